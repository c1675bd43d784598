// # embedded_usage - push-core end to end
//
// Drives a `PushOrchestrator` against simulated providers so the whole
// registration lifecycle can be watched in the logs: provider selection,
// fallback, transient retries, persistence and unregistration.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `PUSH_CONFIG_PATH`: JSON file with a full `PushConfig` (overrides the rest)
// - `PUSH_SELECT_SYSTEM_PREFERRED`: `true` to try system-hosted providers first
// - `PUSH_RECOVER_PROVIDER`: `true` to re-register when a provider goes away
// - `PUSH_BACKOFF_MAX_TRIES`: retry budget for transient failures (0 = unlimited)
// - `PUSH_STATE_STORE_PATH`: state file; in-memory store when unset
// - `PUSH_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// Without a config file three simulated providers are used: `vendor` is not
// available on this device, `flaky` fails once with SERVICE_NOT_AVAILABLE and
// then succeeds, `backup` always succeeds.
//
// ## Example
//
// ```bash
// export PUSH_BACKOFF_MAX_TRIES=3
// export PUSH_STATE_STORE_PATH=/tmp/push/state.json
// export PUSH_LOG_LEVEL=debug
//
// cargo run -p embedded_usage
// ```

use anyhow::{Context, Result};
use push_core::traits::{PersistedState, PushProviderFactory};
use push_core::{
    BackoffConfig, ChannelListener, Options, ProviderCallback, ProviderConfig, ProviderError,
    ProviderRegistry, PushConfig, PushEvent, PushOrchestrator, PushProvider, PushResult,
    StateStoreConfig,
};
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// How long the demo waits for the next lifecycle event
const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Simulated provider latency
const PROVIDER_LATENCY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
enum DemoExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DemoExitCode> for ExitCode {
    fn from(code: DemoExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    config_path: Option<String>,
    select_system_preferred: bool,
    recover_provider: bool,
    backoff_max_tries: Option<u32>,
    state_store_path: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            config_path: env::var("PUSH_CONFIG_PATH").ok(),
            select_system_preferred: parse_flag("PUSH_SELECT_SYSTEM_PREFERRED")?,
            recover_provider: parse_flag("PUSH_RECOVER_PROVIDER")?,
            backoff_max_tries: env::var("PUSH_BACKOFF_MAX_TRIES")
                .ok()
                .map(|s| {
                    s.parse()
                        .with_context(|| format!("PUSH_BACKOFF_MAX_TRIES is not a number: {}", s))
                })
                .transpose()?,
            state_store_path: env::var("PUSH_STATE_STORE_PATH").ok(),
            log_level: env::var("PUSH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    fn validate(&self) -> Result<()> {
        if let Some(ref path) = self.state_store_path
            && path.is_empty()
        {
            anyhow::bail!("PUSH_STATE_STORE_PATH cannot be empty");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PUSH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the library configuration
    fn push_config(&self) -> Result<PushConfig> {
        if let Some(ref path) = self.config_path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read PUSH_CONFIG_PATH {}", path))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("Invalid push configuration in {}", path));
        }

        let providers = vec![
            ProviderConfig::new("simulated").with_config(json!({
                "name": "vendor",
                "host_app_package": "com.vendor.push",
                "available": false,
            })),
            ProviderConfig::new("simulated").with_config(json!({
                "name": "flaky",
                "fail_first": "service_not_available",
            })),
            ProviderConfig::new("simulated").with_config(json!({ "name": "backup" })),
        ];

        let state_store = match &self.state_store_path {
            Some(path) => StateStoreConfig::File { path: path.clone() },
            None => StateStoreConfig::Memory,
        };

        Ok(PushConfig {
            providers,
            select_system_preferred: self.select_system_preferred,
            recover_provider: self.recover_provider,
            backoff: self.backoff_max_tries.map(|max| BackoffConfig {
                max_tries: (max > 0).then_some(max),
            }),
            state_store,
        })
    }
}

fn parse_flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be true or false, got: {}", name, value)),
        Err(_) => Ok(false),
    }
}

/// Configuration accepted by the `simulated` provider factory
#[derive(Debug, Deserialize)]
struct SimulatedConfig {
    name: String,
    #[serde(default)]
    host_app_package: Option<String>,
    #[serde(default = "default_available")]
    available: bool,
    /// Error reported by the first registration attempt
    #[serde(default)]
    fail_first: Option<ProviderError>,
}

fn default_available() -> bool {
    true
}

/// Provider that answers from a spawned task after a short delay
struct SimulatedProvider {
    name: String,
    host_app_package: String,
    available: AtomicBool,
    fail_first: Mutex<Option<ProviderError>>,
    registration_id: Arc<Mutex<Option<String>>>,
    attempts: AtomicUsize,
    callback: ProviderCallback,
}

impl SimulatedProvider {
    fn report(&self, result: PushResult, registration_id: Option<String>) {
        let callback = self.callback.clone();
        let slot = self.registration_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(PROVIDER_LATENCY).await;
            if result.is_success() {
                *slot.lock().unwrap_or_else(|e| e.into_inner()) = registration_id;
            }
            if let Err(e) = callback.on_result(result).await {
                warn!("Result rejected: {}", e);
            }
        });
    }
}

impl PushProvider for SimulatedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn host_app_package(&self) -> &str {
        &self.host_app_package
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn register(&self) {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!("[{}] register() attempt {}", self.name, attempt);

        let failure = self
            .fail_first
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match failure {
            Some(error) => self.report(PushResult::registration_failed(&self.name, error), None),
            None => {
                let id = format!("{}-reg-{}", self.name, attempt);
                self.report(PushResult::registered(&self.name, &id), Some(id));
            }
        }
    }

    fn unregister(&self) {
        info!("[{}] unregister()", self.name);
        let id = self.registration_id().unwrap_or_default();
        self.report(PushResult::unregistered(&self.name, id), None);
    }

    fn is_registered(&self) -> bool {
        self.registration_id().is_some()
    }

    fn registration_id(&self) -> Option<String> {
        self.registration_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn on_registration_invalid(&self) {
        *self.registration_id.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn on_unavailable(&self) {
        self.available.store(false, Ordering::SeqCst);
    }
}

struct SimulatedProviderFactory;

impl PushProviderFactory for SimulatedProviderFactory {
    fn create(
        &self,
        config: &serde_json::Value,
        callback: ProviderCallback,
    ) -> push_core::Result<Arc<dyn PushProvider>> {
        let config: SimulatedConfig = serde_json::from_value(config.clone())?;
        let host_app_package = config
            .host_app_package
            .unwrap_or_else(|| format!("com.example.{}", config.name));

        Ok(Arc::new(SimulatedProvider {
            name: config.name,
            host_app_package,
            available: AtomicBool::new(config.available),
            fail_first: Mutex::new(config.fail_first),
            registration_id: Arc::new(Mutex::new(None)),
            attempts: AtomicUsize::new(0),
            callback,
        }))
    }
}

/// One-line summary of the orchestrator and its persisted state
async fn describe(orchestrator: &PushOrchestrator) -> String {
    let persisted: PersistedState = orchestrator.persisted_state().await;
    format!(
        "state={} provider={} pending_retry={}",
        orchestrator.state().await,
        persisted.last_provider_name.as_deref().unwrap_or("-"),
        persisted
            .pending_retry_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    )
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DemoExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DemoExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DemoExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DemoExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run(config).await {
            error!("Demo error: {:#}", e);
            DemoExitCode::RuntimeError
        } else {
            DemoExitCode::CleanShutdown
        }
    });

    result.into()
}

async fn run(config: Config) -> Result<()> {
    let push_config = config.push_config()?;

    let registry = ProviderRegistry::with_builtin_stores();
    registry.register_provider("simulated", Arc::new(SimulatedProviderFactory));

    let store = registry.create_state_store(&push_config.state_store).await?;
    info!("Using {} state store", push_config.state_store.type_name());

    let (listener, mut events) = ChannelListener::new();
    let orchestrator = PushOrchestrator::builder(store)
        .listener(Arc::new(listener))
        .build();

    let options = Options::from_config(&push_config, &registry, &orchestrator.provider_callback())?;
    for descriptor in options.descriptors() {
        info!(
            "Provider #{}: {} ({})",
            descriptor.position, descriptor.name, descriptor.host_app_package
        );
    }

    orchestrator.init(options).await?;
    info!("Initialized: {}", describe(&orchestrator).await);

    if !orchestrator.is_registered().await {
        orchestrator.register().await?;
        wait_for(&mut events, |event| {
            matches!(
                event,
                PushEvent::Registered { .. } | PushEvent::NoAvailableProvider
            )
        })
        .await?;
    }
    info!("After register: {}", describe(&orchestrator).await);

    if orchestrator.is_registered().await {
        orchestrator.unregister().await?;
        wait_for(&mut events, |event| {
            matches!(
                event,
                PushEvent::Unregistered { .. } | PushEvent::UnregistrationError { .. }
            )
        })
        .await?;
        info!("After unregister: {}", describe(&orchestrator).await);
    }

    orchestrator.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}

/// Log events until one matches `done`
async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<PushEvent>,
    done: impl Fn(&PushEvent) -> bool,
) -> Result<()> {
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, events.recv())
            .await
            .context("Timed out waiting for a push event")?
            .context("Event channel closed")?;
        info!("Event: {:?}", event);
        if done(&event) {
            return Ok(());
        }
    }
}
