// # Platform Trait
//
// Device facts and subscriptions the orchestrator needs but does not own:
// which packages are part of the system image, whether the network is up,
// the device identity, and watching a provider's host application for
// removal.

/// Host platform services used by the orchestrator
///
/// Every method has a neutral default so embedders only implement what their
/// platform supports.
pub trait Platform: Send + Sync {
    /// Whether `package` is installed as a privileged system application
    fn is_system_package(&self, _package: &str) -> bool {
        false
    }

    /// Whether the device currently has network connectivity
    ///
    /// When this returns `false` a registration attempt fails immediately
    /// with `ServiceNotAvailable` instead of reaching the provider.
    fn is_network_connected(&self) -> bool {
        true
    }

    /// Stable identity of this device, persisted on registration
    fn device_identity(&self) -> Option<String> {
        None
    }

    /// Start watching the registered provider's host application
    ///
    /// The platform should call
    /// [`crate::PushOrchestrator::on_provider_unavailable`] when it goes away.
    fn watch_provider(&self, _provider_name: &str, _host_app_package: &str) {}

    /// Stop the watch started by [`Platform::watch_provider`]
    fn unwatch_provider(&self) {}
}

/// Platform with no system packages, permanent connectivity and no identity
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlatform;

impl Platform for DefaultPlatform {}
