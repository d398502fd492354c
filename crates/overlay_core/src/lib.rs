//! In-process debug overlay: observable capture stores for logs, network exchanges and
//! analytics, a lifecycle-scoped action registry, and shake-to-open detection.

use std::sync::Arc;

use anyhow::{Context, Result};
use storage::{prepare_database_url, Prefs, SqlitePrefsStore};
use tracing::info;

pub mod capture;
pub mod config;
pub mod export;
pub mod lifecycle;
mod lock;
pub mod network;
pub mod overlay;
pub mod registry;
pub mod shake;
pub mod store;

pub use capture::{AnalyticsRecorder, AnalyticsStore, LogCaptureLayer, LogRecorder, LogStore};
pub use config::{load_settings, OverlaySettings};
pub use lifecycle::{LifecycleSignal, ScopeBinding};
pub use network::{CapturedResponse, NetworkRecorder, NetworkStore};
pub use overlay::{OverlayController, OverlayError, OverlayModule, OverlayOptions};
pub use registry::{
    ActionDescriptor, ActionFailure, RegistryError, ScopeState, ScopedActionRegistry,
};
pub use shake::{ShakeConfig, ShakeDebouncer, ShakeDetector, ShakeError};
pub use store::{EventStore, Snapshot, StoreChange};

/// The three capture stores. Each is independent; nothing is ordered across them.
#[derive(Clone)]
pub struct CaptureStores {
    pub logs: Arc<LogStore>,
    pub network: Arc<NetworkStore>,
    pub analytics: Arc<AnalyticsStore>,
}

impl CaptureStores {
    pub fn new(change_capacity: usize) -> Self {
        Self {
            logs: Arc::new(EventStore::with_change_capacity("logs", change_capacity)),
            network: Arc::new(EventStore::with_change_capacity("network", change_capacity)),
            analytics: Arc::new(EventStore::with_change_capacity("analytics", change_capacity)),
        }
    }

    pub fn clear_all(&self) {
        self.logs.clear();
        self.network.clear();
        self.analytics.clear();
    }
}

impl Default for CaptureStores {
    fn default() -> Self {
        Self::new(store::DEFAULT_CHANGE_CAPACITY)
    }
}

/// Owns one overlay's stores, registry and controller. Construct one per process and hand
/// clones of its parts to producers.
pub struct DebugOverlay {
    settings: OverlaySettings,
    stores: CaptureStores,
    registry: Arc<ScopedActionRegistry>,
    controller: OverlayController,
}

impl DebugOverlay {
    pub fn new(
        settings: OverlaySettings,
        modules: Vec<OverlayModule>,
    ) -> Result<Self, OverlayError> {
        let registry = Arc::new(ScopedActionRegistry::new());
        let controller = OverlayController::new(
            modules,
            OverlayOptions::from(&settings),
            Arc::clone(&registry),
        )?;
        let stores = CaptureStores::new(settings.event_channel_capacity);
        info!(
            modules = controller.modules().len(),
            show_fab = settings.show_fab,
            enable_shake = settings.enable_shake,
            "debug overlay ready"
        );
        Ok(Self {
            settings,
            stores,
            registry,
            controller,
        })
    }

    /// Logs, network, analytics, an empty actions list and preferences.
    pub fn with_default_modules(settings: OverlaySettings) -> Result<Self, OverlayError> {
        Self::new(
            settings,
            vec![
                OverlayModule::Logs,
                OverlayModule::Network,
                OverlayModule::Analytics,
                OverlayModule::actions("Actions", Vec::new()),
                OverlayModule::preferences("Preferences"),
            ],
        )
    }

    pub fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    pub fn stores(&self) -> &CaptureStores {
        &self.stores
    }

    pub fn registry(&self) -> &Arc<ScopedActionRegistry> {
        &self.registry
    }

    pub fn controller(&self) -> &OverlayController {
        &self.controller
    }

    pub fn log_layer(&self) -> LogCaptureLayer {
        LogCaptureLayer::new(Arc::clone(&self.stores.logs))
    }

    pub fn log_recorder(&self) -> LogRecorder {
        LogRecorder::new(Arc::clone(&self.stores.logs))
    }

    pub fn network_recorder(&self) -> NetworkRecorder {
        NetworkRecorder::new(Arc::clone(&self.stores.network))
    }

    pub fn analytics(&self) -> AnalyticsRecorder {
        AnalyticsRecorder::new(Arc::clone(&self.stores.analytics))
    }

    /// A fresh scope instance labelled `label`; recreating a screen binds again.
    pub fn bind_scope(
        &self,
        label: &str,
        actions: impl IntoIterator<Item = ActionDescriptor>,
    ) -> ScopeBinding {
        ScopeBinding::new(Arc::clone(&self.registry), label, actions)
    }

    pub async fn open_prefs(&self) -> Result<Prefs<SqlitePrefsStore>> {
        let database_url = prepare_database_url(&self.settings.prefs_database_url)?;
        let store = SqlitePrefsStore::new(&database_url)
            .await
            .with_context(|| format!("failed to open preferences at '{database_url}'"))?;
        Ok(Prefs::new(Arc::new(store)))
    }

    pub fn shutdown(&self) {
        self.controller.shutdown();
    }
}
