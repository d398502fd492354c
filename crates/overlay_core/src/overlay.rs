use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use sensor_integration::MotionSensor;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    config::OverlaySettings,
    lock::lock_or_recover,
    registry::{ActionDescriptor, ScopedActionRegistry},
    shake::{ShakeConfig, ShakeDetector, ShakeError},
};

/// One tab of the overlay.
#[derive(Debug, Clone)]
pub enum OverlayModule {
    Logs,
    Network,
    Analytics,
    /// Static `global_actions` are always listed ahead of whatever scopes contribute.
    Actions {
        title: String,
        global_actions: Vec<ActionDescriptor>,
    },
    Preferences {
        title: String,
    },
}

impl OverlayModule {
    pub fn actions(title: impl Into<String>, global_actions: Vec<ActionDescriptor>) -> Self {
        OverlayModule::Actions {
            title: title.into(),
            global_actions,
        }
    }

    pub fn preferences(title: impl Into<String>) -> Self {
        OverlayModule::Preferences {
            title: title.into(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            OverlayModule::Logs => "Logs",
            OverlayModule::Network => "Network",
            OverlayModule::Analytics => "Analytics",
            OverlayModule::Actions { title, .. } | OverlayModule::Preferences { title } => title,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayOptions {
    pub show_fab: bool,
    pub enable_shake: bool,
    pub shake: ShakeConfig,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            show_fab: true,
            enable_shake: false,
            shake: ShakeConfig::default(),
        }
    }
}

impl From<&OverlaySettings> for OverlayOptions {
    fn from(settings: &OverlaySettings) -> Self {
        Self {
            show_fab: settings.show_fab,
            enable_shake: settings.enable_shake,
            shake: settings.shake_config(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("the overlay needs at least one module")]
    NoModules,
    #[error("module index {index} out of range ({count} modules)")]
    ModuleIndex { index: usize, count: usize },
    #[error(transparent)]
    Shake(#[from] ShakeError),
}

/// Visibility, tab selection and the shake trigger of the overlay. Rendering is left to the
/// host, which follows `subscribe_visibility`.
pub struct OverlayController {
    modules: Vec<OverlayModule>,
    options: OverlayOptions,
    selected: AtomicUsize,
    visible: Arc<watch::Sender<bool>>,
    registry: Arc<ScopedActionRegistry>,
    detector: Mutex<Option<ShakeDetector>>,
}

impl OverlayController {
    pub fn new(
        modules: Vec<OverlayModule>,
        options: OverlayOptions,
        registry: Arc<ScopedActionRegistry>,
    ) -> Result<Self, OverlayError> {
        if modules.is_empty() {
            return Err(OverlayError::NoModules);
        }
        let (visible, _) = watch::channel(false);
        Ok(Self {
            modules,
            options,
            selected: AtomicUsize::new(0),
            visible: Arc::new(visible),
            registry,
            detector: Mutex::new(None),
        })
    }

    pub fn modules(&self) -> &[OverlayModule] {
        &self.modules
    }

    pub fn options(&self) -> OverlayOptions {
        self.options
    }

    pub fn registry(&self) -> &Arc<ScopedActionRegistry> {
        &self.registry
    }

    /// Tabs are only worth drawing with more than one module.
    pub fn shows_tabs(&self) -> bool {
        self.modules.len() > 1
    }

    pub fn shows_fab(&self) -> bool {
        self.options.show_fab
    }

    pub fn select(&self, index: usize) -> Result<&OverlayModule, OverlayError> {
        let module = self.modules.get(index).ok_or(OverlayError::ModuleIndex {
            index,
            count: self.modules.len(),
        })?;
        self.selected.store(index, Ordering::Relaxed);
        debug!(module = module.title(), "selected overlay module");
        Ok(module)
    }

    pub fn selected_index(&self) -> usize {
        self.selected.load(Ordering::Relaxed)
    }

    pub fn selected(&self) -> &OverlayModule {
        &self.modules[self.selected_index()]
    }

    /// Global actions of the module followed by the scopes' active ones. Empty for modules
    /// that are not action lists.
    pub fn actions_for(&self, module: &OverlayModule) -> Vec<ActionDescriptor> {
        match module {
            OverlayModule::Actions { global_actions, .. } => {
                let mut actions = global_actions.clone();
                for action in self.registry.list_active() {
                    if !actions.contains(&action) {
                        actions.push(action);
                    }
                }
                actions
            }
            _ => Vec::new(),
        }
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    pub fn subscribe_visibility(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }

    pub fn show(&self) {
        set_visible(&self.visible, true);
    }

    pub fn hide(&self) {
        set_visible(&self.visible, false);
    }

    /// Returns the new visibility.
    pub fn toggle(&self) -> bool {
        toggle_visible(&self.visible)
    }

    /// Floating button press. Ignored when the button is configured off.
    pub fn press_fab(&self) -> bool {
        if self.options.show_fab {
            self.toggle()
        } else {
            self.is_visible()
        }
    }

    /// Starts shake-to-toggle against `sensor` when enabled in the options. Returns whether
    /// detection is running afterwards.
    pub fn enable_shake(&self, sensor: Arc<dyn MotionSensor>) -> Result<bool, OverlayError> {
        if !self.options.enable_shake {
            return Ok(false);
        }
        let mut slot = lock_or_recover(&self.detector, "overlay shake detector");
        if slot.as_ref().is_some_and(ShakeDetector::is_running) {
            return Ok(true);
        }

        let detector = ShakeDetector::new(sensor, self.options.shake);
        let visible = Arc::clone(&self.visible);
        detector.start(move || {
            toggle_visible(&visible);
        })?;
        *slot = Some(detector);
        Ok(true)
    }

    pub fn shake_running(&self) -> bool {
        lock_or_recover(&self.detector, "overlay shake detector")
            .as_ref()
            .is_some_and(ShakeDetector::is_running)
    }

    /// Stops shake detection and hides the overlay.
    pub fn shutdown(&self) {
        let detector = lock_or_recover(&self.detector, "overlay shutdown").take();
        if let Some(detector) = detector {
            detector.stop();
        }
        self.hide();
        info!("debug overlay shut down");
    }
}

fn set_visible(visible: &watch::Sender<bool>, value: bool) {
    visible.send_if_modified(|current| {
        let changed = *current != value;
        *current = value;
        changed
    });
}

fn toggle_visible(visible: &watch::Sender<bool>) -> bool {
    let mut now_visible = false;
    visible.send_modify(|current| {
        *current = !*current;
        now_visible = *current;
    });
    debug!(visible = now_visible, "toggled debug overlay");
    now_visible
}

#[cfg(test)]
#[path = "tests/overlay_tests.rs"]
mod tests;
