use std::{fs, io, path::Path, str::FromStr, time::Duration};

use serde::Deserialize;
use storage::DEFAULT_PREFS_DATABASE_URL;
use tracing::warn;

use crate::{shake::ShakeConfig, store::DEFAULT_CHANGE_CAPACITY};

pub const SETTINGS_FILE: &str = "debug_overlay.toml";
const ENV_PREFIX: &str = "DEBUG_OVERLAY__";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub show_fab: bool,
    pub enable_shake: bool,
    pub shake_threshold: f64,
    pub shake_cooldown_ms: u64,
    pub event_channel_capacity: usize,
    pub prefs_database_url: String,
    pub log_filter: String,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        let shake = ShakeConfig::default();
        Self {
            show_fab: true,
            enable_shake: false,
            shake_threshold: shake.threshold,
            shake_cooldown_ms: u64::try_from(shake.cooldown.as_millis()).unwrap_or(u64::MAX),
            event_channel_capacity: DEFAULT_CHANGE_CAPACITY,
            prefs_database_url: DEFAULT_PREFS_DATABASE_URL.into(),
            log_filter: "info".into(),
        }
    }
}

impl OverlaySettings {
    pub fn shake_config(&self) -> ShakeConfig {
        ShakeConfig {
            threshold: self.shake_threshold,
            cooldown: Duration::from_millis(self.shake_cooldown_ms),
        }
    }
}

/// `debug_overlay.toml` in the working directory, then `DEBUG_OVERLAY__*` overrides.
pub fn load_settings() -> OverlaySettings {
    let mut settings = load_settings_from(Path::new(SETTINGS_FILE));
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

/// A missing file yields the defaults; an unreadable or malformed one is reported and
/// ignored.
pub fn load_settings_from(path: &Path) -> OverlaySettings {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return OverlaySettings::default();
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to read overlay settings; using defaults");
            return OverlaySettings::default();
        }
    };

    match toml::from_str::<OverlaySettings>(&raw) {
        Ok(settings) => settings,
        Err(error) => {
            warn!(path = %path.display(), %error, "malformed overlay settings; using defaults");
            OverlaySettings::default()
        }
    }
}

pub fn apply_env_overrides<F>(settings: &mut OverlaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    override_parsed(&mut settings.show_fab, "SHOW_FAB", var("SHOW_FAB"));
    override_parsed(&mut settings.enable_shake, "ENABLE_SHAKE", var("ENABLE_SHAKE"));
    override_parsed(
        &mut settings.shake_threshold,
        "SHAKE_THRESHOLD",
        var("SHAKE_THRESHOLD"),
    );
    override_parsed(
        &mut settings.shake_cooldown_ms,
        "SHAKE_COOLDOWN_MS",
        var("SHAKE_COOLDOWN_MS"),
    );
    override_parsed(
        &mut settings.event_channel_capacity,
        "EVENT_CHANNEL_CAPACITY",
        var("EVENT_CHANNEL_CAPACITY"),
    );

    if let Some(v) = var("PREFS_DATABASE_URL") {
        settings.prefs_database_url = v;
    }

    if let Some(v) = lookup("RUST_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = var("LOG_FILTER") {
        settings.log_filter = v;
    }
}

fn override_parsed<T: FromStr>(field: &mut T, name: &str, value: Option<String>) {
    let Some(value) = value else {
        return;
    };
    match value.trim().parse::<T>() {
        Ok(parsed) => *field = parsed,
        Err(_) => warn!(
            variable = %format!("{ENV_PREFIX}{name}"),
            %value,
            "ignoring unparsable override"
        ),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
