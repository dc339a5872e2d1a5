use std::{collections::HashMap, fs, path::Path, time::Duration};

use crate::runs::RunnerSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub ui_timeout_ms: u64,
    pub step_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8000".into(),
            ui_timeout_ms: 60_000,
            step_delay_ms: 500,
        }
    }
}

impl Settings {
    pub fn runner(&self) -> RunnerSettings {
        RunnerSettings {
            step_delay: Duration::from_millis(self.step_delay_ms),
            ui_timeout: Duration::from_millis(self.ui_timeout_ms),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    apply_file(&mut settings, Path::new("server.toml"));
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, path: &Path) {
    let Ok(raw) = fs::read_to_string(path) else {
        return;
    };
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(&raw) else {
        tracing::warn!(path = %path.display(), "ignoring unparseable settings file");
        return;
    };

    if let Some(v) = file_cfg.get("bind_addr").and_then(toml::Value::as_str) {
        settings.server_bind = v.to_string();
    }
    if let Some(v) = file_cfg.get("ui_timeout_ms").and_then(toml::Value::as_integer) {
        settings.ui_timeout_ms = v.max(0) as u64;
    }
    if let Some(v) = file_cfg.get("step_delay_ms").and_then(toml::Value::as_integer) {
        settings.step_delay_ms = v.max(0) as u64;
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("APP__UI_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        settings.ui_timeout_ms = v;
    }
    if let Some(v) = var("APP__STEP_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.step_delay_ms = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
