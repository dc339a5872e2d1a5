use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSettings {
    pub server_url: String,
    pub log_filter: String,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    server_url: Option<String>,
    log_filter: Option<String>,
}

/// Defaults, then the config file, then the environment. CLI flags are
/// applied by the caller on top of the result.
///
/// An explicitly named file must exist; the default `console.toml` is
/// optional.
pub fn load_settings(explicit: Option<&Path>) -> Result<ConsoleSettings> {
    let mut settings = ConsoleSettings::default();
    match explicit {
        Some(path) => apply_file(&mut settings, path)?,
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                apply_file(&mut settings, path)?;
            }
        }
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut ConsoleSettings, path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: FileConfig =
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;

    if let Some(url) = file.server_url {
        settings.server_url = url;
    }
    if let Some(filter) = file.log_filter {
        settings.log_filter = filter;
    }
    Ok(())
}

fn apply_env(settings: &mut ConsoleSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("RUN_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
