use std::path::{Path, PathBuf};

use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub execution_url: String,
    pub execution_timeout_secs: u64,
    pub static_dir: Option<PathBuf>,
    pub max_frame_bytes: usize,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".into(),
            execution_url: execution::DEFAULT_EXECUTION_URL.into(),
            execution_timeout_secs: 15,
            static_dir: None,
            max_frame_bytes: 1024 * 1024,
            log_filter: "info".into(),
        }
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))?;
    let bind_from_env = std::env::var("APP__BIND_ADDR").is_ok();
    if !bind_from_env {
        apply_port_override(&mut settings, std::env::var("PORT").ok().as_deref());
    }
    Ok(settings)
}

/// Defaults, then the optional TOML file at `path`, then `APP__*` variables.
pub fn load_settings_from(path: &Path) -> anyhow::Result<Settings> {
    let settings = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to read settings from '{}'", path.display()))?;

    let settings: Settings = settings
        .try_deserialize()
        .context("invalid server settings")?;
    validate(&settings)?;
    Ok(settings)
}

/// Hosting platforms hand out the listen port through `PORT`.
pub fn apply_port_override(settings: &mut Settings, port: Option<&str>) {
    let Some(port) = port.map(str::trim).filter(|port| !port.is_empty()) else {
        return;
    };
    if port.parse::<u16>().is_ok() {
        settings.bind_addr = format!("0.0.0.0:{port}");
    }
}

fn validate(settings: &Settings) -> anyhow::Result<()> {
    if settings.execution_timeout_secs == 0 {
        anyhow::bail!("execution_timeout_secs must be greater than zero");
    }
    if settings.max_frame_bytes == 0 {
        anyhow::bail!("max_frame_bytes must be greater than zero");
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
