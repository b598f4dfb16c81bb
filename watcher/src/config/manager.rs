use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Process-level settings, loaded from `<config_dir>/watcher.toml` with
/// environment overrides for the transport credential and bind port.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_exports_dir")]
    pub exports_dir: PathBuf,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub telegram_token: Option<String>,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./db.json")
}

fn default_exports_dir() -> PathBuf {
    PathBuf::from("./exports")
}

fn default_port() -> u16 {
    7860
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            exports_dir: default_exports_dir(),
            port: default_port(),
            telegram_token: None,
        }
    }
}

impl AppConfig {
    pub async fn load(config_dir: impl AsRef<Path>) -> Result<Self> {
        let path = config_dir.as_ref().join("watcher.toml");
        let mut config = if path.exists() {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let parsed: Self =
                toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
            info!("configuration loaded from {}", path.display());
            parsed
        } else {
            info!(
                "no configuration file at {}, using defaults",
                path.display()
            );
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
            if !token.trim().is_empty() {
                self.telegram_token = Some(token.trim().to_string());
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) => self.port = parsed,
                Err(_) => warn!("ignoring unparsable PORT value '{}'", port),
            }
        }
    }
}
