//! Daemon configuration.
//!
//! JSON config file (path from `--config` or `WASTEWATCH_CONFIG`), then
//! `WASTEWATCH_*` environment overrides, then a validation pass. The class
//! catalog is deployment configuration here, never hard-coded at call
//! sites.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::catalog::{ClassCatalog, REFERENCE_LABELS};

const DEFAULT_DB_PATH: &str = "wastewatch.db";
const DEFAULT_IMAGE_DIR: &str = "images";
const DEFAULT_LABELED_DIR: &str = "labeled";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8640";
const DEFAULT_TOKEN_VALIDITY_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize, Default)]
struct WastewatchConfigFile {
    db_path: Option<String>,
    image_dir: Option<String>,
    labeled_dir: Option<String>,
    api: Option<ApiConfigFile>,
    tokens: Option<TokenConfigFile>,
    catalog: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    require_upload_token: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenConfigFile {
    validity_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct WastewatchConfig {
    pub db_path: String,
    pub image_dir: String,
    pub labeled_dir: String,
    pub api_addr: String,
    /// The reference deployment leaves the upload path open to its device
    /// network; gate it per deployment, not by assumption.
    pub require_upload_token: bool,
    pub token_validity: Duration,
    pub catalog_labels: Vec<String>,
}

impl WastewatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WASTEWATCH_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WastewatchConfigFile) -> Self {
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            image_dir: file
                .image_dir
                .unwrap_or_else(|| DEFAULT_IMAGE_DIR.to_string()),
            labeled_dir: file
                .labeled_dir
                .unwrap_or_else(|| DEFAULT_LABELED_DIR.to_string()),
            api_addr: file
                .api
                .as_ref()
                .and_then(|api| api.addr.clone())
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            require_upload_token: file
                .api
                .and_then(|api| api.require_upload_token)
                .unwrap_or(false),
            token_validity: Duration::from_secs(
                file.tokens
                    .and_then(|tokens| tokens.validity_secs)
                    .unwrap_or(DEFAULT_TOKEN_VALIDITY_SECS),
            ),
            catalog_labels: file
                .catalog
                .unwrap_or_else(|| REFERENCE_LABELS.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("WASTEWATCH_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(dir) = std::env::var("WASTEWATCH_IMAGE_DIR") {
            if !dir.trim().is_empty() {
                self.image_dir = dir;
            }
        }
        if let Ok(dir) = std::env::var("WASTEWATCH_LABELED_DIR") {
            if !dir.trim().is_empty() {
                self.labeled_dir = dir;
            }
        }
        if let Ok(addr) = std::env::var("WASTEWATCH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(flag) = std::env::var("WASTEWATCH_REQUIRE_UPLOAD_TOKEN") {
            self.require_upload_token = match flag.trim() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                other => {
                    return Err(anyhow!(
                        "WASTEWATCH_REQUIRE_UPLOAD_TOKEN must be a boolean, got '{other}'"
                    ))
                }
            };
        }
        if let Ok(secs) = std::env::var("WASTEWATCH_TOKEN_VALIDITY_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("WASTEWATCH_TOKEN_VALIDITY_SECS must be an integer number of seconds")
            })?;
            self.token_validity = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        // ClassCatalog::new enforces the non-empty / unique constraints.
        ClassCatalog::new(self.catalog_labels.clone())?;
        if self.token_validity.as_secs() == 0 {
            return Err(anyhow!("token validity must be greater than zero"));
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<ClassCatalog> {
        ClassCatalog::new(self.catalog_labels.clone())
    }
}

fn read_config_file(path: &Path) -> Result<WastewatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
