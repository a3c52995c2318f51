use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use storage::config::DEFAULT_MAX_PAGES;
use storage::StorageConfig;

const DEFAULT_LOG_LEVEL: &str = "warn";

/// Runtime settings, layered: built-in defaults, then the optional settings
/// file, then `TOYDB_*` environment variables (`__` separates sections, e.g.
/// `TOYDB_STORAGE__MAX_PAGES`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub log_level: String,
    pub storage: StorageConfig,
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("log_level", DEFAULT_LOG_LEVEL)?
            .set_default("storage.max_pages", i64::from(DEFAULT_MAX_PAGES))?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("TOYDB")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("failed to read settings")?
            .try_deserialize()
            .context("invalid settings")
    }
}
