// ABOUTME: Parses tsvio.toml settings: fixtures directory and named connections
// ABOUTME: Resolves a --connection argument to a database URL

use crate::backend::DatabaseKind;
use crate::transfer::discovery::DEFAULT_FIXTURES_DIR;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "tsvio.toml";

pub const DEFAULT_CONNECTION: &str = "default";

/// Environment variable consulted when no `default` connection is configured
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: PathBuf,
    /// Connection name -> database URL
    #[serde(default)]
    pub connections: BTreeMap<String, String>,
}

fn default_fixtures_dir() -> PathBuf {
    PathBuf::from(DEFAULT_FIXTURES_DIR)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fixtures_dir: default_fixtures_dir(),
            connections: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse TOML settings")
    }

    /// Resolve a connection name or literal URL
    ///
    /// Lookup order: a configured connection with that name, then the
    /// argument itself if it looks like a database URL, then `DATABASE_URL`
    /// for the `default` name.
    pub fn resolve_connection(&self, name_or_url: &str) -> Result<String> {
        if let Some(url) = self.connections.get(name_or_url) {
            return Ok(url.clone());
        }
        if DatabaseKind::detect(name_or_url).is_ok() {
            return Ok(name_or_url.to_string());
        }
        if name_or_url == DEFAULT_CONNECTION {
            if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
                return Ok(url);
            }
        }

        let known: Vec<&str> = self.connections.keys().map(String::as_str).collect();
        bail!(
            "Unknown connection '{}'. Configured connections: {}",
            name_or_url,
            if known.is_empty() {
                "(none)".to_string()
            } else {
                known.join(", ")
            }
        )
    }
}

/// Load settings from `path`, or from `tsvio.toml` when no path is given
///
/// A missing default file yields the default settings; a missing file that
/// was asked for explicitly is an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    if !explicit && !path.exists() {
        tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
        return Ok(Settings::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    Settings::from_toml(&raw)
        .with_context(|| format!("Failed to parse TOML config at {}", path.display()))
}
