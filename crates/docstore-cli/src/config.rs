//! Connection settings, layered: flags, then environment, then the config
//! file, then defaults.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use docstore_core::DbUrl;
use docstore_mongo::ConnectionConfig;

use crate::cli::GlobalArgs;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub const URL_ENV: &str = "DOCSTORE_MONGODB_URL";
pub const DATABASE_ENV: &str = "DOCSTORE_DATABASE";

/// Contents of `config.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Where a setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Flag,
    Env,
    File,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Flag => f.write_str("flag"),
            Source::Env => f.write_str("environment"),
            Source::File => f.write_str("config file"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Setting<T> {
    pub value: T,
    pub source: Source,
}

/// Resolved connection settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub url: Option<Setting<DbUrl>>,
    pub database: Option<Setting<String>>,
}

impl Settings {
    /// Library configuration for these settings.
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new();
        if let Some(url) = &self.url {
            config = config.with_url(url.value.clone());
        }
        if let Some(database) = &self.database {
            config = config.with_database(database.value.clone());
        }
        config
    }
}

/// Get the config file path.
pub fn config_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "docstore").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.json"))
}

/// Load the config file, or defaults if there is none.
pub fn load() -> Result<StoredConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(StoredConfig::default());
    }

    let json = fs::read_to_string(&path).context("Failed to read config file")?;
    serde_json::from_str(&json).context("Invalid config file")
}

/// Write the config file. It may hold credentials, so it is private to the
/// user on Unix.
pub fn save(config: &StoredConfig) -> Result<PathBuf> {
    let path = config_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("Failed to create config directory")?;
    }

    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, &json).context("Failed to write config file")?;

    #[cfg(unix)]
    {
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&path, perms)?;
    }

    Ok(path)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn pick(flag: Option<String>, env: Option<String>, file: Option<String>) -> Option<Setting<String>> {
    flag.map(|value| Setting {
        value,
        source: Source::Flag,
    })
    .or_else(|| {
        env.map(|value| Setting {
            value,
            source: Source::Env,
        })
    })
    .or_else(|| {
        file.map(|value| Setting {
            value,
            source: Source::File,
        })
    })
}

/// Resolve connection settings for this invocation.
pub fn resolve(globals: &GlobalArgs) -> Result<Settings> {
    let stored = load()?;

    let url = match pick(globals.url.clone(), env_var(URL_ENV), stored.url) {
        Some(raw) => Some(Setting {
            value: DbUrl::new(&raw.value)
                .with_context(|| format!("Invalid connection URL from {}", raw.source))?,
            source: raw.source,
        }),
        None => None,
    };
    let database = pick(globals.database.clone(), env_var(DATABASE_ENV), stored.database);

    debug!(
        url = ?url.as_ref().map(|u| u.value.to_string()),
        url_source = ?url.as_ref().map(|u| u.source),
        database = ?database.as_ref().map(|d| d.value.as_str()),
        database_source = ?database.as_ref().map(|d| d.source),
        "Resolved connection settings"
    );

    Ok(Settings { url, database })
}
