use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dialect::{BackendKind, DialectError, TableRef, DEFAULT_PAGE_SIZE};
use crate::dispatch::StalePolicy;

pub const PASSWORD_ENV_VAR: &str = "ROWDECK_DB_PASSWORD";
pub const CONFIG_DIR_ENV_VAR: &str = "ROWDECK_CONFIG_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ViewerSettings {
    pub page_size: i64,
    pub status_clear_secs: u64,
    pub probe_timeout_secs: u64,
    pub accept_stale_results: bool,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            page_size: i64::try_from(DEFAULT_PAGE_SIZE).unwrap_or(i64::MAX),
            status_clear_secs: 4,
            probe_timeout_secs: 10,
            accept_stale_results: false,
        }
    }
}

impl ViewerSettings {
    #[must_use]
    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_clear_secs)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    #[must_use]
    pub fn stale_policy(&self) -> StalePolicy {
        if self.accept_stale_results {
            StalePolicy::ApplyAll
        } else {
            StalePolicy::DropStale
        }
    }
}

/// Where the viewport points: one table on one backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub backend: BackendKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    /// Database file for the file-based backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl ConnectionTarget {
    #[must_use]
    pub fn new(backend: BackendKind, table: impl Into<String>) -> Self {
        Self {
            backend,
            host: default_host(),
            port: None,
            user: None,
            database: None,
            path: None,
            schema: None,
            table: table.into(),
        }
    }

    #[must_use]
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| self.backend.default_port())
    }

    /// Table reference, qualified with a schema only where the backend has them.
    pub fn table_ref(&self) -> Result<TableRef, DialectError> {
        let schema = if self.backend.supports_schemas() {
            Some(self.schema.as_deref().unwrap_or("public"))
        } else {
            None
        };
        TableRef::new(schema, &self.table)
    }

    #[must_use]
    pub fn password(&self) -> Option<String> {
        env::var(PASSWORD_ENV_VAR).ok().filter(|pw| !pw.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub viewer: ViewerSettings,
    #[serde(default)]
    pub connection: Option<ConnectionTarget>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no connection is configured in {0}")]
    MissingConnection(PathBuf),
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    config: AppConfig,
}

impl FileConfigStore {
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                config: AppConfig::default(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                config: AppConfig::default(),
            });
        }

        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        Ok(Self { path, config })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn connection(&self) -> Result<&ConnectionTarget, ConfigError> {
        self.config
            .connection
            .as_ref()
            .ok_or_else(|| ConfigError::MissingConnection(self.path.clone()))
    }

    pub fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| ConfigError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = toml::to_string_pretty(&self.config)
            .map_err(|source| ConfigError::Serialize { source })?;

        fs::write(&self.path, rendered).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = if let Some(custom) = env::var_os(CONFIG_DIR_ENV_VAR) {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ConfigError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ConfigError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("rowdeck"))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_config_dir()?.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConnectionTarget, FileConfigStore, ViewerSettings};
    use crate::dialect::BackendKind;
    use crate::dispatch::StalePolicy;

    fn temp_config_path(temp_dir: &TempDir) -> PathBuf {
        temp_dir.path().join("config.toml")
    }

    #[test]
    fn missing_config_file_loads_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let store =
            FileConfigStore::load_from_path(temp_config_path(&temp_dir)).expect("load store");

        assert_eq!(store.config(), &AppConfig::default());
        assert_eq!(store.config().viewer.page_size, 50);
        assert_eq!(store.config().viewer.stale_policy(), StalePolicy::DropStale);
        assert!(matches!(
            store.connection(),
            Err(ConfigError::MissingConnection(_))
        ));
    }

    #[test]
    fn parses_partial_settings_and_backend_aliases() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_config_path(&temp_dir);
        fs::write(
            &path,
            r#"
            [viewer]
            page_size = 25
            accept_stale_results = true

            [connection]
            backend = "postgresql"
            database = "shop"
            table = "orders"
            "#,
        )
        .expect("write config");

        let store = FileConfigStore::load_from_path(&path).expect("load store");
        let viewer = &store.config().viewer;
        assert_eq!(viewer.page_size, 25);
        assert_eq!(viewer.status_clear_secs, 4);
        assert_eq!(viewer.stale_policy(), StalePolicy::ApplyAll);

        let target = store.connection().expect("connection");
        assert_eq!(target.backend, BackendKind::Postgres);
        assert_eq!(target.host, "127.0.0.1");
        assert_eq!(target.effective_port(), Some(5432));
        assert_eq!(target.table_ref().expect("table").to_string(), "public.orders");
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_config_path(&temp_dir);
        fs::write(&path, "[connection]\nbackend = \"oracle\"\ntable = \"t\"\n")
            .expect("write config");

        let err = FileConfigStore::load_from_path(&path).expect_err("unknown backend");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn persist_and_reload_round_trips() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut store = FileConfigStore::load_from_path(&path).expect("load store");
        let mut target = ConnectionTarget::new(BackendKind::Sqlite, "users");
        target.path = Some(PathBuf::from("/tmp/app.db"));
        store.config_mut().connection = Some(target.clone());
        store.config_mut().viewer = ViewerSettings {
            page_size: 10,
            ..ViewerSettings::default()
        };
        store.persist().expect("persist");

        let reloaded = FileConfigStore::load_from_path(&path).expect("reload");
        assert_eq!(reloaded.connection().expect("connection"), &target);
        assert_eq!(reloaded.config().viewer.page_size, 10);
        assert_eq!(
            target.table_ref().expect("table").schema(),
            None,
            "file-based backend has no schemas"
        );
    }
}
