//! Store configuration.
//!
//! ```toml
//! [backend]
//! kind = "file"
//! path = "/home/me/.local/share/taskbook/tasks.json"
//! codec = "json"
//! ```
//!
//! Environment variables override the file: `TASKBOOK_BACKEND`
//! (`memory`, `file`, `sqlite`), `TASKBOOK_PATH` and `TASKBOOK_CODEC`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "file")]
use crate::backend::{Codec, FileBackend};
#[cfg(feature = "sqlite")]
use crate::backend::SqliteBackend;
use crate::backend::{Backend, InMemoryBackend};
use crate::error::StoreError;
use crate::store::Store;

pub const ENV_BACKEND: &str = "TASKBOOK_BACKEND";
pub const ENV_PATH: &str = "TASKBOOK_PATH";
pub const ENV_CODEC: &str = "TASKBOOK_CODEC";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Where records are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Nothing survives the process.
    #[default]
    Memory,
    #[cfg(feature = "file")]
    File {
        path: PathBuf,
        #[serde(default)]
        codec: Codec,
    },
    #[cfg(feature = "sqlite")]
    Sqlite { path: PathBuf },
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            #[cfg(feature = "file")]
            BackendConfig::File { .. } => "file",
            #[cfg(feature = "sqlite")]
            BackendConfig::Sqlite { .. } => "sqlite",
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            BackendConfig::Memory => None,
            #[cfg(feature = "file")]
            BackendConfig::File { path, .. } => Some(path),
            #[cfg(feature = "sqlite")]
            BackendConfig::Sqlite { path } => Some(path),
        }
    }

    /// Construct the backend this configuration describes.
    pub fn open(&self) -> Result<Box<dyn Backend>, StoreError> {
        let backend: Box<dyn Backend> = match self {
            BackendConfig::Memory => Box::new(InMemoryBackend::new()),
            #[cfg(feature = "file")]
            BackendConfig::File { path, codec } => Box::new(FileBackend::open(path, *codec)?),
            #[cfg(feature = "sqlite")]
            BackendConfig::Sqlite { path } => Box::new(SqliteBackend::open(path)?),
        };
        Ok(backend)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
}

impl StoreConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, "config")
    }

    /// Read and parse a TOML file. Environment overrides are not applied.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, &path.display().to_string())
    }

    fn parse(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key/value source. Blank values are ignored;
    /// invalid ones are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let kind = read(ENV_BACKEND)
            .map(|kind| kind.to_ascii_lowercase())
            .unwrap_or_else(|| self.backend.kind().to_string());
        let path = read(ENV_PATH)
            .map(PathBuf::from)
            .or_else(|| self.backend.path().map(Path::to_path_buf));
        #[cfg(feature = "file")]
        let codec = {
            let current = match &self.backend {
                BackendConfig::File { codec, .. } => *codec,
                _ => Codec::default(),
            };
            match read(ENV_CODEC) {
                Some(raw) => Codec::parse(&raw).unwrap_or_else(|| {
                    tracing::warn!("invalid {ENV_CODEC} {raw:?}, ignoring");
                    current
                }),
                None => current,
            }
        };

        let next = match (kind.as_str(), path) {
            ("memory", _) => BackendConfig::Memory,
            #[cfg(feature = "file")]
            ("file", Some(path)) => BackendConfig::File { path, codec },
            #[cfg(feature = "sqlite")]
            ("sqlite", Some(path)) => BackendConfig::Sqlite { path },
            #[cfg(feature = "file")]
            ("file", None) => {
                tracing::warn!("{ENV_BACKEND}=file needs a path, ignoring");
                return;
            }
            #[cfg(feature = "sqlite")]
            ("sqlite", None) => {
                tracing::warn!("{ENV_BACKEND}=sqlite needs a path, ignoring");
                return;
            }
            (other, _) => {
                tracing::warn!("unsupported {ENV_BACKEND} {other:?}, ignoring");
                return;
            }
        };
        self.backend = next;
    }

    /// Open a store on the configured backend.
    pub fn open(&self) -> Result<Store<Box<dyn Backend>>, StoreError> {
        tracing::debug!(
            backend = self.backend.kind(),
            path = ?self.backend.path(),
            "opening store from config"
        );
        Store::open(self.backend.open()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_config_is_memory() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);
    }

    #[cfg(feature = "file")]
    #[test]
    fn parses_file_backend() {
        let config = StoreConfig::from_toml_str(
            r#"
            [backend]
            kind = "file"
            path = "/tmp/tasks.bin"
            codec = "bitcode"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::File {
                path: PathBuf::from("/tmp/tasks.bin"),
                codec: Codec::Bitcode,
            }
        );

        let reparsed = StoreConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = StoreConfig::from_toml_str("[backend]\nkind = \"postgres\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = StoreConfig::load("/nonexistent/taskbook.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[cfg(feature = "file")]
    #[test]
    fn env_switches_backend() {
        let mut config = StoreConfig::default();
        config.apply_overrides(env(&[
            (ENV_BACKEND, "File"),
            (ENV_PATH, " /var/tasks.json "),
        ]));
        assert_eq!(
            config.backend,
            BackendConfig::File {
                path: PathBuf::from("/var/tasks.json"),
                codec: Codec::Json,
            }
        );
    }

    #[cfg(feature = "file")]
    #[test]
    fn env_codec_keeps_path() {
        let mut config = StoreConfig {
            backend: BackendConfig::File {
                path: PathBuf::from("tasks.json"),
                codec: Codec::Json,
            },
        };
        config.apply_overrides(env(&[(ENV_CODEC, "bitcode")]));
        assert_eq!(
            config.backend,
            BackendConfig::File {
                path: PathBuf::from("tasks.json"),
                codec: Codec::Bitcode,
            }
        );
    }

    #[test]
    fn invalid_env_is_ignored() {
        let mut config = StoreConfig::default();
        config.apply_overrides(env(&[(ENV_BACKEND, "carrier-pigeon")]));
        assert_eq!(config, StoreConfig::default());

        config.apply_overrides(env(&[(ENV_BACKEND, "file")]));
        assert_eq!(config, StoreConfig::default());

        config.apply_overrides(env(&[(ENV_BACKEND, "   ")]));
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn opens_memory_store() {
        let store = StoreConfig::default().open().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.backend().kind(), "memory");
    }
}
