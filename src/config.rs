//! Runtime configuration, read from `CERTCHAIN_*` environment variables.

use crate::blockchain::MirrorConfig;
use crate::pki::{Issuer, RegistryLimits};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("reading issuer directory {path}: {source}")]
    IssuersFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing issuer directory {path}: {source}")]
    IssuersFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub issuers_file: Option<PathBuf>,
    pub max_file_bytes: usize,
    pub archive_timeout: Duration,
    pub archive_cache_entries: usize,
    pub ledger_difficulty: u32,
    pub ledger_max_attempts: u32,
    pub ledger_backoff: Duration,
    pub ledger_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("./certchain-data"),
            issuers_file: None,
            max_file_bytes: 10 * 1024 * 1024,
            archive_timeout: Duration::from_millis(10_000),
            archive_cache_entries: 256,
            ledger_difficulty: 1,
            ledger_max_attempts: 5,
            ledger_backoff: Duration::from_millis(200),
            ledger_timeout: Duration::from_millis(5_000),
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: parse_or(&lookup, "CERTCHAIN_BIND_ADDR", defaults.bind_addr)?,
            data_dir: lookup("CERTCHAIN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            issuers_file: lookup("CERTCHAIN_ISSUERS_FILE").map(PathBuf::from),
            max_file_bytes: parse_or(&lookup, "CERTCHAIN_MAX_FILE_BYTES", defaults.max_file_bytes)?,
            archive_timeout: millis_or(&lookup, "CERTCHAIN_ARCHIVE_TIMEOUT_MS", defaults.archive_timeout)?,
            archive_cache_entries: parse_or(
                &lookup,
                "CERTCHAIN_ARCHIVE_CACHE_ENTRIES",
                defaults.archive_cache_entries,
            )?,
            ledger_difficulty: parse_or(&lookup, "CERTCHAIN_LEDGER_DIFFICULTY", defaults.ledger_difficulty)?,
            ledger_max_attempts: parse_or(
                &lookup,
                "CERTCHAIN_LEDGER_MAX_ATTEMPTS",
                defaults.ledger_max_attempts,
            )?,
            ledger_backoff: millis_or(&lookup, "CERTCHAIN_LEDGER_BACKOFF_MS", defaults.ledger_backoff)?,
            ledger_timeout: millis_or(&lookup, "CERTCHAIN_LEDGER_TIMEOUT_MS", defaults.ledger_timeout)?,
        })
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("records.journal")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.data_dir.join("archive")
    }

    pub fn registry_limits(&self) -> RegistryLimits {
        RegistryLimits {
            max_file_bytes: self.max_file_bytes,
            archive_timeout: self.archive_timeout,
        }
    }

    pub fn mirror_config(&self) -> MirrorConfig {
        MirrorConfig {
            max_attempts: self.ledger_max_attempts,
            initial_backoff: self.ledger_backoff,
            submit_timeout: self.ledger_timeout,
        }
    }

    /// Issuer directory keyed by id. Empty when no file is configured.
    pub fn load_issuers(&self) -> Result<HashMap<String, Issuer>, ConfigError> {
        let Some(path) = &self.issuers_file else {
            return Ok(HashMap::new());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::IssuersFile {
            path: path.clone(),
            source,
        })?;
        let issuers: Vec<Issuer> =
            serde_json::from_str(&text).map_err(|source| ConfigError::IssuersFormat {
                path: path.clone(),
                source,
            })?;
        Ok(issuers.into_iter().map(|i| (i.id.clone(), i)).collect())
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let default_ms = default.as_millis() as u64;
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(env(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.journal_path(), PathBuf::from("./certchain-data/records.journal"));
        assert!(config.load_issuers().unwrap().is_empty());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(env(&[
            ("CERTCHAIN_BIND_ADDR", "0.0.0.0:8080"),
            ("CERTCHAIN_DATA_DIR", "/var/lib/certchain"),
            ("CERTCHAIN_ARCHIVE_TIMEOUT_MS", "250"),
            ("CERTCHAIN_LEDGER_MAX_ATTEMPTS", " 9 "),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.archive_dir(), PathBuf::from("/var/lib/certchain/archive"));
        assert_eq!(config.registry_limits().archive_timeout, Duration::from_millis(250));
        assert_eq!(config.mirror_config().max_attempts, 9);
    }

    #[test]
    fn bad_values_are_reported() {
        let err = Config::from_lookup(env(&[("CERTCHAIN_MAX_FILE_BYTES", "ten megs")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CERTCHAIN_MAX_FILE_BYTES", .. }));
    }

    #[test]
    fn issuer_directory_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issuers.json");
        std::fs::write(
            &path,
            r#"[{"id":"uni-a","authorized":true},{"id":"registrar","authorized":true,"admin":true}]"#,
        )
        .unwrap();

        let config = Config {
            issuers_file: Some(path),
            ..Config::default()
        };
        let issuers = config.load_issuers().unwrap();
        assert_eq!(issuers["uni-a"], Issuer::authorized("uni-a"));
        assert_eq!(issuers["registrar"], Issuer::admin("registrar"));
    }

    #[test]
    fn broken_issuer_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issuers.json");
        std::fs::write(&path, "{not json").unwrap();
        let config = Config {
            issuers_file: Some(path),
            ..Config::default()
        };
        assert!(matches!(config.load_issuers(), Err(ConfigError::IssuersFormat { .. })));
    }
}
