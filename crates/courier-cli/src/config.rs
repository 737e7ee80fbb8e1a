//! Node configuration.
//!
//! The config file is TOML. An optional secrets file (also TOML) is merged
//! over it table by table, so credentials can live outside the main file.
//!
//! ```toml
//! [localdb]
//! path = "/var/lib/courier/local.db"
//!
//! [tag_replication]
//! concurrency_limit = 4
//! timeout_ms = 30000
//!
//! [[remotes]]
//! address = "build-index.dc2:5263"
//! tags = ["^uber-usi/.*"]
//!
//! [write_back]
//! max_attempts = 20
//!
//! [blob_cache]
//! dir = "/var/cache/courier/blobs"
//!
//! [[backends]]
//! namespace = ".*"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use courier_core::ManagerConfig;
use courier_core::app::ConfigError;
use courier_core::workloads::RemoteConfig;
use serde::Deserialize;
use thiserror::Error;
use toml::{Table, Value};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub localdb: LocalDbConfig,
    pub tag_replication: WorkloadConfig,
    pub write_back: WorkloadConfig,
    pub remotes: Vec<RemoteConfig>,
    pub blob_cache: BlobCacheConfig,
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LocalDbConfig {
    pub path: PathBuf,
}

impl Default for LocalDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("courier/local.db"),
        }
    }
}

/// One manager's settings plus the per-attempt timeout of its executor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    #[serde(flatten)]
    pub manager: ManagerConfig,
    pub timeout_ms: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            manager: ManagerConfig::default(),
            timeout_ms: 60_000,
        }
    }
}

impl WorkloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BlobCacheConfig {
    pub dir: PathBuf,
}

impl Default for BlobCacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("courier/blobs"),
        }
    }
}

/// A storage backend serving every namespace matching `namespace`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendConfig {
    pub namespace: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Shape(#[source] toml::de::Error),

    #[error("[{section}]: {source}")]
    Manager {
        section: &'static str,
        #[source]
        source: ConfigError,
    },

    #[error("[{section}]: timeout_ms must be at least 1")]
    ZeroTimeout { section: &'static str },
}

impl NodeConfig {
    /// Load `path`, merge `secrets` over it if given, then validate.
    pub fn load(path: &Path, secrets: Option<&Path>) -> Result<Self, LoadError> {
        let mut merged = read_table(path)?;
        if let Some(secrets) = secrets {
            merge_tables(&mut merged, read_table(secrets)?);
        }
        let config: NodeConfig = Value::Table(merged).try_into().map_err(LoadError::Shape)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        for (section, workload) in [
            ("tag_replication", &self.tag_replication),
            ("write_back", &self.write_back),
        ] {
            workload
                .manager
                .validate()
                .map_err(|source| LoadError::Manager { section, source })?;
            if workload.timeout_ms == 0 {
                return Err(LoadError::ZeroTimeout { section });
            }
        }
        Ok(())
    }
}

fn read_table(path: &Path) -> Result<Table, LoadError> {
    let contents = fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Nested tables merge key by key; any other value in `overlay` replaces
/// the one in `base`.
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn empty_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "courier.toml", "");

        let config = NodeConfig::load(&path, None).unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.tag_replication.manager.concurrency_limit, 8);
        assert_eq!(config.write_back.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn manager_keys_sit_beside_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "courier.toml",
            r#"
[localdb]
path = "/data/local.db"

[tag_replication]
concurrency_limit = 2
max_attempts = 5
timeout_ms = 1500

[[remotes]]
address = "dc2:5263"
tags = ["^library/"]

[[backends]]
namespace = "^library/"
"#,
        );

        let config = NodeConfig::load(&path, None).unwrap();
        assert_eq!(config.localdb.path, PathBuf::from("/data/local.db"));
        assert_eq!(config.tag_replication.manager.concurrency_limit, 2);
        assert_eq!(config.tag_replication.manager.max_attempts, 5);
        assert_eq!(config.tag_replication.timeout(), Duration::from_millis(1500));
        // untouched keys keep their defaults
        assert_eq!(config.tag_replication.manager.backoff_base_ms, 1_000);
        assert_eq!(config.remotes[0].address, "dc2:5263");
        assert_eq!(config.backends[0].namespace, "^library/");
    }

    #[test]
    fn secrets_merge_into_nested_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "courier.toml",
            "[write_back]\nmax_attempts = 3\ntimeout_ms = 100\n",
        );
        let secrets = write_file(
            dir.path(),
            "secrets.toml",
            "[write_back]\ntimeout_ms = 900\n[localdb]\npath = \"/secret.db\"\n",
        );

        let config = NodeConfig::load(&path, Some(&secrets)).unwrap();
        assert_eq!(config.write_back.manager.max_attempts, 3);
        assert_eq!(config.write_back.timeout_ms, 900);
        assert_eq!(config.localdb.path, PathBuf::from("/secret.db"));
    }

    #[test]
    fn invalid_manager_section_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "courier.toml", "[write_back]\nconcurrency_limit = 0\n");

        match NodeConfig::load(&path, None) {
            Err(LoadError::Manager { section, source }) => {
                assert_eq!(section, "write_back");
                assert_eq!(source, ConfigError::ZeroConcurrency);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "courier.toml", "[tag_replication]\ntimeout_ms = 0\n");

        assert!(matches!(
            NodeConfig::load(&path, None),
            Err(LoadError::ZeroTimeout {
                section: "tag_replication"
            })
        ));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = NodeConfig::load(Path::new("/nonexistent/courier.toml"), None).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/courier.toml"));
    }
}
