//! Remotes - どの tag をどのリモートへ複製するか
//!
//! 設定は「リモートのアドレス → tag の正規表現リスト」。
//! tag がいずれかの正規表現にマッチしたリモートが複製先になります。

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tag_replication::TagReplicationTask;

/// One `[[remotes]]` entry of the node config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Address of the remote tag service (`host:port`).
    pub address: String,
    /// Tag patterns replicated to this remote (unanchored regexes).
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RemotesError {
    #[error("invalid tag pattern {pattern:?} for remote {address}: {source}")]
    InvalidPattern {
        address: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("remote {0} is configured twice")]
    DuplicateRemote(String),
}

#[derive(Debug, Clone)]
struct Remote {
    address: String,
    patterns: Vec<Regex>,
}

/// Compiled replication targets.
#[derive(Debug, Clone, Default)]
pub struct Remotes {
    remotes: Vec<Remote>,
}

impl Remotes {
    pub fn build(configs: &[RemoteConfig]) -> Result<Self, RemotesError> {
        let mut remotes: Vec<Remote> = Vec::with_capacity(configs.len());
        for config in configs {
            if remotes.iter().any(|r| r.address == config.address) {
                return Err(RemotesError::DuplicateRemote(config.address.clone()));
            }
            let patterns = config
                .tags
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|source| RemotesError::InvalidPattern {
                        address: config.address.clone(),
                        pattern: pattern.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            remotes.push(Remote {
                address: config.address.clone(),
                patterns,
            });
        }
        Ok(Self { remotes })
    }

    /// Addresses of the remotes `tag` should be replicated to.
    pub fn matches(&self, tag: &str) -> Vec<&str> {
        self.remotes
            .iter()
            .filter(|r| r.patterns.iter().any(|p| p.is_match(tag)))
            .map(|r| r.address.as_str())
            .collect()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.remotes.iter().any(|r| r.address == address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.remotes.iter().map(|r| r.address.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    /// One replication task per remote matching `tag`.
    pub fn tasks_for(
        &self,
        tag: &str,
        digest: &str,
        dependencies: &[String],
    ) -> Vec<TagReplicationTask> {
        self.matches(tag)
            .into_iter()
            .map(|destination| TagReplicationTask {
                tag: tag.to_string(),
                digest: digest.to_string(),
                dependencies: dependencies.to_vec(),
                destination: destination.to_string(),
            })
            .collect()
    }
}
