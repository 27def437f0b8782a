//! TOML configuration: which backend to use and how the resolver behaves.
//!
//! ```toml
//! [source]
//! kind = "snapshot"
//! path = "tracker.jsonl"
//!
//! [resolver]
//! missing = "memoize"
//!
//! [stream]
//! capacity = 64
//! ```

use crate::adapter::SourceLoader;
use crate::snapshot::{OfflineSource, SnapshotError, SnapshotSource};
use crate::stream::DEFAULT_CAPACITY;
use crate::transport::BulkSource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use trackref_registry::{MissingPolicy, Registry};

pub const DEFAULT_SNAPSHOT_PATH: &str = ".trackref/tracker.jsonl";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    pub source: SourceConfig,
    pub resolver: ResolverConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceConfig {
    Snapshot { path: PathBuf },
    Offline,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Snapshot {
            path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    pub missing: MissingPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    pub capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl TrackerConfig {
    /// Load from a file. A relative snapshot path is taken relative to the
    /// file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::parse(&text, &path.display().to_string())?;
        if let SourceConfig::Snapshot { path: snapshot } = &mut config.source
            && snapshot.is_relative()
            && let Some(dir) = path.parent()
        {
            *snapshot = dir.join(&*snapshot);
        }
        debug!(config = %path.display(), source = ?config.source, "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, "<inline>")
    }

    fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::ParseToml {
            path: origin.to_string(),
            source,
        })
    }

    pub fn open_source(&self) -> Result<Box<dyn BulkSource>, ConfigError> {
        Ok(match &self.source {
            SourceConfig::Snapshot { path } => Box::new(SnapshotSource::load(path)?),
            SourceConfig::Offline => Box::new(OfflineSource),
        })
    }

    /// A registry backed by the configured source and missing-key policy.
    pub fn open_registry(&self) -> Result<Arc<Registry>, ConfigError> {
        let loader = SourceLoader::new(self.open_source()?);
        Ok(Registry::with_policy(loader, self.resolver.missing))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
