//! Model availability sources.
//!
//! `CachedAvailability` reads the provider caches maintained by the host:
//!
//! - `provider-models.json`: `{ "<provider>": [<model>, ...] }` where each
//!   model is either an id string or an object with an `id` field
//! - `connected-providers.json`: `["<provider>", ...]`
//!
//! A missing models file means availability is unknown; a present file (even
//! an empty one) means it is known.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use taskrelay_traits::{AvailabilitySnapshot, AvailabilitySource, ModelAvailability};
use tracing::{debug, warn};

use crate::paths;

pub const PROVIDER_MODELS_FILE: &str = "provider-models.json";
pub const CONNECTED_PROVIDERS_FILE: &str = "connected-providers.json";

/// Fixed availability, for tests and explicit command-line input.
#[derive(Debug, Clone, Default)]
pub struct StaticAvailability {
    snapshot: AvailabilitySnapshot,
}

impl StaticAvailability {
    pub fn new(snapshot: AvailabilitySnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl AvailabilitySource for StaticAvailability {
    async fn snapshot(&self) -> AvailabilitySnapshot {
        self.snapshot.clone()
    }
}

/// A cached model entry as written by hosts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CachedModel {
    Id(String),
    Object { id: String },
}

impl CachedModel {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

/// Availability read from cache files on every snapshot.
#[derive(Debug, Clone)]
pub struct CachedAvailability {
    cache_dir: PathBuf,
}

impl CachedAvailability {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Cache under the default cache directory, if one can be determined.
    pub fn from_default_dir() -> Option<Self> {
        paths::cache_dir().map(Self::new)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    async fn read_models(&self) -> ModelAvailability {
        let path = self.cache_dir.join(PROVIDER_MODELS_FILE);
        let Some(raw) = read_optional(&path).await else {
            return ModelAvailability::Unknown;
        };

        match parse_provider_models(&raw) {
            Ok(models) => ModelAvailability::Known(models),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring malformed model cache");
                ModelAvailability::Unknown
            }
        }
    }

    async fn read_connected(&self) -> Option<Vec<String>> {
        let path = self.cache_dir.join(CONNECTED_PROVIDERS_FILE);
        let raw = read_optional(&path).await?;

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(providers) => Some(providers),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring malformed provider cache");
                None
            }
        }
    }
}

#[async_trait]
impl AvailabilitySource for CachedAvailability {
    async fn snapshot(&self) -> AvailabilitySnapshot {
        let snapshot = AvailabilitySnapshot {
            models: self.read_models().await,
            connected_providers: self.read_connected().await,
        };
        debug!(
            models = snapshot.models.models().map(BTreeSet::len),
            connected = snapshot.connected_providers.as_ref().map(Vec::len),
            "Loaded availability snapshot"
        );
        snapshot
    }
}

async fn read_optional(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Some(raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read availability cache");
            None
        }
    }
}

/// Flatten the per-provider cache into `provider/model` strings.
fn parse_provider_models(raw: &str) -> serde_json::Result<BTreeSet<String>> {
    if raw.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    let parsed: BTreeMap<String, Vec<CachedModel>> = serde_json::from_str(raw)?;
    Ok(parsed
        .into_iter()
        .flat_map(|(provider, models)| {
            models
                .into_iter()
                .map(CachedModel::into_id)
                .filter(|id| !id.trim().is_empty())
                .map(move |id| format!("{}/{}", provider, id.trim()))
        })
        .collect())
}
