pub mod categories;
pub mod resolve;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use taskrelay_core::{CachedAvailability, StaticAvailability};
use taskrelay_traits::{AvailabilitySnapshot, AvailabilitySource};

/// Availability from an explicit cache directory, the default one, or none.
pub fn availability(cache_dir: Option<PathBuf>) -> Arc<dyn AvailabilitySource> {
    match cache_dir
        .map(CachedAvailability::new)
        .or_else(CachedAvailability::from_default_dir)
    {
        Some(cache) => Arc::new(cache),
        None => Arc::new(StaticAvailability::default()),
    }
}

pub async fn snapshot(cache_dir: Option<PathBuf>) -> AvailabilitySnapshot {
    availability(cache_dir).snapshot().await
}
