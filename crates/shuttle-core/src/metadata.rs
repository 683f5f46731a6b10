//! Metadata Loader (C11): caches self-describing tool metadata files used
//! by the catalog (C7) to improve search scoring. Concrete YAML-file
//! loading lives in `shuttle-store`; this module defines the data model
//! and cache contract.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One tool's optional `.yaml` metadata file. Absent file is not an
/// error — it simply means the tool has no metadata; a malformed file
/// does surface as an error to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub complements: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub best_practices: Vec<String>,
    #[serde(default)]
    pub common_errors: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub rate_limit: Option<String>,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub backend: Option<String>,
}

/// Loads and caches [`ToolMetadata`] files by tool name, behind a single
/// reader/writer lock over the cache map (per this system's lock
/// discipline: one lock per primary map, no finer-grained locking).
pub trait MetadataSource: Send + Sync {
    /// Reads and parses the metadata file for `tool_name`, if one exists.
    fn load(&self, tool_name: &str) -> Result<Option<ToolMetadata>, Error>;
}

pub struct MetadataCache<S: MetadataSource> {
    source: S,
    cache: RwLock<HashMap<String, Option<ToolMetadata>>>,
}

impl<S: MetadataSource> MetadataCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tool_name: &str) -> Result<Option<ToolMetadata>, Error> {
        if let Some(cached) = self.cache.read().expect("metadata cache lock poisoned").get(tool_name) {
            return Ok(cached.clone());
        }

        let loaded = self.source.load(tool_name)?;
        self.cache
            .write()
            .expect("metadata cache lock poisoned")
            .insert(tool_name.to_string(), loaded.clone());
        Ok(loaded)
    }

    pub fn invalidate(&self, tool_name: &str) {
        self.cache.write().expect("metadata cache lock poisoned").remove(tool_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl MetadataSource for CountingSource {
        fn load(&self, tool_name: &str) -> Result<Option<ToolMetadata>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if tool_name == "known" {
                Ok(Some(ToolMetadata {
                    name: "known".to_string(),
                    ..Default::default()
                }))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn second_lookup_hits_cache_not_source() {
        let cache = MetadataCache::new(CountingSource { calls: AtomicUsize::new(0) });
        assert!(cache.get("known").unwrap().is_some());
        assert!(cache.get("known").unwrap().is_some());
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn absent_file_is_not_an_error() {
        let cache = MetadataCache::new(CountingSource { calls: AtomicUsize::new(0) });
        assert!(cache.get("unknown").unwrap().is_none());
    }
}
