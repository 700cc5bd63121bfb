//! Cached schema lookup
//!
//! Reads take a shared lock on the cache. A miss takes the load lock, checks
//! the cache again and only then goes to the store, so each
//! `(platform, version)` is parsed at most once no matter how many workers
//! ask for it at the same moment. Misses happen once per schema, so one load
//! lock for every platform is enough.
//!
//! The latest version of a platform is resolved from the store once and then
//! pinned for the life of the registry. Documents added to the store later are
//! reachable by exact version, or through a fresh registry.

use crate::error::{NormalizerError, Result};
use crate::metrics;
use crate::schema::store::{FsSchemaStore, SchemaStore};
use crate::schema::{version, SchemaDefinition};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SchemaKey {
    platform: String,
    version: String,
}

pub struct SchemaRegistry {
    store: Arc<dyn SchemaStore>,
    cache: RwLock<HashMap<SchemaKey, Arc<SchemaDefinition>>>,
    latest: RwLock<HashMap<String, String>>,
    load_lock: Mutex<()>,
}

impl SchemaRegistry {
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            latest: RwLock::new(HashMap::new()),
            load_lock: Mutex::new(()),
        }
    }

    /// Registry over `<dir>/<platform>_schema_v<version>.json`
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FsSchemaStore::new(dir)))
    }

    pub fn store(&self) -> &dyn SchemaStore {
        self.store.as_ref()
    }

    fn cached(&self, key: &SchemaKey) -> Option<Arc<SchemaDefinition>> {
        self.cache.read().get(key).cloned()
    }

    /// Loads one exact version, parsing it on first use
    pub fn load(&self, platform: &str, version: &str) -> Result<Arc<SchemaDefinition>> {
        let key = SchemaKey {
            platform: platform.to_string(),
            version: version.to_string(),
        };

        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let _guard = self.load_lock.lock();
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let text = self.store.fetch_definition(platform, version)?;
        let schema = SchemaDefinition::parse(&text).map_err(|e| match e {
            NormalizerError::SchemaValidation { reason, .. } => {
                NormalizerError::schema_invalid(platform, version, reason)
            }
            other => other,
        })?;

        if schema.platform != platform || schema.version != version {
            return Err(NormalizerError::schema_invalid(
                platform,
                version,
                format!(
                    "document declares {} v{} instead",
                    schema.platform, schema.version
                ),
            ));
        }

        let schema = Arc::new(schema);
        self.cache.write().insert(key, schema.clone());
        metrics::record_schema_load(platform);

        info!(
            platform = %platform,
            version = %version,
            mappings = schema.field_mappings.len(),
            computed = schema.computed_fields.len(),
            "Schema loaded"
        );

        Ok(schema)
    }

    /// Loads the highest numeric version stored for `platform`
    pub fn latest(&self, platform: &str) -> Result<Arc<SchemaDefinition>> {
        let pinned = self.latest.read().get(platform).cloned();
        let latest = match pinned {
            Some(v) => v,
            None => {
                let versions = self.store.list_versions(platform)?;
                let latest = version::highest(&versions).ok_or_else(|| NormalizerError::SchemaNotFound {
                    platform: platform.to_string(),
                    version: "latest".to_string(),
                })?;
                debug!(platform = %platform, version = %latest, "Resolved latest schema version");
                self.latest.write().insert(platform.to_string(), latest.clone());
                latest
            }
        };
        self.load(platform, &latest)
    }

    /// `load` when a version is pinned, `latest` otherwise
    pub fn resolve(&self, platform: &str, version: Option<&str>) -> Result<Arc<SchemaDefinition>> {
        match version {
            Some(v) => self.load(platform, v),
            None => self.latest(platform),
        }
    }

    /// Loads every stored document, failing on the first broken one
    pub fn preload(&self) -> Result<Vec<Arc<SchemaDefinition>>> {
        let mut loaded = Vec::new();
        for platform in self.store.list_platforms()? {
            let mut versions = self.store.list_versions(&platform)?;
            versions.sort();
            for v in versions {
                loaded.push(self.load(&platform, &v)?);
            }
        }
        Ok(loaded)
    }

    /// Number of parsed schemas held in the cache
    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::store::MemorySchemaStore;

    fn document(platform: &str, version: &str) -> String {
        format!(
            r#"{{
                "schema_version": "{version}",
                "platform": "{platform}",
                "field_mappings": {{
                    "core": {{
                        "post_id": {{ "source_field": "id", "target_field": "post_id", "target_type": "STRING", "required": true }}
                    }}
                }}
            }}"#
        )
    }

    fn registry() -> SchemaRegistry {
        let store = MemorySchemaStore::new()
            .with_document("tiktok", "1.0.0", document("tiktok", "1.0.0"))
            .with_document("tiktok", "1.10.0", document("tiktok", "1.10.0"))
            .with_document("tiktok", "1.9.0", document("tiktok", "1.9.0"))
            .with_document("youtube", "1.0.0", document("tiktok", "1.0.0"));
        SchemaRegistry::new(Arc::new(store))
    }

    #[test]
    fn test_load_is_cached() {
        let registry = registry();
        let first = registry.load("tiktok", "1.0.0").unwrap();
        let second = registry.load("tiktok", "1.0.0").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.cached_count(), 1);
    }

    #[test]
    fn test_latest_uses_numeric_order() {
        let registry = registry();
        assert_eq!(registry.latest("tiktok").unwrap().version, "1.10.0");
        assert!(matches!(
            registry.latest("instagram"),
            Err(NormalizerError::SchemaNotFound { .. })
        ));
    }

    #[test]
    fn test_latest_is_pinned_once_resolved() {
        let store = Arc::new(MemorySchemaStore::new().with_document("tiktok", "1.0.0", document("tiktok", "1.0.0")));
        let registry = SchemaRegistry::new(store.clone());
        assert_eq!(registry.latest("tiktok").unwrap().version, "1.0.0");

        store.insert("tiktok", "2.0.0", document("tiktok", "2.0.0"));
        assert_eq!(registry.latest("tiktok").unwrap().version, "1.0.0");
        assert_eq!(registry.load("tiktok", "2.0.0").unwrap().version, "2.0.0");
        assert_eq!(SchemaRegistry::new(store).latest("tiktok").unwrap().version, "2.0.0");
    }

    #[test]
    fn test_mismatched_document_is_invalid() {
        let registry = registry();
        let err = registry.load("youtube", "1.0.0").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("youtube v1.0.0"));
    }

    #[test]
    fn test_missing_version() {
        let registry = registry();
        let err = registry.resolve("tiktok", Some("3.0.0")).unwrap_err();
        assert!(matches!(err, NormalizerError::SchemaNotFound { .. }));
    }

    #[test]
    fn test_concurrent_loads_share_one_definition() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.load("tiktok", "1.9.0").unwrap())
            })
            .collect();
        let loaded: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(loaded.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.cached_count(), 1);
    }
}
