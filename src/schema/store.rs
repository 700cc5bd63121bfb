//! Where schema documents come from
//!
//! The registry only needs two things from storage: the raw text of one
//! document and the versions available for a platform. Documents on disk are
//! named `<platform>_schema_v<version>.json`.

use crate::error::{NormalizerError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait SchemaStore: Send + Sync {
    /// Raw document text for one platform/version
    fn fetch_definition(&self, platform: &str, version: &str) -> Result<String>;

    /// Every version stored for `platform`, in no particular order
    fn list_versions(&self, platform: &str) -> Result<Vec<String>>;

    /// Every platform with at least one stored version, sorted
    fn list_platforms(&self) -> Result<Vec<String>>;
}

/// File name for a stored document
pub fn document_name(platform: &str, version: &str) -> String {
    format!("{platform}_schema_v{version}.json")
}

/// Splits a document file name into `(platform, version)`
pub fn parse_document_name(file_name: &str) -> Option<(String, String)> {
    let stem = file_name.strip_suffix(".json")?;
    let (platform, version) = stem.rsplit_once("_schema_v")?;
    if platform.is_empty() || version.is_empty() {
        return None;
    }
    Some((platform.to_string(), version.to_string()))
}

/// Schema documents in a directory
#[derive(Debug, Clone)]
pub struct FsSchemaStore {
    dir: PathBuf,
}

impl FsSchemaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn documents(&self) -> Result<Vec<(String, String)>> {
        if !self.dir.is_dir() {
            debug!(dir = %self.dir.display(), "Schema directory does not exist");
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(parsed) = entry.file_name().to_str().and_then(parse_document_name) {
                found.push(parsed);
            }
        }
        Ok(found)
    }
}

impl SchemaStore for FsSchemaStore {
    fn fetch_definition(&self, platform: &str, version: &str) -> Result<String> {
        let path = self.dir.join(document_name(platform, version));
        if !path.is_file() {
            return Err(NormalizerError::SchemaNotFound {
                platform: platform.to_string(),
                version: version.to_string(),
            });
        }
        debug!(path = %path.display(), "Reading schema document");
        Ok(std::fs::read_to_string(path)?)
    }

    fn list_versions(&self, platform: &str) -> Result<Vec<String>> {
        Ok(self
            .documents()?
            .into_iter()
            .filter(|(p, _)| p == platform)
            .map(|(_, v)| v)
            .collect())
    }

    fn list_platforms(&self) -> Result<Vec<String>> {
        let platforms: BTreeSet<String> = self.documents()?.into_iter().map(|(p, _)| p).collect();
        Ok(platforms.into_iter().collect())
    }
}

/// In-memory documents, handy for embedding and tests
#[derive(Debug, Default)]
pub struct MemorySchemaStore {
    documents: RwLock<BTreeMap<(String, String), String>>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, platform: &str, version: &str, document: impl Into<String>) {
        self.documents
            .write()
            .insert((platform.to_string(), version.to_string()), document.into());
    }

    pub fn with_document(self, platform: &str, version: &str, document: impl Into<String>) -> Self {
        self.insert(platform, version, document);
        self
    }
}

impl SchemaStore for MemorySchemaStore {
    fn fetch_definition(&self, platform: &str, version: &str) -> Result<String> {
        self.documents
            .read()
            .get(&(platform.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| NormalizerError::SchemaNotFound {
                platform: platform.to_string(),
                version: version.to_string(),
            })
    }

    fn list_versions(&self, platform: &str) -> Result<Vec<String>> {
        Ok(self
            .documents
            .read()
            .keys()
            .filter(|(p, _)| p == platform)
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn list_platforms(&self) -> Result<Vec<String>> {
        let platforms: BTreeSet<String> = self.documents.read().keys().map(|(p, _)| p.clone()).collect();
        Ok(platforms.into_iter().collect())
    }
}
