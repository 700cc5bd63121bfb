//! Deduplication Module
//!
//! Prevents the same post (or the same media URL) from being emitted twice:
//! - Post keys are a SHA-256 over platform, post id and crawl id
//! - Media URLs are compared in canonical form

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

const TRACKING_PARAMS: &[&str] = &[
    "utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content", "fbclid", "gclid",
    "msclkid", "mc_cid", "mc_eid", "_ga", "_gl", "yclid", "twclid", "igshid", "_r", "is_from_webapp",
    "sender_device",
];

/// Computes SHA-256 hash of content
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Key identifying one post of one crawl
pub fn post_key(platform: &str, post_id: &str, crawl_id: &str) -> String {
    compute_hash(&format!("{}|{}|{}", platform.to_lowercase(), post_id.trim(), crawl_id))
}

/// Normalizes URL to canonical form
/// - Removes fragments (#...)
/// - Removes tracking parameters (utm_*, fbclid, etc.)
/// - Lowercase scheme and host
/// - Sorts query parameters
///
/// Signed CDN parameters are kept, so two signatures of the same object stay distinct.
pub fn canonicalize_url(url_str: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(url_str.trim())?;
    url.set_fragment(None);

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&&**key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.set_query(None);
    if !params.is_empty() {
        params.sort();
        url.query_pairs_mut().extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    Ok(url.to_string())
}

/// Comparison key for a media URL. Unparseable URLs compare by trimmed text.
pub fn media_url_key(url: &str) -> String {
    canonicalize_url(url).unwrap_or_else(|_| url.trim().to_string())
}

/// Thread-safe seen-set
#[derive(Debug, Default)]
pub struct DedupStore {
    seen: RwLock<HashSet<String>>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks and marks in one operation (atomic check-and-set)
    /// Returns true if duplicate, false if new (and marks as seen)
    pub fn check_and_mark(&self, key: &str) -> bool {
        let duplicate = !self.seen.write().insert(key.to_string());
        if duplicate {
            debug!(key = %key, "Duplicate found");
        }
        duplicate
    }

    /// Number of distinct keys marked so far
    pub fn len(&self) -> usize {
        self.seen.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.read().is_empty()
    }
}
