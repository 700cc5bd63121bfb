//! Numeric dotted schema versions (`1.0.0`, `2.1`)

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone)]
pub struct SchemaVersion {
    raw: String,
    parts: Vec<u64>,
}

impl SchemaVersion {
    /// Accepts an optional leading `v`. Anything non-numeric is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if digits.is_empty() {
            return None;
        }
        let parts = digits
            .split('.')
            .map(|p| p.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            raw: trimmed.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for SchemaVersion {
    /// Missing trailing components count as zero, so `1.0 == 1.0.0`
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| {
                let a = self.parts.get(i).copied().unwrap_or(0);
                let b = other.parts.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SchemaVersion {}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Highest parseable version in `versions`. Unparseable entries are ignored.
pub fn highest<S: AsRef<str>>(versions: &[S]) -> Option<String> {
    versions
        .iter()
        .filter_map(|v| SchemaVersion::parse(v.as_ref()))
        .max()
        .map(|v| v.raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ordering() {
        let v = |s| SchemaVersion::parse(s).unwrap();
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("2.0") > v("1.99.99"));
        assert_eq!(v("1.0"), v("1.0.0"));
        assert!(SchemaVersion::parse("1.0-beta").is_none());
        assert!(SchemaVersion::parse("").is_none());
    }

    #[test]
    fn test_highest_ignores_garbage() {
        let versions = ["1.0.0", "draft", "1.2.0", "1.10.0"];
        assert_eq!(highest(&versions), Some("1.10.0".to_string()));
        assert_eq!(highest::<&str>(&[]), None);
    }
}
