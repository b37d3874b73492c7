//! Opaque segment/lock version markers
//!
//! A version is a recency marker attached to locks and segments. The registry
//! never inspects its contents: two versions relate only through the
//! lexicographic order of their strings, and a greater string means more
//! recent. Producers get sensible semantics by using sortable strings such as
//! RFC 3339 timestamps. Note that under this ordering `"v10" < "v2"`; that is
//! the contract, not a bug, and numeric-suffix schemes are on the producer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lexicographically ordered recency marker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Version {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for Version {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_lexicographic() {
        assert!(Version::from("v1") < Version::from("v2"));
        assert!(Version::from("v2") < Version::from("v3"));

        // Byte order, not numeric order
        assert!(Version::from("v10") < Version::from("v2"));

        // Timestamp-style versions sort by recency
        assert!(
            Version::from("2020-01-01T00:00:00Z") < Version::from("2020-06-01T00:00:00Z")
        );
    }

    #[test]
    fn test_serde_transparent() {
        let version = Version::from("2020-01-01T00:00:00Z");
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"2020-01-01T00:00:00Z\"");

        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, version);
    }
}
