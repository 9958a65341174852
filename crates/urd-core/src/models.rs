//! Core domain models and strongly-typed identifiers.
//!
//! Defines usage records, endpoint addresses, and the derived routing map.
//! Newtype wrappers keep record handles and endpoint URLs from being mixed
//! with arbitrary strings at compile time.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Strongly-typed record identifier.
///
/// Wraps the record's file name / handle in active storage. Records are
/// immutable once produced, and this ID follows them through delivery,
/// archival, and eventual deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Logical endpoint base address.
///
/// This is the endpoint's identity throughout the system: routing targets
/// it, delivery state records it, and discovery resolves it to a concrete
/// registration URL once per run. Two endpoints with the same base address
/// are the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointUrl(pub String);

impl EndpointUrl {
    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EndpointUrl {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EndpointUrl {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A usage-accounting record loaded from active storage.
///
/// Immutable once created. The group tags are extracted from the payload
/// by the record source; the payload itself is treated as opaque bytes by
/// everything downstream.
#[derive(Debug, Clone)]
pub struct Record {
    /// Identifier of the record in active storage.
    pub id: RecordId,
    /// Group tags driving conditional routing.
    pub groups: Vec<String>,
    /// Raw record content, delivered verbatim.
    pub payload: Bytes,
}

/// Derived map of record → endpoints it must be delivered to.
///
/// Recomputed every run from the current record set and configuration;
/// never persisted. Records that resolve to an empty endpoint set are
/// excluded from the map entirely.
pub type RoutingMap = HashMap<RecordId, BTreeSet<EndpointUrl>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_display_matches_inner() {
        let id = RecordId::from("usage-20260829-001");
        assert_eq!(id.to_string(), "usage-20260829-001");
        assert_eq!(id.as_str(), "usage-20260829-001");
    }

    #[test]
    fn endpoint_urls_compare_by_address() {
        let a = EndpointUrl::from("https://collector.example.org:6143");
        let b = EndpointUrl::from("https://collector.example.org:6143");
        assert_eq!(a, b);

        let mut set = BTreeSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }
}
