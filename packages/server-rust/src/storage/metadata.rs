//! Dataset metadata tracked by the registry.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value as JsonValue};

/// Metadata for one stored dataset.
///
/// Immutable after insertion except for the entry's LRU position, which lives
/// in the registry's ordering, not here.
#[derive(Debug, Clone)]
pub struct DatasetMetadata {
    /// Registry-unique dataset ID.
    pub id: String,
    /// Wall-clock insertion time.
    pub created_at: DateTime<Utc>,
    /// `(rows, cols)` at insertion.
    pub shape: (usize, usize),
    /// Column-name to dtype-tag pairs in column order.
    pub dtypes: Vec<(String, String)>,
    /// Deep memory footprint at insertion.
    pub memory_bytes: u64,
    /// Secondary byte measure; equal to `memory_bytes` for the in-memory
    /// backend.
    pub size_bytes: u64,
    /// Absent means the dataset never expires.
    pub ttl_seconds: Option<u64>,
    /// Free-form caller tags, used for filtered listing only.
    pub tags: Map<String, JsonValue>,
}

impl DatasetMetadata {
    /// Expiration instant, when a TTL is set.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = self.ttl_seconds?;
        let seconds = i64::try_from(ttl).unwrap_or(i64::MAX);
        self.created_at.checked_add_signed(Duration::seconds(seconds))
    }

    /// Whether the dataset is expired as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now > at)
    }

    /// Whether the dataset is expired right now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Tag-filter match: every key in `filter` must be present with an equal
    /// value. The empty filter matches everything.
    #[must_use]
    pub fn matches_tags(&self, filter: &Map<String, JsonValue>) -> bool {
        filter
            .iter()
            .all(|(key, value)| self.tags.get(key) == Some(value))
    }
}
