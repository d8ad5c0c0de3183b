//! Identifier types for mergehub.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::CoreError;

/// Maximum length of a store id, in characters.
pub const MAX_STORE_ID_LEN: usize = 128;

/// Name of one logical shared document.
///
/// Store ids appear in URL paths and file names, so they are restricted to
/// `[A-Za-z0-9_.-]` and 1 to 128 characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreId(String);

impl StoreId {
    /// Validate and wrap a store id.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::EmptyStoreId);
        }
        let len = id.chars().count();
        if len > MAX_STORE_ID_LEN {
            return Err(CoreError::StoreIdTooLong {
                len,
                max: MAX_STORE_ID_LEN,
            });
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
        {
            return Err(CoreError::InvalidStoreIdChar(c));
        }
        Ok(Self(id))
    }

    /// The store every server seeds on startup.
    pub fn default_store() -> Self {
        Self("default".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.0)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StoreId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for StoreId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<StoreId> for String {
    fn from(id: StoreId) -> Self {
        id.0
    }
}

impl AsRef<str> for StoreId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

static LAST_SNAPSHOT_ID: AtomicI64 = AtomicI64::new(0);

/// Identifier of one persisted snapshot.
///
/// A nanosecond wall-clock timestamp, issued strictly increasing within the
/// process so that later snapshots always compare greater.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(i64);

impl SnapshotId {
    /// Issue a fresh id greater than every id issued before it in this process.
    pub fn generate() -> Self {
        let now = now_nanos();
        let mut last = LAST_SNAPSHOT_ID.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_SNAPSHOT_ID.compare_exchange_weak(
                last,
                next,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Self(next),
                Err(actual) => last = actual,
            }
        }
    }

    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|_| CoreError::InvalidSnapshotId(s.to_string()))
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_store_id_accepts_url_safe_names() {
        for id in ["default", "a", "team-1.notes_v2", &"x".repeat(128)] {
            assert!(StoreId::new(id).is_ok(), "{id}");
        }
    }

    #[test]
    fn test_store_id_rejects_bad_names() {
        assert_eq!(StoreId::new(""), Err(CoreError::EmptyStoreId));
        assert!(matches!(
            StoreId::new("x".repeat(129)),
            Err(CoreError::StoreIdTooLong { len: 129, .. })
        ));
        assert_eq!(
            StoreId::new("a/b"),
            Err(CoreError::InvalidStoreIdChar('/'))
        );
        assert_eq!(
            StoreId::new("naïve"),
            Err(CoreError::InvalidStoreIdChar('ï'))
        );
    }

    #[test]
    fn test_store_id_serde_validates() {
        let id: StoreId = serde_json::from_str("\"notes\"").unwrap();
        assert_eq!(id.as_str(), "notes");
        assert!(serde_json::from_str::<StoreId>("\"../etc\"").is_err());
    }

    #[test]
    fn test_snapshot_ids_strictly_increase() {
        let mut prev = SnapshotId::generate();
        for _ in 0..10_000 {
            let next = SnapshotId::generate();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_snapshot_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..1000).map(|_| SnapshotId::generate()).collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<SnapshotId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    proptest! {
        #[test]
        fn prop_valid_store_ids_roundtrip(id in "[A-Za-z0-9_.-]{1,128}") {
            let parsed: StoreId = id.parse().unwrap();
            prop_assert_eq!(parsed.to_string(), id);
        }
    }
}
