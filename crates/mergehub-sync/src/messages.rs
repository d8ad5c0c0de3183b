//! Wire types for the resumable session.

use mergehub_core::Cookie;
use serde::{Deserialize, Serialize};

/// Session limits.
pub mod limits {
    /// Default cap on messages generated per batch in one resumable round.
    pub const DEFAULT_MAX_ROUND_MESSAGES: usize = 100;

    /// Consecutive rounds with traffic but no local progress before a peer
    /// drops its session and bootstraps again.
    pub const MAX_STALLED_ROUNDS: usize = 5;
}

/// One resumable round, caller to server.
///
/// `cookie` is absent on the first round of a session. Messages are opaque
/// engine bytes, base64 in JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub cookie: Option<Cookie>,
    #[serde(default, with = "mergehub_core::b64::list")]
    pub messages: Vec<Vec<u8>>,
}

impl SyncRequest {
    /// The request that opens a session.
    pub fn bootstrap() -> Self {
        Self::default()
    }

    pub fn resume(cookie: Cookie, messages: Vec<Vec<u8>>) -> Self {
        Self {
            cookie: Some(cookie),
            messages,
        }
    }
}

/// One resumable round, server to caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub cookie: Cookie,
    #[serde(default, with = "mergehub_core::b64::list")]
    pub messages: Vec<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json_shape() {
        let request = SyncRequest::resume(Cookie::from_bytes(vec![1]), vec![vec![2, 3]]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["cookie"], "AQ==");
        assert_eq!(json["messages"][0], "AgM=");
    }

    #[test]
    fn test_bootstrap_accepts_null_and_missing_fields() {
        let explicit: SyncRequest =
            serde_json::from_str(r#"{"cookie":null,"messages":[]}"#).unwrap();
        let missing: SyncRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(explicit, SyncRequest::bootstrap());
        assert_eq!(missing, SyncRequest::bootstrap());
    }
}
