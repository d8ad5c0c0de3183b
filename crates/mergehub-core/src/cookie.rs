//! Opaque resumable sync state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sync state handed to a remote caller between resumable rounds.
///
/// The server never keeps a cookie; the caller returns it verbatim on the
/// next round. Its contents are engine- and session-defined. JSON transports
/// carry it as base64.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cookie(#[serde(with = "crate::b64")] Vec<u8>);

impl Cookie {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cookie({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Cookie {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_json_is_base64_string() {
        let cookie = Cookie::from_bytes(vec![1, 2, 3]);
        let json = serde_json::to_string(&cookie).unwrap();
        assert_eq!(json, "\"AQID\"");
        let back: Cookie = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cookie);
    }

    #[test]
    fn test_cookie_debug_hides_contents() {
        let cookie = Cookie::from_bytes(vec![9; 40]);
        assert_eq!(format!("{cookie:?}"), "Cookie(40 bytes)");
    }
}
