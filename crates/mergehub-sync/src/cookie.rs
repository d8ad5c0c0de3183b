//! The session envelope carried inside a [`Cookie`].
//!
//! A cookie holds the engine's encoded sync state plus the marks the session
//! layer needs to recognise a round that has nothing left to do.

use mergehub_core::Cookie;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Envelope format version.
pub const COOKIE_VERSION: u8 = 1;

/// Decoded cookie contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub version: u8,
    /// Engine sync state, as produced by `Replica::save_sync_state`.
    pub engine: Vec<u8>,
    /// Replica heads when the cookie was issued.
    pub heads: Vec<String>,
    /// Whether the issuing round generated every message it could.
    pub drained: bool,
}

impl SessionCookie {
    pub fn new(engine: Vec<u8>, heads: Vec<String>, drained: bool) -> Self {
        Self {
            version: COOKIE_VERSION,
            engine,
            heads,
            drained,
        }
    }

    pub fn encode(&self) -> Result<Cookie> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SyncError::Encoding(e.to_string()))?;
        Ok(Cookie::from_bytes(buf))
    }

    pub fn decode(cookie: &Cookie) -> Result<Self> {
        let decoded: Self = ciborium::from_reader(cookie.as_bytes())
            .map_err(|e| SyncError::InvalidCookie(e.to_string()))?;
        if decoded.version != COOKIE_VERSION {
            return Err(SyncError::InvalidCookie(format!(
                "unsupported cookie version {}",
                decoded.version
            )));
        }
        Ok(decoded)
    }
}
