//! JSON bodies of the HTTP surface shared by server and client.

use mergehub_core::StoreId;
use serde::{Deserialize, Serialize};

/// Body of `GET /stores/{store}/heads`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadsResponse {
    pub store: StoreId,
    pub heads: Vec<String>,
}

/// Body of `POST /stores/{store}` on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub store: StoreId,
    pub snapshot: i64,
    pub size: u64,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
