//! HTTP side of the client: snapshot fetch, store creation and resumable
//! rounds.

use async_trait::async_trait;
use mergehub_core::{Replica, StoreId};
use mergehub_sync::{RoundTransport, SyncError, SyncRequest, SyncResponse};
use reqwest::StatusCode;

use crate::api::{ErrorBody, HeadsResponse};
use crate::error::ClientError;

/// A thin client for one mergehub server.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base: String,
}

impl HttpClient {
    /// `server` must be an `http://` or `https://` base URL.
    pub fn new(server: &str) -> Result<Self, ClientError> {
        let base = server.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(server.to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base: base.to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn store_url(&self, store_id: &StoreId, suffix: &str) -> String {
        format!("{}/stores/{}{}", self.base, store_id, suffix)
    }

    /// WebSocket URL of the duplex endpoint.
    pub fn ws_url(&self, store_id: &StoreId) -> String {
        let url = self.store_url(store_id, "/sync");
        match url.strip_prefix("https://") {
            Some(rest) => format!("wss://{rest}"),
            None => url.replacen("http://", "ws://", 1),
        }
    }

    /// Latest server content for a store, or `None` if the server does not
    /// know it.
    pub async fn latest(&self, store_id: &StoreId) -> Result<Option<Vec<u8>>, ClientError> {
        let response = self.http.get(self.store_url(store_id, "/latest")).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?.to_vec())),
            status => Err(status_error(status, response).await),
        }
    }

    /// Create a store from serialized content. `false` if it already exists.
    pub async fn create(&self, store_id: &StoreId, content: Vec<u8>) -> Result<bool, ClientError> {
        let response = self
            .http
            .post(self.store_url(store_id, ""))
            .body(content)
            .send()
            .await?;
        match response.status() {
            StatusCode::CREATED => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            status => Err(status_error(status, response).await),
        }
    }

    pub async fn heads(&self, store_id: &StoreId) -> Result<Vec<String>, ClientError> {
        let response = self.http.get(self.store_url(store_id, "/heads")).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        Ok(response.json::<HeadsResponse>().await?.heads)
    }

    /// Load the server's replica for a store, creating the store from a
    /// fresh replica if the server has none.
    pub async fn bootstrap<R: Replica>(&self, store_id: &StoreId) -> Result<R, ClientError> {
        if let Some(content) = self.latest(store_id).await? {
            tracing::info!(store = %store_id, size = content.len(), "loaded server replica");
            return Ok(R::load(&content)?);
        }

        let replica = R::empty();
        if self.create(store_id, replica.save()).await? {
            tracing::info!(store = %store_id, "created store on server");
            return Ok(replica);
        }

        // Another peer created it first.
        match self.latest(store_id).await? {
            Some(content) => Ok(R::load(&content)?),
            None => Err(ClientError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: format!("store {store_id} vanished during bootstrap"),
            }),
        }
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> ClientError {
    let body = response.text().await.unwrap_or_default();
    ClientError::Status {
        status: status.as_u16(),
        body,
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl RoundTransport for HttpClient {
    async fn round(
        &self,
        store_id: &StoreId,
        request: SyncRequest,
    ) -> mergehub_sync::Result<SyncResponse> {
        let response = self
            .http
            .post(self.store_url(store_id, "/sync"))
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<SyncResponse>()
                .await
                .map_err(|e| SyncError::Transport(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::BAD_REQUEST => SyncError::ProtocolViolation(error_message(&body)),
            StatusCode::NOT_FOUND => SyncError::NotFound(store_id.clone()),
            _ => SyncError::Transport(format!("status {}: {}", status.as_u16(), error_message(&body))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_urls() {
        assert!(matches!(
            HttpClient::new("ftp://example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(HttpClient::new("http://127.0.0.1:8080/").is_ok());
    }

    #[test]
    fn test_ws_url_follows_scheme() {
        let store = StoreId::default_store();
        let plain = HttpClient::new("http://localhost:8080/").unwrap();
        assert_eq!(plain.ws_url(&store), "ws://localhost:8080/stores/default/sync");

        let tls = HttpClient::new("https://hub.example.com").unwrap();
        assert_eq!(tls.ws_url(&store), "wss://hub.example.com/stores/default/sync");
    }

    #[test]
    fn test_error_message_prefers_json_body() {
        assert_eq!(error_message(r#"{"error":"bad cookie"}"#), "bad cookie");
        assert_eq!(error_message("plain text"), "plain text");
    }
}
