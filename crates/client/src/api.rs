//! HTTP client for `POST /api/v1/complete-event`.

use std::time::Duration;

use async_trait::async_trait;
use habitquest_core::error::ErrorKind;
use habitquest_core::session::CompletionRequest;
use habitquest_core::types::RecordId;
use serde::Deserialize;

/// HTTP request timeout for a single settlement call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const COMPLETE_EVENT_PATH: &str = "/api/v1/complete-event";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Successful settlement response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReceipt {
    pub ok: bool,
    pub completed_event_id: RecordId,
    pub rewards: RewardGrant,
    pub user: ProfileTotals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RewardGrant {
    pub xp: i64,
    pub coins: i64,
}

/// The caller's totals after settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProfileTotals {
    pub xp: i64,
    pub level: i32,
    pub coins: i64,
    pub weekly_coins: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: ErrorKind,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request did not produce a response (network, DNS, timeout, etc.).
    /// The server may or may not have applied it.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with an error body.
    #[error("Settlement rejected with HTTP {status} ({}): {message}", kind.as_code())]
    Api {
        status: u16,
        kind: ErrorKind,
        message: String,
    },

    /// The server answered with something that is not an error body.
    #[error("Unexpected settlement response (HTTP {status}): {detail}")]
    UnexpectedResponse { status: u16, detail: String },
}

impl ClientError {
    /// The server-reported error kind, if the server answered.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the server may have applied the request despite the error.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, ClientError::Request(_))
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Where a finished session sends its completion request.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    async fn complete_event(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionReceipt, ClientError>;
}

/// [`SettlementGateway`] over HTTP with a bearer token.
#[derive(Debug, Clone)]
pub struct SettlementClient {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl SettlementClient {
    pub fn new(base_url: &str, access_token: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url, access_token))
    }

    /// Use a preconfigured `reqwest` client (proxies, TLS, timeouts).
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}{COMPLETE_EVENT_PATH}", base_url.trim_end_matches('/')),
            access_token: access_token.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SettlementGateway for SettlementClient {
    async fn complete_event(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionReceipt, ClientError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if status.is_success() {
            return serde_json::from_slice(&bytes).map_err(|e| ClientError::UnexpectedResponse {
                status: status.as_u16(),
                detail: e.to_string(),
            });
        }

        match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(body) => Err(ClientError::Api {
                status: status.as_u16(),
                kind: body.code,
                message: body.error,
            }),
            Err(_) => Err(ClientError::UnexpectedResponse {
                status: status.as_u16(),
                detail: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }
}
