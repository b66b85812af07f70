use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Opaque credential issued by the platform's external login flow.
///
/// Carried verbatim in the `zelidauth` header. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// `None` for an empty or whitespace-only token.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// A running unit on a node, as reported by `/apps/listrunningapps`.
///
/// Rebuilt from every poll; never cached across cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workload {
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "State", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Workload {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into()],
            ..Self::default()
        }
    }

    /// The container name the platform reports first, e.g. `/fluxweb_myapp`.
    pub fn display_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str).filter(|n| !n.is_empty())
    }
}

/// Result of one removal attempt. Consumed immediately by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The remote accepted the request; carries the raw response body.
    Success(String),
    /// The remote answered but refused. `auth_error` marks a credential
    /// the remote no longer accepts.
    SoftFail { message: String, auth_error: bool },
    /// The request never produced a usable answer.
    TransportFail(String),
}

impl RemovalOutcome {
    pub fn is_auth_error(&self) -> bool {
        matches!(self, RemovalOutcome::SoftFail { auth_error: true, .. })
    }
}

/// Failure of a listing or probe call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request timeout")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("unexpected payload: {0}")]
    Payload(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Payload(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// `{ status, data }` envelope used by every Flux API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl ApiEnvelope {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}
