//! Typed HTTP client for a Flux node's management API.
//!
//! Every request is bounded by the client timeout. Outcomes are folded into
//! the small result taxonomy the engine works with instead of bubbling up
//! transport errors.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::domain::fleet_api::FleetApi;
use crate::domain::node::Node;
use crate::domain::types::{ApiEnvelope, ApiError, Credential, RemovalOutcome, Workload};
use crate::logging::{LogItem, Logger};

pub const AUTH_HEADER: &str = "zelidauth";

const PROBE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const LIST_PATH: &str = "/apps/listrunningapps";
const REMOVE_PATH: &str = "/apps/appremove";

pub struct FluxClient {
    http: Client,
    logger: Arc<Logger>,
}

impl FluxClient {
    pub fn new(timeout: Duration, logger: Arc<Logger>) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { http, logger })
    }

    async fn fetch_running_apps(
        &self,
        node: &Node,
        credential: Option<&Credential>,
    ) -> Result<Vec<Workload>, ApiError> {
        let url = format!("{}{}", base(&node.api_url), LIST_PATH);
        let mut req = self.http.get(&url);
        if let Some(cred) = credential {
            req = req.header(AUTH_HEADER, cred.expose());
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status().as_u16()));
        }

        let body: Value = resp.json().await?;
        self.logger.record_debug(
            &format!("API-{}", node.id),
            &["Running Apps:".into(), LogItem::from(&body)],
        );

        let envelope: ApiEnvelope = serde_json::from_value(body)
            .map_err(|e| ApiError::Payload(e.to_string()))?;
        match envelope.data {
            Value::Array(items) if envelope.is_success() => Ok(items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect()),
            _ => Err(ApiError::Payload(
                "API call to list apps did not return a success status or valid data.".into(),
            )),
        }
    }

    fn classify_body(&self, node: &Node, app_name: &str, body: String) -> RemovalOutcome {
        let prefix = format!("API-{}", node.id);
        self.logger.record_debug(
            &prefix,
            &[format!("Removal of {app_name} answered. Server response: {body}").into()],
        );

        let mut terminal = None;
        for (index, segment) in split_json_segments(&body).into_iter().enumerate() {
            match serde_json::from_str::<Value>(segment) {
                Ok(value) => {
                    self.logger.record_debug(
                        &prefix,
                        &[format!("Response segment {}:", index + 1).into(), LogItem::from(&value)],
                    );
                    if value.is_object() {
                        terminal = Some(value);
                    }
                }
                Err(e) => self.logger.record_debug(
                    &prefix,
                    &[format!("Ignoring unparseable response segment {}: {e}", index + 1).into()],
                ),
            }
        }

        match terminal.as_ref().and_then(classify_error_payload) {
            Some((message, true)) => {
                self.logger.record(
                    &format!("{prefix}-Error"),
                    &["Soft-fail: API returned 200 OK but body contains Unauthorized error.".into()],
                );
                RemovalOutcome::SoftFail {
                    message,
                    auth_error: true,
                }
            }
            Some((message, false)) => RemovalOutcome::SoftFail {
                message,
                auth_error: false,
            },
            None => RemovalOutcome::Success(body),
        }
    }
}

impl FleetApi for FluxClient {
    async fn probe_exists(&self, api_url: &str) -> bool {
        let url = format!("{}{}", base(api_url), LIST_PATH);
        match self
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, PROBE_USER_AGENT)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                self.logger.record_debug(
                    "DISCOVERY-Check",
                    &[format!("Node check failed for {api_url}: {}", ApiError::from(e)).into()],
                );
                false
            }
        }
    }

    async fn list_running_apps(
        &self,
        node: &Node,
        credential: Option<&Credential>,
    ) -> Result<Vec<Workload>, ApiError> {
        let result = self.fetch_running_apps(node, credential).await;
        if let Err(e) = &result {
            let message = match e {
                ApiError::Status(code) => format!("Error listing running apps: HTTP status {code}"),
                ApiError::Payload(msg) => msg.clone(),
                other => format!("Error listing running apps: {other}"),
            };
            self.logger
                .record(&format!("API-{}-Error", node.id), &[message.into()]);
        }
        result
    }

    async fn remove_app(
        &self,
        node: &Node,
        credential: Option<&Credential>,
        app_name: &str,
    ) -> RemovalOutcome {
        let Some(cred) = credential else {
            let message = "Not logged in. Token is missing.".to_string();
            self.logger.record(
                &format!("API-{}", node.id),
                &[format!("Error: {message}").into()],
            );
            return RemovalOutcome::SoftFail {
                message,
                auth_error: true,
            };
        };

        let url = format!("{}{}", base(&node.api_url), REMOVE_PATH);
        let sent = self
            .http
            .get(&url)
            .query(&[("appname", app_name)])
            .header(AUTH_HEADER, cred.expose())
            .send()
            .await;

        let resp = match sent {
            Ok(resp) => resp,
            Err(e) => {
                let message = ApiError::from(e).to_string();
                self.logger.record(
                    &format!("API-{}-Error", node.id),
                    &[format!("Error stopping application {app_name}: {message}").into()],
                );
                return RemovalOutcome::TransportFail(message);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let message = format!("HTTP error! Status: {}", status.as_u16());
            self.logger
                .record(&format!("API-{}-Error", node.id), &[message.clone().into()]);
            return RemovalOutcome::SoftFail {
                message,
                auth_error: is_auth_status(status),
            };
        }

        match resp.text().await {
            Ok(body) => self.classify_body(node, app_name, body),
            Err(e) => {
                let message = ApiError::from(e).to_string();
                self.logger.record(
                    &format!("API-{}-Error", node.id),
                    &[format!("Error reading removal response for {app_name}: {message}").into()],
                );
                RemovalOutcome::TransportFail(message)
            }
        }
    }
}

fn base(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn is_auth_status(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Inspect the terminal response object. Returns `(message, is_auth_error)`
/// when its status marker is `"error"`.
pub fn classify_error_payload(value: &Value) -> Option<(String, bool)> {
    if value.get("status").and_then(Value::as_str) != Some("error") {
        return None;
    }

    let data = value.get("data").cloned().unwrap_or(Value::Object(Default::default()));
    let code = data.get("code").and_then(|c| match c {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    let message = match data.get("message") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => data.to_string(),
    };

    let auth = matches!(code, Some(401) | Some(403))
        || message.to_lowercase().contains("unauthorized");
    Some((message, auth))
}

/// Split a body of back-to-back JSON objects (`{..}{..}`) into segments by
/// brace depth, ignoring braces inside string literals. Non-object text
/// between objects becomes its own segment so a parse failure stays local
/// to it. A trailing unterminated object is returned as-is.
pub fn split_json_segments(body: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut stray: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in body.char_indices() {
        if depth == 0 {
            if ch == '{' {
                if let Some(s) = stray.take() {
                    segments.push(body[s..i].trim());
                }
                start = i;
                depth = 1;
            } else if !ch.is_whitespace() && stray.is_none() {
                stray = Some(i);
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    segments.push(&body[start..=i]);
                }
            }
            _ => {}
        }
    }

    if depth > 0 {
        segments.push(&body[start..]);
    } else if let Some(s) = stray {
        segments.push(body[s..].trim());
    }
    segments
}
