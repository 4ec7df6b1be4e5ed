//! Long-poll change feed over the hub's JSON-RPC endpoint.
//!
//! The feed is a three-call protocol: `RE/subscribe` hands out a
//! subscription id, `RE/longPoll` blocks until changes arrive or the wait
//! elapses, and `RE/unsubscribe` releases the id. A long-poll answered with
//! a non-success HTTP status is not an error here; the status is surfaced in
//! [`LongPollResponse`] so the caller can pick a backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::client::{HubClient, classify};
use crate::error::Error;

/// Topic covering every change the hub publishes to paired clients.
pub const SUBSCRIPTION_TOPIC: &str = "com/bosch/sh/remote/*";

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

/// The hub answers batch-shaped requests with an array, but older
/// firmware replies with a bare object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcEnvelope {
    Batch(Vec<RpcResponse>),
    Single(RpcResponse),
}

impl RpcEnvelope {
    fn into_result(self, body: &str) -> Result<Value, Error> {
        let response = match self {
            Self::Batch(mut responses) => {
                if responses.is_empty() {
                    return Err(Error::Deserialization {
                        message: "empty JSON-RPC batch".into(),
                        body: body.to_owned(),
                    });
                }
                responses.swap_remove(0)
            }
            Self::Single(response) => response,
        };

        if let Some(err) = response.error {
            return Err(Error::JsonRpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

// ── LongPollResponse ────────────────────────────────────────────────

/// Outcome of one long-poll round trip that reached the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct LongPollResponse {
    /// HTTP status of the poll response.
    pub status: u16,
    /// Change records, in the order the hub produced them. Empty unless
    /// `status` is a success.
    pub results: Vec<Value>,
}

impl LongPollResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ── Feed calls ──────────────────────────────────────────────────────

impl HubClient {
    /// Open a subscription and return its id.
    pub async fn subscribe(&self) -> Result<String, Error> {
        let (status, body) = self
            .post_rpc("RE/subscribe", json!([SUBSCRIPTION_TOPIC, null]), self.timeout)
            .await?;
        let result = parse_success(status, body)?;

        match result {
            Value::String(id) => {
                debug!(subscription = %id, "subscribed to change feed");
                Ok(id)
            }
            other => Err(Error::Deserialization {
                message: "subscription id is not a string".into(),
                body: other.to_string(),
            }),
        }
    }

    /// Block until the hub has changes for `subscription` or `wait` elapses.
    ///
    /// The request deadline is `wait + grace` so the hub gets to answer an
    /// empty poll before the client gives up on it.
    pub async fn long_poll(
        &self,
        subscription: &str,
        wait: Duration,
        grace: Duration,
    ) -> Result<LongPollResponse, Error> {
        let (status, body) = self
            .post_rpc(
                "RE/longPoll",
                json!([subscription, wait.as_secs()]),
                wait + grace,
            )
            .await?;

        if !status.is_success() {
            debug!(status = status.as_u16(), body = %body, "long poll answered with failure status");
            return Ok(LongPollResponse {
                status: status.as_u16(),
                results: Vec::new(),
            });
        }

        let results = match parse_envelope(&body)? {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        trace!(count = results.len(), "long poll delivered changes");

        Ok(LongPollResponse {
            status: status.as_u16(),
            results,
        })
    }

    /// Release a subscription.
    pub async fn unsubscribe(&self, subscription: &str) -> Result<(), Error> {
        let (status, body) = self
            .post_rpc("RE/unsubscribe", json!([subscription]), self.timeout)
            .await?;
        parse_success(status, body)?;
        debug!(subscription, "unsubscribed from change feed");
        Ok(())
    }

    async fn post_rpc(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<(reqwest::StatusCode, String), Error> {
        let url = self.rpc_url()?;
        debug!(method, "POST {}", url);

        let request = [RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
        }];

        let resp = self
            .http
            .post(url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| classify(e, timeout))?;
        Ok((status, body))
    }
}

fn parse_success(status: reqwest::StatusCode, body: String) -> Result<Value, Error> {
    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            body,
        });
    }
    parse_envelope(&body)
}

fn parse_envelope(body: &str) -> Result<Value, Error> {
    let envelope: RpcEnvelope =
        serde_json::from_str(body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.to_owned(),
        })?;
    envelope.into_result(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn batch_envelope_yields_first_result() {
        let body = r#"[{"result":"abc-123","jsonrpc":"2.0"}]"#;
        assert_eq!(parse_envelope(body).unwrap(), json!("abc-123"));
    }

    #[test]
    fn bare_envelope_is_accepted() {
        let body = r#"{"result":[{"@type":"room"}],"jsonrpc":"2.0"}"#;
        assert_eq!(parse_envelope(body).unwrap(), json!([{"@type": "room"}]));
    }

    #[test]
    fn rpc_error_is_surfaced() {
        let body = r#"[{"jsonrpc":"2.0","error":{"code":-32001,"message":"No subscription with id: x"}}]"#;
        let err = parse_envelope(body).unwrap_err();
        assert!(matches!(err, Error::JsonRpc { code: -32001, .. }));
    }

    #[test]
    fn empty_batch_is_deserialization_error() {
        assert!(matches!(
            parse_envelope("[]"),
            Err(Error::Deserialization { .. })
        ));
    }

    #[test]
    fn success_range() {
        let ok = LongPollResponse {
            status: 200,
            results: Vec::new(),
        };
        let starting = LongPollResponse {
            status: 503,
            results: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!starting.is_success());
    }
}
