use color_eyre::eyre::{
    Result as EyreResult,
    WrapErr,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{
    Value,
    json,
};
use std::{
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
    time::Duration,
};
use thiserror::Error;

/// EIP-1193 code for "the user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn user_rejected(&self) -> bool {
        matches!(self, ProviderError::Rpc { code, .. } if *code == USER_REJECTED_CODE)
    }
}

/// The wallet object the client talks to: a single EIP-1193 `request` entry point.
pub trait Eip1193Provider {
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, ProviderError>>;
}

/// JSON-RPC 2.0 over HTTP: a wallet bridge or a node with unlocked accounts.
pub struct HttpProvider {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpProvider {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> EyreResult<Self> {
        let url = url.into();
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .wrap_err("failed to build HTTP client for wallet provider")?;
        Ok(Self {
            url,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Eip1193Provider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let res = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if status != StatusCode::OK {
            let body = String::from_utf8_lossy(&bytes);
            return Err(ProviderError::Transport(format!(
                "provider responded with {status} to {method}: {body}"
            )));
        }
        let envelope: RpcResponseDto = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        envelope.into_result()
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponseDto {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorDto>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorDto {
    code: i64,
    message: String,
}

impl RpcResponseDto {
    fn into_result(self) -> Result<Value, ProviderError> {
        match (self.error, self.result) {
            (Some(err), _) => Err(ProviderError::Rpc {
                code: err.code,
                message: err.message,
            }),
            (None, Some(value)) => Ok(value),
            // `null` results (e.g. a receipt that is not mined yet) deserialize as None
            (None, None) => Ok(Value::Null),
        }
    }
}

/// Probes `url` with `eth_chainId`. No answer means no provider.
pub async fn detect_provider(url: &str, request_timeout: Duration) -> Option<HttpProvider> {
    let provider = match HttpProvider::new(url, request_timeout) {
        Ok(provider) => provider,
        Err(err) => {
            tracing::warn!(%url, ?err, "could not build wallet provider");
            return None;
        }
    };
    match provider.request("eth_chainId", json!([])).await {
        Ok(chain_id) => {
            tracing::info!(%url, %chain_id, "wallet provider detected");
            Some(provider)
        }
        Err(err) => {
            tracing::warn!(%url, error = %err, "no wallet provider answered");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn parse(raw: &str) -> Result<Value, ProviderError> {
        serde_json::from_str::<RpcResponseDto>(raw)
            .unwrap()
            .into_result()
    }

    #[test]
    fn into_result__returns_result_value() {
        let actual = parse(r#"{"jsonrpc":"2.0","id":1,"result":"0x7a69"}"#);

        assert_eq!(actual, Ok(json!("0x7a69")));
    }

    #[test]
    fn into_result__null_result_is_null() {
        let actual = parse(r#"{"jsonrpc":"2.0","id":1,"result":null}"#);

        assert_eq!(actual, Ok(Value::Null));
    }

    #[test]
    fn into_result__error_keeps_code_and_message() {
        // given
        let raw = r#"{"jsonrpc":"2.0","id":1,"error":{"code":4001,"message":"User rejected"}}"#;

        // when
        let actual = parse(raw).unwrap_err();

        // then
        assert!(actual.user_rejected());
        assert_eq!(
            actual,
            ProviderError::Rpc {
                code: 4001,
                message: "User rejected".to_string()
            }
        );
    }
}
