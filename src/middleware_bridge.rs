//! User middleware transport (C5).
//!
//! Applies a user-supplied transformation to a `(RequestDetails,
//! ResponseDetails)` pair over one of two transports: a subprocess that
//! reads the pair as JSON on stdin and writes the (possibly mutated) pair
//! as JSON on stdout, or an HTTP POST to a configured URL carrying the same
//! JSON shape. Both transports are wrapped in a configurable timeout; a
//! timeout, non-zero exit, non-2xx response, or malformed JSON all surface
//! as [`ProxyError::Middleware`] with the original pair left untouched for
//! the caller to decide how to proceed.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use simulacra::canonical::{HeaderMultiMap, RequestDetails, ResponseDetails};
//! use simulacra::middleware_bridge::{MiddlewareBridge, MiddlewareTransport};
//!
//! # async fn example() -> Result<(), simulacra::error::ProxyError> {
//! let bridge = MiddlewareBridge::new(
//!     MiddlewareTransport::Subprocess { command: "./mutate.sh".into(), args: vec![] },
//!     Duration::from_secs(5),
//! );
//! let request = RequestDetails {
//!     scheme: "http".into(), method: "GET".into(), destination: "example.com".into(),
//!     path: "/".into(), query: String::new(), body: String::new(), headers: HeaderMultiMap::default(),
//! };
//! let response = ResponseDetails { status: 200, body: String::new(), headers: HeaderMultiMap::default(), encoded_body: false };
//! let (request, response) = bridge.apply(request, response).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::canonical::{RequestDetails, ResponseDetails};
use crate::error::ProxyError;

/// The `{"request": .., "response": ..}` JSON shape exchanged with user
/// middleware, carrying the canonical forms both transports agree on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgePayload {
    pub request: RequestDetails,
    pub response: ResponseDetails,
}

/// How to reach the user-supplied middleware.
#[derive(Debug, Clone)]
pub enum MiddlewareTransport {
    /// Spawn `command args...`, write the payload to its stdin, read the
    /// (possibly mutated) payload back from its stdout.
    Subprocess { command: String, args: Vec<String> },
    /// POST the payload as JSON to `url` and parse its body as the
    /// mutated payload. Requires the `client` feature.
    #[cfg(feature = "client")]
    Http { url: String },
}

/// Applies one configured [`MiddlewareTransport`] under a fixed timeout.
pub struct MiddlewareBridge {
    transport: MiddlewareTransport,
    timeout: Duration,
}

impl MiddlewareBridge {
    pub fn new(transport: MiddlewareTransport, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Sends `(request, response)` through the configured transport and
    /// returns the (possibly mutated) pair, or a [`ProxyError::Middleware`]
    /// describing why the call failed.
    pub async fn apply(
        &self,
        request: RequestDetails,
        response: ResponseDetails,
    ) -> Result<(RequestDetails, ResponseDetails), ProxyError> {
        let payload = BridgePayload { request, response };

        match tokio::time::timeout(self.timeout, self.invoke(&payload)).await {
            Ok(Ok(out)) => Ok((out.request, out.response)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ProxyError::Middleware("middleware call timed out".to_string())),
        }
    }

    async fn invoke(&self, payload: &BridgePayload) -> Result<BridgePayload, ProxyError> {
        match &self.transport {
            MiddlewareTransport::Subprocess { command, args } => {
                invoke_subprocess(command, args, payload).await
            }
            #[cfg(feature = "client")]
            MiddlewareTransport::Http { url } => invoke_http(url, payload).await,
        }
    }
}

async fn invoke_subprocess(
    command: &str,
    args: &[String],
    payload: &BridgePayload,
) -> Result<BridgePayload, ProxyError> {
    use std::process::Stdio;
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command;

    let body = serde_json::to_vec(payload).map_err(|e| ProxyError::Middleware(e.to_string()))?;

    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ProxyError::Middleware(format!("failed to spawn middleware process: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ProxyError::Middleware("middleware process has no stdin".to_string()))?;
    stdin
        .write_all(&body)
        .await
        .map_err(|e| ProxyError::Middleware(format!("failed to write to middleware stdin: {e}")))?;
    drop(stdin);

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ProxyError::Middleware(e.to_string()))?;

    if !output.status.success() {
        return Err(ProxyError::Middleware(format!(
            "middleware process exited with status {}",
            output.status
        )));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| ProxyError::Middleware(format!("invalid middleware response JSON: {e}")))
}

#[cfg(feature = "client")]
async fn invoke_http(url: &str, payload: &BridgePayload) -> Result<BridgePayload, ProxyError> {
    use bytes::Bytes;
    use http_body_util::Full;

    let body = serde_json::to_vec(payload).map_err(|e| ProxyError::Middleware(e.to_string()))?;

    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| ProxyError::Middleware(format!("invalid middleware URL: {e}")))?;
    let host = uri
        .host()
        .ok_or_else(|| ProxyError::Middleware("middleware URL has no host".to_string()))?
        .to_string();
    let port = uri.port_u16();
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/").to_string();

    let request = http::Request::builder()
        .method(http::Method::POST)
        .uri(path_and_query)
        .header(http::header::HOST, &host)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| ProxyError::Middleware(e.to_string()))?;

    let response = if uri.scheme_str() == Some("https") {
        let mut client = crate::client::TakoTlsClient::<Full<Bytes>>::new(&host, port)
            .await
            .map_err(|e| ProxyError::Middleware(format!("middleware connect failed: {e}")))?;
        client.request(request).await
    } else {
        let mut client = crate::client::TakoClient::<Full<Bytes>>::new(&host, port)
            .await
            .map_err(|e| ProxyError::Middleware(format!("middleware connect failed: {e}")))?;
        client.request(request).await
    }
    .map_err(|e| ProxyError::Middleware(format!("middleware HTTP call failed: {e}")))?;

    if !response.status().is_success() {
        return Err(ProxyError::Middleware(format!(
            "middleware HTTP call returned {}",
            response.status()
        )));
    }

    serde_json::from_slice(response.body())
        .map_err(|e| ProxyError::Middleware(format!("invalid middleware response JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::HeaderMultiMap;

    fn sample_payload() -> BridgePayload {
        BridgePayload {
            request: RequestDetails {
                scheme: "http".into(),
                method: "GET".into(),
                destination: "example.com".into(),
                path: "/".into(),
                query: String::new(),
                body: String::new(),
                headers: HeaderMultiMap::default(),
            },
            response: ResponseDetails {
                status: 200,
                body: "hi".into(),
                headers: HeaderMultiMap::default(),
                encoded_body: false,
            },
        }
    }

    #[tokio::test]
    async fn subprocess_echoes_payload_back() {
        let payload = sample_payload();
        let bridge = MiddlewareBridge::new(
            MiddlewareTransport::Subprocess {
                command: "cat".to_string(),
                args: vec![],
            },
            Duration::from_secs(5),
        );
        let (request, response) = bridge.apply(payload.request.clone(), payload.response.clone()).await.unwrap();
        assert_eq!(request, payload.request);
        assert_eq!(response, payload.response);
    }

    #[tokio::test]
    async fn nonzero_exit_is_middleware_error() {
        let payload = sample_payload();
        let bridge = MiddlewareBridge::new(
            MiddlewareTransport::Subprocess {
                command: "false".to_string(),
                args: vec![],
            },
            Duration::from_secs(5),
        );
        let err = bridge.apply(payload.request, payload.response).await.unwrap_err();
        assert!(matches!(err, ProxyError::Middleware(_)));
    }

    #[tokio::test]
    async fn timeout_is_middleware_error() {
        let payload = sample_payload();
        let bridge = MiddlewareBridge::new(
            MiddlewareTransport::Subprocess {
                command: "sleep".to_string(),
                args: vec!["5".to_string()],
            },
            Duration::from_millis(50),
        );
        let err = bridge.apply(payload.request, payload.response).await.unwrap_err();
        assert!(matches!(err, ProxyError::Middleware(_)));
    }
}
