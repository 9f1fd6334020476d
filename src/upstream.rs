//! Outbound HTTP(S) client (C8).
//!
//! Performs the real network round-trip Capture, Modify, and a Spy miss
//! need: takes a canonical [`RequestDetails`], issues it against
//! `destination`, and canonicalizes the reply back into a
//! [`ResponseDetails`] using the same body-classification rule the
//! canonicalizer uses for exports.
//!
//! Built directly on [`crate::client::TakoClient`] /
//! [`crate::client::TakoTlsClient`] — the same rustls-based HTTP/1.1
//! client the admin-facing middleware HTTP transport uses — picking the
//! TLS variant when the canonical scheme is `https`.

#![cfg(feature = "client")]

use bytes::Bytes;
use http_body_util::Full;

use crate::canonical::{classify_body, HeaderMultiMap, RequestDetails, ResponseDetails};
use crate::client::{TakoClient, TakoTlsClient};
use crate::error::{ProxyError, UpstreamError};

/// Stateless outbound client: every call makes its own connection, per
/// spec.md §5 ("Upstream Client … stateless per request").
pub struct UpstreamClient;

impl UpstreamClient {
    /// Sends `request` to its own `destination` and returns the canonical
    /// response, or an [`ProxyError::Upstream`] describing the failure.
    pub async fn send(request: &RequestDetails) -> Result<ResponseDetails, ProxyError> {
        let (host, port) = split_destination(&request.destination, &request.scheme);

        let uri = build_path_and_query(&request.path, &request.query);
        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(uri)
            .header(http::header::HOST, &host);
        for (name, values) in request.headers.iter() {
            for value in values {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        let body = Full::new(Bytes::from(request.body.clone().into_bytes()));
        let http_request = builder
            .body(body)
            .map_err(|e| ProxyError::Upstream(UpstreamError::Http(e.to_string())))?;

        let response = if request.scheme == "https" {
            let mut client = TakoTlsClient::<Full<Bytes>>::new(&host, port)
                .await
                .map_err(|e| ProxyError::Upstream(connect_error(&e)))?;
            client.request(http_request).await
        } else {
            let mut client = TakoClient::<Full<Bytes>>::new(&host, port)
                .await
                .map_err(|e| ProxyError::Upstream(connect_error(&e)))?;
            client.request(http_request).await
        }
        .map_err(|e| ProxyError::Upstream(UpstreamError::Http(e.to_string())))?;

        let (parts, body_bytes) = response.into_parts();

        let content_encoding_present = parts.headers.contains_key(http::header::CONTENT_ENCODING);
        let (body, encoded_body) = classify_body(content_encoding_present, &body_bytes);

        Ok(ResponseDetails {
            status: parts.status.as_u16(),
            body,
            headers: HeaderMultiMap::from_header_map(&parts.headers),
            encoded_body,
        })
    }
}

/// A TCP/TLS connect failure is distinguished from an HTTPS handshake
/// failure only heuristically (the client API returns a boxed error either
/// way); both are tagged `Connect` here since `TakoTlsClient::new` performs
/// connect-then-handshake as one fallible step.
fn connect_error(e: &(dyn std::error::Error)) -> UpstreamError {
    UpstreamError::Connect(e.to_string())
}

/// Splits a canonical `destination` (`host` or `host:port`) into a host and
/// an optional port, defaulting the port by scheme when absent.
fn split_destination(destination: &str, scheme: &str) -> (String, Option<u16>) {
    match destination.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            (host.to_string(), port.parse().ok())
        }
        _ => (destination.to_string(), default_port(scheme)),
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "https" => Some(443),
        _ => Some(80),
    }
}

fn build_path_and_query(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_explicit_port() {
        assert_eq!(split_destination("example.com:8443", "https"), ("example.com".to_string(), Some(8443)));
    }

    #[test]
    fn defaults_port_by_scheme() {
        assert_eq!(split_destination("example.com", "https"), ("example.com".to_string(), Some(443)));
        assert_eq!(split_destination("example.com", "http"), ("example.com".to_string(), Some(80)));
    }

    #[test]
    fn builds_path_with_query() {
        assert_eq!(build_path_and_query("/a", "b=1"), "/a?b=1");
        assert_eq!(build_path_and_query("/a", ""), "/a");
    }
}
