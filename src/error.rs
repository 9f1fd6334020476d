//! Crate-wide error taxonomy for the proxy core.
//!
//! This module collects the error kinds the canonicalizer, simulation store,
//! matcher, templating engine, middleware bridge, mode engine and journal can
//! raise into a single enum. Call sites that reach the admin API or the proxy
//! entry point map a [`ProxyError`] onto an HTTP status and a `{"error": ".."}`
//! body; call sites internal to the engine match on specific variants (for
//! example the mode engine inspects [`ProxyError::Matching`] to recover the
//! closest miss for a 502 body).
//!
//! # Examples
//!
//! ```rust
//! use simulacra::error::ProxyError;
//!
//! let err = ProxyError::Validation("missing meta.schemaVersion".into());
//! assert_eq!(err.status_code().as_u16(), 400);
//! ```

use http::StatusCode;

use crate::matcher::ClosestMiss;

/// Error kinds produced by the proxy core.
///
/// Each variant corresponds to one of the taxonomic kinds named in the
/// error-handling design: bad simulation JSON, an unrecognized schema
/// version, a matching miss (carrying its closest miss for diagnostics),
/// upstream network failure, middleware transport failure, template
/// rendering failure, request body I/O failure, a disabled journal, and
/// an authentication failure surfaced by the admin auth collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Malformed or structurally invalid simulation JSON.
    #[error("Invalid JSON: {0}")]
    Validation(String),

    /// `meta.schemaVersion` is present but not one of `v1`/`v2`/`v3`.
    #[error("unknown simulation schema version: {0}")]
    Version(String),

    /// No stored pair matched the canonical request.
    #[error("no matching simulation pair found")]
    Matching {
        /// The disqualified pair with the highest partial score, if any pair
        /// scored above zero.
        closest_miss: Option<ClosestMiss>,
    },

    /// The upstream client failed (DNS, TCP connect, TLS, or protocol error).
    #[error("upstream request failed: {0}")]
    Upstream(#[from] UpstreamError),

    /// The middleware bridge (subprocess or HTTP transport) failed.
    #[error("middleware error: {0}")]
    Middleware(String),

    /// A handlebars template failed to render.
    #[error("templating error: {0}")]
    Templating(#[from] handlebars::RenderError),

    /// Reading the inbound request body failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The journal is disabled (`EntryLimit == 0`).
    #[error("journal is disabled")]
    Disabled,

    /// The admin API bearer-token check failed.
    #[error("authentication failed")]
    Auth,
}

/// Outbound-request failure detail, nested under [`ProxyError::Upstream`].
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// TCP connect or DNS resolution failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Tls(String),

    /// The HTTP request/response exchange itself failed after connecting.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl ProxyError {
    /// Maps an error onto the HTTP status code spec.md assigns to it.
    ///
    /// `Validation`/`Version` surface as `400` from the admin API;
    /// `Matching`/`Upstream`/`Middleware`/`Templating` surface as `502` from
    /// the proxy surface; `Auth` is `401`; everything else is `500`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Validation(_) | ProxyError::Version(_) => StatusCode::BAD_REQUEST,
            ProxyError::Matching { .. }
            | ProxyError::Upstream(_)
            | ProxyError::Middleware(_)
            | ProxyError::Templating(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Auth => StatusCode::UNAUTHORIZED,
            ProxyError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Renders the `{"error": "<message>"}` JSON body the admin API and
    /// proxy error responses both use.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_400() {
        assert_eq!(
            ProxyError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn matching_is_502() {
        let err = ProxyError::Matching { closest_miss: None };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn json_body_carries_message() {
        let err = ProxyError::Disabled;
        let body = err.to_json();
        assert_eq!(body["error"], "journal is disabled");
    }
}
