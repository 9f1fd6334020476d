//! Process configuration surface (C10, ambient).
//!
//! Deliberately plain: a `serde`-deserializable struct with no
//! command-line parsing layered on top (spec.md §1 treats the CLI/config
//! surface as a thin external collaborator). Callers load this from
//! wherever suits them — a JSON/TOML file, environment variables via
//! `serde_json::from_str`, or just construct it with [`ProxyConfig::default`]
//! and override fields.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::matcher::Strategy;
use crate::mode::Mode;

/// Top-level configuration for the `simulacra-proxy` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the forward-proxy surface listens on.
    pub proxy_addr: SocketAddr,
    /// Address the admin API listens on.
    pub admin_addr: SocketAddr,
    /// Mode the engine starts in.
    pub initial_mode: Mode,
    /// Matching strategy the engine starts with.
    pub initial_strategy: Strategy,
    /// Maximum number of entries the journal retains; `0` disables the
    /// journal entirely (spec.md §5).
    pub journal_limit: usize,
    /// Bearer tokens accepted by the admin API. Empty means no token is
    /// accepted and every admin request is rejected.
    pub admin_tokens: Vec<String>,
    /// Path to a simulation document (v1/v2/v3 JSON) to load at startup,
    /// if any.
    pub simulation_file: Option<String>,
    /// Path to a PEM certificate chain for the TLS admin/proxy listener,
    /// if TLS termination is desired for either surface.
    pub tls_cert_file: Option<String>,
    /// Path to the PEM private key matching `tls_cert_file`.
    pub tls_key_file: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxy_addr: "127.0.0.1:8500".parse().unwrap(),
            admin_addr: "127.0.0.1:8888".parse().unwrap(),
            initial_mode: Mode::Simulate,
            initial_strategy: Strategy::Strongest,
            journal_limit: 1000,
            admin_tokens: Vec::new(),
            simulation_file: None,
            tls_cert_file: None,
            tls_key_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_well_formed() {
        let config = ProxyConfig::default();
        assert_eq!(config.initial_mode, Mode::Simulate);
        assert_eq!(config.initial_strategy, Strategy::Strongest);
        assert!(config.admin_tokens.is_empty());
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let config: ProxyConfig =
            serde_json::from_str(r#"{"admin_tokens": ["secret"]}"#).unwrap();
        assert_eq!(config.admin_tokens, vec!["secret".to_string()]);
        assert_eq!(config.journal_limit, 1000);
    }
}
