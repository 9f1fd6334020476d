#![cfg(feature = "tls")]

//! TLS MITM certificate machinery boundary.
//!
//! Treated as an external collaborator (spec.md §1, §6): this crate ships
//! the trait boundary only, no certificate generation. A `CONNECT` tunnel
//! with no [`CertificateProvider`] configured falls back to opaque
//! byte-for-byte tunneling (spec.md §6) rather than failing — interception
//! is an opt-in capability, not a requirement to proxy HTTPS traffic.

use rustls::sign::CertifiedKey;

/// Supplies a per-host leaf certificate for intercepting a `CONNECT`
/// tunnel. No implementation ships with this crate.
pub trait CertificateProvider: Send + Sync {
    fn certificate_for(&self, host: &str) -> Option<CertifiedKey>;
}
