#![cfg_attr(docsrs, feature(doc_cfg))]

//! Core of an HTTP(S) service-virtualization proxy.
//!
//! This crate implements the record/replay engine behind a man-in-the-middle
//! proxy: it canonicalizes inbound requests, matches them against a stored
//! simulation, renders templated responses, runs them through user-supplied
//! middleware, and journals the outcome. The HTTP transport, router, and
//! bearer-token auth layer are a small async web framework (`router`,
//! `server`, `middleware`, `body`, `responder`, `state`, `types`, `client`)
//! that the proxy and admin API are built on top of.
//!
//! # Key concepts
//! - [canonical] turns an inbound request into a [canonical::RequestDetails]
//!   and computes its advisory hash.
//! - [simulation] holds the in-memory [simulation::store::SimulationStore],
//!   the versioned on-disk schema, and the v1→v2→v3 upgrade path.
//! - [matcher] selects the best stored pair for a canonical request under a
//!   `first`/`strongest` strategy.
//! - [templating] renders `{{handlebars}}`-style response bodies.
//! - [middleware_bridge] applies user middleware (subprocess or HTTP) to a
//!   request/response pair.
//! - [mode] is the process-wide Capture/Simulate/Synthesize/Modify/Spy state
//!   machine that ties the above together per request.
//! - [journal] is the bounded ring of completed exchanges.
//! - [upstream] performs real outbound HTTP for modes that need it.
//! - [admin] wires the documented admin routes onto [router::Router].
//! - [error] is the crate's error taxonomy.
//! - [aux_cache] and [certificate] are thin external-collaborator trait
//!   boundaries; [config] is the process configuration surface.
//!
//! # Feature flags
//! - `client` — outbound HTTPS client support (rustls)
//! - `tls` — TLS server support (rustls)
//! - `proxy-tracing` — structured tracing subscriber setup

/// HTTP request and response body handling utilities.
pub mod body;

/// HTTP client implementation for making outbound requests.
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Request data extraction utilities for parsing query params, JSON, and more.
pub mod extractors;

/// Request handler traits and implementations.
mod handler;

/// Middleware for processing requests and responses in a pipeline.
pub mod middleware;

/// Response generation utilities and traits.
pub mod responder;

/// Route definition and matching logic.
mod route;

/// Request routing and dispatch functionality.
pub mod router;

/// HTTP server implementation and configuration.
mod server;

/// Application state management and dependency injection.
pub mod state;

/// Distributed tracing integration for observability.
#[cfg(feature = "proxy-tracing")]
#[cfg_attr(docsrs, doc(cfg(feature = "proxy-tracing")))]
pub mod tracing_setup;

/// Core type definitions used throughout the framework.
pub mod types;

/// Canonicalization of inbound requests and outbound responses (C1).
pub mod canonical;

/// Simulation store, versioned schema, and upgrade path (C2).
pub mod simulation;

/// Multi-field, multi-strategy request matcher (C3).
pub mod matcher;

/// Handlebars-style response body templating (C4).
pub mod templating;

/// User middleware transport (subprocess / HTTP) over a request/response pair (C5).
pub mod middleware_bridge;

/// Process-wide mode state machine and per-request dispatch (C6).
pub mod mode;

/// Bounded FIFO journal of completed exchanges (C7).
pub mod journal;

/// Outbound HTTP(S) client used by Capture/Modify/Spy-miss (C8).
pub mod upstream;

/// Thin admin HTTP API wiring over the core types.
pub mod admin;

/// Crate-wide error taxonomy.
pub mod error;

/// Auxiliary key/value cache boundary (external collaborator).
pub mod aux_cache;

/// TLS MITM certificate machinery boundary (external collaborator).
#[cfg(feature = "tls")]
#[cfg_attr(docsrs, doc(cfg(feature = "tls")))]
pub mod certificate;

/// Process configuration surface.
pub mod config;

pub use bytes::Bytes;
pub use http::{Method, StatusCode, header};
pub use http_body_util::Full;

/// Starts the HTTP server with the given listener and router.
///
/// This is the main entry point for starting a proxy listener. The function
/// takes ownership of a TCP listener and router, then serves incoming
/// connections until the server is shut down.
pub use server::serve;

/// TLS/SSL server implementation for secure connections.
#[cfg(feature = "tls")]
#[cfg_attr(docsrs, doc(cfg(feature = "tls")))]
pub mod server_tls;

/// Starts the HTTPS server with TLS encryption support.
#[cfg(feature = "tls")]
#[cfg_attr(docsrs, doc(cfg(feature = "tls")))]
pub use server_tls::serve_tls;
