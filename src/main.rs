//! `simulacra-proxy` binary: wires the mode engine, the admin API, and the
//! forward-proxy surface together and serves both.
//!
//! Configuration is a single [`simulacra::config::ProxyConfig`], read as
//! JSON from the path in `SIMULACRA_CONFIG` if set, or defaulted otherwise.
//! The forward-proxy surface speaks standard HTTP/1.1 forward-proxy
//! semantics, including `CONNECT` for HTTPS: without a configured
//! [`simulacra::certificate::CertificateProvider`] a `CONNECT` tunnel is
//! relayed byte-for-byte (no interception), per spec.md §6.

use std::convert::Infallible;
use std::sync::Arc;

use http::Method;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use simulacra::admin;
use simulacra::canonical::Canonicalizer;
use simulacra::config::ProxyConfig;
use simulacra::journal::Journal;
use simulacra::middleware::bearer_auth::BearerAuth;
use simulacra::mode::{ModeConfig, ModeEngine};
use simulacra::simulation::SimulationStore;
use simulacra::types::{Request, Response};

/// A `BearerAuth` with static tokens carries no verification closure; this
/// names the function-pointer type its `F` parameter needs so
/// `BearerAuth::<(), NoVerify>` has something concrete to name.
type NoVerify = fn(&str) -> Option<()>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "proxy-tracing")]
    simulacra::tracing_setup::init_tracing();

    let config = load_config()?;

    let store = Arc::new(SimulationStore::new());
    if let Some(path) = &config.simulation_file {
        let bytes = std::fs::read(path)?;
        store.load(&bytes)?;
        tracing::info!(path, pairs = store.pair_count(), "loaded simulation file");
    }

    let journal = Arc::new(Journal::new(config.journal_limit));
    let mode_engine = Arc::new(ModeEngine::new(
        ModeConfig {
            mode: config.initial_mode,
            matching_strategy: config.initial_strategy,
        },
        store.clone(),
        journal.clone(),
        None,
    ));

    let shutdown = CancellationToken::new();

    let admin_auth = BearerAuth::<(), NoVerify>::static_tokens(config.admin_tokens.clone());
    let admin_router = admin::router(mode_engine.clone(), store.clone(), journal.clone(), admin_auth);
    let admin_listener = TcpListener::bind(config.admin_addr).await?;
    tracing::info!(addr = %config.admin_addr, "admin API listening");
    let admin_task = tokio::spawn(simulacra::serve(admin_listener, admin_router));

    let proxy_listener = TcpListener::bind(config.proxy_addr).await?;
    tracing::info!(addr = %config.proxy_addr, "forward proxy listening");
    let proxy_task = tokio::spawn(run_proxy(proxy_listener, mode_engine, shutdown.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
        res = admin_task => { res?; }
        res = proxy_task => { res??; }
    }

    Ok(())
}

fn load_config() -> Result<ProxyConfig, Box<dyn std::error::Error>> {
    match std::env::var("SIMULACRA_CONFIG") {
        Ok(path) => Ok(serde_json::from_slice(&std::fs::read(path)?)?),
        Err(_) => Ok(ProxyConfig::default()),
    }
}

/// Accepts connections on the forward-proxy surface until `shutdown` fires.
///
/// Each connection gets its own child cancellation token so an in-flight
/// request can bail out cooperatively when the process is asked to shut
/// down mid-request, rather than finishing whatever upstream call it was in
/// the middle of.
async fn run_proxy(
    listener: TcpListener,
    mode_engine: Arc<ModeEngine>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };

        let mode_engine = mode_engine.clone();
        let conn_token = shutdown.child_token();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let svc = service_fn(move |req: Request| {
                let mode_engine = mode_engine.clone();
                let token = conn_token.clone();
                async move { Ok::<_, Infallible>(handle_proxy_request(req, mode_engine, token).await) }
            });

            let mut http = http1::Builder::new();
            http.keep_alive(true);
            if let Err(err) = http.serve_connection(io, svc).with_upgrades().await {
                tracing::warn!(%err, %addr, "error serving proxy connection");
            }
        });
    }
}

async fn handle_proxy_request(
    req: Request,
    mode_engine: Arc<ModeEngine>,
    token: CancellationToken,
) -> Response {
    if req.method() == Method::CONNECT {
        return handle_connect(req).await;
    }

    let request = match Canonicalizer::canonicalize(req).await {
        Ok(details) => details,
        Err(err) => return error_response(&err),
    };

    let details = tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::debug!("request cancelled cooperatively before completion");
            return cancelled_response();
        }
        details = mode_engine.handle(request, &[]) => details,
    };

    response_details_to_response(details)
}

/// `CONNECT` without a configured [`simulacra::certificate::CertificateProvider`]
/// performs opaque byte-for-byte tunneling: once the client sees `200`, its
/// bytes are relayed untouched to the real destination and back. This is a
/// valid, named mode (spec.md §6), not a placeholder for interception.
async fn handle_connect(req: Request) -> Response {
    let Some(authority) = req.uri().authority().map(|a| a.to_string()) else {
        return text_response(http::StatusCode::BAD_REQUEST, "CONNECT requires an authority");
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                if let Err(err) = tunnel(upgraded, &authority).await {
                    tracing::warn!(%err, %authority, "CONNECT tunnel error");
                }
            }
            Err(err) => tracing::warn!(%err, %authority, "CONNECT upgrade failed"),
        }
    });

    hyper::Response::builder()
        .status(http::StatusCode::OK)
        .body(simulacra::body::TakoBody::empty())
        .unwrap_or_else(|_| unreachable!())
}

async fn tunnel(upgraded: hyper::upgrade::Upgraded, authority: &str) -> std::io::Result<()> {
    let mut server = TcpStream::connect(authority).await?;
    let mut client = TokioIo::new(upgraded);
    tokio::io::copy_bidirectional(&mut client, &mut server).await?;
    Ok(())
}

fn response_details_to_response(details: simulacra::canonical::ResponseDetails) -> Response {
    let body = if details.encoded_body {
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &details.body)
            .unwrap_or_else(|_| details.body.clone().into_bytes())
    } else {
        details.body.into_bytes()
    };

    let mut builder = hyper::Response::builder().status(
        http::StatusCode::from_u16(details.status).unwrap_or(http::StatusCode::BAD_GATEWAY),
    );
    for (name, values) in details.headers.iter() {
        for value in values {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
        .body(simulacra::body::TakoBody::from(body))
        .unwrap_or_else(|_| unreachable!())
}

fn error_response(err: &simulacra::error::ProxyError) -> Response {
    text_response(http::StatusCode::BAD_GATEWAY, &err.to_string())
}

fn cancelled_response() -> Response {
    text_response(http::StatusCode::BAD_GATEWAY, "request cancelled")
}

fn text_response(status: http::StatusCode, body: &str) -> Response {
    hyper::Response::builder()
        .status(status)
        .body(simulacra::body::TakoBody::from(body.to_owned()))
        .unwrap_or_else(|_| unreachable!())
}
