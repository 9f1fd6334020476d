//! Admin HTTP API (C9).
//!
//! Wires the documented JSON routes onto [`crate::router::Router`]:
//! `GET/PUT/DELETE /api/v2/simulation`, `GET/DELETE /api/v2/journal`,
//! `GET/PUT /api/v2/hoverfly/mode`. Every route sits behind the bearer-token
//! middleware supplied by the caller (spec.md §6, "all admin routes require
//! bearer-token auth supplied by the external auth collaborator"). Failures
//! are rendered as `{"error":"<message>"}` with the status
//! [`crate::error::ProxyError::status_code`] assigns.

use std::sync::Arc;

use http::{Method, StatusCode};
use http_body_util::BodyExt;
use serde::Deserialize;
use serde_json::json;

use crate::body::TakoBody;
use crate::error::ProxyError;
use crate::journal::Journal;
use crate::matcher::Strategy;
use crate::middleware::bearer_auth::BearerAuth;
use crate::middleware::IntoMiddleware;
use crate::mode::{Mode, ModeConfig, ModeEngine};
use crate::router::Router;
use crate::simulation::SimulationStore;
use crate::types::{Request, Response};

/// Builds the admin router, gated behind `auth`.
///
/// `C`/`F` mirror [`BearerAuth`]'s own type parameters — callers typically
/// instantiate this with `BearerAuth::<(), _>::static_token(..)`.
pub fn router<C, F>(
    mode_engine: Arc<ModeEngine>,
    store: Arc<SimulationStore>,
    journal: Arc<Journal>,
    auth: BearerAuth<C, F>,
) -> Router
where
    F: Fn(&str) -> Option<C> + Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    let mut router = Router::new();
    router.middleware(auth.into_middleware());

    {
        let store = store.clone();
        router.route(Method::GET, "/api/v2/simulation", move |_req: Request| {
            let store = store.clone();
            async move { get_simulation(&store) }
        });
    }
    {
        let store = store.clone();
        router.route(Method::PUT, "/api/v2/simulation", move |req: Request| {
            let store = store.clone();
            async move { put_simulation(&store, req).await }
        });
    }
    {
        let store = store.clone();
        router.route(Method::DELETE, "/api/v2/simulation", move |_req: Request| {
            let store = store.clone();
            async move { delete_simulation(&store) }
        });
    }
    router.route(Method::OPTIONS, "/api/v2/simulation", |_req: Request| async {
        options_response(&["GET", "PUT", "DELETE", "OPTIONS"])
    });

    {
        let journal = journal.clone();
        router.route(Method::GET, "/api/v2/journal", move |_req: Request| {
            let journal = journal.clone();
            async move { get_journal(&journal) }
        });
    }
    {
        let journal = journal.clone();
        router.route(Method::DELETE, "/api/v2/journal", move |_req: Request| {
            let journal = journal.clone();
            async move { delete_journal(&journal) }
        });
    }
    router.route(Method::OPTIONS, "/api/v2/journal", |_req: Request| async {
        options_response(&["GET", "DELETE", "OPTIONS"])
    });

    {
        let mode_engine = mode_engine.clone();
        router.route(Method::GET, "/api/v2/hoverfly/mode", move |_req: Request| {
            let mode_engine = mode_engine.clone();
            async move { get_mode(&mode_engine) }
        });
    }
    {
        let mode_engine = mode_engine.clone();
        router.route(Method::PUT, "/api/v2/hoverfly/mode", move |req: Request| {
            let mode_engine = mode_engine.clone();
            async move { put_mode(&mode_engine, req).await }
        });
    }
    router.route(Method::OPTIONS, "/api/v2/hoverfly/mode", |_req: Request| async {
        options_response(&["GET", "PUT", "OPTIONS"])
    });

    router
}

fn get_simulation(store: &SimulationStore) -> Response {
    json_bytes_response(StatusCode::OK, store.export())
}

async fn put_simulation(store: &SimulationStore, req: Request) -> Response {
    match read_body(req).await {
        Ok(body) => apply_simulation_put(store, &body),
        Err(resp) => resp,
    }
}

/// The testable core of the simulation `PUT` handler: load `body` and
/// report the result, split out from [`put_simulation`] so it can be
/// exercised without a live `hyper::Request<Incoming>`.
fn apply_simulation_put(store: &SimulationStore, body: &[u8]) -> Response {
    match store.load(body) {
        Ok(()) => json_bytes_response(StatusCode::OK, store.export()),
        Err(err) => error_response(&err),
    }
}

fn delete_simulation(store: &SimulationStore) -> Response {
    store.clear();
    json_bytes_response(StatusCode::OK, store.export())
}

fn get_journal(journal: &Journal) -> Response {
    match journal.get_entries() {
        Ok(entries) => json_response(StatusCode::OK, json!({ "journal": entries })),
        Err(err) => error_response(&err),
    }
}

fn delete_journal(journal: &Journal) -> Response {
    match journal.delete_entries() {
        Ok(()) => json_response(StatusCode::OK, json!({ "journal": [] })),
        Err(err) => error_response(&err),
    }
}

fn get_mode(engine: &ModeEngine) -> Response {
    json_response(StatusCode::OK, mode_json(engine.mode()))
}

async fn put_mode(engine: &ModeEngine, req: Request) -> Response {
    match read_body(req).await {
        Ok(body) => apply_mode_put(engine, &body),
        Err(resp) => resp,
    }
}

/// The testable core of the mode `PUT` handler, split out from
/// [`put_mode`] for the same reason as [`apply_simulation_put`].
fn apply_mode_put(engine: &ModeEngine, body: &[u8]) -> Response {
    let parsed: ModeRequest = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => return error_response(&ProxyError::Validation(e.to_string())),
    };

    let mode: Mode = match serde_json::from_value(serde_json::Value::String(parsed.mode.clone())) {
        Ok(m) => m,
        Err(_) => {
            return error_response(&ProxyError::Validation(format!(
                "unrecognized mode: {}",
                parsed.mode
            )));
        }
    };

    let matching_strategy = match parsed.arguments.and_then(|a| a.matching_strategy) {
        None => Strategy::Strongest,
        Some(s) => match serde_json::from_value(serde_json::Value::String(s.clone())) {
            Ok(strategy) => strategy,
            Err(_) => {
                return error_response(&ProxyError::Validation(format!(
                    "unrecognized matching strategy: {s}"
                )));
            }
        },
    };

    let config = ModeConfig { mode, matching_strategy };
    engine.set_mode(config);
    json_response(StatusCode::OK, mode_json(config))
}

fn mode_json(config: ModeConfig) -> serde_json::Value {
    json!({
        "mode": config.mode,
        "arguments": { "matchingStrategy": config.matching_strategy },
    })
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: String,
    arguments: Option<ModeArguments>,
}

#[derive(Debug, Deserialize)]
struct ModeArguments {
    #[serde(rename = "matchingStrategy")]
    matching_strategy: Option<String>,
}

async fn read_body(req: Request) -> Result<Vec<u8>, Response> {
    let collected = req
        .into_body()
        .collect()
        .await
        .map_err(|e| error_response(&ProxyError::Io(std::io::Error::other(e.to_string()))))?;
    Ok(collected.to_bytes().to_vec())
}

fn error_response(err: &ProxyError) -> Response {
    json_response(err.status_code(), err.to_json())
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    json_bytes_response(status, serde_json::to_vec(&body).unwrap_or_default())
}

fn json_bytes_response(status: StatusCode, body: Vec<u8>) -> Response {
    hyper::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(TakoBody::from(body))
        .unwrap()
}

fn options_response(allowed: &[&str]) -> Response {
    hyper::Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(http::header::ALLOW, allowed.join(", "))
        .body(TakoBody::empty())
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::HeaderMultiMap;

    fn store_with_one_pair() -> SimulationStore {
        let store = SimulationStore::new();
        store
            .load(br#"{"data":{"pairs":[{"request":{"path":{"exactMatch":"/a"}},"response":{"status":200,"body":"hi","headers":{}}}],"globalActions":{"delays":[]}},"meta":{"schemaVersion":"v3","hoverflyVersion":"x","timeExported":"now"}}"#)
            .unwrap();
        store
    }

    #[test]
    fn get_simulation_returns_export() {
        let store = store_with_one_pair();
        let resp = get_simulation(&store);
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn put_simulation_rejects_invalid_json() {
        let store = SimulationStore::new();
        let resp = apply_simulation_put(&store, b"not json");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.pair_count(), 0);
    }

    #[test]
    fn put_simulation_loads_valid_document() {
        let store = SimulationStore::new();
        let body = br#"{"data":{"pairs":[{"request":{"path":{"exactMatch":"/b"}},"response":{"status":201,"body":"made","headers":{}}}],"globalActions":{"delays":[]}},"meta":{"schemaVersion":"v3","hoverflyVersion":"x","timeExported":"now"}}"#;
        let resp = apply_simulation_put(&store, body);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(store.pair_count(), 1);
    }

    #[test]
    fn delete_simulation_empties_store() {
        let store = store_with_one_pair();
        let resp = delete_simulation(&store);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(store.pair_count(), 0);
    }

    fn journal_with_one_entry() -> Journal {
        let journal = Journal::new(10);
        journal
            .append(crate::journal::JournalEntry {
                request: crate::canonical::RequestDetails {
                    scheme: "http".into(),
                    method: "GET".into(),
                    destination: "example.com".into(),
                    path: "/a".into(),
                    query: String::new(),
                    body: String::new(),
                    headers: HeaderMultiMap::default(),
                },
                response: crate::canonical::ResponseDetails {
                    status: 200,
                    body: String::new(),
                    headers: HeaderMultiMap::default(),
                    encoded_body: false,
                },
                mode: Mode::Simulate,
                time_started: "2024-01-01T00:00:00Z".into(),
                latency_millis: 1,
            })
            .unwrap();
        journal
    }

    #[test]
    fn get_journal_reports_entries() {
        let journal = journal_with_one_entry();
        let resp = get_journal(&journal);
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn get_journal_disabled_is_service_unavailable() {
        let journal = Journal::new(0);
        let resp = get_journal(&journal);
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn delete_journal_clears_entries() {
        let journal = journal_with_one_entry();
        let resp = delete_journal(&journal);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(journal.len().unwrap(), 0);
    }

    fn engine() -> ModeEngine {
        ModeEngine::new(
            ModeConfig { mode: Mode::Simulate, matching_strategy: Strategy::First },
            Arc::new(SimulationStore::new()),
            Arc::new(Journal::new(10)),
            None,
        )
    }

    #[test]
    fn get_mode_reports_current_config() {
        let eng = engine();
        let resp = get_mode(&eng);
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn put_mode_switches_mode_and_strategy() {
        let eng = engine();
        let body = json!({"mode": "capture", "arguments": {"matchingStrategy": "strongest"}});
        let resp = apply_mode_put(&eng, &serde_json::to_vec(&body).unwrap());
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(eng.mode().mode, Mode::Capture);
        assert_eq!(eng.mode().matching_strategy, Strategy::Strongest);
    }

    #[test]
    fn put_mode_rejects_unknown_mode() {
        let eng = engine();
        let body = json!({"mode": "teleport"});
        let resp = apply_mode_put(&eng, &serde_json::to_vec(&body).unwrap());
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(eng.mode().mode, Mode::Simulate);
    }

    #[test]
    fn put_mode_defaults_strategy_to_strongest() {
        let eng = engine();
        let body = json!({"mode": "spy"});
        let resp = apply_mode_put(&eng, &serde_json::to_vec(&body).unwrap());
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(eng.mode().matching_strategy, Strategy::Strongest);
    }
}
