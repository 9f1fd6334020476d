//! Process-wide mode state machine and per-request dispatch (C6).
//!
//! The active [`Mode`] and [`crate::matcher::Strategy`] are configuration,
//! not per-request state: they live behind an [`arc_swap::ArcSwap`] that
//! only admin API calls mutate. A request in flight keeps using whatever
//! [`ModeConfig`] it read at the start of [`ModeEngine::handle`], even if
//! the mode changes mid-flight, per spec.md §5 ("in-flight requests
//! complete under the mode they started with").
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use simulacra::journal::Journal;
//! use simulacra::matcher::Strategy;
//! use simulacra::mode::{Mode, ModeConfig, ModeEngine};
//! use simulacra::simulation::SimulationStore;
//!
//! let engine = ModeEngine::new(
//!     ModeConfig { mode: Mode::Simulate, matching_strategy: Strategy::First },
//!     Arc::new(SimulationStore::new()),
//!     Arc::new(Journal::new(1000)),
//!     None,
//! );
//! assert_eq!(engine.mode().mode, Mode::Simulate);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::canonical::{HeaderMultiMap, RequestDetails, ResponseDetails};
use crate::error::ProxyError;
use crate::journal::{Journal, JournalEntry};
use crate::matcher::Strategy;
use crate::middleware_bridge::MiddlewareBridge;
use crate::simulation::schema::{MatcherSpec, PairV3, RequestMatcherSetV3, ResponseView};
use crate::simulation::SimulationStore;

/// Process-wide operating mode, set only via the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Capture,
    Simulate,
    Synthesize,
    Modify,
    Spy,
}

/// The mode plus whichever matching strategy Simulate/Spy should use.
#[derive(Debug, Clone, Copy)]
pub struct ModeConfig {
    pub mode: Mode,
    pub matching_strategy: Strategy,
}

/// Ties the canonicalizer, simulation store, matcher, templating,
/// middleware bridge, upstream client, and journal together per request.
pub struct ModeEngine {
    config: ArcSwap<ModeConfig>,
    store: Arc<SimulationStore>,
    journal: Arc<Journal>,
    middleware: Option<Arc<MiddlewareBridge>>,
}

impl ModeEngine {
    pub fn new(
        initial: ModeConfig,
        store: Arc<SimulationStore>,
        journal: Arc<Journal>,
        middleware: Option<Arc<MiddlewareBridge>>,
    ) -> Self {
        Self {
            config: ArcSwap::from_pointee(initial),
            store,
            journal,
            middleware,
        }
    }

    /// The currently active mode and matching strategy.
    pub fn mode(&self) -> ModeConfig {
        **self.config.load()
    }

    /// Swaps the active mode/strategy. Requests already dispatched keep
    /// running under the mode they read at the start of `handle`.
    pub fn set_mode(&self, config: ModeConfig) {
        self.config.store(Arc::new(config));
    }

    /// Runs one request through the mode-appropriate flow, journals the
    /// outcome (tagged with the mode that actually ran), and returns the
    /// response to send to the client.
    ///
    /// `path_params` are the router's extracted path parameters, used only
    /// by Simulate/Spy when the matched pair is templated.
    pub async fn handle(&self, request: RequestDetails, path_params: &[String]) -> ResponseDetails {
        let config = self.mode();
        let started_at = std::time::Instant::now();
        let time_started = chrono::Utc::now().to_rfc3339();

        let result = match config.mode {
            Mode::Simulate => self.run_simulate(&request, path_params, config.matching_strategy).await,
            Mode::Spy => self.run_spy(&request, path_params, config.matching_strategy).await,
            Mode::Capture => self.run_capture(&request).await,
            Mode::Modify => self.run_modify(&request).await,
            Mode::Synthesize => self.run_synthesize(&request).await,
        };

        let latency_millis = started_at.elapsed().as_millis() as u64;
        let response = match &result {
            Ok(details) => details.clone(),
            Err(err) => {
                tracing::warn!(mode = ?config.mode, error = %err, "request failed");
                error_response(err)
            }
        };

        let entry = JournalEntry {
            request,
            response: response.clone(),
            mode: config.mode,
            time_started,
            latency_millis,
        };
        if let Err(err) = self.journal.append(entry) {
            if !matches!(err, ProxyError::Disabled) {
                tracing::warn!(error = %err, "failed to append journal entry");
            }
        }

        response
    }

    async fn run_simulate(
        &self,
        request: &RequestDetails,
        path_params: &[String],
        strategy: Strategy,
    ) -> Result<ResponseDetails, ProxyError> {
        let view = self
            .store
            .find(request, strategy)
            .map_err(|closest_miss| ProxyError::Matching { closest_miss })?;
        self.render_and_bridge(&view, request, path_params).await
    }

    async fn run_spy(
        &self,
        request: &RequestDetails,
        path_params: &[String],
        strategy: Strategy,
    ) -> Result<ResponseDetails, ProxyError> {
        match self.store.find(request, strategy) {
            Ok(view) => self.render_and_bridge(&view, request, path_params).await,
            Err(_closest_miss) => crate::upstream::UpstreamClient::send(request).await,
        }
    }

    async fn render_and_bridge(
        &self,
        view: &ResponseView,
        request: &RequestDetails,
        path_params: &[String],
    ) -> Result<ResponseDetails, ProxyError> {
        let mut details = response_view_to_details(view);
        if view.templated.unwrap_or(false) {
            details.body = crate::templating::render(&details.body, request, path_params)?;
        }
        if let Some(bridge) = &self.middleware {
            let (_, response) = bridge.apply(request.clone(), details).await?;
            details = response;
        }
        Ok(details)
    }

    async fn run_capture(&self, request: &RequestDetails) -> Result<ResponseDetails, ProxyError> {
        let mut response = crate::upstream::UpstreamClient::send(request).await?;
        if let Some(bridge) = &self.middleware {
            let (_, bridged) = bridge.apply(request.clone(), response).await?;
            response = bridged;
        }
        self.store.append(build_pair(request, &response))?;
        Ok(response)
    }

    async fn run_modify(&self, request: &RequestDetails) -> Result<ResponseDetails, ProxyError> {
        let response = crate::upstream::UpstreamClient::send(request).await?;
        let bridge = self
            .middleware
            .as_ref()
            .ok_or_else(|| ProxyError::Middleware("modify mode requires middleware".to_string()))?;
        let (_, response) = bridge.apply(request.clone(), response).await?;
        Ok(response)
    }

    async fn run_synthesize(&self, request: &RequestDetails) -> Result<ResponseDetails, ProxyError> {
        let bridge = self
            .middleware
            .as_ref()
            .ok_or_else(|| ProxyError::Middleware("synthesize mode requires middleware".to_string()))?;
        let empty = ResponseDetails {
            status: 0,
            body: String::new(),
            headers: HeaderMultiMap::default(),
            encoded_body: false,
        };
        let (_, response) = bridge.apply(request.clone(), empty).await?;
        Ok(response)
    }
}

/// Mode-engine failures always surface as a textual 502, independent of
/// `ProxyError::status_code` (which serves the admin API's JSON errors
/// instead) — spec.md §4.6 assigns every step failure the same status.
fn error_response(err: &ProxyError) -> ResponseDetails {
    ResponseDetails {
        status: 502,
        body: err.to_string(),
        headers: HeaderMultiMap::default(),
        encoded_body: false,
    }
}

fn response_view_to_details(view: &ResponseView) -> ResponseDetails {
    ResponseDetails {
        status: view.status,
        body: view.body.clone(),
        headers: HeaderMultiMap::from_pairs(view.headers.iter().map(|(k, v)| (k.clone(), v.clone()))),
        encoded_body: view.encoded_body,
    }
}

/// Captures a live exchange as a literal pair: every field becomes an
/// `exactMatch` matcher (query split per-key, the same shape a stored v3
/// query map already uses).
fn build_pair(request: &RequestDetails, response: &ResponseDetails) -> PairV3 {
    let mut query = BTreeMap::new();
    if !request.query.is_empty() {
        for (k, v) in url::form_urlencoded::parse(request.query.as_bytes()) {
            query.insert(k.into_owned(), MatcherSpec::exact(v.into_owned()));
        }
    }

    let mut headers = BTreeMap::new();
    for (name, values) in request.headers.iter() {
        headers.insert(name.clone(), values.clone());
    }

    let matcher_set = RequestMatcherSetV3 {
        scheme: Some(MatcherSpec::exact(request.scheme.clone())),
        method: Some(MatcherSpec::exact(request.method.clone())),
        destination: Some(MatcherSpec::exact(request.destination.clone())),
        path: Some(MatcherSpec::exact(request.path.clone())),
        query: (!query.is_empty()).then_some(query),
        body: (!request.body.is_empty()).then(|| MatcherSpec::exact(request.body.clone())),
        headers: (!headers.is_empty()).then_some(headers),
    };

    PairV3 {
        request: matcher_set,
        response: ResponseView {
            status: response.status,
            body: response.body.clone(),
            encoded_body: response.encoded_body,
            headers: response.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            templated: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::middleware_bridge::MiddlewareTransport;

    fn engine(mode: Mode, middleware: Option<Arc<MiddlewareBridge>>) -> ModeEngine {
        ModeEngine::new(
            ModeConfig {
                mode,
                matching_strategy: Strategy::First,
            },
            Arc::new(SimulationStore::new()),
            Arc::new(Journal::new(10)),
            middleware,
        )
    }

    fn req(path: &str) -> RequestDetails {
        RequestDetails {
            scheme: "http".into(),
            method: "GET".into(),
            destination: "example.com".into(),
            path: path.into(),
            query: String::new(),
            body: String::new(),
            headers: HeaderMultiMap::default(),
        }
    }

    #[tokio::test]
    async fn simulate_hit_returns_stored_response() {
        let eng = engine(Mode::Simulate, None);
        eng.store
            .load(br#"{"data":{"pairs":[{"request":{"path":{"exactMatch":"/a"}},"response":{"status":200,"body":"hi","headers":{}}}],"globalActions":{"delays":[]}},"meta":{"schemaVersion":"v3","hoverflyVersion":"x","timeExported":"now"}}"#)
            .unwrap();

        let resp = eng.handle(req("/a"), &[]).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "hi");
    }

    #[tokio::test]
    async fn simulate_miss_is_502() {
        let eng = engine(Mode::Simulate, None);
        let resp = eng.handle(req("/missing"), &[]).await;
        assert_eq!(resp.status, 502);
    }

    #[tokio::test]
    async fn synthesize_requires_middleware() {
        let eng = engine(Mode::Synthesize, None);
        let resp = eng.handle(req("/anything"), &[]).await;
        assert_eq!(resp.status, 502);
    }

    #[tokio::test]
    async fn synthesize_runs_middleware_on_empty_response() {
        let bridge = Arc::new(MiddlewareBridge::new(
            MiddlewareTransport::Subprocess {
                command: "cat".to_string(),
                args: vec![],
            },
            Duration::from_secs(5),
        ));
        let eng = engine(Mode::Synthesize, Some(bridge));
        let resp = eng.handle(req("/anything"), &[]).await;
        assert_eq!(resp.status, 0);
    }

    #[tokio::test]
    async fn mode_change_is_visible_to_next_request() {
        let eng = engine(Mode::Simulate, None);
        assert_eq!(eng.mode().mode, Mode::Simulate);
        eng.set_mode(ModeConfig {
            mode: Mode::Spy,
            matching_strategy: Strategy::Strongest,
        });
        assert_eq!(eng.mode().mode, Mode::Spy);
    }

    #[tokio::test]
    async fn handle_appends_journal_entry_tagged_with_mode() {
        let eng = engine(Mode::Simulate, None);
        eng.handle(req("/missing"), &[]).await;
        let entries = eng.journal.get_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mode, Mode::Simulate);
    }
}
