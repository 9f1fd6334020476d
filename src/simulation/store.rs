//! In-memory simulation store (C2).
//!
//! Wraps a [`super::schema::SimulationV3`] in a `RwLock<Arc<_>>` so readers
//! (every proxied request, in Simulate mode) never block on writers
//! (`Load`/`Append`/`Clear` from the admin API): a write builds a whole new
//! snapshot and swaps the `Arc` under the lock, so in-flight reads keep
//! using the old snapshot until they finish. Each pair's matcher patterns
//! are compiled once at `Load`/`Append` time and cached in the snapshot
//! alongside the raw wire shape needed to answer `Export` faithfully.
//!
//! # Examples
//!
//! ```rust
//! use simulacra::simulation::SimulationStore;
//!
//! let store = SimulationStore::new();
//! assert_eq!(store.pair_count(), 0);
//! ```

use std::sync::{Arc, RwLock};

use crate::canonical::RequestDetails;
use crate::error::ProxyError;
use crate::matcher::{find_match, ClosestMiss, CompiledPair, Strategy};

use super::schema::{self, DataV3, DelayV3, GlobalActionsV3, MetaV3, PairV3, ResponseView, SimulationV3};

#[derive(Clone)]
struct StoredPair {
    raw: PairV3,
    compiled: CompiledPair,
}

struct Snapshot {
    pairs: Vec<StoredPair>,
    delays: Vec<DelayV3>,
    meta: MetaV3,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            pairs: Vec::new(),
            delays: Vec::new(),
            meta: schema::fresh_meta(""),
        }
    }
}

/// Copy-on-write store of matching pairs and global delay actions.
pub struct SimulationStore {
    inner: RwLock<Arc<Snapshot>>,
}

impl Default for SimulationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationStore {
    /// An empty store, as if a fresh v3 simulation with no pairs was loaded.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(Snapshot::empty())),
        }
    }

    /// Parses and installs a simulation document, replacing the current
    /// contents wholesale. Fails closed: a bad document (invalid JSON,
    /// unknown schema version, or an uncompilable matcher pattern) leaves
    /// the store untouched.
    pub fn load(&self, bytes: &[u8]) -> Result<(), ProxyError> {
        let sim = schema::load(bytes)?;
        self.install(sim)
    }

    fn install(&self, sim: SimulationV3) -> Result<(), ProxyError> {
        let mut pairs = Vec::with_capacity(sim.data.pairs.len());
        for raw in sim.data.pairs {
            let compiled = CompiledPair::compile(&raw)?;
            pairs.push(StoredPair { raw, compiled });
        }
        let snapshot = Arc::new(Snapshot {
            pairs,
            delays: sim.data.global_actions.delays,
            meta: sim.meta,
        });
        *self.inner.write().unwrap() = snapshot;
        Ok(())
    }

    /// Serializes the current contents back to v3 JSON.
    pub fn export(&self) -> Vec<u8> {
        let snapshot = self.inner.read().unwrap().clone();
        let sim = SimulationV3 {
            data: DataV3 {
                pairs: snapshot.pairs.iter().map(|p| p.raw.clone()).collect(),
                global_actions: GlobalActionsV3 {
                    delays: snapshot.delays.clone(),
                },
            },
            meta: snapshot.meta.clone(),
        };
        schema::export(&sim)
    }

    /// Appends a single pair (used by Capture mode), compiling its matcher
    /// patterns before it becomes visible to readers.
    pub fn append(&self, pair: PairV3) -> Result<(), ProxyError> {
        let compiled = CompiledPair::compile(&pair)?;
        let mut guard = self.inner.write().unwrap();
        let mut pairs = guard.pairs.clone();
        pairs.push(StoredPair { raw: pair, compiled });
        *guard = Arc::new(Snapshot {
            pairs,
            delays: guard.delays.clone(),
            meta: guard.meta.clone(),
        });
        Ok(())
    }

    /// Empties the store, keeping an empty v3 meta block.
    pub fn clear(&self) {
        *self.inner.write().unwrap() = Arc::new(Snapshot::empty());
    }

    /// Finds the best matching pair's response for `request` under
    /// `strategy`. See [`crate::matcher::find_match`] for selection rules.
    pub fn find(
        &self,
        request: &RequestDetails,
        strategy: Strategy,
    ) -> Result<ResponseView, Option<ClosestMiss>> {
        let snapshot = self.inner.read().unwrap().clone();
        let compiled: Vec<CompiledPair> = snapshot.pairs.iter().map(|p| p.compiled.clone()).collect();
        let (_, response) = find_match(&compiled, request, strategy)?;
        Ok(response.clone())
    }

    /// The global artificial-delay actions currently configured.
    pub fn delays(&self) -> Vec<DelayV3> {
        self.inner.read().unwrap().delays.clone()
    }

    /// Number of pairs currently stored.
    pub fn pair_count(&self) -> usize {
        self.inner.read().unwrap().pairs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::HeaderMultiMap;

    fn sample_v3() -> Vec<u8> {
        br#"{"data":{"pairs":[{"request":{"path":{"exactMatch":"/users"}},"response":{"status":200,"body":"ok","headers":{}}}],"globalActions":{"delays":[]}},"meta":{"schemaVersion":"v3","hoverflyVersion":"x","timeExported":"now"}}"#.to_vec()
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

    #[test]
    fn load_then_find_returns_stored_response() {
        let store = SimulationStore::new();
        store.load(&sample_v3()).unwrap();
        assert_eq!(store.pair_count(), 1);

        let resp = store.find(&req("/users"), Strategy::First).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "ok");
    }

    #[test]
    fn find_on_empty_store_misses() {
        let store = SimulationStore::new();
        let err = store.find(&req("/anything"), Strategy::First).unwrap_err();
        assert!(err.is_none());
    }

    #[test]
    fn clear_empties_store() {
        let store = SimulationStore::new();
        store.load(&sample_v3()).unwrap();
        store.clear();
        assert_eq!(store.pair_count(), 0);
    }

    #[test]
    fn append_is_visible_to_subsequent_finds() {
        let store = SimulationStore::new();
        let pair: PairV3 = serde_json::from_str(
            r#"{"request":{"path":{"exactMatch":"/new"}},"response":{"status":201,"body":"created","headers":{}}}"#,
        )
        .unwrap();
        store.append(pair).unwrap();
        let resp = store.find(&req("/new"), Strategy::First).unwrap();
        assert_eq!(resp.status, 201);
    }

    #[test]
    fn export_round_trips_through_load() {
        let store = SimulationStore::new();
        store.load(&sample_v3()).unwrap();
        let bytes = store.export();

        let reloaded = SimulationStore::new();
        reloaded.load(&bytes).unwrap();
        assert_eq!(reloaded.pair_count(), 1);
    }

    #[test]
    fn load_failure_leaves_store_unchanged() {
        let store = SimulationStore::new();
        store.load(&sample_v3()).unwrap();
        let err = store.load(b"not json");
        assert!(err.is_err());
        assert_eq!(store.pair_count(), 1);
    }
}
