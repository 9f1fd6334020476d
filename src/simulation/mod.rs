//! Simulation storage: versioned wire schema ([`schema`]) and the
//! in-memory, copy-on-write store built from it ([`store`]).

pub mod schema;
pub mod store;

pub use schema::{PairV3, ResponseView, SimulationV3};
pub use store::SimulationStore;
