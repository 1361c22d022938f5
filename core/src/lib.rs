//! landcal-core: fixed-supply calibration around an external land-use
//! equilibrium solver.
//!
//! Pipeline: table store → validator → (optional) balancer → calibration
//! engine → repeated solver invocations. The engine is the orchestrator;
//! everything else is a service it calls.

pub mod balance;
pub mod config;
pub mod csv;
pub mod engine;
pub mod error;
pub mod solver;
pub mod store;
pub mod table;
pub mod types;
pub mod validate;
