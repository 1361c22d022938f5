use crate::types::{AgentId, MarketId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalibError {
    #[error("Missing input table '{name}' at {path}")]
    MissingTable { name: String, path: PathBuf },

    #[error("Schema error in table '{table}': {detail}")]
    Schema { table: String, detail: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("Cannot balance market {market}: aggregate supply is zero")]
    Balance { market: MarketId },

    #[error("Solver timed out after {seconds}s")]
    SolverTimeout { seconds: u64 },

    #[error("Solver run failed: {reason}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    SolverRun {
        reason: String,
        stdout: String,
        stderr: String,
    },

    #[error("Solver output table '{table}' has {actual} rows, expected {expected}")]
    SolverOutput {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Calibration diverged for agent {agent}: {detail}")]
    Divergence { agent: AgentId, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One variant per structural invariant, so callers can react to each
/// violation differently. Never mutates the tables it inspects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("zone ids are not unique ({distinct} distinct ids over {rows} rows)")]
    DuplicateZoneIds { distinct: usize, rows: usize },

    #[error("real estate zone ids do not match zonal data ({distinct} distinct, {expected} zones)")]
    ZoneMismatch { distinct: usize, expected: usize },

    #[error("market count differs between agents ({agents}) and real estate ({real_estate})")]
    MarketMismatch { agents: usize, real_estate: usize },

    #[error("function table '{0}' is missing or empty")]
    MissingFunctionTable(&'static str),

    #[error("table '{table}' has {actual} rows, expected {expected}")]
    RowCountMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type CalibResult<T> = Result<T, CalibError>;
