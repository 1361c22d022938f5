//! Calibration engine tests: convergence, divergence and the iteration cap,
//! driven by synthetic solvers.

use landcal_core::config::CalibrationSettings;
use landcal_core::engine::{CalibrationEngine, CalibrationStatus};
use landcal_core::error::{CalibError, CalibResult};
use landcal_core::solver::{Solver, SolverOutput};
use landcal_core::store::TableSet;
use landcal_core::table::Table;
use landcal_core::validate::ValidationReport;
use std::cell::Cell;
use std::path::Path;
use tempfile::tempdir;

/// A solver that allocates a scripted total to the single agent of the
/// minimal table set, one entry per invocation (the last repeats).
struct ScriptedSolver {
    allocations: Vec<f64>,
    calls: Cell<usize>,
}

impl ScriptedSolver {
    fn new(allocations: Vec<f64>) -> Self {
        Self {
            allocations,
            calls: Cell::new(0),
        }
    }
}

impl Solver for ScriptedSolver {
    fn run(
        &self,
        _tables: &TableSet,
        _working_dir: &Path,
        _report: &ValidationReport,
    ) -> CalibResult<SolverOutput> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        let est = *self
            .allocations
            .get(call)
            .or(self.allocations.last())
            .unwrap_or(&0.0);

        let mut location = Table::new(vec!["Realestate", "Zone", "B_H[1]V"]);
        location.push_row(vec![1.into(), 1.into(), est.into()]);
        let mut per_estate = Table::new(vec!["Realestate", "Zone", "Value"]);
        per_estate.push_row(vec![1.into(), 1.into(), 0.0.into()]);
        let mut bh = Table::new(vec!["Agents", "Value"]);
        bh.push_row(vec![1.into(), 0.0.into()]);

        Ok(SolverOutput {
            bids: per_estate.clone(),
            bh,
            location,
            location_probability: per_estate.clone(),
            rents: per_estate,
        })
    }
}

fn engine(solver: ScriptedSolver, settings: CalibrationSettings) -> (CalibrationEngine, tempfile::TempDir) {
    let work = tempdir().unwrap();
    let engine = CalibrationEngine::new(Box::new(solver), work.path(), settings);
    (engine, work)
}

fn no_balance_settings() -> CalibrationSettings {
    let _ = env_logger::builder().is_test(true).try_init();
    CalibrationSettings {
        balance: false,
        ..CalibrationSettings::default()
    }
}

/// Control total in the minimal set is 100. An exact allocation must
/// converge on the first post-baseline check with a zero gap.
#[test]
fn exact_allocation_converges_in_two_iterations() {
    let (engine, _work) = engine(ScriptedSolver::new(vec![100.0]), no_balance_settings());
    let result = engine.calibrate(TableSet::default_test()).unwrap();

    assert_eq!(result.status, CalibrationStatus::Converged);
    assert_eq!(result.iterations_run, 2);
    assert_eq!(result.history.len(), 2);
    assert_eq!(result.history[1].max_abs_pct_diff, 0.0);
    // exact match: the log-ratio correction is zero, adjustments untouched
    assert_eq!(
        result.tables.bids_adjustments.rows[0][3],
        landcal_core::table::Value::Num(0.0)
    );
}

/// Strictly increasing successive-allocation RMSE must be detected as
/// divergence at the first k > 1 where RMSE rises, well before the cap.
#[test]
fn rising_rmse_is_divergence() {
    // RMSE_1 = |150-200|/200 = 0.25, RMSE_2 = |300-150|/150 = 1.0 > 0.25
    let solver = ScriptedSolver::new(vec![200.0, 150.0, 300.0]);
    let settings = CalibrationSettings {
        min_rmse: 1e-9,
        ..no_balance_settings()
    };
    let (engine, _work) = engine(solver, settings);
    let result = engine.calibrate(TableSet::default_test()).unwrap();

    assert_eq!(result.status, CalibrationStatus::Diverged);
    assert_eq!(result.iterations_run, 3);
    let last = result.history.last().unwrap();
    assert!(last.rmse.unwrap() > result.history[1].rmse.unwrap());
}

/// Neither converging nor oscillating: the run must stop exactly at the
/// iteration cap.
#[test]
fn iteration_cap_is_exact() {
    // est_k = 200 + 100/(k+1): gap stays ~100%+, RMSE strictly decreasing,
    // so neither convergence rule nor the divergence rule ever fires.
    let allocations: Vec<f64> = (0..32).map(|k| 200.0 + 100.0 / (k as f64 + 1.0)).collect();
    let settings = CalibrationSettings {
        max_iterations: 4,
        min_rmse: 0.0,
        ..no_balance_settings()
    };
    let (engine, _work) = engine(ScriptedSolver::new(allocations), settings);
    let result = engine.calibrate(TableSet::default_test()).unwrap();

    assert_eq!(result.status, CalibrationStatus::MaxIterationsReached);
    assert_eq!(result.iterations_run, 5); // baseline + iterations 1..=4
    assert_eq!(result.history.last().unwrap().iteration, 4);
    // partial state still returned for inspection
    assert!(!result.tables.bids_adjustments.is_empty());
}

/// Stable allocations converge through the secondary RMSE signal even when
/// the gap never reaches the tolerance.
#[test]
fn stable_allocation_converges_via_min_rmse() {
    let solver = ScriptedSolver::new(vec![150.0, 150.0]);
    let settings = CalibrationSettings {
        tolerance: 0.1, // 50% gap never passes the primary rule
        min_rmse: 0.01,
        ..no_balance_settings()
    };
    let (engine, _work) = engine(solver, settings);
    let result = engine.calibrate(TableSet::default_test()).unwrap();

    assert_eq!(result.status, CalibrationStatus::Converged);
    assert_eq!(result.history.last().unwrap().rmse, Some(0.0));
}

/// A zero allocation makes the log-ratio undefined: fail fast.
#[test]
fn zero_allocation_fails_fast() {
    let (engine, _work) = engine(ScriptedSolver::new(vec![0.0]), no_balance_settings());

    match engine.calibrate(TableSet::default_test()) {
        Err(CalibError::Divergence { agent, .. }) => assert_eq!(agent, 1),
        other => panic!("expected Divergence error, got {other:?}"),
    }
}

/// Under-allocation raises the agent's bid adjustment (positive log-ratio).
#[test]
fn under_allocation_raises_bids() {
    let solver = ScriptedSolver::new(vec![50.0, 100.0]);
    let (engine, _work) = engine(solver, no_balance_settings());
    let result = engine.calibrate(TableSet::default_test()).unwrap();

    assert_eq!(result.status, CalibrationStatus::Converged);
    // baseline applied ln(100/50) = ln 2; the converging iteration adds ln 1.
    let adj = result.tables.bids_adjustments.rows[0][3]
        .as_num()
        .unwrap();
    assert!((adj - 2.0f64.ln()).abs() < 1e-12);
    let bh = result.output.bh.rows[0][1].as_num().unwrap();
    assert!(bh.abs() < 1e-12); // last bh update was ln(1) = 0
}
