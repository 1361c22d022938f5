//! The calibration engine: the fixed-point loop around the solver.
//!
//! ITERATION BODY (fixed order, never reordered):
//!   1. Run the solver on the current table set in a fresh working dir.
//!   2. Sum the per-agent allocation from the `location` output.
//!   3. Per agent: gap against the control total, log-ratio correction
//!      ln(target / allocated).
//!   4. Apply the correction additively to `bids_adjustments` and `bh`,
//!      producing new tables (no in-place mutation).
//!   5. Max absolute percentage gap; for k > 0 the RMSE of successive
//!      allocations, normalized by the prior mean.
//!   6. Transition: tolerance hit → Converged; iteration cap →
//!      MaxIterationsReached; RMSE rising after k > 1 → Diverged;
//!      RMSE below the floor → Converged.
//!
//! Divergence and the iteration cap are expected outcomes of a numeric
//! search: they terminate with a structured result carrying the partial
//! adjustment state, not an error. Errors are reserved for infrastructure
//! failures and for gaps the log-ratio step cannot express (zero
//! allocation, zero target).

use crate::balance::balance_supply;
use crate::config::CalibrationSettings;
use crate::error::{CalibError, CalibResult};
use crate::solver::{Solver, SolverOutput};
use crate::store::TableSet;
use crate::table::{Table, Value};
use crate::types::AgentId;
use crate::validate::{validate, ValidationReport};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    Converged,
    Diverged,
    MaxIterationsReached,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    /// 100 * max_h |allocated - target| / target.
    pub max_abs_pct_diff: f64,
    /// Successive-allocation RMSE; undefined on the baseline iteration.
    pub rmse: Option<f64>,
}

#[derive(Debug)]
pub struct CalibrationResult {
    pub status: CalibrationStatus,
    /// Final table set, including the last bid adjustments. Returned for
    /// non-converged runs too, for inspection.
    pub tables: TableSet,
    /// Last solver output, with `bh` carrying the applied corrections.
    pub output: SolverOutput,
    pub report: ValidationReport,
    pub iterations_run: u32,
    pub history: Vec<IterationRecord>,
}

pub struct CalibrationEngine {
    solver: Box<dyn Solver>,
    work_root: PathBuf,
    settings: CalibrationSettings,
}

impl CalibrationEngine {
    pub fn new(
        solver: Box<dyn Solver>,
        work_root: impl Into<PathBuf>,
        settings: CalibrationSettings,
    ) -> Self {
        Self {
            solver,
            work_root: work_root.into(),
            settings,
        }
    }

    /// Drive the solver to a fixed point where the modeled allocation of
    /// agents matches the control totals from the demand table. The engine
    /// owns the table set for the whole run; each iteration's input depends
    /// on the previous one's output, so the loop is strictly sequential.
    pub fn calibrate(&self, tables: TableSet) -> CalibResult<CalibrationResult> {
        let report = validate(&tables)?;
        let mut tables = tables;

        if self.settings.reset_adjustments {
            tables.bids_adjustments = zero_last_column(&tables.bids_adjustments);
        }
        if self.settings.balance {
            tables.supply = balance_supply(
                &tables.supply,
                &tables.demand,
                &tables.real_estates_zones,
                &tables.agents,
            )?;
        }

        let control = control_totals(&tables.demand)?;

        let mut history: Vec<IterationRecord> = Vec::new();
        let mut prior_alloc: Option<BTreeMap<AgentId, f64>> = None;
        let mut prior_rmse: Option<f64> = None;
        let mut k: u32 = 0;

        loop {
            // Isolated, uniquely named working dir per iteration, discarded
            // after the call.
            let working_dir = self.work_root.join(format!("iter-{k}-{}", Uuid::new_v4()));
            fs::create_dir_all(&working_dir)?;
            let run = self.solver.run(&tables, &working_dir, &report);
            let _ = fs::remove_dir_all(&working_dir);
            let mut output = run?;

            let est_loc = allocated_totals(&output.location)?;

            let mut deltas: BTreeMap<AgentId, f64> = BTreeMap::new();
            let mut max_abs_pct_diff: f64 = 0.0;
            for (&agent, &target) in &control {
                if target <= 0.0 {
                    return Err(CalibError::Divergence {
                        agent,
                        detail: format!("control total {target} is not positive"),
                    });
                }
                let est = est_loc.get(&agent).copied().unwrap_or(0.0);
                if est <= 0.0 {
                    return Err(CalibError::Divergence {
                        agent,
                        detail: format!("allocation {est} is not positive, log-ratio undefined"),
                    });
                }
                deltas.insert(agent, (target / est).ln());
                max_abs_pct_diff = max_abs_pct_diff.max(100.0 * (est - target).abs() / target);
            }

            tables.bids_adjustments =
                apply_agent_deltas(&tables.bids_adjustments, &deltas, "bids_adjustments")?;
            output.bh = apply_agent_deltas(&output.bh, &deltas, "bh")?;

            let rmse = prior_alloc
                .as_ref()
                .map(|prior| successive_rmse(&est_loc, prior));
            history.push(IterationRecord {
                iteration: k,
                max_abs_pct_diff,
                rmse,
            });
            match rmse {
                Some(rmse) => log::info!(
                    "iteration {k}: RMSE = {rmse:.4}, max abs diff = {max_abs_pct_diff:.2}%"
                ),
                None => log::info!(
                    "iteration {k} (baseline): max abs diff = {max_abs_pct_diff:.2}%"
                ),
            }

            // Transition rules apply only once a baseline allocation exists.
            if let Some(rmse) = rmse {
                let status = if max_abs_pct_diff < self.settings.tolerance {
                    Some(CalibrationStatus::Converged)
                } else if k == self.settings.max_iterations {
                    Some(CalibrationStatus::MaxIterationsReached)
                } else if k > 1 && prior_rmse.is_some_and(|prior| rmse > prior) {
                    Some(CalibrationStatus::Diverged)
                } else if rmse < self.settings.min_rmse {
                    Some(CalibrationStatus::Converged)
                } else {
                    None
                };
                if let Some(status) = status {
                    if status != CalibrationStatus::Converged {
                        log::warn!("calibration did not converge: {status:?}");
                    }
                    return Ok(CalibrationResult {
                        status,
                        tables,
                        output,
                        report,
                        iterations_run: k + 1,
                        history,
                    });
                }
            }

            prior_rmse = rmse;
            prior_alloc = Some(est_loc);
            k += 1;
        }
    }
}

/// Per-agent control totals from the demand table.
fn control_totals(demand: &Table) -> CalibResult<BTreeMap<AgentId, f64>> {
    let agents = demand.id_column(0, "demand")?;
    let counts = demand.num_column(1, "demand")?;
    Ok(agents.into_iter().zip(counts).collect())
}

/// Sum the `location` output by agent. The first two columns index
/// (real-estate type, zone); every further column belongs to one agent,
/// identified by the bracketed id in the column header. The join is by
/// that id, never by column position.
fn allocated_totals(location: &Table) -> CalibResult<BTreeMap<AgentId, f64>> {
    let mut totals: BTreeMap<AgentId, f64> = BTreeMap::new();
    for (col, name) in location.header.iter().enumerate().skip(2) {
        let agent = agent_id_from_column(name).ok_or_else(|| CalibError::Schema {
            table: "location".to_string(),
            detail: format!("column '{name}' carries no bracketed agent id"),
        })?;
        let sum: f64 = location.num_column(col, "location")?.iter().sum();
        *totals.entry(agent).or_insert(0.0) += sum;
    }
    Ok(totals)
}

/// `"B_H[7]V"` → `Some(7)`.
fn agent_id_from_column(name: &str) -> Option<AgentId> {
    let start = name.find('[')? + 1;
    let end = name[start..].find(']')? + start;
    name[start..end].trim().parse().ok()
}

/// Add each agent's delta to the last column of every row keyed by that
/// agent (first column). Produces a new table; rows of agents without a
/// delta are copied unchanged. `name` attributes schema errors to the
/// table being transformed.
fn apply_agent_deltas(
    table: &Table,
    deltas: &BTreeMap<AgentId, f64>,
    name: &str,
) -> CalibResult<Table> {
    let value_col = table.header.len() - 1;
    let mut adjusted = Table::new(table.header.clone());
    for (i, row) in table.rows.iter().enumerate() {
        let agent = row.first().and_then(Value::as_id).ok_or_else(|| CalibError::Schema {
            table: name.to_string(),
            detail: format!("row {i}: first column is not an agent id"),
        })?;
        let mut new_row = row.clone();
        if let Some(delta) = deltas.get(&agent) {
            let current = new_row
                .get(value_col)
                .and_then(Value::as_num)
                .ok_or_else(|| CalibError::Schema {
                    table: name.to_string(),
                    detail: format!("row {i}: adjustment column is not numeric"),
                })?;
            new_row[value_col] = Value::Num(current + delta);
        }
        adjusted.push_row(new_row);
    }
    Ok(adjusted)
}

/// RMSE of successive allocations, normalized by the prior mean. Used as a
/// stability signal independent of the control-total gap.
fn successive_rmse(current: &BTreeMap<AgentId, f64>, prior: &BTreeMap<AgentId, f64>) -> f64 {
    let n = prior.len() as f64;
    let sse: f64 = prior
        .iter()
        .map(|(agent, &p)| {
            let c = current.get(agent).copied().unwrap_or(0.0);
            (c - p) * (c - p)
        })
        .sum();
    let mean_prior = prior.values().sum::<f64>() / n;
    (sse / n).sqrt() / mean_prior
}

/// Reset the adjustment column to zero (the original model's optional
/// init-bids step).
fn zero_last_column(table: &Table) -> Table {
    let value_col = table.header.len() - 1;
    let mut zeroed = Table::new(table.header.clone());
    for row in &table.rows {
        let mut new_row = row.clone();
        new_row[value_col] = Value::Num(0.0);
        zeroed.push_row(new_row);
    }
    zeroed
}
