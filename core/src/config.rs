use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Knobs of a calibration run. Defaults match the reference model setup:
/// 1 % tolerance on the worst agent-type gap, at most 10 iterations, and a
/// secondary convergence signal when successive allocations stabilize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Converged when the max absolute per-agent gap drops below this,
    /// in percent of the control total.
    pub tolerance: f64,
    /// Hard cap on the iteration counter.
    pub max_iterations: u32,
    /// Converged when the successive-allocation RMSE drops below this,
    /// even if the gap has not hit `tolerance`.
    pub min_rmse: f64,
    /// Rescale supply to demand per market before the first solver call.
    pub balance: bool,
    /// Zero the bid-adjustment column before the loop starts.
    pub reset_adjustments: bool,
    /// Wall-clock budget for a single solver invocation.
    pub solver_timeout_secs: u64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            max_iterations: 10,
            min_rmse: 0.01,
            balance: true,
            reset_adjustments: false,
            solver_timeout_secs: 120,
        }
    }
}

impl CalibrationSettings {
    /// Load from a JSON file. Absent fields keep their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn solver_timeout(&self) -> Duration {
        Duration::from_secs(self.solver_timeout_secs)
    }
}
