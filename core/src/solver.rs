//! Adapter around the external equilibrium solver.
//!
//! The solver is a black box driven through a file protocol: twelve input
//! CSVs under `<working_dir>/input`, five output CSVs under
//! `<working_dir>/output`, invoked as `binary <working_dir>`. Success is
//! signalled by a literal marker on stdout; exit status alone is not
//! trusted. No retries: any failure aborts the calibration run.

use crate::csv;
use crate::error::{CalibError, CalibResult};
use crate::store::{self, TableSet};
use crate::table::Table;
use crate::validate::ValidationReport;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// The literal line the solver prints on a successful run. The misspelling
/// is the binary's own; do not correct it.
pub const SUCCESS_MARKER: &str = "Algorithm ended sucessfully";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub binary: PathBuf,
    pub timeout: Duration,
}

/// Fixed-shape solver response: one field per output table.
#[derive(Debug, Clone)]
pub struct SolverOutput {
    pub bids: Table,
    pub bh: Table,
    pub location: Table,
    pub location_probability: Table,
    pub rents: Table,
}

/// Seam between the calibration engine and the real process. Tests plug in
/// synthetic solvers here.
pub trait Solver {
    fn run(
        &self,
        tables: &TableSet,
        working_dir: &Path,
        report: &ValidationReport,
    ) -> CalibResult<SolverOutput>;
}

/// The real thing: spawns the solver binary with a wall-clock timeout.
/// Availability of the binary is checked at spawn time, not construction,
/// so the adapter can be built in environments without the solver.
pub struct ProcessSolver {
    config: SolverConfig,
}

impl ProcessSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    fn spawn_and_wait(&self, working_dir: &Path) -> CalibResult<(String, String)> {
        let mut child = Command::new(&self.config.binary)
            .arg(working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CalibError::SolverRun {
                reason: format!("failed to launch {}: {e}", self.config.binary.display()),
                stdout: String::new(),
                stderr: String::new(),
            })?;

        // Drain both pipes on threads so a chatty solver cannot deadlock
        // against the exit poll below.
        let stdout_handle = drain(child.stdout.take());
        let stderr_handle = drain(child.stderr.take());

        let deadline = Instant::now() + self.config.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CalibError::SolverTimeout {
                    seconds: self.config.timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();

        if !stdout.contains(SUCCESS_MARKER) {
            return Err(CalibError::SolverRun {
                reason: format!("success marker not found on stdout (exit: {status})"),
                stdout,
                stderr,
            });
        }
        Ok((stdout, stderr))
    }
}

impl Solver for ProcessSolver {
    fn run(
        &self,
        tables: &TableSet,
        working_dir: &Path,
        report: &ValidationReport,
    ) -> CalibResult<SolverOutput> {
        write_inputs(tables, working_dir)?;
        let (_stdout, _stderr) = self.spawn_and_wait(working_dir)?;
        read_outputs(working_dir, report)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

/// Lay out `<working_dir>/input` and `<working_dir>/output` and serialize
/// every input table. `output` is recreated empty: a reused working dir
/// must not leak a previous run's outputs into this one.
pub fn write_inputs(tables: &TableSet, working_dir: &Path) -> CalibResult<()> {
    let input = working_dir.join("input");
    fs::create_dir_all(&input)?;
    let output = working_dir.join("output");
    if output.exists() {
        fs::remove_dir_all(&output)?;
    }
    fs::create_dir_all(&output)?;
    store::write_all(tables, &input)
}

/// Parse the five output tables and enforce the row-count contract: the
/// four (type, zone)-indexed outputs carry `n_zones * n_types` rows, `bh`
/// carries `n_agents`. A mismatch is the primary defense against consuming
/// a truncated solver run.
pub fn read_outputs(working_dir: &Path, report: &ValidationReport) -> CalibResult<SolverOutput> {
    let dir = working_dir.join("output");
    let per_estate = report.n_zones * report.n_types;

    let read = |name: &'static str, expected: usize| -> CalibResult<Table> {
        let table = csv::read_table(&dir.join(format!("{name}.csv")), name)?;
        if table.len() != expected {
            return Err(CalibError::SolverOutput {
                table: name,
                expected,
                actual: table.len(),
            });
        }
        Ok(table)
    };

    Ok(SolverOutput {
        bids: read("bids", per_estate)?,
        bh: read("bh", report.n_agents)?,
        location: read("location", per_estate)?,
        location_probability: read("location_probability", per_estate)?,
        rents: read("rents", per_estate)?,
    })
}
