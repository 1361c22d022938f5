//! landcal-runner: headless fixed-supply calibration runner.
//!
//! Usage:
//!   landcal-runner --data ./model --solver /usr/bin/mu-land
//!   landcal-runner --data ./model --solver ./mu-land --out ./results \
//!                  --tolerance 0.5 --max-iters 20 --no-balance

use anyhow::Result;
use landcal_core::{
    config::CalibrationSettings,
    engine::{CalibrationEngine, CalibrationStatus},
    solver::{ProcessSolver, SolverConfig},
    store::TableSet,
    validate::validate,
};
use serde::Serialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct RunArtifact<'a> {
    run_id: &'a str,
    status: CalibrationStatus,
    iterations_run: u32,
    history: &'a [landcal_core::engine::IterationRecord],
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = required_arg(&args, "--data")?;
    let solver_binary = required_arg(&args, "--solver")?;
    let work_dir = string_arg(&args, "--work", "./work");
    let out_dir = string_arg(&args, "--out", "./results");

    let mut settings = match args
        .windows(2)
        .find(|w| w[0] == "--settings")
        .map(|w| w[1].as_str())
    {
        Some(path) => CalibrationSettings::load(Path::new(path))?,
        None => CalibrationSettings::default(),
    };
    settings.tolerance = parse_arg(&args, "--tolerance", settings.tolerance);
    settings.max_iterations = parse_arg(&args, "--max-iters", settings.max_iterations);
    settings.min_rmse = parse_arg(&args, "--min-rmse", settings.min_rmse);
    settings.solver_timeout_secs =
        parse_arg(&args, "--timeout-secs", settings.solver_timeout_secs);
    if args.iter().any(|a| a == "--no-balance") {
        settings.balance = false;
    }
    if args.iter().any(|a| a == "--reset-adjustments") {
        settings.reset_adjustments = true;
    }

    println!("landcal fixed-supply calibration runner");
    println!("  data:      {data_dir}");
    println!("  solver:    {solver_binary}");
    println!("  work:      {work_dir}");
    println!("  out:       {out_dir}");
    println!(
        "  settings:  tolerance {}%, max {} iterations, min RMSE {}, balance {}",
        settings.tolerance, settings.max_iterations, settings.min_rmse, settings.balance
    );
    println!();

    let tables = TableSet::from_dir(&data_dir)?.fill_structure()?;
    let report = validate(&tables)?;
    println!(
        "model: {} zones, {} real-estate types, {} markets, {} agent types",
        report.n_zones, report.n_types, report.n_markets, report.n_agents
    );

    let run_id = format!("cal-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S"));
    let work_root = PathBuf::from(&work_dir).join(&run_id);
    fs::create_dir_all(&work_root)?;
    log::info!("run {run_id}: working under {}", work_root.display());

    let solver = ProcessSolver::new(SolverConfig {
        binary: PathBuf::from(&solver_binary),
        timeout: settings.solver_timeout(),
    });
    let engine = CalibrationEngine::new(Box::new(solver), &work_root, settings);
    let result = engine.calibrate(tables)?;

    println!();
    match result.status {
        CalibrationStatus::Converged => {
            println!("converged after {} iterations", result.iterations_run)
        }
        CalibrationStatus::Diverged => println!(
            "DIVERGED after {} iterations, inspect history.json",
            result.iterations_run
        ),
        CalibrationStatus::MaxIterationsReached => println!(
            "iteration cap reached ({} iterations) without convergence",
            result.iterations_run
        ),
    }
    if let Some(last) = result.history.last() {
        println!(
            "last iteration: max abs diff = {:.2}%, RMSE = {}",
            last.max_abs_pct_diff,
            last.rmse
                .map(|r| format!("{r:.4}"))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }

    // Artifacts: final adjustments, adjusted bh, last solver tables, history.
    let out = PathBuf::from(&out_dir).join(&run_id);
    fs::create_dir_all(&out)?;
    landcal_core::csv::write_table(
        &out.join("bids_adjustments.csv"),
        &result.tables.bids_adjustments,
    )?;
    landcal_core::csv::write_table(&out.join("bh.csv"), &result.output.bh)?;
    landcal_core::csv::write_table(&out.join("location.csv"), &result.output.location)?;
    landcal_core::csv::write_table(&out.join("rents.csv"), &result.output.rents)?;
    let artifact = RunArtifact {
        run_id: &run_id,
        status: result.status,
        iterations_run: result.iterations_run,
        history: &result.history,
    };
    fs::write(
        out.join("history.json"),
        serde_json::to_string_pretty(&artifact)?,
    )?;
    println!("artifacts written to {}", out.display());

    Ok(())
}

fn required_arg(args: &[String], flag: &str) -> Result<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .ok_or_else(|| anyhow::anyhow!("missing required argument: {flag} <value>"))
}

fn string_arg(args: &[String], flag: &str, default: &str) -> String {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .unwrap_or_else(|| default.to_string())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
