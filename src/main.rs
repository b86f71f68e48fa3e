//! # cxmatrix CLI Entry Point
//!
//! `cxm <project.json>` loads both configs, runs every project against every
//! toolchain and exits 0 only if all of them passed.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use cxmatrix::config::{self, CompilersConfig};
use cxmatrix::interrupt;
use cxmatrix::matrix::{self, MatrixOptions};
use cxmatrix::orchestrator::{Supervisor, SupervisorOptions};
use cxmatrix::telemetry;
use cxmatrix::ui::{self, Severity};

#[derive(Parser, Debug)]
#[command(name = "cxm")]
#[command(about = "Build and test a project with every configured toolchain", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
struct Cli {
    /// Path to the project config file
    #[arg(value_name = "PATH", value_parser = existing_file)]
    project: PathBuf,

    /// Path to the compilers config file [default: bundled config.json]
    #[arg(long, value_name = "PATH", value_parser = existing_file)]
    config: Option<PathBuf>,

    /// Perform a clean build
    #[arg(long)]
    clean: bool,

    /// Replay the logs of passing toolchains too
    #[arg(short, long)]
    verbose: bool,

    /// Stop every toolchain as soon as one fails
    #[arg(long, alias = "fatal")]
    fail_fast: bool,

    /// Project root [default: current directory]
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,
}

fn existing_file(path: &str) -> std::result::Result<PathBuf, String> {
    let path = PathBuf::from(path);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("{} is not a file", path.display()))
    }
}

fn main() -> ExitCode {
    // Usage errors exit 1 like every other failure; --help/--version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    telemetry::init_tracing(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "x".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    interrupt::install_handler().context("Failed to install interrupt handler")?;

    let compilers = match &cli.config {
        Some(path) => CompilersConfig::load(path)?,
        None => CompilersConfig::bundled()?,
    };
    let projects = config::load_projects(&cli.project)?;

    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let options = MatrixOptions {
        root,
        clean: cli.clean,
    };
    let supervisor = Supervisor::new(SupervisorOptions {
        verbose: cli.verbose,
        fail_fast: cli.fail_fast,
        ..Default::default()
    });

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = matrix::run(&mut out, &supervisor, &compilers, &projects, &options)?;

    if report.interrupted() || interrupt::interrupted() {
        ui::print_line(&mut out, "Interrupted by user", Severity::Error)?;
        return Ok(false);
    }

    let summary = report.summary();
    if !summary.is_empty() {
        writeln!(out)?;
        summary.render(&mut out)?;
    }
    Ok(report.success())
}
