// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::{Parser, Subcommand};
use kinetis_config::{BoardConfig, Scenario};
use kinetis_core::board::Board;
use kinetis_core::scenario::{self, ScenarioReport};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Kinetis KE02Z peripheral simulator",
    long_about = None
)]
struct Cli {
    /// Log every register access
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario (YAML) against a board and report the outcome as JSON.
    Run(RunArgs),

    /// Print the memory map of a board.
    Describe(DescribeArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the board config (YAML). Falls back to the scenario's `board`
    /// entry, then to the built-in FRDM-KE02Z layout.
    #[arg(short, long)]
    board: Option<PathBuf>,

    /// Path to the scenario (YAML)
    #[arg(short, long)]
    scenario: PathBuf,

    /// Disable UART stdout echo (still captured for assertions/artifacts)
    #[arg(long)]
    no_uart_stdout: bool,

    /// Directory to write artifacts (result.json, snapshot.json, <uart>.log)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct DescribeArgs {
    /// Path to the board config (YAML)
    #[arg(short, long)]
    board: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the report and UART echo.
    let level = if cli.trace {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run_scenario(args),
        Commands::Describe(args) => describe(args),
    }
}

fn run_scenario(args: RunArgs) -> ExitCode {
    let scenario = match Scenario::from_file(&args.scenario) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let board_path = args.board.clone().or_else(|| {
        scenario
            .board
            .as_deref()
            .map(|b| resolve_relative(&args.scenario, b))
    });
    let mut config = match load_board(board_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if args.no_uart_stdout {
        for uart in &mut config.uarts {
            uart.echo_stdout = false;
        }
    }

    let mut board = match Board::from_config(&config) {
        Ok(b) => b,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    info!("Running scenario '{}' on '{}'", scenario.name, board.name);
    let report = match scenario::run(&mut board, &scenario) {
        Ok(r) => r,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Failed to serialize report: {}", e),
    }

    if let Some(dir) = &args.output_dir {
        if let Err(e) = write_outputs(dir, &report, &board) {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    }

    if report.passed() {
        info!("Scenario '{}' passed", report.name);
        ExitCode::from(EXIT_PASS)
    } else {
        for failure in &report.failures {
            error!("{}", failure);
        }
        for assertion in report.assertions.iter().filter(|a| !a.passed) {
            error!("Assertion failed: {}", assertion.description);
        }
        ExitCode::from(EXIT_ASSERT_FAIL)
    }
}

fn describe(args: DescribeArgs) -> ExitCode {
    let board = match load_board(args.board.as_deref()).and_then(|c| Board::from_config(&c)) {
        Ok(b) => b,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    println!("{}", board.name);
    for p in &board.bus().peripherals {
        let irq = p
            .irq
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<8} {:#010x}..{:#010x}  irq {}",
            p.name,
            p.base,
            p.base + p.size,
            irq
        );
    }
    ExitCode::from(EXIT_PASS)
}

fn load_board(path: Option<&Path>) -> anyhow::Result<BoardConfig> {
    match path {
        Some(path) => {
            info!("Loading board config: {:?}", path);
            BoardConfig::from_file(path)
        }
        None => Ok(BoardConfig::default()),
    }
}

fn resolve_relative(scenario_path: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        return path;
    }
    scenario_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(path)
}

fn write_outputs(dir: &Path, report: &ScenarioReport, board: &Board) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let result =
        std::fs::File::create(dir.join("result.json")).context("Failed to create result.json")?;
    serde_json::to_writer_pretty(result, report).context("Failed to write result.json")?;

    let snapshot = std::fs::File::create(dir.join("snapshot.json"))
        .context("Failed to create snapshot.json")?;
    serde_json::to_writer_pretty(snapshot, &board.snapshot())
        .context("Failed to write snapshot.json")?;

    for id in board.uart_ids() {
        let bytes = board.uart_output(id).unwrap_or_default();
        let path = dir.join(format!("{}.log", id));
        std::fs::write(&path, bytes).with_context(|| format!("Failed to write {:?}", path))?;
    }
    Ok(())
}
