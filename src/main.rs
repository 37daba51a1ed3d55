//! lsmtrace CLI
//!
//! Command-line interface for reconstruction runs:
//! - Extract all artifacts from a log directory
//! - Print the best end-of-run stats line
//! - Generate a default config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use lsmtrace::config::{generate_default_config, Config, LoggingConfig};
use lsmtrace::{Pipeline, PipelineConfig, RunReport, SummaryReport};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "lsmtrace")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rebuild LSM flush/merge history from engine logs")]
#[command(long_about = "lsmtrace reads the logs an LSM storage engine wrote during a benchmark run\nand reconstructs its flush and merge history and per-generation tree metrics.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/lsmtrace/config.toml, then ./lsmtrace.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconstruct and write every artifact
    Extract {
        /// Directory holding the engine logs
        #[arg(short, long)]
        log_dir: Option<PathBuf>,
        /// File name glob (e.g. "nc-*.log*")
        #[arg(short, long)]
        pattern: Option<String>,
        /// Dataset name printed after each tag
        #[arg(short, long)]
        dataset: Option<String>,
        /// Output directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Artifact name prefix
        #[arg(short, long)]
        task: Option<String>,
    },

    /// Print the best end-of-run stats line
    Summary {
        /// Directory holding the engine logs
        #[arg(short, long)]
        log_dir: Option<PathBuf>,
        /// File name glob
        #[arg(short, long)]
        pattern: Option<String>,
        /// Dataset name printed after each tag
        #[arg(short, long)]
        dataset: Option<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Config { output } = &cli.command {
        let config = generate_default_config();
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &config)
                    .with_context(|| format!("writing config to {:?}", path))?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", config),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Extract {
            log_dir,
            pattern,
            dataset,
            out_dir,
            task,
        } => {
            apply_source_args(&mut config, log_dir, pattern, dataset);
            if let Some(dir) = out_dir {
                config.output.dir = dir;
            }
            if let Some(task) = task {
                config.output.task_name = task;
            }

            let pipeline = Pipeline::new(PipelineConfig::from_config(&config));
            let report = pipeline.run().await.context("reconstruction failed")?;

            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&report)?),
                _ => print_run_report(&report),
            }

            if report.artifacts_ok() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(2))
            }
        }

        Commands::Summary {
            log_dir,
            pattern,
            dataset,
        } => {
            apply_source_args(&mut config, log_dir, pattern, dataset);

            let pipeline = Pipeline::new(PipelineConfig::from_config(&config));
            let report = pipeline.summarize().await.context("summary failed")?;

            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&report)?),
                _ => print_summary_report(&report),
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn apply_source_args(
    config: &mut Config,
    log_dir: Option<PathBuf>,
    pattern: Option<String>,
    dataset: Option<String>,
) {
    if let Some(dir) = log_dir {
        config.source.log_dir = dir;
    }
    if let Some(pattern) = pattern {
        config.source.pattern = pattern;
    }
    if dataset.is_some() {
        config.source.dataset = dataset;
    }
}

/// Logs go to stderr (or the configured file); stdout carries the report
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let writer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let ansi = logging.file.is_none();

    let (pretty, json) = match logging.format.as_str() {
        "json" => (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_writer(writer)),
        ),
        _ => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(ansi)
                    .with_writer(writer),
            ),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
    Ok(())
}

fn print_run_report(report: &RunReport) {
    println!("lsmtrace v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Task:            {}", report.task_name);
    println!("Started:         {}", report.started_at.format("%Y-%m-%dT%H:%M:%SZ"));
    println!("Elapsed:         {} ms", report.elapsed_ms);
    println!();
    println!("Files scanned:   {}", report.files_scanned);
    println!("Lines read:      {}", report.lines_read);
    println!("Lines captured:  {}", report.lines_captured);
    println!("Malformed lines: {}", report.malformed_lines);
    if report.out_of_range_events > 0 {
        println!("  out of range:  {}", report.out_of_range_events);
    }
    println!(
        "Events:          {} flush, {} merge, {} components",
        report.events.flush, report.events.merge, report.events.components
    );
    println!("Generations:     {}", report.generations);
    if report.spilled_runs > 0 {
        println!("Spilled runs:    {}", report.spilled_runs);
    }

    if !report.failures.is_empty() {
        println!();
        println!("Skipped files:");
        for failure in &report.failures {
            println!("  {:?}: {}", failure.path, failure.error);
        }
    }

    println!();
    println!("{:<12} {:<8} {:>8}  {}", "Artifact", "Status", "Rows", "Path");
    println!("{}", "-".repeat(60));
    for artifact in &report.artifacts {
        let status = if artifact.is_ok() { "ok" } else { "FAILED" };
        println!(
            "{:<12} {:<8} {:>8}  {}",
            artifact.kind.to_string(),
            status,
            artifact.rows,
            artifact.path.display()
        );
        if let Some(error) = &artifact.error {
            println!("  {}", error);
        }
    }
}

fn print_summary_report(report: &SummaryReport) {
    match &report.summary {
        Some(stats) => println!("{}", stats),
        None => println!("No stats line found in {} files", report.files_scanned),
    }

    for failure in &report.failures {
        eprintln!("Skipped {:?}: {}", failure.path, failure.error);
    }
}
