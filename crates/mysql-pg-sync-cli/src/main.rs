//! mysql-pg-sync CLI - recurring MySQL to PostgreSQL row sync.

use clap::{Parser, Subcommand};
use mysql_pg_sync::{Config, Orchestrator, SyncError, SyncRunResult};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-pg-sync")]
#[command(about = "Recurring MySQL to PostgreSQL row sync")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured table jobs
    Run {
        /// Run only the named table job
        #[arg(long)]
        table: Option<String>,
    },

    /// Check the configuration file without connecting
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run { table } => {
            if let Some(name) = table {
                config.select_table(&name)?;
            }

            let cancel_token = setup_signal_handler();
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.run(cancel_token).await;
            orchestrator.close().await;

            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    // jobs that finished before the abort are still reported
                    if let SyncError::Aborted { partial, .. } = &e {
                        report(partial, cli.output_json)?;
                    }
                    return Err(e);
                }
            };
            report(&result, cli.output_json)?;
            result.outcome()?;
        }

        Commands::Validate => {
            if cli.output_json {
                let jobs: Vec<serde_json::Value> = config
                    .tables
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "target_table": t.target(&config.target.schema).display_name(),
                            "batch_size": t.batch_size.unwrap_or(config.sync.batch_size),
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "valid": true,
                        "jobs": jobs,
                    }))?
                );
            } else {
                println!("Configuration is valid");
                println!("  Table jobs: {}", config.tables.len());
                for table in &config.tables {
                    println!(
                        "    {} -> {}",
                        table.name,
                        table.target(&config.target.schema).display_name()
                    );
                }
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MySQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(SyncError::pool("one or more databases unreachable", "health check"));
            }
        }
    }

    Ok(())
}

fn report(result: &SyncRunResult, json: bool) -> Result<(), SyncError> {
    if json {
        println!("{}", result.to_json()?);
    } else {
        print_run_result(result);
    }
    Ok(())
}

fn print_run_result(result: &SyncRunResult) {
    println!("\n{}", render_run_result(result).join("\n"));
}

/// Text report: run totals, one line per finished job, then failures.
fn render_run_result(result: &SyncRunResult) -> Vec<String> {
    let mut lines = vec![
        format!("Sync {}!", result.status),
        format!("  Run ID: {}", result.run_id),
        format!("  Duration: {:.2}s", result.duration_seconds),
        format!("  Jobs: {}/{}", result.jobs.len(), result.jobs_total),
        format!(
            "  Rows: read {}, accepted {}, skipped {}, rejected {}",
            result.rows_read, result.rows_accepted, result.rows_skipped, result.rows_rejected
        ),
    ];
    lines.extend(result.jobs.iter().map(|job| format!("  {}", job.report_line())));
    lines.extend(
        result
            .failures
            .iter()
            .map(|f| format!("  Failed: {}: {}", f.name, f.error)),
    );
    lines
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
///
/// The job in flight finishes; no new job starts afterwards.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Finishing the current job, then stopping...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Could not install {} handler: {}", name, e),
        }
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing the current job, then stopping...");
            token.cancel();
        }
    });

    cancel_token
}
