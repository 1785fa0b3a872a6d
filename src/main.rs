//! action-lock-replay - Correction engine trace replayer
//!
//! Entry point for the replay binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use action_lock_engine::config::Config;
use action_lock_engine::database::{LockDatabase, LockEntry};
use action_lock_engine::engine::CorrectionEngine;
use action_lock_engine::replay::{load_trace, Replayer};

/// Command-line arguments for action-lock-replay
#[derive(Parser, Debug)]
#[command(name = "action-lock-replay")]
#[command(version, about = "Replay a lock trace through the correction engine", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "ACTION_LOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Trace file (JSON array of events)
    #[arg(short, long)]
    trace: PathBuf,

    /// Compute corrections without writing them to the host
    #[arg(long)]
    dry_run: bool,

    /// Load a lock database export before replaying
    #[arg(long)]
    import_db: Option<PathBuf>,

    /// Write the lock database export after replaying
    #[arg(long)]
    export_db: Option<PathBuf>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    log_format: String,

    /// Write logs to file (in addition to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Config first: its logging level is the fallback when -v is absent
    let (config, load_error) = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default_config(), Some(e)),
        },
        None => (Config::default_config(), None),
    };
    let config = config.with_overrides(args.dry_run);

    init_logging(&args, &config.logging.level)?;

    info!("════════════════════════════════════════════════════════");
    info!("  action-lock-replay v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {}", env!("BUILD_DATE"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    if let Some(e) = load_error {
        warn!("Failed to load config: {:#}, using defaults", e);
    }
    tracing::debug!("Config: {:?}", config);

    if let Err(e) = run(&args, &config) {
        eprintln!("{}", action_lock_engine::utils::format_user_error(&e));
        return Err(e);
    }
    Ok(())
}

fn run(args: &Args, config: &Config) -> Result<()> {
    let mut engine = CorrectionEngine::new(config.engine_config());
    if let Some(path) = &args.import_db {
        let imported = import_database(&mut engine, path)?;
        info!("Imported {} lock entries from {}", imported, path.display());
    }

    let trace = load_trace(&args.trace)?;
    info!("Loaded {} trace events from {}", trace.len(), args.trace.display());

    let mut replayer = Replayer::new(engine);
    let report = replayer.run(&trace);

    if let Some(path) = &args.export_db {
        export_database(replayer.engine().database(), path)?;
        info!("Exported {} lock entries to {}", report.database.len(), path.display());
    }

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize replay report")?;
    println!("{}", json);
    Ok(())
}

fn import_database(engine: &mut CorrectionEngine, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lock database: {}", path.display()))?;
    let entries: BTreeMap<String, LockEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse lock database: {}", path.display()))?;
    engine
        .import_database(&entries)
        .with_context(|| format!("Failed to import lock database: {}", path.display()))
}

fn export_database(database: &LockDatabase, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&database.export())
        .context("Failed to serialize lock database")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write lock database: {}", path.display()))
}

fn init_logging(args: &Args, config_level: &str) -> Result<()> {
    use std::fs::File;

    let log_level = match args.verbose {
        0 => config_level,
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "action_lock_engine={level},action_lock_replay={level},warn",
            level = log_level
        ))
    });

    // The report goes to stdout, so logs always go to stderr
    if let Some(log_file_path) = &args.log_file {
        let file = File::create(log_file_path).with_context(|| {
            format!("Failed to create log file: {}", log_file_path.display())
        })?;

        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(std::io::stderr),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(std::io::stderr),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_writer(std::io::stderr),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
        }
        info!("Logging to file: {}", log_file_path.display());
    } else {
        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(std::io::stderr),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_writer(std::io::stderr),
                    )
                    .init();
            }
        }
    }

    Ok(())
}
