//! Spoke Backup Orchestrator
//!
//! Hub-side command that backs up a list of managed spoke clusters in one run
//! and prints one status line per spoke.
//!
//! ```text
//! spoke-backup-orchestrator --spokes sno-1,sno-2 --backup-path /var/recovery
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spoke_backup_orchestrator::{
    connect, Error, KubeControlPlane, ManagedClusterRegistry, Orchestrator, OrchestratorConfig,
    Result, RunMetrics, Spoke, SpokeJobController, StatusReport, TemplateCatalog,
};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Spoke Backup Orchestrator - trigger and watch backups on managed clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma separated spoke cluster names
    #[arg(long, env = "SPOKES")]
    spokes: String,

    /// Hub kubeconfig file; otherwise inferred like kubectl does (KUBECONFIG, in-cluster)
    #[arg(long, env = "HUB_KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, env = "BACKUP_CONFIG")]
    config: Option<PathBuf>,

    /// Recovery partition path on the spoke
    #[arg(long, env = "BACKUP_PATH")]
    backup_path: Option<String>,

    /// Backup container image
    #[arg(long, env = "BACKUP_IMAGE")]
    image: Option<String>,

    /// Seconds between view reads
    #[arg(long, env = "POLL_INTERVAL")]
    poll_interval_secs: Option<u64>,

    /// Seconds to wait for the job to launch
    #[arg(long, env = "LAUNCH_TIMEOUT")]
    launch_timeout_secs: Option<u64>,

    /// Seconds to wait for the job to complete
    #[arg(long, env = "COMPLETION_TIMEOUT")]
    completion_timeout_secs: Option<u64>,

    /// Maximum spokes processed at once
    #[arg(long, env = "MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Report format
    #[arg(long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Exit non-zero when any spoke did not finish its backup
    #[arg(long, env = "FAIL_ON_SPOKE_ERROR")]
    fail_on_spoke_error: bool,

    /// Write run metrics in Prometheus text format to this file
    #[arg(long, env = "METRICS_FILE")]
    metrics_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args);

    match run(&args).await {
        Ok(report) => {
            if args.fail_on_spoke_error && !report.all_done() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %e, "Backup run aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<StatusReport> {
    let config = Arc::new(load_config(args)?);
    let spokes = Spoke::parse_list(&args.spokes);
    if spokes.is_empty() {
        return Err(Error::Configuration("no spoke clusters given".into()));
    }

    info!("Starting Spoke Backup Orchestrator");
    info!("  Version: {}", spoke_backup_orchestrator::VERSION);
    info!("  Spokes: {}", spokes.len());
    info!("  Image: {}", config.image);
    info!("  Recovery path: {}", config.recovery_path);

    let client = connect(args.kubeconfig.as_deref()).await?;
    let control_plane = Arc::new(KubeControlPlane::new(client, config.discovery_retry));
    let registry = Arc::new(ManagedClusterRegistry::new(control_plane.clone()));
    let metrics = RunMetrics::new()?;

    let controller = SpokeJobController::from_parts(
        config.clone(),
        control_plane,
        registry,
        Arc::new(TemplateCatalog::builtin()),
    )
    .with_metrics(metrics.clone());
    let orchestrator = Orchestrator::new(controller).with_metrics(metrics.clone());

    let report = orchestrator.run_all(&spokes).await;
    info!(
        view_polls = metrics.view_polls(),
        rollbacks = metrics.rollbacks(),
        "Control plane activity"
    );

    match args.output {
        OutputFormat::Table => print!("{}", report.render_table()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if let Some(path) = &args.metrics_file {
        if let Err(e) = metrics.write_to(path) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics file");
        }
    }

    Ok(report)
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> Result<OrchestratorConfig> {
    let mut config = match &args.config {
        Some(path) => OrchestratorConfig::from_file(path)?,
        None => OrchestratorConfig::default(),
    };

    if let Some(path) = &args.backup_path {
        config.recovery_path = path.clone();
    }
    if let Some(image) = &args.image {
        config.image = image.clone();
    }
    if let Some(secs) = args.poll_interval_secs {
        config.poll_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = args.launch_timeout_secs {
        config.launch_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.completion_timeout_secs {
        config.completion_timeout = Duration::from_secs(secs);
    }
    if args.max_concurrency.is_some() {
        config.max_concurrency = args.max_concurrency;
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // logs go to stderr so the report on stdout stays machine readable
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
