//! CLI command definitions for redis-key-analysis.
//!
//! `run` performs a full analysis across the configured instances and posts
//! the summary. `export` converts a saved analysis response into CSV files
//! without contacting any remote service.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{
    decode_analysis_result, AliyunClient, AliyunConfig, GitLabConfig, GitLabPublisher, Publisher,
    RemoteJobService,
};
use crate::export::{export_records, ResultKind};
use crate::pipeline::{AppConfig, Orchestrator, OrchestratorConfig, DEFAULT_CONFIG_PATH};

/// Default output directory for `export`.
const DEFAULT_EXPORT_DIR: &str = "/tmp";

/// Offline Redis key analysis.
#[derive(Parser)]
#[command(name = "redis-key-analysis")]
#[command(about = "Run Aliyun cache analysis jobs for Redis instances and publish the results")]
#[command(version)]
#[command(
    long_about = "redis-key-analysis drives DAS cache analysis jobs for each configured Redis instance, exports the top-prefix and top-bigmem tables as CSV files, uploads them to GitLab and posts a summary comment.\n\nExample usage:\n  redis-key-analysis run --config config/config.yaml --timeout-secs 7200"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Analyze all configured instances and post the summary.
    Run(RunArgs),

    /// Convert a saved DescribeCacheAnalysisJob response into CSV files.
    Export(ExportArgs),
}

/// Arguments for `redis-key-analysis run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "REDIS_ANALYSIS_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Cancel jobs still pending after this many seconds. The summary is still posted.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Arguments for `redis-key-analysis export`.
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// JSON file holding a DescribeCacheAnalysisJob response or its `Data` object.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Base file name of the exports, usually the instance id.
    #[arg(short = 'n', long)]
    pub name: String,

    /// Output directory for the CSV files.
    #[arg(short, long, default_value = DEFAULT_EXPORT_DIR)]
    pub output: PathBuf,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_analysis_command(args).await,
        Commands::Export(args) => run_export_command(args),
    }
}

// ============================================================================
// Run
// ============================================================================

async fn run_analysis_command(args: RunArgs) -> anyhow::Result<()> {
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    let jobs: Arc<dyn RemoteJobService> = Arc::new(AliyunClient::new(
        AliyunConfig::new(&config.ali_access_key, &config.ali_access_secret)
            .with_das_endpoint(&config.ali_das_endpoint)
            .with_kvstore_endpoint(&config.ali_kvstore_endpoint),
    )?);
    let publisher: Arc<dyn Publisher> = Arc::new(GitLabPublisher::new(GitLabConfig::new(
        &config.gitlab_url,
        &config.gitlab_access_token,
        config.gitlab_project_id,
        config.gitlab_issue_iid,
    ))?);

    let orchestrator = Orchestrator::new(jobs, publisher, OrchestratorConfig::from(&config));

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_shutdown(
        cancel.clone(),
        args.timeout_secs.map(Duration::from_secs),
    ));

    let result = orchestrator.run(&config.redis_instances, cancel.clone()).await;
    cancel.cancel();
    watcher.abort();

    let summary = result?;
    println!(
        "Analysis finished: {}/{} instances published ({:.0}%)",
        summary.succeeded.len(),
        summary.total(),
        summary.success_rate() * 100.0
    );
    if !summary.failed.is_empty() {
        println!("Failed instances: {}", summary.failed.join(", "));
    }
    Ok(())
}

/// Cancels `cancel` on Ctrl+C or once `timeout` elapses.
async fn cancel_on_shutdown(cancel: CancellationToken, timeout: Option<Duration>) {
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = interrupted => warn!("Interrupt received, cancelling pending analysis jobs"),
        _ = deadline => warn!("Run timeout reached, cancelling pending analysis jobs"),
    }

    cancel.cancel();
}

// ============================================================================
// Export
// ============================================================================

fn run_export_command(args: ExportArgs) -> anyhow::Result<()> {
    let paths = export_saved_response(&args.input, &args.name, &args.output)?;
    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}

/// Exports both tables of a saved analysis response.
fn export_saved_response(input: &Path, name: &str, output: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let response: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", input.display()))?;

    let data = response.get("Data").unwrap_or(&response);
    let result = decode_analysis_result(data)?;

    let mut paths = Vec::new();
    for kind in ResultKind::ALL {
        let path = export_records(result.records(kind), kind.schema().name, output, name)?;
        info!(kind = %kind, file = %path.display(), "Exported result table");
        paths.push(path);
    }
    Ok(paths)
}
