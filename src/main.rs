//! redis-key-analysis CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = redis_key_analysis::cli::parse_cli();
    init_tracing(&cli.log_level);

    redis_key_analysis::cli::run_with_cli(cli).await
}

/// Priority: RUST_LOG > --log-level > "info". An unparsable level falls back to "info".
fn init_tracing(cli_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(cli_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
