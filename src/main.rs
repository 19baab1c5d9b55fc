use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrome_debug_adapter::ChromeDebugAdapter;
use chrome_debug_bridge::{load_config, serve, Logging};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level, overriding the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = CliArgs::parse();
    // one logical flow of control: every session task runs on this thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: CliArgs) -> Result<()> {
    let loaded = load_config(cli.config.as_deref()).await?;
    let mut config = loaded.config.clone();
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if cli.debug {
        config.log_level = "debug".to_string();
    }
    if cli.log_file.is_some() {
        config.log_file = cli.log_file;
    }

    let logging = Logging::install(&config.log_level, config.log_file.as_deref())?;
    info!(target: "dap-server", "Starting chrome-debug-bridge v{}", env!("CARGO_PKG_VERSION"));
    loaded.report();

    let adapter = ChromeDebugAdapter::new(config.adapter_config());
    adapter.set_diagnostic_hook(logging.diagnostic_hook());

    match serve(tokio::io::stdin(), tokio::io::stdout(), Arc::new(adapter)).await {
        Ok(()) => {
            info!(target: "dap-server", "Session ended");
            Ok(())
        }
        Err(err) => {
            error!(target: "dap-server", %err, "Session failed");
            Err(err.into())
        }
    }
}
