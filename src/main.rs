//! wax_relay - relay daemon
//!
//! ```text
//! ┌──────────┐    ┌────────────────┐    ┌───────────────────────┐
//! │  Config  │───▶│ Signer scripts │───▶│ one task per account  │
//! │  (YAML)  │    │  (read once)   │    │ ScanController loop   │
//! └──────────┘    └────────────────┘    └───────────────────────┘
//! ```
//!
//! Exit codes: 0 after `--once` or Ctrl-C, 1 when any account stopped,
//! 2 when configuration or startup failed.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};

use wax_relay::config::{AccountConfig, AppConfig};
use wax_relay::logging::init_logging;
use wax_relay::relay::{
    self, HttpChainClient, LoopExit, QueryRetry, ScanController, ScanSettings, SignerScripts,
    WebDriverBridge,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config/dev.yaml")]
    config: String,

    /// Run a single cycle per account and exit
    #[arg(long)]
    once: bool,

    /// Only run this configured source account
    #[arg(short, long)]
    account: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", cli.config, e);
            return ExitCode::from(2);
        }
    };
    let _log_guard = init_logging(&config);
    info!(config = %cli.config, once = cli.once, "wax_relay starting");

    let controllers = match build_controllers(&config, &cli) {
        Ok(controllers) => controllers,
        Err(e) => {
            error!(error = ?e, "Startup failed");
            return ExitCode::from(2);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loops = JoinSet::new();
    for (account, controller) in controllers {
        let span = info_span!("account", account = %account);
        loops.spawn(controller.run_forever(shutdown_rx.clone()).instrument(span));
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stopped = false;
    let mut listen_ctrl_c = true;
    loop {
        tokio::select! {
            joined = loops.join_next() => match joined {
                None => break,
                Some(Ok(LoopExit::Stopped)) => stopped = true,
                Some(Ok(exit)) => info!(?exit, "Account loop finished"),
                Some(Err(e)) => {
                    error!(error = %e, "Account loop aborted");
                    stopped = true;
                }
            },
            signal = &mut ctrl_c, if listen_ctrl_c => {
                listen_ctrl_c = false;
                match signal {
                    Ok(()) => {
                        info!("Ctrl-C received, stopping at the next wait");
                        let _ = shutdown_tx.send(true);
                    }
                    Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
                }
            }
        }
    }

    if stopped {
        error!("At least one account stopped. Check the logs and restart manually");
        ExitCode::from(1)
    } else {
        info!("wax_relay finished");
        ExitCode::SUCCESS
    }
}

fn build_controllers(config: &AppConfig, cli: &Cli) -> Result<Vec<(String, ScanController)>> {
    let scripts = relay::scripts::init(
        Path::new(&config.scripts.signer_library),
        Path::new(&config.scripts.glue),
    )
    .context("Failed to load signer scripts")?;

    let accounts = config
        .select_accounts(cli.account.as_deref())
        .context("Failed to select accounts")?;

    accounts
        .iter()
        .map(|account| {
            build_controller(account, scripts, cli.once)
                .with_context(|| format!("Failed to set up account {}", account.account))
        })
        .collect()
}

fn build_controller(
    account: &AccountConfig,
    scripts: &'static SignerScripts,
    once: bool,
) -> Result<(String, ScanController)> {
    let retry = QueryRetry {
        attempts: account.request_retries,
        interval: account.request_interval(),
    };
    let chain = HttpChainClient::new(
        &account.rpc_domain,
        &account.assets_domain,
        account.http_timeout(),
        retry,
    )?;
    let bridge = WebDriverBridge::new(
        &account.webdriver.url,
        &account.webdriver.session_id,
        &account.rpc_domain,
        scripts,
        account.webdriver.script_timeout(),
    )?;

    let settings = ScanSettings::from_config(account, once);
    Ok((
        account.account.clone(),
        ScanController::new(settings, Arc::new(chain), Arc::new(bridge)),
    ))
}
