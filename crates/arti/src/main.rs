//! A minimal command-line client for connecting to the Tor network.
//!
//! Runs as a local SOCKS5 proxy: `arti proxy` loads a [`TorClientConfig`],
//! bootstraps a [`TorClient`], and serves SOCKS5 on the configured (or
//! overridden) port until interrupted.
//!
//! Grounded on the teacher's `arti/src/main.rs` (`App`/subcommand parsing,
//! `trace::setup_logging`, the `proxy` subcommand's run loop), reduced to
//! `clap`'s derive API and a single `proxy` subcommand, since bridges,
//! pluggable transports, onion services, and config-file hot-reload are all
//! out of scope here.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cfg;

use std::process::ExitCode;

use arti_client::{TorClient, TorClientConfig};
use clap::Parser;
use tracing::{info, warn};

use cfg::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cfg::load_config(&cli) {
        Ok(config) => {
            let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("arti: failed to start the async runtime: {e}");
                    return ExitCode::FAILURE;
                }
            };
            match runtime.block_on(run(config)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("arti: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("arti: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Install a `tracing-subscriber` formatting layer, honoring `RUST_LOG` and
/// an optional `--log-level` override.
fn init_logging(cli_level: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = cli_level
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Bootstrap a [`TorClient`] from `config`, serve SOCKS5 on it, and run
/// until interrupted.
async fn run(config: TorClientConfig) -> anyhow::Result<()> {
    let client = TorClient::create_unbootstrapped(config)?;

    client.bootstrap().await?;
    info!("bootstrap complete; SOCKS proxy is now functional");

    let addr = arti_client::serve_socks(client.clone()).await?;
    info!(%addr, "SOCKS5 proxy listening");

    tokio::signal::ctrl_c().await?;
    warn!("received interrupt, shutting down");
    client.shutdown().await;

    Ok(())
}
