//! chainsync: follow an Ethereum-style node block by block from a persisted cursor.
//!
//! Usage:
//!
//!   chainsync --rpc-url http://127.0.0.1:8545 --cursor-file ./cursor.json --stop-height 120
//!
//! Exit codes: 0 on reaching the stop height, 1 on a fatal sync error, 2 on invalid
//! configuration (including a stop height behind the chain head), 130 on interrupt. Logs go
//! to stderr (`RUST_LOG` overrides the default `chainsync=info`).

use anyhow::Context;
use chainsync::{
    ConfigError, CursorStore, FileCursorStore, FilterChain, FilterContext, FnFilter,
    JsonRpcSource, MemoryCursorStore, SyncConfig, SyncDriver, SyncError, Termination,
    Transaction,
};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// HTTP JSON-RPC endpoint of the node.
    #[arg(long)]
    rpc_url: String,

    /// Cursor file. Without it the cursor lives in memory and restarts begin again.
    #[arg(long)]
    cursor_file: Option<PathBuf>,

    /// JSON file with a SyncConfig; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    start_height: Option<u64>,

    #[arg(long)]
    stop_height: Option<u64>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Print one JSON line per transaction to stdout.
    #[arg(long)]
    print: bool,
}

const EXIT_OK: u8 = 0;
const EXIT_FATAL: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// How the driver thread ended, as seen from `main`.
#[derive(Debug)]
enum Outcome {
    Finished(anyhow::Result<Termination>),
    /// The driver thread went away without sending a result (it panicked).
    Lost,
    Interrupted,
}

#[derive(Serialize)]
struct TransactionLine<'a> {
    block: u64,
    index: u64,
    hash: &'a str,
}

fn load_config(args: &Args) -> Result<SyncConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::from_json_file(path)?,
        None => SyncConfig::default(),
    };
    if args.start_height.is_some() {
        config.start_height = args.start_height;
    }
    if args.stop_height.is_some() {
        config.stop_height = args.stop_height;
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

fn build_chain(print: bool) -> FilterChain {
    let mut chain = FilterChain::new().with_filter(FnFilter::new(
        "log",
        |tx: &Transaction, ctx: &FilterContext<'_>| {
            tracing::debug!(
                height = ctx.block_height,
                index = tx.index,
                hash = %hex::encode(&tx.payload),
                "transaction"
            );
            Ok(())
        },
    ));
    if print {
        chain.add_filter(FnFilter::new(
            "print",
            |tx: &Transaction, ctx: &FilterContext<'_>| {
                let hash = format!("0x{}", hex::encode(&tx.payload));
                let line = serde_json::to_string(&TransactionLine {
                    block: ctx.block_height,
                    index: tx.index,
                    hash: &hash,
                })?;
                println!("{}", line);
                Ok(())
            },
        ));
    }
    chain
}

fn run_driver(config: SyncConfig, args: &Args) -> anyhow::Result<Termination> {
    let source = JsonRpcSource::new(args.rpc_url.clone()).context("build RPC client")?;
    let store: Box<dyn CursorStore> = match &args.cursor_file {
        Some(path) => Box::new(FileCursorStore::new(path)),
        None => Box::new(MemoryCursorStore::new()),
    };
    let mut driver = SyncDriver::new(config, source, store, build_chain(args.print))?;
    let termination = driver.run()?;
    Ok(termination)
}

/// Log the outcome and map it to the process exit status.
fn report(outcome: Outcome) -> u8 {
    match outcome {
        Outcome::Finished(Ok(termination)) => {
            eprintln!("{}", termination);
            EXIT_OK
        }
        Outcome::Finished(Err(e)) => {
            tracing::error!(reason = %format!("{:#}", e), "sync failed");
            match e.downcast_ref::<SyncError>() {
                Some(SyncError::Config(_)) => EXIT_CONFIG,
                _ => EXIT_FATAL,
            }
        }
        Outcome::Lost => {
            tracing::error!("sync thread exited without a result");
            EXIT_FATAL
        }
        Outcome::Interrupted => {
            tracing::warn!("interrupted");
            EXIT_INTERRUPTED
        }
    }
}

fn main() -> ExitCode {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chainsync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    // The sync loop blocks; run it on its own thread and wait for it or for Ctrl-C.
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let driver_args = args.clone();
    std::thread::spawn(move || {
        let _ = done_tx.send(run_driver(config, &driver_args));
    });

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("start runtime: {}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };
    let outcome = rt.block_on(async {
        tokio::select! {
            res = done_rx => match res {
                Ok(result) => Outcome::Finished(result),
                Err(_) => Outcome::Lost,
            },
            _ = tokio::signal::ctrl_c() => Outcome::Interrupted,
        }
    });
    ExitCode::from(report(outcome))
}
