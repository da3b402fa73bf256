//! Example: follow a node from a height and tally transactions per block.
//!
//! The tally is keyed by block height and overwritten on every dispatch, so a block that is
//! dispatched twice (after a failed cursor write, say) is still counted once.
//!
//! Usage:
//!
//!   cargo run -p chainsync --example follow_head -- \
//!       --rpc-url http://127.0.0.1:8545 --from 0 --to 20

use chainsync::{
    Filter, FilterChain, FilterContext, JsonRpcSource, MemoryCursorStore, SyncConfig, SyncDriver,
    Transaction,
};
use clap::Parser;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Parser)]
struct Args {
    #[arg(long)]
    rpc_url: String,
    #[arg(long, default_value_t = 0)]
    from: u64,
    #[arg(long)]
    to: u64,
}

/// Transactions seen per block. Replay-safe: the count is set, not incremented.
struct Tally(Arc<Mutex<BTreeMap<u64, usize>>>);

impl Filter for Tally {
    fn handle(&mut self, _tx: &Transaction, ctx: &FilterContext<'_>) -> anyhow::Result<()> {
        let mut counts = self
            .0
            .lock()
            .map_err(|_| anyhow::anyhow!("tally lock poisoned"))?;
        counts.insert(ctx.block_height, ctx.transaction_count());
        Ok(())
    }

    fn name(&self) -> &str {
        "tally"
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let counts = Arc::new(Mutex::new(BTreeMap::new()));
    let config = SyncConfig {
        start_height: Some(args.from),
        stop_height: Some(args.to),
        ..Default::default()
    };
    let mut driver = SyncDriver::new(
        config,
        JsonRpcSource::new(args.rpc_url)?,
        MemoryCursorStore::new(),
        FilterChain::new().with_filter(Tally(Arc::clone(&counts))),
    )?;
    let termination = driver.run()?;

    let counts = counts
        .lock()
        .map_err(|_| anyhow::anyhow!("tally lock poisoned"))?;
    for (height, n) in counts.iter() {
        println!("block {} transactions={}", height, n);
    }
    eprintln!("{}", termination);
    Ok(())
}
