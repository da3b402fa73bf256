//! Common helpers for integration tests: a scripted source, a store that can be made to
//! fail, and recording filters.
//! Some helpers are only used by specific test binaries; allow dead_code to avoid
//! per-binary warnings.
#![allow(dead_code)]

use chainsync::{
    Cursor, CursorStore, Filter, FilterContext, MemoryCursorStore, SourceAdapter, SourceError,
    StoreError, SyncConfig, Transaction, WorkUnit,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with no sleeping, so `run` finishes fast.
pub fn fast_config(start_height: u64, stop_height: Option<u64>) -> SyncConfig {
    let mut config = head_config(stop_height);
    config.start_height = Some(start_height);
    config
}

/// Like [fast_config] but without a start height, so an empty store defaults to the head.
pub fn head_config(stop_height: Option<u64>) -> SyncConfig {
    let mut config = SyncConfig {
        start_height: None,
        stop_height,
        poll_interval_ms: 0,
        ..Default::default()
    };
    config.backoff.initial_backoff_ms = 0;
    config.backoff.max_backoff_ms = 0;
    config.backoff.max_jitter_ms = 0;
    config
}

#[derive(Debug, Default)]
struct ScriptState {
    blocks: BTreeMap<u64, WorkUnit>,
    fetched: Vec<u64>,
    fail_next: u32,
}

/// In-memory chain. Clones share state so a test can inspect fetches or append blocks
/// while the driver owns its copy.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSource {
    /// Blocks `from..=to`, each with `txs_per_block` transactions.
    pub fn with_blocks(from: u64, to: u64, txs_per_block: usize) -> Self {
        let source = Self::default();
        for h in from..=to {
            let payloads: Vec<Vec<u8>> = (0..txs_per_block)
                .map(|i| format!("{}:{}", h, i).into_bytes())
                .collect();
            source.push(WorkUnit::from_payloads(h, payloads));
        }
        source
    }

    pub fn push(&self, unit: WorkUnit) {
        self.state.lock().unwrap().blocks.insert(unit.height(), unit);
    }

    /// Heights passed to `fetch`, in call order.
    pub fn fetched(&self) -> Vec<u64> {
        self.state.lock().unwrap().fetched.clone()
    }

    /// Make the next `n` source calls fail.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().unwrap().fail_next = n;
    }

    fn take_failure(state: &mut ScriptState) -> Result<(), SourceError> {
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SourceError::Unavailable("scripted outage".into()));
        }
        Ok(())
    }
}

impl SourceAdapter for ScriptedSource {
    fn latest_available_height(&mut self) -> Result<u64, SourceError> {
        let mut state = self.state.lock().unwrap();
        Self::take_failure(&mut state)?;
        Ok(state.blocks.keys().next_back().copied().unwrap_or(0))
    }

    fn fetch(&mut self, height: u64) -> Result<Option<WorkUnit>, SourceError> {
        let mut state = self.state.lock().unwrap();
        Self::take_failure(&mut state)?;
        state.fetched.push(height);
        Ok(state.blocks.get(&height).cloned())
    }
}

/// Memory store whose writes (and reads) can be made to fail, and which records every write.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    inner: MemoryCursorStore,
    writes: Arc<Mutex<Vec<Cursor>>>,
    fail_sets: Arc<Mutex<u32>>,
    fail_gets: Arc<Mutex<u32>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: Cursor) -> Self {
        Self {
            inner: MemoryCursorStore::with_cursor(cursor),
            ..Default::default()
        }
    }

    pub fn fail_next_sets(&self, n: u32) {
        *self.fail_sets.lock().unwrap() = n;
    }

    pub fn fail_next_gets(&self, n: u32) {
        *self.fail_gets.lock().unwrap() = n;
    }

    pub fn current(&self) -> Option<Cursor> {
        self.inner.current()
    }

    /// Every successfully persisted cursor, in order.
    pub fn writes(&self) -> Vec<Cursor> {
        self.writes.lock().unwrap().clone()
    }
}

fn take(counter: &Mutex<u32>) -> bool {
    let mut n = counter.lock().unwrap();
    if *n > 0 {
        *n -= 1;
        true
    } else {
        false
    }
}

impl CursorStore for FlakyStore {
    fn load_cursor(&self) -> Result<Option<Cursor>, StoreError> {
        if take(&self.fail_gets) {
            return Err(StoreError::Unavailable("scripted read failure".into()));
        }
        self.inner.load_cursor()
    }

    fn set_cursor(&mut self, cursor: Cursor) -> Result<(), StoreError> {
        if take(&self.fail_sets) {
            return Err(StoreError::Unavailable("scripted write failure".into()));
        }
        self.inner.set_cursor(cursor)?;
        self.writes.lock().unwrap().push(cursor);
        Ok(())
    }
}

pub type CallLog = Arc<Mutex<Vec<(String, u64, u64)>>>;

/// Records `(filter, height, tx index)` for every call.
pub struct Recorder {
    pub name: String,
    pub log: CallLog,
}

impl Recorder {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
        }
    }
}

impl Filter for Recorder {
    fn handle(&mut self, tx: &Transaction, ctx: &FilterContext<'_>) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push((self.name.clone(), ctx.block_height, tx.index));
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fails on one `(height, tx index)` until disarmed.
pub struct FailAt {
    pub height: u64,
    pub index: u64,
    pub armed: Arc<Mutex<bool>>,
}

impl Filter for FailAt {
    fn handle(&mut self, tx: &Transaction, ctx: &FilterContext<'_>) -> anyhow::Result<()> {
        let hit = ctx.block_height == self.height && tx.index == self.index;
        if hit && *self.armed.lock().unwrap() {
            anyhow::bail!("rejecting {}:{}", self.height, self.index);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fail_at"
    }
}

/// Idempotent filter: a set of `(height, tx index)` seen. Replays leave it unchanged.
pub struct SeenSet {
    pub seen: Arc<Mutex<BTreeSet<(u64, u64)>>>,
}

impl Filter for SeenSet {
    fn handle(&mut self, tx: &Transaction, ctx: &FilterContext<'_>) -> anyhow::Result<()> {
        self.seen.lock().unwrap().insert((ctx.block_height, tx.index));
        Ok(())
    }
}

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}
