//! SyncDriver: single-threaded polling loop over a source, a filter chain and a cursor store.
//!
//! One [SyncDriver::tick] is one pass of `Fetching → Dispatching → Advancing`.
//! [SyncDriver::run] repeats ticks with a blocking sleep of at least the poll interval in
//! between until the stop height is reached or a fatal error occurs. The cursor is loaded once
//! and persisted only after a whole unit has been dispatched, so a failed unit is fetched and
//! dispatched again from its first transaction.

use crate::config::{ConfigError, SyncConfig};
use crate::cursor::Cursor;
use crate::error::SyncError;
use crate::filter::FilterChain;
use crate::source::{SourceAdapter, SourceError};
use crate::store::{CursorStore, StoreError};
use crate::termination::Termination;
use rand::Rng;
use std::time::Duration;

/// Where the driver currently is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching,
    Dispatching,
    Advancing,
    Sleeping,
    Stopped,
}

/// Outcome of one non-fatal tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// A unit was dispatched and the new cursor persisted.
    Advanced(Cursor),
    /// The source has nothing at the cursor yet.
    NoWork,
    /// The source failed; retried after backoff.
    SourceRetry { attempt: u32 },
    /// The cursor store failed, still within the retry budget.
    StoreRetry { attempt: u32 },
    /// The stop height was reached. Returned once.
    Stopped(Termination),
}

pub struct SyncDriver<S, C> {
    config: SyncConfig,
    source: S,
    store: C,
    chain: FilterChain,
    state: SyncState,
    cursor: Option<Cursor>,
    source_failures: u32,
    store_failures: u32,
}

impl<S, C> SyncDriver<S, C>
where
    S: SourceAdapter,
    C: CursorStore,
{
    pub fn new(
        config: SyncConfig,
        source: S,
        store: C,
        chain: FilterChain,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            store,
            chain,
            state: SyncState::Idle,
            cursor: None,
            source_failures: 0,
            store_failures: 0,
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// In-memory cursor; `None` until loaded from the store.
    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// Run until the stop height is reached or a fatal error occurs.
    pub fn run(&mut self) -> Result<Termination, SyncError> {
        tracing::info!(
            start_height = ?self.config.start_height,
            stop_height = ?self.config.stop_height,
            filters = ?self.chain.names(),
            "sync driver starting"
        );
        loop {
            let tick = self.tick()?;
            if let Tick::Stopped(termination) = tick {
                return Ok(termination);
            }
            let pause = self.pause_after(&tick);
            if !pause.is_zero() {
                tracing::trace!(?pause, ?tick, "sleeping");
                std::thread::sleep(pause);
            }
        }
    }

    /// One pass of the loop. Filter errors and exhausted store retries are fatal; everything
    /// else is reported as a [Tick].
    pub fn tick(&mut self) -> Result<Tick, SyncError> {
        if self.state == SyncState::Stopped {
            return Err(SyncError::Stopped);
        }

        let cursor = match self.cursor {
            Some(cursor) => cursor,
            None => match self.load_cursor()? {
                Ok(cursor) => cursor,
                Err(tick) => return Ok(tick),
            },
        };

        self.state = SyncState::Fetching;
        let latest = match self.source.latest_available_height() {
            Ok(h) => h,
            Err(e) => return Ok(self.source_failed(Some(cursor), e)),
        };
        if cursor.block_height > latest {
            self.source_failures = 0;
            self.state = SyncState::Sleeping;
            tracing::trace!(%cursor, latest, "no new block");
            return Ok(Tick::NoWork);
        }
        let unit = match self.source.fetch(cursor.block_height) {
            Ok(Some(unit)) if unit.height() == cursor.block_height => unit,
            Ok(Some(unit)) => {
                let e = SourceError::HeightMismatch {
                    requested: cursor.block_height,
                    returned: unit.height(),
                };
                return Ok(self.source_failed(Some(cursor), e));
            }
            Ok(None) => {
                self.source_failures = 0;
                self.state = SyncState::Sleeping;
                tracing::debug!(%cursor, latest, "block not served yet");
                return Ok(Tick::NoWork);
            }
            Err(e) => return Ok(self.source_failed(Some(cursor), e)),
        };
        self.source_failures = 0;

        self.state = SyncState::Dispatching;
        let dispatched = match self.chain.dispatch(&unit, cursor.first_transaction()) {
            Ok(n) => n,
            Err(source) => {
                tracing::error!(
                    %cursor,
                    filter = %source.filter,
                    transaction_index = source.transaction_index,
                    reason = %source.source,
                    "filter failed, cursor not advanced"
                );
                return Err(SyncError::Dispatch { cursor, source });
            }
        };

        self.state = SyncState::Advancing;
        let next = Cursor::after(unit.height());
        if let Err(e) = self.store.set_cursor(next) {
            return self.store_failed(Some(cursor), e);
        }
        self.store_failures = 0;
        self.cursor = Some(next);
        tracing::info!(
            height = unit.height(),
            transactions = dispatched,
            latest,
            "block processed"
        );

        if let Some(stop) = self.config.stop_height {
            if unit.height() >= stop {
                let termination = Termination::stop_height_reached(unit.height(), stop);
                tracing::info!(final_height = unit.height(), stop, "stop height reached");
                self.state = SyncState::Stopped;
                return Ok(Tick::Stopped(termination));
            }
        }

        self.state = SyncState::Sleeping;
        Ok(Tick::Advanced(next))
    }

    /// Idle: read the persisted cursor once. Only an empty store falls back to `start_height`
    /// or the source head. `Err(tick)` means retry later.
    fn load_cursor(&mut self) -> Result<Result<Cursor, Tick>, SyncError> {
        let stored = match self.store.load_cursor() {
            Ok(stored) => stored,
            Err(e) => return self.store_failed(None, e).map(Err),
        };
        self.store_failures = 0;

        let cursor = match stored {
            Some(cursor) => {
                if let Some(stop) = self.config.stop_height {
                    if cursor.block_height > stop {
                        // A previous run already processed the stop height.
                        let termination =
                            Termination::stop_height_reached(cursor.block_height - 1, stop);
                        tracing::info!(%cursor, stop, "stop height already reached");
                        self.state = SyncState::Stopped;
                        return Ok(Err(Tick::Stopped(termination)));
                    }
                }
                tracing::info!(%cursor, "cursor loaded");
                cursor
            }
            None => {
                let height = match self.config.start_height {
                    Some(h) => h,
                    None => match self.source.latest_available_height() {
                        Ok(h) => h,
                        Err(e) => return Ok(Err(self.source_failed(None, e))),
                    },
                };
                if let Some(stop) = self.config.stop_height {
                    // `validate` rules this out for `start_height`, so `height` is the head.
                    if height > stop {
                        tracing::error!(head = height, stop, "stop height behind chain head");
                        return Err(ConfigError::StopBehindHead { head: height, stop }.into());
                    }
                }
                let cursor = Cursor::new(height);
                tracing::info!(%cursor, "no stored cursor, starting from default");
                cursor
            }
        };
        self.cursor = Some(cursor);
        Ok(Ok(cursor))
    }

    fn source_failed(&mut self, cursor: Option<Cursor>, e: SourceError) -> Tick {
        self.source_failures = self.source_failures.saturating_add(1);
        tracing::warn!(
            cursor = ?cursor,
            attempt = self.source_failures,
            reason = %e,
            "source failed, retrying"
        );
        self.state = self.retry_state();
        Tick::SourceRetry {
            attempt: self.source_failures,
        }
    }

    fn store_failed(&mut self, cursor: Option<Cursor>, e: StoreError) -> Result<Tick, SyncError> {
        self.store_failures = self.store_failures.saturating_add(1);
        let attempts = self.store_failures;
        if attempts >= self.config.store_max_attempts {
            tracing::error!(
                cursor = ?cursor,
                attempts,
                reason = %e,
                "cursor store failed, giving up"
            );
            return Err(SyncError::Store {
                cursor,
                attempts,
                source: e,
            });
        }
        tracing::warn!(
            cursor = ?cursor,
            attempt = attempts,
            reason = %e,
            "cursor store failed, retrying"
        );
        self.state = self.retry_state();
        Ok(Tick::StoreRetry { attempt: attempts })
    }

    fn retry_state(&self) -> SyncState {
        if self.cursor.is_some() {
            SyncState::Sleeping
        } else {
            SyncState::Idle
        }
    }

    /// How long `run` sleeps after `tick`. Source retries back off instead of polling.
    fn pause_after(&self, tick: &Tick) -> Duration {
        match tick {
            Tick::Advanced(_) | Tick::NoWork | Tick::StoreRetry { .. } => {
                self.config.poll_interval()
            }
            Tick::SourceRetry { attempt } => {
                let backoff = &self.config.backoff;
                let jitter = rand::thread_rng().gen_range(0..=backoff.max_jitter_ms);
                backoff.delay(*attempt) + Duration::from_millis(jitter)
            }
            Tick::Stopped(_) => Duration::ZERO,
        }
    }
}
