//! Fatal sync errors. A clean stop is not an error: see [crate::Termination].

use crate::config::ConfigError;
use crate::cursor::Cursor;
use crate::filter::DispatchError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// A filter failed; the cursor was left at `cursor`.
    #[error("dispatch failed at cursor {cursor}: {source}")]
    Dispatch {
        cursor: Cursor,
        #[source]
        source: DispatchError,
    },
    /// The cursor store kept failing past the retry budget.
    #[error("cursor store failed {attempts} consecutive times: {source}")]
    Store {
        cursor: Option<Cursor>,
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error("driver already stopped")]
    Stopped,
}

impl SyncError {
    /// Cursor position at the time of failure, when known.
    pub fn cursor(&self) -> Option<Cursor> {
        match self {
            SyncError::Dispatch { cursor, .. } => Some(*cursor),
            SyncError::Store { cursor, .. } => *cursor,
            SyncError::Config(_) | SyncError::Stopped => None,
        }
    }
}
