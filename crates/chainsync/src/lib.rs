//! Resumable block synchronization: follow a chain head block by block and hand every
//! transaction to an ordered chain of filters.
//!
//! - **SyncDriver**: single-threaded polling loop (`Idle → Fetching → Dispatching →
//!   Advancing → Sleeping`). Persists the [Cursor] only after a whole block has been
//!   dispatched, so delivery to filters is at-least-once and filters must tolerate replay.
//! - **CursorStore**: durable cursor ([FileCursorStore] writes-then-renames JSON,
//!   [MemoryCursorStore] for tests and dry runs).
//! - **SourceAdapter**: where blocks come from ([JsonRpcSource] for Ethereum-style nodes).
//! - **FilterChain**: ordered [Filter]s; [NoopFilter] and closure-backed [FnFilter].
//! - **Termination**: returned once when the configured stop height has been committed.

pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod filter;
pub mod rpc;
pub mod source;
pub mod store;
pub mod termination;

pub use config::{BackoffConfig, ConfigError, SyncConfig};
pub use cursor::Cursor;
pub use driver::{SyncDriver, SyncState, Tick};
pub use error::SyncError;
pub use filter::{DispatchError, Filter, FilterChain, FilterContext, FnFilter, NoopFilter};
pub use rpc::JsonRpcSource;
pub use source::{SourceAdapter, SourceError, Transaction, WorkUnit};
pub use store::{CursorStore, FileCursorStore, MemoryCursorStore, StoreError};
pub use termination::{StopReason, Termination};
