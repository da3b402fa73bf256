//! Source adapter: where work units (blocks) come from.

use thiserror::Error;

/// One transaction inside a block. The payload is opaque to the sync loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub index: u64,
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(index: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            payload: payload.into(),
        }
    }
}

/// A fetched block: its height and its transactions in strictly increasing index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    height: u64,
    transactions: Vec<Transaction>,
}

impl WorkUnit {
    /// Build a unit, sorting transactions by index. Duplicate indices are rejected.
    pub fn new(height: u64, mut transactions: Vec<Transaction>) -> Result<Self, SourceError> {
        transactions.sort_by_key(|tx| tx.index);
        if let Some(pair) = transactions.windows(2).find(|w| w[0].index == w[1].index) {
            return Err(SourceError::Malformed(format!(
                "block {} has duplicate transaction index {}",
                height, pair[0].index
            )));
        }
        Ok(Self {
            height,
            transactions,
        })
    }

    /// Unit whose transactions are indexed 0.. in payload order.
    pub fn from_payloads<P>(height: u64, payloads: impl IntoIterator<Item = P>) -> Self
    where
        P: Into<Vec<u8>>,
    {
        let transactions = payloads
            .into_iter()
            .enumerate()
            .map(|(i, p)| Transaction::new(i as u64, p))
            .collect();
        Self {
            height,
            transactions,
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("malformed source data: {0}")]
    Malformed(String),
    #[error("requested block {requested}, source returned {returned}")]
    HeightMismatch { requested: u64, returned: u64 },
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Chain/node connection the driver pulls work from.
pub trait SourceAdapter {
    /// Highest block height the source can currently serve.
    fn latest_available_height(&mut self) -> Result<u64, SourceError>;

    /// Block at `height`, or `None` if it is not available yet.
    fn fetch(&mut self, height: u64) -> Result<Option<WorkUnit>, SourceError>;
}

impl<S: SourceAdapter + ?Sized> SourceAdapter for Box<S> {
    fn latest_available_height(&mut self) -> Result<u64, SourceError> {
        (**self).latest_available_height()
    }

    fn fetch(&mut self, height: u64) -> Result<Option<WorkUnit>, SourceError> {
        (**self).fetch(height)
    }
}
