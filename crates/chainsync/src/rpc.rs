//! Blocking JSON-RPC source for Ethereum-style nodes.
//!
//! `eth_blockNumber` gives the head; `eth_getBlockByNumber(<height>, false)` gives the block,
//! whose transaction hashes become the unit's transactions in block order.

use crate::source::{SourceAdapter, SourceError, Transaction, WorkUnit};
use serde_json::{json, Value};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct JsonRpcSource {
    client: reqwest::blocking::Client,
    url: String,
    next_id: u64,
}

impl JsonRpcSource {
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        // No system proxy lookup: it panics in some sandboxes.
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: 1,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn call(&mut self, method: &str, params: Value) -> Result<Value, SourceError> {
        let id = self.next_id;
        self.next_id += 1;
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()?
            .error_for_status()?;
        let json: Value = resp.json()?;
        rpc_result(json)
    }
}

impl SourceAdapter for JsonRpcSource {
    fn latest_available_height(&mut self) -> Result<u64, SourceError> {
        let result = self.call("eth_blockNumber", json!([]))?;
        parse_quantity(&result)
    }

    fn fetch(&mut self, height: u64) -> Result<Option<WorkUnit>, SourceError> {
        let result = self.call(
            "eth_getBlockByNumber",
            json!([format!("0x{:x}", height), false]),
        )?;
        parse_block(height, &result)
    }
}

fn rpc_result(json: Value) -> Result<Value, SourceError> {
    if let Some(err) = json.get("error") {
        return Err(SourceError::Rpc(err.to_string()));
    }
    json.get("result")
        .cloned()
        .ok_or_else(|| SourceError::Malformed("missing result".into()))
}

fn parse_quantity(v: &Value) -> Result<u64, SourceError> {
    let s = v
        .as_str()
        .ok_or_else(|| SourceError::Malformed(format!("quantity not a string: {}", v)))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| SourceError::Malformed(format!("quantity {:?}: {}", s, e)))
}

fn decode_hash(s: &str) -> Result<Vec<u8>, SourceError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| SourceError::Malformed(format!("transaction hash {:?}: {}", s, e)))
}

/// `null` means the node does not have the block yet.
fn parse_block(height: u64, block: &Value) -> Result<Option<WorkUnit>, SourceError> {
    if block.is_null() {
        return Ok(None);
    }
    let number = block
        .get("number")
        .ok_or_else(|| SourceError::Malformed("block without number".into()))?;
    let number = parse_quantity(number)?;
    if number != height {
        return Err(SourceError::HeightMismatch {
            requested: height,
            returned: number,
        });
    }
    let txs = match block.get("transactions") {
        Some(Value::Array(txs)) => txs,
        Some(Value::Null) | None => return WorkUnit::new(height, Vec::new()).map(Some),
        Some(other) => {
            return Err(SourceError::Malformed(format!(
                "transactions not an array: {}",
                other
            )))
        }
    };
    let mut transactions = Vec::with_capacity(txs.len());
    for (position, tx) in txs.iter().enumerate() {
        let transaction = match tx {
            // Hash-only form (full = false).
            Value::String(hash) => Transaction::new(position as u64, decode_hash(hash)?),
            // Full transaction objects.
            Value::Object(obj) => {
                let hash = obj
                    .get("hash")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SourceError::Malformed("transaction without hash".into()))?;
                let index = match obj.get("transactionIndex") {
                    Some(idx) => parse_quantity(idx)?,
                    None => position as u64,
                };
                Transaction::new(index, decode_hash(hash)?)
            }
            other => {
                return Err(SourceError::Malformed(format!(
                    "unexpected transaction entry: {}",
                    other
                )))
            }
        };
        transactions.push(transaction);
    }
    WorkUnit::new(height, transactions).map(Some)
}
