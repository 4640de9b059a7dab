//! Block context threaded through block application

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::crypto::{derive_id, IdSeed};

/// Header of the block being applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height
    pub height: u64,
    /// Block timestamp in seconds
    pub timestamp: u64,
}

impl BlockHeader {
    /// Create a new block header
    pub fn new(height: u64, timestamp: u64) -> Self {
        Self { height, timestamp }
    }
}

/// The transaction a submission originates from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEnvelope {
    /// Transaction id
    pub id: String,
    /// Sending account
    pub sender: String,
    /// Sender nonce
    pub nonce: u64,
}

impl TxEnvelope {
    /// Create a new transaction envelope
    pub fn new(id: impl Into<String>, sender: impl Into<String>, nonce: u64) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            nonce,
        }
    }

    /// Seed for rows minted by this transaction
    pub fn seed(&self) -> IdSeed {
        IdSeed::Sender {
            sender: self.sender.clone(),
            nonce: self.nonce,
        }
    }
}

/// Per-block context
///
/// Built fresh for every block, so the per-table row counters start at
/// zero each block.
#[derive(Debug, Clone)]
pub struct BlockContext {
    header: BlockHeader,
    counters: BTreeMap<String, u64>,
}

impl BlockContext {
    /// Start a new block
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            counters: BTreeMap::new(),
        }
    }

    /// Header of the current block
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Block height
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Block time in seconds
    pub fn now(&self) -> u64 {
        self.header.timestamp
    }

    /// Seed for rows minted by block hooks
    pub fn block_seed(&self) -> IdSeed {
        IdSeed::Block { height: self.header.height }
    }

    /// Claim the next row number of `table`
    pub fn next_row(&mut self, table: &str) -> u64 {
        let counter = self.counters.entry(table.to_string()).or_insert(0);
        let row = *counter;
        *counter += 1;
        row
    }

    /// Mint the id of the next `table` row under `seed`
    pub fn next_id(&mut self, table: &str, seed: &IdSeed) -> String {
        let row = self.next_row(table);
        derive_id(table, seed, row)
    }
}
