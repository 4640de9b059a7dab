//! Deterministic identifiers
//!
//! Every replica must mint the same identifier for the same row, so ids are
//! a SHA-256 digest over an exact, ordered input tuple rather than anything
//! random or clock-derived.

use std::fmt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hash data using SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// What an identifier is anchored to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdSeed {
    /// Rows minted by block hooks
    Block { height: u64 },
    /// Rows minted by a signed transaction
    Sender { sender: String, nonce: u64 },
}

impl fmt::Display for IdSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdSeed::Block { height } => write!(f, "block:{}", height),
            IdSeed::Sender { sender, nonce } => write!(f, "sender:{}:{}", sender, nonce),
        }
    }
}

/// Derive the identifier of row `row` of `prefix` under `seed`
///
/// Fields are length-prefixed so no two distinct tuples share an encoding.
pub fn derive_id(prefix: &str, seed: &IdSeed, row: u64) -> String {
    let mut hasher = Sha256::new();
    write_field(&mut hasher, prefix.as_bytes());
    match seed {
        IdSeed::Block { height } => {
            write_field(&mut hasher, b"block");
            write_field(&mut hasher, &height.to_be_bytes());
        }
        IdSeed::Sender { sender, nonce } => {
            write_field(&mut hasher, b"sender");
            write_field(&mut hasher, sender.as_bytes());
            write_field(&mut hasher, &nonce.to_be_bytes());
        }
    }
    write_field(&mut hasher, &row.to_be_bytes());
    hex::encode(hasher.finalize())
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
