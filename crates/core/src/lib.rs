//! Core Auton module
//!
//! This module provides the collaborators the governance engine runs on:
//! the transactional ledger state, the per-block context, deterministic
//! identifiers, the event channel and configuration.

pub mod block;
pub mod config;
pub mod crypto;
pub mod events;
pub mod storage;

// Re-export key components
pub use block::{BlockContext, BlockHeader, TxEnvelope};
pub use config::{ConfigError, ConfigResult, EngineConfig};
pub use crypto::{derive_id, sha256, IdSeed};
pub use events::{BroadcastChannel, Event, EventChannel, NullChannel};
pub use storage::{
    FileStorage, JsonStorage, LedgerState, MemoryStorage, MockStorage, Record, Storage,
    StorageError, StorageResult, WriteBatch,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Package description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Initialize tracing for Auton
///
/// `RUST_LOG` takes precedence over `default_level`. Fails instead of
/// panicking when a global subscriber is already installed.
pub fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global tracing subscriber: {}", e))
}
