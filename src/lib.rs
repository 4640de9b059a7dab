//! Auton
//!
//! A deterministic proposal lifecycle engine for replicated cooperative
//! governance: proposals campaign, collect votes, get decided and settled,
//! all driven by a scheduler that runs once per committed block.

/// Module version information
pub mod version {
    /// The current version of the Auton library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

pub mod node;

pub use node::{AutonNode, BlockSession};

/// Re-export the member crates
pub use auton_core as core;
pub use auton_governance as governance;
