//! Single-replica host for the proposal engine
//!
//! An [`AutonNode`] applies blocks in height order: [`AutonNode::begin_block`]
//! opens a fresh ledger overlay and block context, the caller applies the
//! block's transactions through the submission operations, and
//! [`AutonNode::commit_block`] runs the scheduler pass before flushing
//! everything to storage as one unit.

use std::sync::Arc;
use tracing::{info, warn};

use auton_core::config::env::EnvOverrides;
use auton_core::{
    BlockContext, BlockHeader, BroadcastChannel, EngineConfig, EventChannel, LedgerState, Storage,
};
use auton_governance::{
    ActionPipeline, GovernanceConfig, GovernanceError, GovernanceResult, PassReport,
    ProposalScheduler,
};

/// A block being applied
#[derive(Debug)]
pub struct BlockSession {
    pub state: LedgerState,
    pub block: BlockContext,
}

/// Block driver owning the storage and the scheduler
pub struct AutonNode {
    storage: Arc<dyn Storage>,
    scheduler: ProposalScheduler,
    events: Option<Arc<BroadcastChannel>>,
    last_header: Option<BlockHeader>,
}

impl AutonNode {
    /// Create a node around an already assembled scheduler
    pub fn new(storage: Arc<dyn Storage>, scheduler: ProposalScheduler) -> Self {
        Self {
            storage,
            scheduler,
            events: None,
            last_header: None,
        }
    }

    /// Assemble the built-in pipeline and, if enabled, a broadcast channel
    ///
    /// `AUTON_*` environment variables take precedence over `config`.
    pub fn from_config(config: &EngineConfig, storage: Arc<dyn Storage>) -> GovernanceResult<Self> {
        Self::from_config_with_env(config, storage, &EnvOverrides::new())
    }

    /// Like [`AutonNode::from_config`], reading overrides through `overrides`
    pub fn from_config_with_env(
        config: &EngineConfig,
        storage: Arc<dyn Storage>,
        overrides: &EnvOverrides,
    ) -> GovernanceResult<Self> {
        let config = &overrides.apply(config.clone());
        let governance = GovernanceConfig::from_engine(config)?;
        let pipeline = ActionPipeline::with_builtin_handlers(&governance);
        let mut scheduler = ProposalScheduler::new(pipeline, governance);

        let events = if config.events.enabled {
            let channel = Arc::new(BroadcastChannel::new(config.events.capacity));
            scheduler = scheduler.with_events(channel.clone() as Arc<dyn EventChannel>);
            Some(channel)
        } else {
            None
        };

        Ok(Self {
            storage,
            scheduler,
            events,
            last_header: None,
        })
    }

    /// Broadcast channel of decision events, when events are enabled
    pub fn events(&self) -> Option<Arc<BroadcastChannel>> {
        self.events.clone()
    }

    pub fn scheduler(&self) -> &ProposalScheduler {
        &self.scheduler
    }

    /// Header of the last committed block
    pub fn last_header(&self) -> Option<BlockHeader> {
        self.last_header
    }

    /// Read-only view of committed state
    pub fn view(&self) -> LedgerState {
        LedgerState::new(self.storage.clone())
    }

    /// Open a block; heights must increase and time must not go backwards
    pub fn begin_block(&self, header: BlockHeader) -> GovernanceResult<BlockSession> {
        if let Some(last) = self.last_header {
            if header.height <= last.height || header.timestamp < last.timestamp {
                return Err(GovernanceError::Other(anyhow::anyhow!(
                    "block {}@{} does not follow block {}@{}",
                    header.height, header.timestamp, last.height, last.timestamp
                )));
            }
        }

        Ok(BlockSession {
            state: LedgerState::new(self.storage.clone()),
            block: BlockContext::new(header),
        })
    }

    /// Run the scheduler pass and commit the block
    ///
    /// A failing pass discards every write of the block.
    pub async fn commit_block(&mut self, session: BlockSession) -> GovernanceResult<PassReport> {
        let BlockSession { mut state, mut block } = session;

        let report = match self.scheduler.on_block_commit(&mut block, &mut state).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Aborting block {}: {}", block.height(), e);
                state.discard();
                return Err(e);
            }
        };

        let writes = match state.commit().await {
            Ok(writes) => writes,
            Err(e) => {
                warn!("Failed to commit block {}: {}", block.height(), e);
                state.discard();
                return Err(e.into());
            }
        };
        self.last_header = Some(*block.header());
        info!(
            "Committed block {} ({} writes, {} transitions)",
            block.height(),
            writes,
            report.transitions.len()
        );
        Ok(report)
    }

    /// Drop a block without committing anything
    pub fn abort_block(&self, session: BlockSession) {
        let BlockSession { mut state, block } = session;
        state.discard();
        info!("Aborted block {}", block.height());
    }
}
