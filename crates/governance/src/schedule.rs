//! The durable working set of proposals awaiting re-evaluation

use serde::{Deserialize, Serialize};

use auton_core::{LedgerState, Record, StorageResult};

/// Record id the index is stored under
const INDEX_ID: &str = "index";

/// A proposal due for re-evaluation at `scheduled_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub proposal_id: String,
    pub scheduled_at: u64,
}

/// Set of scheduled proposals, one entry per proposal
///
/// Entries keep their insertion position when overwritten, so `due` yields
/// the same order on every replica.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleIndex {
    entries: Vec<ScheduleEntry>,
}

impl Record for ScheduleIndex {
    const TABLE: &'static str = "schedule";
}

impl ScheduleIndex {
    /// Load the index, empty if it was never written
    pub async fn load(state: &LedgerState) -> StorageResult<Self> {
        Ok(state.get_record::<Self>(INDEX_ID).await?.unwrap_or_default())
    }

    /// Write the index back into the block overlay
    pub fn save(&self, state: &mut LedgerState) -> StorageResult<()> {
        state.update_record(INDEX_ID, self)?;
        Ok(())
    }

    /// Insert or overwrite the entry of `proposal_id`
    pub fn upsert(&mut self, proposal_id: &str, scheduled_at: u64) {
        match self.entries.iter_mut().find(|e| e.proposal_id == proposal_id) {
            Some(entry) => entry.scheduled_at = scheduled_at,
            None => self.entries.push(ScheduleEntry {
                proposal_id: proposal_id.to_string(),
                scheduled_at,
            }),
        }
    }

    /// Snapshot of every entry with `scheduled_at <= now`, in insertion order
    pub fn due(&self, now: u64) -> Vec<ScheduleEntry> {
        self.entries
            .iter()
            .filter(|e| e.scheduled_at <= now)
            .cloned()
            .collect()
    }

    /// Drop the entry of `proposal_id`; returns whether one existed
    pub fn remove(&mut self, proposal_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.proposal_id != proposal_id);
        self.entries.len() != before
    }

    /// The entry of `proposal_id`, if scheduled
    pub fn get(&self, proposal_id: &str) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.proposal_id == proposal_id)
    }

    /// All entries in insertion order
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
