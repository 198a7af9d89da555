/// Snap sync phase state machine.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapPhase {
    /// No snap sync running.
    #[default]
    Idle,

    /// Downloading the hashed account range.
    ///
    /// Accounts with storage or code queue follow-up work for the next phase.
    Accounts,

    /// Downloading storage slots and bytecode for the accounts found.
    StorageAndCode,

    /// Filling in trie nodes the range downloads did not produce.
    Healing,

    /// State is complete under the target root.
    Done,
}

impl SnapPhase {
    /// Check if a transition to the target phase is valid.
    ///
    /// Phases only move forward; any phase may fall back to `Idle` when the run is abandoned.
    pub fn can_transition_to(&self, target: SnapPhase) -> bool {
        match self {
            SnapPhase::Idle => matches!(target, SnapPhase::Accounts),
            SnapPhase::Accounts => matches!(target, SnapPhase::StorageAndCode | SnapPhase::Idle),
            SnapPhase::StorageAndCode => matches!(target, SnapPhase::Healing | SnapPhase::Idle),
            SnapPhase::Healing => matches!(target, SnapPhase::Done | SnapPhase::Idle),
            SnapPhase::Done => matches!(target, SnapPhase::Idle),
        }
    }
}
