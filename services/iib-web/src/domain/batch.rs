//! `Batch` — an explicit grouping of requests submitted atomically
//! (SPEC_FULL.md §3).

use iib_events::BuildState;
use iib_id::BatchId;
use serde_json::Value as Json;

#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub annotations: Json,
}

impl Batch {
    /// The batch's derived state is the coarsest of its member requests'
    /// states: in-progress beats failed beats complete.
    pub fn derived_state(member_states: impl IntoIterator<Item = BuildState>) -> BuildState {
        let mut any_failed = false;
        let mut any = false;
        for s in member_states {
            any = true;
            match s {
                BuildState::InProgress => return BuildState::InProgress,
                BuildState::Failed => any_failed = true,
                BuildState::Complete => {}
            }
        }
        if !any {
            return BuildState::Complete;
        }
        if any_failed {
            BuildState::Failed
        } else {
            BuildState::Complete
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_in_progress_dominates() {
        let states = [BuildState::Complete, BuildState::InProgress, BuildState::Failed];
        assert_eq!(Batch::derived_state(states), BuildState::InProgress);
    }

    #[test]
    fn test_failed_beats_complete_when_none_in_progress() {
        let states = [BuildState::Complete, BuildState::Failed];
        assert_eq!(Batch::derived_state(states), BuildState::Failed);
    }

    #[test]
    fn test_all_complete_is_complete() {
        let states = [BuildState::Complete, BuildState::Complete];
        assert_eq!(Batch::derived_state(states), BuildState::Complete);
    }
}
