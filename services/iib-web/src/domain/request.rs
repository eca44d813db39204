//! `Request` and `RequestState`, and the `add_state` transition invariant
//! (SPEC_FULL.md §3 invariants 1-2, §4.6 `add_state`).
//!
//! The `Request ↔ RequestState` cycle is resolved the way SPEC_FULL.md §9
//! prescribes: `Request` owns the `Vec<RequestState>` history and separately
//! holds `current_state_id`, a non-owning pointer into it; `RequestState`
//! holds `request_id` as a back-reference only, never a reference to its
//! parent.

use chrono::{DateTime, Utc};
use iib_events::BuildState;
use iib_id::{BatchId, RequestId, RequestStateId};

use super::error::DomainError;
use super::types::RequestPayload;

/// One entry in a request's state history.
#[derive(Debug, Clone)]
pub struct RequestState {
    pub id: RequestStateId,
    pub request_id: RequestId,
    pub state: BuildState,
    pub state_reason: String,
    pub updated: DateTime<Utc>,
}

/// The polymorphic request record. `payload` carries the per-type fields;
/// everything else is the common envelope (SPEC_FULL.md §3).
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub batch_id: BatchId,
    pub user_id: Option<String>,
    pub current_state_id: Option<RequestStateId>,
    pub architectures: Vec<String>,
    pub binary_image: Option<String>,
    pub binary_image_resolved: Option<String>,
    pub index_image: Option<String>,
    pub index_image_resolved: Option<String>,
    pub internal_index_image_copy: Option<String>,
    pub internal_index_image_copy_resolved: Option<String>,
    pub build_tags: Vec<String>,
    pub states: Vec<RequestState>,
    pub payload: RequestPayload,
}

impl Request {
    /// The state pointed to by `current_state_id`. Not simply the last
    /// element of `states`: the pointer is authoritative, the vector is
    /// history.
    pub fn latest_state(&self) -> Option<&RequestState> {
        let id = self.current_state_id?;
        self.states.iter().find(|s| s.id == id)
    }

    pub fn state(&self) -> Option<BuildState> {
        self.latest_state().map(|s| s.state)
    }

    /// Validate a proposed transition without mutating anything. Used both
    /// by the in-memory construction path and by `db::RequestStore` before
    /// it persists a new `RequestState` row.
    pub fn validate_transition(
        current: Option<BuildState>,
        new_state: BuildState,
    ) -> Result<(), DomainError> {
        if let Some(current) = current {
            if current.is_terminal() && current != new_state {
                return Err(DomainError::TerminalTransition {
                    from: current,
                    to: new_state,
                });
            }
        }
        Ok(())
    }

    /// Append a new state to the in-memory history. The database-backed
    /// counterpart (`db::RequestStore::append_state`) performs the same
    /// validation before the row is actually flushed and the id known; this
    /// method exists so the invariant can be unit tested without a pool.
    pub fn add_state(
        &mut self,
        id: RequestStateId,
        state: BuildState,
        reason: impl Into<String>,
        updated: DateTime<Utc>,
    ) -> Result<&RequestState, DomainError> {
        Self::validate_transition(self.state(), state)?;
        self.states.push(RequestState {
            id,
            request_id: self.id,
            state,
            state_reason: reason.into(),
            updated,
        });
        self.current_state_id = Some(id);
        Ok(self.states.last().expect("just pushed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::AddPayload;

    fn empty_request() -> Request {
        Request {
            id: RequestId::new(1),
            batch_id: BatchId::new(1),
            user_id: None,
            current_state_id: None,
            architectures: vec![],
            binary_image: None,
            binary_image_resolved: None,
            index_image: None,
            index_image_resolved: None,
            internal_index_image_copy: None,
            internal_index_image_copy_resolved: None,
            build_tags: vec![],
            states: vec![],
            payload: RequestPayload::Add(AddPayload::default()),
        }
    }

    #[test]
    fn test_add_state_appends_and_updates_pointer() {
        let mut req = empty_request();
        let now = Utc::now();
        req.add_state(
            RequestStateId::new(1),
            BuildState::InProgress,
            "The request was initiated",
            now,
        )
        .unwrap();
        assert_eq!(req.state(), Some(BuildState::InProgress));
        assert_eq!(req.latest_state().unwrap().state_reason, "The request was initiated");
        assert_eq!(req.states.len(), 1);
    }

    #[test]
    fn test_terminal_to_different_state_rejected() {
        let mut req = empty_request();
        let now = Utc::now();
        req.add_state(RequestStateId::new(1), BuildState::InProgress, "start", now)
            .unwrap();
        req.add_state(RequestStateId::new(2), BuildState::Complete, "done", now)
            .unwrap();
        let err = req
            .add_state(RequestStateId::new(3), BuildState::InProgress, "oops", now)
            .unwrap_err();
        assert!(matches!(err, DomainError::TerminalTransition { .. }));
        assert_eq!(req.states.len(), 2, "rejected transition must not persist a new row");
    }

    #[test]
    fn test_same_terminal_state_reason_update_allowed() {
        let mut req = empty_request();
        let now = Utc::now();
        req.add_state(RequestStateId::new(1), BuildState::Failed, "timeout", now)
            .unwrap();
        req.add_state(RequestStateId::new(2), BuildState::Failed, "timeout (confirmed)", now)
            .unwrap();
        assert_eq!(req.states.len(), 2);
        assert_eq!(req.state(), Some(BuildState::Failed));
    }

    #[test]
    fn test_latest_state_follows_pointer_not_vector_order() {
        let mut req = empty_request();
        let now = Utc::now();
        req.add_state(RequestStateId::new(5), BuildState::InProgress, "start", now)
            .unwrap();
        assert_eq!(req.latest_state().unwrap().id, RequestStateId::new(5));
    }
}
