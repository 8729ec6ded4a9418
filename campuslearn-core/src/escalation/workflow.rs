//! Assignment workflow state machine
//!
//! | From     | Event   | To        |
//! |----------|---------|-----------|
//! | pending  | assign  | assigned  |
//! | pending  | cancel  | cancelled |
//! | assigned | resolve | resolved  |
//! | assigned | cancel  | cancelled |
//!
//! Everything else is an invalid transition. The service layer maps a `None`
//! here to a conflict error; the persisted row is never mutated on an
//! invalid transition.

use crate::types::EscalationStatus;

/// Events that move an escalation through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// Bind a tutor (auto- or manual assignment)
    Assign,
    /// Close the escalation as handled
    Resolve,
    /// Withdraw the escalation
    Cancel,
}

impl WorkflowEvent {
    /// Verb used in conflict error messages
    pub fn action(&self) -> &'static str {
        match self {
            WorkflowEvent::Assign => "assign",
            WorkflowEvent::Resolve => "resolve",
            WorkflowEvent::Cancel => "cancel",
        }
    }
}

/// Returns the successor status, or `None` when the transition is invalid.
pub fn next_status(current: EscalationStatus, event: WorkflowEvent) -> Option<EscalationStatus> {
    use EscalationStatus::*;
    use WorkflowEvent::*;

    match (current, event) {
        (Pending, Assign) => Some(Assigned),
        (Pending, Cancel) => Some(Cancelled),
        (Assigned, Resolve) => Some(Resolved),
        (Assigned, Cancel) => Some(Cancelled),
        _ => None,
    }
}
