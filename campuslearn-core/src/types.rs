//! Core domain types for CampusLearn escalations
//!
//! These types represent the canonical data model for the chatbot-escalation
//! workflow: a student question the chatbot could not resolve is raised as an
//! [`Escalation`] and routed to a human tutor.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Escalation** | A student chatbot question flagged for human tutor follow-up |
//! | **Tutor** | A user approved to tutor a set of modules |
//! | **Module** | A course unit identified by a code (e.g. `BCS101`) |
//! | **Auto-assign** | System-selected tutor match for a pending escalation |
//! | **Sweep** | A batch pass that auto-assigns every matchable pending escalation |
//!
//! An escalation with no module code (or the wildcard `General` code) is not
//! tied to a specific course and can be handled by any tutor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Status
// ============================================

/// Lifecycle state of an escalation.
///
/// `Pending` is the initial state; `Resolved` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    /// Waiting for a tutor
    Pending,
    /// Bound to a tutor, work in progress
    Assigned,
    /// Closed by the assigned tutor (or an admin)
    Resolved,
    /// Withdrawn; no further work will happen
    Cancelled,
}

impl EscalationStatus {
    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStatus::Pending => "pending",
            EscalationStatus::Assigned => "assigned",
            EscalationStatus::Resolved => "resolved",
            EscalationStatus::Cancelled => "cancelled",
        }
    }

    /// True when no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EscalationStatus::Resolved | EscalationStatus::Cancelled
        )
    }
}

impl std::str::FromStr for EscalationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EscalationStatus::Pending),
            "assigned" => Ok(EscalationStatus::Assigned),
            "resolved" => Ok(EscalationStatus::Resolved),
            "cancelled" => Ok(EscalationStatus::Cancelled),
            _ => Err(format!("unknown escalation status: {}", s)),
        }
    }
}

impl std::fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Priority
// ============================================

/// Urgency of an escalation, set at creation.
///
/// Influences triage ordering only; it does not gate assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Triage rank, highest urgency first (0 = most urgent).
    ///
    /// Stored explicitly so SQL `ORDER BY` and in-memory sorts agree.
    pub fn triage_rank(&self) -> i64 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Escalation
// ============================================

/// A student chatbot question flagged for human tutor follow-up.
///
/// Created in `Pending` and mutated only through the assignment workflow.
/// Invariant: `tutor_id` and `assigned_at` are set iff
/// `status ∈ {Assigned, Resolved}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    /// Unique identifier (UUID)
    pub id: String,
    /// Chatbot conversation the question came from
    pub conversation_id: String,
    /// Student who raised the original question
    pub student_id: String,
    /// Student display name, if known
    pub student_name: Option<String>,
    /// Assigned tutor; `None` while pending
    pub tutor_id: Option<String>,
    /// Module the question concerns; `None` narrows nothing
    pub module_code: Option<String>,
    /// Free-text question captured from the chatbot conversation
    pub original_question: String,
    /// Why the chatbot could not resolve the question
    pub escalation_reason: Option<String>,
    /// Urgency, set at creation
    pub priority: Priority,
    /// Workflow state
    pub status: EscalationStatus,
    /// Messaging thread opened between tutor and student after assignment
    pub message_thread_id: Option<String>,
    /// Optional note recorded when the escalation was resolved
    pub resolution_note: Option<String>,
    /// When the escalation was created
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// When a tutor was bound
    pub assigned_at: Option<DateTime<Utc>>,
    /// When the escalation was resolved
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Escalation {
    /// Module code used for matching; normalizes empty strings away.
    pub fn matching_module(&self) -> Option<&str> {
        self.module_code.as_deref().filter(|m| !m.is_empty())
    }
}

/// Input for creating a new escalation.
///
/// The store assigns the id and timestamps; status always starts `Pending`.
#[derive(Debug, Clone, Default)]
pub struct NewEscalation {
    pub conversation_id: String,
    pub student_id: String,
    pub student_name: Option<String>,
    pub module_code: Option<String>,
    pub original_question: String,
    pub escalation_reason: Option<String>,
    pub priority: Priority,
}

// ============================================
// Tutors
// ============================================

/// Directory record for a tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorProfile {
    /// Unique identifier
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Module codes the tutor is approved to tutor
    pub modules: Vec<String>,
    /// Inactive tutors are invisible to matching
    pub active: bool,
}

impl TutorProfile {
    /// Display name used in lists and notifications
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// True when the tutor is approved for the given module code
    pub fn covers_module(&self, module_code: &str) -> bool {
        self.modules.iter().any(|m| m == module_code)
    }
}

/// Tutor read model annotated with current load.
///
/// Not persisted independently; derived from the tutor directory plus the
/// count of escalations currently `Assigned` to the tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorWithAvailability {
    /// The underlying directory record
    pub profile: TutorProfile,
    /// Count of escalations currently assigned to this tutor
    pub current_escalations: i64,
    /// Below the configured concurrent-escalation cap
    pub is_available: bool,
}

// ============================================
// Stats and filters
// ============================================

/// Counts of escalations by status, recomputed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStats {
    pub total: i64,
    pub pending: i64,
    pub assigned: i64,
    pub resolved: i64,
    pub cancelled: i64,
}

/// Filter for listing escalations.
#[derive(Debug, Clone, Default)]
pub struct EscalationFilter {
    /// Restrict to a single status
    pub status: Option<EscalationStatus>,
    /// Restrict to escalations assigned to this tutor
    pub tutor_id: Option<String>,
    /// Restrict to a module code
    pub module_code: Option<String>,
    /// Maximum number of rows to return
    pub limit: Option<usize>,
}

/// Outcome of a batch auto-assignment sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Pending escalations examined
    pub processed: usize,
    /// Escalations assigned during the sweep
    pub assigned: usize,
    /// Escalations left pending because no tutor covered their module
    pub unmatched: usize,
}
