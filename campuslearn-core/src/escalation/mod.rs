//! Escalation assignment workflow
//!
//! The service that moves a chatbot escalation from `pending` through
//! `assigned` to `resolved` (or `cancelled`), matching pending escalations
//! to tutors by module coverage and current load.
//!
//! Every status transition is executed as a conditional update in the store,
//! so two concurrent writers cannot both succeed; the loser gets a conflict
//! and the row is left untouched.

pub mod collaborators;
pub mod matching;
pub mod workflow;

use crate::config::MatchingConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::*;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use self::collaborators::{Messenger, Notifier, StoreMessenger, StoreNotifier};
use self::workflow::{next_status, WorkflowEvent};

/// Service owning the escalation assignment workflow.
pub struct EscalationService {
    db: Arc<Database>,
    matching: MatchingConfig,
    messenger: Box<dyn Messenger>,
    notifier: Box<dyn Notifier>,
}

impl EscalationService {
    /// Build a service with the store-backed collaborators.
    pub fn new(db: Arc<Database>, matching: MatchingConfig) -> Self {
        let messenger = Box::new(StoreMessenger::new(Arc::clone(&db)));
        let notifier = Box::new(StoreNotifier::new(Arc::clone(&db)));
        Self::with_collaborators(db, matching, messenger, notifier)
    }

    /// Build a service with explicit collaborators (used by tests).
    pub fn with_collaborators(
        db: Arc<Database>,
        matching: MatchingConfig,
        messenger: Box<dyn Messenger>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            matching,
            messenger,
            notifier,
        }
    }

    // ============================================
    // Creation and queries
    // ============================================

    /// Create a new escalation in `pending` state.
    pub fn create_escalation(&self, new: NewEscalation) -> Result<Escalation> {
        if new.student_id.trim().is_empty() {
            return Err(Error::Validation("student id is required".to_string()));
        }
        if new.original_question.trim().is_empty() {
            return Err(Error::Validation(
                "original question is required".to_string(),
            ));
        }

        let now = Utc::now();
        let escalation = Escalation {
            id: Uuid::new_v4().to_string(),
            conversation_id: new.conversation_id,
            student_id: new.student_id,
            student_name: new.student_name,
            tutor_id: None,
            module_code: new.module_code.filter(|m| !m.is_empty()),
            original_question: new.original_question,
            escalation_reason: new.escalation_reason,
            priority: new.priority,
            status: EscalationStatus::Pending,
            message_thread_id: None,
            resolution_note: None,
            created_at: now,
            updated_at: now,
            assigned_at: None,
            resolved_at: None,
        };

        self.db.insert_escalation(&escalation)?;

        tracing::info!(
            escalation_id = %escalation.id,
            student_id = %escalation.student_id,
            module = escalation.module_code.as_deref().unwrap_or("General"),
            priority = %escalation.priority,
            "Escalation created"
        );

        Ok(escalation)
    }

    /// Get an escalation by id.
    pub fn get_escalation(&self, id: &str) -> Result<Escalation> {
        self.db
            .get_escalation(id)?
            .ok_or_else(|| Error::EscalationNotFound(id.to_string()))
    }

    /// All pending escalations in admin triage order (priority high to low,
    /// then oldest first).
    pub fn get_pending_escalations(&self) -> Result<Vec<Escalation>> {
        self.db.pending_escalations()
    }

    /// All escalations currently or previously assigned to a tutor.
    pub fn get_escalations_for_tutor(&self, tutor_id: &str) -> Result<Vec<Escalation>> {
        self.db.escalations_for_tutor(tutor_id)
    }

    /// Counts by status, recomputed on demand.
    pub fn get_escalation_stats(&self) -> Result<EscalationStats> {
        self.db.count_by_status()
    }

    // ============================================
    // Matching
    // ============================================

    /// Tutors qualifying for a module, annotated with current load.
    ///
    /// Load never excludes a tutor here; an overloaded tutor can still be
    /// chosen manually. Only auto-assignment honors the availability cap.
    pub fn find_available_tutors(
        &self,
        module_code: Option<&str>,
    ) -> Result<Vec<TutorWithAvailability>> {
        let tutors: Vec<TutorProfile> = self
            .db
            .active_tutors()?
            .into_iter()
            .filter(|t| matching::module_covered(module_code, &self.matching.wildcard_module, t))
            .collect();

        let counts = self.db.assigned_counts()?;
        Ok(matching::with_availability(
            tutors,
            &counts,
            self.matching.max_concurrent_escalations,
        ))
    }

    // ============================================
    // Workflow transitions
    // ============================================

    /// Manually bind a specific tutor to a pending escalation.
    ///
    /// The tutor must exist and be active, but is not required to cover the
    /// module or be under the load cap; manual assignment is the admin
    /// override.
    pub fn assign_tutor_to_escalation(&self, escalation_id: &str, tutor_id: &str) -> Result<()> {
        let escalation = self.get_escalation(escalation_id)?;
        let tutor = self
            .db
            .get_tutor(tutor_id)?
            .ok_or_else(|| Error::TutorNotFound(tutor_id.to_string()))?;
        if !tutor.active {
            return Err(Error::Validation(format!(
                "tutor {} is not active",
                tutor_id
            )));
        }

        self.apply_assignment(&escalation, &tutor)
    }

    /// System-selected tutor match for a pending escalation.
    ///
    /// Returns the chosen tutor id, or `None` when no available tutor covers
    /// the module; the escalation then stays `pending`. Given an unchanged
    /// store, repeated calls choose the same tutor.
    pub fn auto_assign_escalation(&self, escalation_id: &str) -> Result<Option<String>> {
        let escalation = self.get_escalation(escalation_id)?;

        if next_status(escalation.status, WorkflowEvent::Assign).is_none() {
            return Err(Error::conflict(
                escalation_id,
                escalation.status.as_str(),
                WorkflowEvent::Assign.action(),
            ));
        }

        let candidates = matching::rank_candidates(
            self.find_available_tutors(escalation.matching_module())?,
        );

        let Some(best) = candidates.into_iter().next() else {
            tracing::info!(
                escalation_id = %escalation.id,
                module = escalation.module_code.as_deref().unwrap_or("General"),
                "No available tutor covers this escalation"
            );
            return Ok(None);
        };

        tracing::debug!(
            escalation_id = %escalation.id,
            tutor_id = %best.profile.id,
            load = best.current_escalations,
            "Auto-assignment selected tutor"
        );

        self.apply_assignment(&escalation, &best.profile)?;
        Ok(Some(best.profile.id))
    }

    /// Batch auto-assignment sweep over all pending escalations.
    ///
    /// Escalations without a matching tutor remain pending; re-running when
    /// nothing changed produces no state change.
    pub fn process_pending_escalations(&self) -> Result<SweepOutcome> {
        self.process_pending_escalations_with(|_| {})
    }

    /// Sweep variant invoking `observe` once per pending escalation,
    /// used by frontends for progress reporting.
    pub fn process_pending_escalations_with<F>(&self, mut observe: F) -> Result<SweepOutcome>
    where
        F: FnMut(&Escalation),
    {
        let pending = self.db.pending_escalations()?;
        let mut outcome = SweepOutcome {
            processed: pending.len(),
            ..Default::default()
        };

        for escalation in pending {
            observe(&escalation);
            match self.auto_assign_escalation(&escalation.id) {
                Ok(Some(tutor_id)) => {
                    tracing::info!(
                        escalation_id = %escalation.id,
                        tutor_id = %tutor_id,
                        "Sweep auto-assigned escalation"
                    );
                    outcome.assigned += 1;
                }
                Ok(None) => outcome.unmatched += 1,
                // Another writer moved the row mid-sweep; skip it.
                Err(e) if e.is_conflict() => {
                    tracing::debug!(escalation_id = %escalation.id, "Escalation raced during sweep");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            processed = outcome.processed,
            assigned = outcome.assigned,
            unmatched = outcome.unmatched,
            "Pending-escalation sweep complete"
        );

        Ok(outcome)
    }

    /// Close an assigned escalation, optionally recording a resolution note.
    pub fn resolve_escalation(&self, escalation_id: &str, note: Option<&str>) -> Result<()> {
        let escalation = self.get_escalation(escalation_id)?;

        if next_status(escalation.status, WorkflowEvent::Resolve).is_none() {
            return Err(Error::conflict(
                escalation_id,
                escalation.status.as_str(),
                WorkflowEvent::Resolve.action(),
            ));
        }

        if !self.db.mark_resolved(escalation_id, note, Utc::now())? {
            return Err(Error::conflict(
                escalation_id,
                escalation.status.as_str(),
                WorkflowEvent::Resolve.action(),
            ));
        }

        tracing::info!(escalation_id = %escalation_id, "Escalation resolved");
        Ok(())
    }

    /// Withdraw a pending or assigned escalation.
    pub fn cancel_escalation(&self, escalation_id: &str) -> Result<()> {
        let escalation = self.get_escalation(escalation_id)?;

        if next_status(escalation.status, WorkflowEvent::Cancel).is_none() {
            return Err(Error::conflict(
                escalation_id,
                escalation.status.as_str(),
                WorkflowEvent::Cancel.action(),
            ));
        }

        if !self.db.mark_cancelled(escalation_id, Utc::now())? {
            return Err(Error::conflict(
                escalation_id,
                escalation.status.as_str(),
                WorkflowEvent::Cancel.action(),
            ));
        }

        tracing::info!(escalation_id = %escalation_id, "Escalation cancelled");
        Ok(())
    }

    // ============================================
    // Internals
    // ============================================

    /// Perform the conditional assignment plus best-effort side effects.
    fn apply_assignment(&self, escalation: &Escalation, tutor: &TutorProfile) -> Result<()> {
        if next_status(escalation.status, WorkflowEvent::Assign).is_none() {
            return Err(Error::conflict(
                &escalation.id,
                escalation.status.as_str(),
                WorkflowEvent::Assign.action(),
            ));
        }

        // The conditional update is the concurrency guard: if another writer
        // assigned first, zero rows change and we report the conflict.
        if !self
            .db
            .mark_assigned(&escalation.id, &tutor.id, Utc::now())?
        {
            return Err(Error::conflict(
                &escalation.id,
                escalation.status.as_str(),
                WorkflowEvent::Assign.action(),
            ));
        }

        tracing::info!(
            escalation_id = %escalation.id,
            tutor_id = %tutor.id,
            "Tutor assigned to escalation"
        );

        // Side effects after the transition are best effort; a messaging or
        // notification failure never rolls back the assignment.
        match self.messenger.open_thread(
            &tutor.id,
            &escalation.student_id,
            &opening_message(escalation),
        ) {
            Ok(thread_id) => {
                if let Err(e) = self.db.set_message_thread(&escalation.id, &thread_id) {
                    tracing::warn!(
                        escalation_id = %escalation.id,
                        error = %e,
                        "Failed to record message thread id"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    escalation_id = %escalation.id,
                    error = %e,
                    "Failed to open message thread"
                );
            }
        }

        self.notifier.notify_assignment(tutor, escalation);

        Ok(())
    }
}

/// Opening message sent from the tutor to the student once assigned.
fn opening_message(escalation: &Escalation) -> String {
    format!(
        "Hi! I'm your assigned tutor for this CampusLearn escalation.\n\n\
         Student question: {}\n\
         Module: {}\n\
         Escalation reason: {}\n\n\
         Feel free to ask any follow-up questions here.",
        escalation.original_question,
        escalation.module_code.as_deref().unwrap_or("General"),
        escalation
            .escalation_reason
            .as_deref()
            .unwrap_or("Complex question requiring human assistance"),
    )
}
