//! Collaborator seams for the assignment workflow
//!
//! Messaging and notifications are external concerns from the workflow's
//! point of view. They are modelled as traits so the service stays testable
//! and their failures never fail an assignment.

use crate::db::Database;
use crate::error::Result;
use crate::types::{Escalation, TutorProfile};
use std::sync::Arc;
use uuid::Uuid;

/// Opens a message thread between a tutor and a student.
///
/// The workflow only cares about the opaque thread id it gets back.
pub trait Messenger: Send + Sync {
    fn open_thread(
        &self,
        tutor_id: &str,
        student_id: &str,
        opening_message: &str,
    ) -> Result<String>;
}

/// Fire-and-forget tutor notification. No delivery guarantee implied;
/// implementations log failures instead of propagating them.
pub trait Notifier: Send + Sync {
    fn notify_assignment(&self, tutor: &TutorProfile, escalation: &Escalation);
}

/// Messenger backed by the local store's `message_threads` table.
pub struct StoreMessenger {
    db: Arc<Database>,
}

impl StoreMessenger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl Messenger for StoreMessenger {
    fn open_thread(
        &self,
        tutor_id: &str,
        student_id: &str,
        opening_message: &str,
    ) -> Result<String> {
        let thread_id = Uuid::new_v4().to_string();
        self.db
            .create_message_thread(&thread_id, student_id, tutor_id, opening_message)?;
        Ok(thread_id)
    }
}

/// Notifier that records an in-app notification row and logs it.
pub struct StoreNotifier {
    db: Arc<Database>,
}

impl StoreNotifier {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl Notifier for StoreNotifier {
    fn notify_assignment(&self, tutor: &TutorProfile, escalation: &Escalation) {
        if let Err(e) =
            self.db
                .insert_tutor_notification(&tutor.id, &escalation.id, "in_app")
        {
            tracing::warn!(
                tutor_id = %tutor.id,
                escalation_id = %escalation.id,
                error = %e,
                "Failed to record tutor notification"
            );
            return;
        }

        tracing::info!(
            tutor_id = %tutor.id,
            escalation_id = %escalation.id,
            module = escalation.module_code.as_deref().unwrap_or("General"),
            "Tutor notified of new escalation"
        );
    }
}
