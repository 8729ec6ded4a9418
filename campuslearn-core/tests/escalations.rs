//! Integration tests for the escalation assignment workflow
//!
//! These exercise the service end to end against an in-memory store:
//! creation, matching, auto- and manual assignment, the batch sweep,
//! resolution, cancellation, and the stats rollup.

use std::sync::{Arc, Mutex};

use campuslearn_core::config::MatchingConfig;
use campuslearn_core::escalation::collaborators::{Messenger, Notifier};
use campuslearn_core::{
    Database, Error, Escalation, EscalationService, EscalationStatus, NewEscalation, Priority,
    TutorProfile,
};

/// Messenger double that records every opened thread.
#[derive(Default)]
struct RecordingMessenger {
    threads: Mutex<Vec<(String, String)>>,
}

impl Messenger for RecordingMessenger {
    fn open_thread(
        &self,
        tutor_id: &str,
        student_id: &str,
        _opening_message: &str,
    ) -> campuslearn_core::Result<String> {
        let mut threads = self.threads.lock().unwrap();
        threads.push((tutor_id.to_string(), student_id.to_string()));
        Ok(format!("thread-{}", threads.len()))
    }
}

/// Notifier double that counts notifications.
#[derive(Default)]
struct RecordingNotifier {
    notified: Mutex<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify_assignment(&self, tutor: &TutorProfile, escalation: &Escalation) {
        self.notified
            .lock()
            .unwrap()
            .push((tutor.id.clone(), escalation.id.clone()));
    }
}

struct TestHarness {
    db: Arc<Database>,
    service: EscalationService,
    messenger: Arc<RecordingMessenger>,
    notifier: Arc<RecordingNotifier>,
}

/// Trait-object adapters so the harness can keep handles to its doubles.
struct SharedMessenger(Arc<RecordingMessenger>);
impl Messenger for SharedMessenger {
    fn open_thread(
        &self,
        tutor_id: &str,
        student_id: &str,
        opening_message: &str,
    ) -> campuslearn_core::Result<String> {
        self.0.open_thread(tutor_id, student_id, opening_message)
    }
}

struct SharedNotifier(Arc<RecordingNotifier>);
impl Notifier for SharedNotifier {
    fn notify_assignment(&self, tutor: &TutorProfile, escalation: &Escalation) {
        self.0.notify_assignment(tutor, escalation)
    }
}

fn harness() -> TestHarness {
    campuslearn_core::logging::init_test();

    let db = Arc::new(Database::open_in_memory().expect("open db"));
    db.migrate().expect("migrate");

    let messenger = Arc::new(RecordingMessenger::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = EscalationService::with_collaborators(
        Arc::clone(&db),
        MatchingConfig::default(),
        Box::new(SharedMessenger(Arc::clone(&messenger))),
        Box::new(SharedNotifier(Arc::clone(&notifier))),
    );

    TestHarness {
        db,
        service,
        messenger,
        notifier,
    }
}

fn add_tutor(h: &TestHarness, id: &str, modules: &[&str]) {
    h.db.upsert_tutor(&TutorProfile {
        id: id.to_string(),
        first_name: "Tutor".to_string(),
        last_name: id.to_uppercase(),
        email: format!("{}@campuslearn.example", id),
        modules: modules.iter().map(|m| m.to_string()).collect(),
        active: true,
    })
    .expect("upsert tutor");
}

fn new_escalation(module: Option<&str>, priority: Priority) -> NewEscalation {
    NewEscalation {
        conversation_id: "conv-1".to_string(),
        student_id: "student-1".to_string(),
        student_name: Some("Thandi Nkosi".to_string()),
        module_code: module.map(|m| m.to_string()),
        original_question: "How do AVL rotations work?".to_string(),
        escalation_reason: Some("Chatbot could not explain rotations".to_string()),
        priority,
    }
}

// ============================================
// Creation
// ============================================

#[test]
fn created_escalations_start_pending_with_no_tutor() {
    let h = harness();
    let escalation = h
        .service
        .create_escalation(new_escalation(Some("BCS101"), Priority::Medium))
        .unwrap();

    assert_eq!(escalation.status, EscalationStatus::Pending);
    assert!(escalation.tutor_id.is_none());
    assert!(escalation.assigned_at.is_none());
}

#[test]
fn creation_requires_a_question_and_student() {
    let h = harness();

    let mut missing_question = new_escalation(None, Priority::Medium);
    missing_question.original_question = "  ".to_string();
    assert!(matches!(
        h.service.create_escalation(missing_question),
        Err(Error::Validation(_))
    ));

    let mut missing_student = new_escalation(None, Priority::Medium);
    missing_student.student_id = String::new();
    assert!(matches!(
        h.service.create_escalation(missing_student),
        Err(Error::Validation(_))
    ));
}

// ============================================
// Matching
// ============================================

#[test]
fn module_filter_excludes_non_covering_tutors() {
    let h = harness();
    add_tutor(&h, "t-cs", &["CS101"]);
    add_tutor(&h, "t-math", &["MAT201"]);

    let tutors = h.service.find_available_tutors(Some("CS101")).unwrap();
    assert_eq!(tutors.len(), 1);
    assert_eq!(tutors[0].profile.id, "t-cs");
}

#[test]
fn no_module_lists_every_active_tutor() {
    let h = harness();
    add_tutor(&h, "t1", &["CS101"]);
    add_tutor(&h, "t2", &[]);

    assert_eq!(h.service.find_available_tutors(None).unwrap().len(), 2);
    // The wildcard code behaves like no module at all
    assert_eq!(
        h.service.find_available_tutors(Some("General")).unwrap().len(),
        2
    );
}

#[test]
fn auto_assign_never_selects_a_tutor_outside_the_module() {
    let h = harness();
    add_tutor(&h, "t-math", &["MAT201"]);

    let escalation = h
        .service
        .create_escalation(new_escalation(Some("CS101"), Priority::Medium))
        .unwrap();

    let chosen = h.service.auto_assign_escalation(&escalation.id).unwrap();
    assert_eq!(chosen, None);

    let reloaded = h.service.get_escalation(&escalation.id).unwrap();
    assert_eq!(reloaded.status, EscalationStatus::Pending);
}

#[test]
fn auto_assign_prefers_the_least_busy_tutor() {
    let h = harness();
    add_tutor(&h, "t1", &["BCS101"]);
    add_tutor(&h, "t2", &["BCS101"]);

    // Give t1 a load of two assigned escalations
    for _ in 0..2 {
        let e = h
            .service
            .create_escalation(new_escalation(Some("BCS101"), Priority::Medium))
            .unwrap();
        h.service.assign_tutor_to_escalation(&e.id, "t1").unwrap();
    }

    let e1 = h
        .service
        .create_escalation(new_escalation(Some("BCS101"), Priority::High))
        .unwrap();
    let chosen = h.service.auto_assign_escalation(&e1.id).unwrap();
    assert_eq!(chosen.as_deref(), Some("t2"));

    let stats = h.service.get_escalation_stats().unwrap();
    assert_eq!(stats.assigned, 3);
    assert_eq!(stats.pending, 0);
}

#[test]
fn auto_assign_is_deterministic_for_an_unchanged_pool() {
    let h = harness();
    add_tutor(&h, "t-b", &["CS101"]);
    add_tutor(&h, "t-a", &["CS101"]);

    // Equal load: the id tiebreak must pick the same tutor every time.
    for _ in 0..3 {
        let e = h
            .service
            .create_escalation(new_escalation(Some("CS101"), Priority::Medium))
            .unwrap();
        let ranked = h.service.find_available_tutors(Some("CS101")).unwrap();
        let first = campuslearn_core::escalation::matching::rank_candidates(ranked);
        assert_eq!(first[0].profile.id, "t-a");
        h.service.cancel_escalation(&e.id).unwrap();
    }
}

#[test]
fn auto_assign_skips_tutors_at_the_concurrency_cap() {
    let h = harness();
    add_tutor(&h, "t1", &["CS101"]);

    // Saturate t1 to the default cap of 5
    for _ in 0..5 {
        let e = h
            .service
            .create_escalation(new_escalation(Some("CS101"), Priority::Medium))
            .unwrap();
        h.service.assign_tutor_to_escalation(&e.id, "t1").unwrap();
    }

    let e = h
        .service
        .create_escalation(new_escalation(Some("CS101"), Priority::Medium))
        .unwrap();
    assert_eq!(h.service.auto_assign_escalation(&e.id).unwrap(), None);

    // Manual assignment ignores the cap
    h.service.assign_tutor_to_escalation(&e.id, "t1").unwrap();
    assert_eq!(
        h.service.get_escalation(&e.id).unwrap().status,
        EscalationStatus::Assigned
    );
}

// ============================================
// Workflow transitions
// ============================================

#[test]
fn assignment_binds_tutor_and_opens_a_thread() {
    let h = harness();
    add_tutor(&h, "t1", &["BCS101"]);

    let e = h
        .service
        .create_escalation(new_escalation(Some("BCS101"), Priority::Medium))
        .unwrap();
    h.service.assign_tutor_to_escalation(&e.id, "t1").unwrap();

    let reloaded = h.service.get_escalation(&e.id).unwrap();
    assert_eq!(reloaded.status, EscalationStatus::Assigned);
    assert_eq!(reloaded.tutor_id.as_deref(), Some("t1"));
    assert!(reloaded.assigned_at.is_some());
    assert_eq!(reloaded.message_thread_id.as_deref(), Some("thread-1"));

    assert_eq!(h.messenger.threads.lock().unwrap().len(), 1);
    assert_eq!(h.notifier.notified.lock().unwrap().len(), 1);
}

#[test]
fn second_assignment_of_the_same_escalation_conflicts() {
    let h = harness();
    add_tutor(&h, "t1", &["BCS101"]);
    add_tutor(&h, "t2", &["BCS101"]);

    let e = h
        .service
        .create_escalation(new_escalation(Some("BCS101"), Priority::Medium))
        .unwrap();

    h.service.assign_tutor_to_escalation(&e.id, "t1").unwrap();
    let second = h.service.assign_tutor_to_escalation(&e.id, "t2");
    assert!(matches!(second, Err(Error::Conflict { .. })));

    // First assignment must not be overwritten
    let reloaded = h.service.get_escalation(&e.id).unwrap();
    assert_eq!(reloaded.tutor_id.as_deref(), Some("t1"));
}

#[test]
fn resolving_a_pending_escalation_conflicts() {
    let h = harness();
    let e = h
        .service
        .create_escalation(new_escalation(None, Priority::Medium))
        .unwrap();

    let result = h.service.resolve_escalation(&e.id, None);
    assert!(matches!(result, Err(Error::Conflict { .. })));
    assert_eq!(
        h.service.get_escalation(&e.id).unwrap().status,
        EscalationStatus::Pending
    );
}

#[test]
fn resolve_records_the_note_and_timestamp() {
    let h = harness();
    add_tutor(&h, "t1", &[]);

    let e = h
        .service
        .create_escalation(new_escalation(None, Priority::Medium))
        .unwrap();
    h.service.assign_tutor_to_escalation(&e.id, "t1").unwrap();
    h.service
        .resolve_escalation(&e.id, Some("Walked through rotations on a call"))
        .unwrap();

    let reloaded = h.service.get_escalation(&e.id).unwrap();
    assert_eq!(reloaded.status, EscalationStatus::Resolved);
    assert_eq!(
        reloaded.resolution_note.as_deref(),
        Some("Walked through rotations on a call")
    );
    assert!(reloaded.resolved_at.is_some());
    // Invariant: resolved escalations keep their tutor binding
    assert_eq!(reloaded.tutor_id.as_deref(), Some("t1"));
}

#[test]
fn cancelled_escalations_reject_further_events() {
    let h = harness();
    let e = h
        .service
        .create_escalation(new_escalation(Some("XYZ999"), Priority::Medium))
        .unwrap();

    // No tutor covers XYZ999, so the escalation stays pending
    assert_eq!(h.service.auto_assign_escalation(&e.id).unwrap(), None);

    h.service.cancel_escalation(&e.id).unwrap();
    assert_eq!(
        h.service.get_escalation(&e.id).unwrap().status,
        EscalationStatus::Cancelled
    );

    assert!(matches!(
        h.service.resolve_escalation(&e.id, None),
        Err(Error::Conflict { .. })
    ));
    assert!(matches!(
        h.service.cancel_escalation(&e.id),
        Err(Error::Conflict { .. })
    ));
}

#[test]
fn unknown_ids_are_not_found() {
    let h = harness();
    assert!(matches!(
        h.service.auto_assign_escalation("missing"),
        Err(Error::EscalationNotFound(_))
    ));
    assert!(matches!(
        h.service.assign_tutor_to_escalation("missing", "t1"),
        Err(Error::EscalationNotFound(_))
    ));

    let e = h
        .service
        .create_escalation(new_escalation(None, Priority::Medium))
        .unwrap();
    assert!(matches!(
        h.service.assign_tutor_to_escalation(&e.id, "nobody"),
        Err(Error::TutorNotFound(_))
    ));
}

// ============================================
// Batch sweep
// ============================================

#[test]
fn sweep_assigns_matchable_items_and_leaves_the_rest_pending() {
    let h = harness();
    add_tutor(&h, "t1", &["BCS101"]);

    let matchable = h
        .service
        .create_escalation(new_escalation(Some("BCS101"), Priority::High))
        .unwrap();
    let orphan = h
        .service
        .create_escalation(new_escalation(Some("XYZ999"), Priority::Low))
        .unwrap();

    let outcome = h.service.process_pending_escalations().unwrap();
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.assigned, 1);
    assert_eq!(outcome.unmatched, 1);

    assert_eq!(
        h.service.get_escalation(&matchable.id).unwrap().status,
        EscalationStatus::Assigned
    );
    assert_eq!(
        h.service.get_escalation(&orphan.id).unwrap().status,
        EscalationStatus::Pending
    );

    // Idempotent: a second sweep with no new tutors changes nothing
    let second = h.service.process_pending_escalations().unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(second.assigned, 0);
    assert_eq!(second.unmatched, 1);
}

#[test]
fn sweep_spreads_load_across_tutors() {
    let h = harness();
    add_tutor(&h, "t1", &["BCS101"]);
    add_tutor(&h, "t2", &["BCS101"]);

    for _ in 0..4 {
        h.service
            .create_escalation(new_escalation(Some("BCS101"), Priority::Medium))
            .unwrap();
    }

    let outcome = h.service.process_pending_escalations().unwrap();
    assert_eq!(outcome.assigned, 4);

    // Least-busy-first ranking alternates between the two tutors
    assert_eq!(h.service.get_escalations_for_tutor("t1").unwrap().len(), 2);
    assert_eq!(h.service.get_escalations_for_tutor("t2").unwrap().len(), 2);
}

#[test]
fn sweep_observer_sees_every_pending_escalation() {
    let h = harness();
    add_tutor(&h, "t1", &["BCS101"]);

    let a = h
        .service
        .create_escalation(new_escalation(Some("BCS101"), Priority::High))
        .unwrap();
    let b = h
        .service
        .create_escalation(new_escalation(Some("XYZ999"), Priority::Low))
        .unwrap();

    let mut seen = Vec::new();
    let outcome = h
        .service
        .process_pending_escalations_with(|escalation| seen.push(escalation.id.clone()))
        .unwrap();

    // One callback per swept item, in triage order, matched or not
    assert_eq!(seen, vec![a.id.clone(), b.id.clone()]);
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.assigned, 1);
    assert_eq!(outcome.unmatched, 1);
}

// ============================================
// Queries and stats
// ============================================

#[test]
fn pending_list_is_priority_then_age_ordered() {
    let h = harness();

    let low = h
        .service
        .create_escalation(new_escalation(None, Priority::Low))
        .unwrap();
    let high = h
        .service
        .create_escalation(new_escalation(None, Priority::High))
        .unwrap();
    let medium = h
        .service
        .create_escalation(new_escalation(None, Priority::Medium))
        .unwrap();

    let pending = h.service.get_pending_escalations().unwrap();
    let ids: Vec<&str> = pending.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![high.id.as_str(), medium.id.as_str(), low.id.as_str()]);
}

#[test]
fn tutor_history_includes_resolved_items() {
    let h = harness();
    add_tutor(&h, "t1", &[]);

    let e1 = h
        .service
        .create_escalation(new_escalation(None, Priority::Medium))
        .unwrap();
    let e2 = h
        .service
        .create_escalation(new_escalation(None, Priority::Medium))
        .unwrap();
    h.service.assign_tutor_to_escalation(&e1.id, "t1").unwrap();
    h.service.assign_tutor_to_escalation(&e2.id, "t1").unwrap();
    h.service.resolve_escalation(&e1.id, None).unwrap();

    let history = h.service.get_escalations_for_tutor("t1").unwrap();
    assert_eq!(history.len(), 2);
}

#[test]
fn stats_counts_sum_to_total() {
    let h = harness();
    add_tutor(&h, "t1", &[]);

    let e1 = h
        .service
        .create_escalation(new_escalation(None, Priority::Medium))
        .unwrap();
    let e2 = h
        .service
        .create_escalation(new_escalation(None, Priority::Medium))
        .unwrap();
    h.service
        .create_escalation(new_escalation(None, Priority::Medium))
        .unwrap();

    h.service.assign_tutor_to_escalation(&e1.id, "t1").unwrap();
    h.service.resolve_escalation(&e1.id, None).unwrap();
    h.service.cancel_escalation(&e2.id).unwrap();

    let stats = h.service.get_escalation_stats().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.assigned, 0);
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(
        stats.total,
        stats.pending + stats.assigned + stats.resolved + stats.cancelled
    );
}
