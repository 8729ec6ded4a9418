//! Tutor matching policy
//!
//! Pure functions that decide which tutors qualify for an escalation and in
//! what order auto-assignment should consider them.
//!
//! Ranking policy: fewest currently assigned escalations first, then tutor id
//! ascending. The id tiebreak makes repeated ranking of the same pool
//! deterministic.

use crate::types::{TutorProfile, TutorWithAvailability};
use std::collections::HashMap;

/// True when a tutor qualifies for the given module code.
///
/// `None` and the wildcard code (`General` by default) match every tutor;
/// otherwise the tutor's approved module set must contain the code.
pub fn module_covered(
    module_code: Option<&str>,
    wildcard_module: &str,
    tutor: &TutorProfile,
) -> bool {
    match module_code {
        None => true,
        Some(code) if code == wildcard_module => true,
        Some(code) => tutor.covers_module(code),
    }
}

/// Annotate tutors with their current load and availability.
///
/// Load is informational here: no tutor is dropped from the result because
/// of it. An overloaded tutor can still be chosen manually.
pub fn with_availability(
    tutors: Vec<TutorProfile>,
    assigned_counts: &HashMap<String, i64>,
    max_concurrent: i64,
) -> Vec<TutorWithAvailability> {
    tutors
        .into_iter()
        .map(|profile| {
            let current_escalations = assigned_counts.get(&profile.id).copied().unwrap_or(0);
            TutorWithAvailability {
                current_escalations,
                is_available: current_escalations < max_concurrent,
                profile,
            }
        })
        .collect()
}

/// Rank auto-assignment candidates: available tutors only, least busy first,
/// tutor id as the deterministic tiebreak.
pub fn rank_candidates(tutors: Vec<TutorWithAvailability>) -> Vec<TutorWithAvailability> {
    let mut candidates: Vec<TutorWithAvailability> =
        tutors.into_iter().filter(|t| t.is_available).collect();

    candidates.sort_by(|a, b| {
        a.current_escalations
            .cmp(&b.current_escalations)
            .then_with(|| a.profile.id.cmp(&b.profile.id))
    });

    candidates
}
