//! # campuslearn-core
//!
//! Core library for CampusLearn's chatbot-escalation workflow.
//!
//! When the CampusLearn chatbot cannot resolve a student's question, it
//! raises an escalation that must reach a human tutor. This library provides:
//! - Domain types for escalations, tutors, and workflow state
//! - A SQLite-backed store with conditional (conflict-safe) status transitions
//! - The matching policy that ranks tutors by module coverage and load
//! - The assignment workflow service (auto-assign, manual assign, resolve,
//!   cancel, batch sweep, stats)
//! - Configuration and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use campuslearn_core::{Config, Database, EscalationService};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Arc::new(Database::open(&Config::database_path()).expect("failed to open database"));
//! db.migrate().expect("failed to run migrations");
//!
//! let service = EscalationService::new(db, config.matching.clone());
//! let outcome = service.process_pending_escalations().expect("sweep failed");
//! println!("assigned {} escalations", outcome.assigned);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use escalation::EscalationService;
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod escalation;
pub mod logging;
pub mod types;
