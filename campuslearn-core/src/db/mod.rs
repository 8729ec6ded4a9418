//! Database layer for CampusLearn escalations
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Conditional status transitions for conflict-safe assignment

pub mod repo;
pub mod schema;

pub use repo::Database;
