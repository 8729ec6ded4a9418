//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: escalation workflow schema
    r#"
    -- ============================================
    -- Tutor directory
    -- ============================================

    CREATE TABLE IF NOT EXISTS tutors (
        id          TEXT PRIMARY KEY,
        first_name  TEXT NOT NULL,
        last_name   TEXT NOT NULL,
        email       TEXT NOT NULL,

        -- JSON array of approved module codes
        modules     JSON NOT NULL,

        active      INTEGER NOT NULL DEFAULT 1
    );

    -- ============================================
    -- Escalations
    -- ============================================

    CREATE TABLE IF NOT EXISTS escalations (
        id                TEXT PRIMARY KEY,
        conversation_id   TEXT NOT NULL,
        student_id        TEXT NOT NULL,
        student_name      TEXT,
        tutor_id          TEXT REFERENCES tutors(id),
        module_code       TEXT,
        original_question TEXT NOT NULL,
        escalation_reason TEXT,
        priority          TEXT NOT NULL DEFAULT 'medium',
        status            TEXT NOT NULL DEFAULT 'pending',
        message_thread_id TEXT,
        resolution_note   TEXT,
        created_at        DATETIME NOT NULL,
        updated_at        DATETIME NOT NULL,
        assigned_at       DATETIME,
        resolved_at       DATETIME
    );

    CREATE INDEX IF NOT EXISTS idx_escalations_status ON escalations(status);
    CREATE INDEX IF NOT EXISTS idx_escalations_tutor  ON escalations(tutor_id);

    -- ============================================
    -- Collaborator records
    -- ============================================

    -- Message thread opened between tutor and student once assigned
    CREATE TABLE IF NOT EXISTS message_threads (
        id              TEXT PRIMARY KEY,
        student_id      TEXT NOT NULL,
        tutor_id        TEXT NOT NULL,
        opening_message TEXT NOT NULL,
        created_at      DATETIME NOT NULL
    );

    -- Fire-and-forget notification records for tutors
    CREATE TABLE IF NOT EXISTS tutor_notifications (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        tutor_id          TEXT NOT NULL REFERENCES tutors(id),
        escalation_id     TEXT NOT NULL REFERENCES escalations(id),
        notification_type TEXT NOT NULL,
        status            TEXT NOT NULL DEFAULT 'pending',
        created_at        DATETIME NOT NULL
    );
    "#,
];

/// Run all pending migrations on the connection
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}
