//! Database repository layer
//!
//! Provides query and mutation operations for escalations, the tutor
//! directory, and the collaborator record tables. Status transitions are
//! conditional updates guarded on the current status so concurrent writers
//! cannot both succeed; the loser observes zero affected rows.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Escalation operations
    // ============================================

    /// Insert a new escalation row
    pub fn insert_escalation(&self, escalation: &Escalation) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO escalations (id, conversation_id, student_id, student_name, tutor_id,
                                     module_code, original_question, escalation_reason, priority,
                                     status, message_thread_id, resolution_note,
                                     created_at, updated_at, assigned_at, resolved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                escalation.id,
                escalation.conversation_id,
                escalation.student_id,
                escalation.student_name,
                escalation.tutor_id,
                escalation.module_code,
                escalation.original_question,
                escalation.escalation_reason,
                escalation.priority.as_str(),
                escalation.status.as_str(),
                escalation.message_thread_id,
                escalation.resolution_note,
                escalation.created_at.to_rfc3339(),
                escalation.updated_at.to_rfc3339(),
                escalation.assigned_at.map(|t| t.to_rfc3339()),
                escalation.resolved_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Get an escalation by ID
    pub fn get_escalation(&self, id: &str) -> Result<Option<Escalation>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM escalations WHERE id = ?", [id], |row| {
            Self::row_to_escalation(row)
        })
        .optional()
        .map_err(Error::from)
    }

    /// List escalations with optional filtering
    pub fn list_escalations(&self, filter: &EscalationFilter) -> Result<Vec<Escalation>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from("SELECT * FROM escalations WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        if let Some(tutor_id) = &filter.tutor_id {
            sql.push_str(" AND tutor_id = ?");
            params.push(Box::new(tutor_id.clone()));
        }

        if let Some(module_code) = &filter.module_code {
            sql.push_str(" AND module_code = ?");
            params.push(Box::new(module_code.clone()));
        }

        sql.push_str(" ORDER BY created_at DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let escalations = stmt
            .query_map(params_refs.as_slice(), Self::row_to_escalation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(escalations)
    }

    /// List pending escalations in admin triage order: priority high to low,
    /// then oldest first.
    pub fn pending_escalations(&self) -> Result<Vec<Escalation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM escalations
            WHERE status = 'pending'
            ORDER BY
                CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END ASC,
                created_at ASC
            "#,
        )?;

        let escalations = stmt
            .query_map([], Self::row_to_escalation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(escalations)
    }

    /// List escalations currently or previously assigned to a tutor,
    /// newest first.
    pub fn escalations_for_tutor(&self, tutor_id: &str) -> Result<Vec<Escalation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM escalations
            WHERE tutor_id = ? AND status IN ('assigned', 'resolved')
            ORDER BY created_at DESC
            "#,
        )?;

        let escalations = stmt
            .query_map([tutor_id], Self::row_to_escalation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(escalations)
    }

    // ============================================
    // Conditional status transitions
    // ============================================
    //
    // Each transition is a single UPDATE guarded on the current status.
    // Returns true when the row was transitioned; false means the
    // precondition failed (row missing or status already moved on) and
    // nothing was mutated.

    /// Bind a tutor to a pending escalation.
    pub fn mark_assigned(
        &self,
        escalation_id: &str,
        tutor_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            UPDATE escalations
            SET tutor_id = ?1, status = 'assigned', assigned_at = ?2, updated_at = ?2
            WHERE id = ?3 AND status = 'pending'
            "#,
            params![tutor_id, at.to_rfc3339(), escalation_id],
        )?;
        Ok(changed > 0)
    }

    /// Close an assigned escalation, recording an optional resolution note.
    pub fn mark_resolved(
        &self,
        escalation_id: &str,
        note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            UPDATE escalations
            SET status = 'resolved', resolution_note = ?1, resolved_at = ?2, updated_at = ?2
            WHERE id = ?3 AND status = 'assigned'
            "#,
            params![note, at.to_rfc3339(), escalation_id],
        )?;
        Ok(changed > 0)
    }

    /// Cancel a pending or assigned escalation.
    pub fn mark_cancelled(&self, escalation_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            UPDATE escalations
            SET status = 'cancelled', updated_at = ?1
            WHERE id = ?2 AND status IN ('pending', 'assigned')
            "#,
            params![at.to_rfc3339(), escalation_id],
        )?;
        Ok(changed > 0)
    }

    /// Record the message thread opened for an assigned escalation.
    ///
    /// Best-effort post-assignment bookkeeping; not status-guarded.
    pub fn set_message_thread(&self, escalation_id: &str, thread_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE escalations SET message_thread_id = ?1 WHERE id = ?2",
            params![thread_id, escalation_id],
        )?;
        Ok(())
    }

    /// Column text that fails to parse surfaces as a conversion error
    /// instead of a defaulted value, so corrupt rows never pass for
    /// valid pending work.
    fn conversion_error(
        row: &Row,
        column: &str,
        message: String,
    ) -> rusqlite::Result<rusqlite::Error> {
        let idx = row.as_ref().column_index(column)?;
        Ok(rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            message.into(),
        ))
    }

    fn column_timestamp(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = row.get(column)?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(dt) => Ok(dt.with_timezone(&Utc)),
            Err(e) => Err(Self::conversion_error(
                row,
                column,
                format!("invalid timestamp {:?}: {}", raw, e),
            )?),
        }
    }

    fn column_timestamp_opt(row: &Row, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = row.get(column)?;
        match raw {
            None => Ok(None),
            Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(dt) => Ok(Some(dt.with_timezone(&Utc))),
                Err(e) => Err(Self::conversion_error(
                    row,
                    column,
                    format!("invalid timestamp {:?}: {}", raw, e),
                )?),
            },
        }
    }

    fn column_parsed<T>(row: &Row, column: &str) -> rusqlite::Result<T>
    where
        T: std::str::FromStr<Err = String>,
    {
        let raw: String = row.get(column)?;
        match raw.parse() {
            Ok(value) => Ok(value),
            Err(e) => Err(Self::conversion_error(row, column, e)?),
        }
    }

    fn row_to_escalation(row: &Row) -> rusqlite::Result<Escalation> {
        Ok(Escalation {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            student_id: row.get("student_id")?,
            student_name: row.get("student_name")?,
            tutor_id: row.get("tutor_id")?,
            module_code: row.get("module_code")?,
            original_question: row.get("original_question")?,
            escalation_reason: row.get("escalation_reason")?,
            priority: Self::column_parsed::<Priority>(row, "priority")?,
            status: Self::column_parsed::<EscalationStatus>(row, "status")?,
            message_thread_id: row.get("message_thread_id")?,
            resolution_note: row.get("resolution_note")?,
            created_at: Self::column_timestamp(row, "created_at")?,
            updated_at: Self::column_timestamp(row, "updated_at")?,
            assigned_at: Self::column_timestamp_opt(row, "assigned_at")?,
            resolved_at: Self::column_timestamp_opt(row, "resolved_at")?,
        })
    }

    // ============================================
    // Tutor directory operations
    // ============================================

    /// Insert or update a tutor
    pub fn upsert_tutor(&self, tutor: &TutorProfile) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO tutors (id, first_name, last_name, email, modules, active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = excluded.email,
                modules = excluded.modules,
                active = excluded.active
            "#,
            params![
                tutor.id,
                tutor.first_name,
                tutor.last_name,
                tutor.email,
                serde_json::to_string(&tutor.modules)?,
                tutor.active as i64,
            ],
        )?;
        Ok(())
    }

    /// Get a tutor by ID
    pub fn get_tutor(&self, id: &str) -> Result<Option<TutorProfile>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM tutors WHERE id = ?", [id], |row| {
            Self::row_to_tutor(row)
        })
        .optional()
        .map_err(Error::from)
    }

    /// List active tutors, ordered by id for deterministic downstream ranking
    pub fn active_tutors(&self) -> Result<Vec<TutorProfile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM tutors WHERE active = 1 ORDER BY id ASC")?;

        let tutors = stmt
            .query_map([], Self::row_to_tutor)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tutors)
    }

    /// Count of currently assigned escalations per tutor.
    ///
    /// Tutors with no assigned escalations are absent from the map.
    pub fn assigned_counts(&self) -> Result<HashMap<String, i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT tutor_id, COUNT(*)
            FROM escalations
            WHERE status = 'assigned' AND tutor_id IS NOT NULL
            GROUP BY tutor_id
            "#,
        )?;

        let counts: HashMap<String, i64> = stmt
            .query_map([], |row| {
                let tutor_id: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((tutor_id, count))
            })?
            .collect::<std::result::Result<_, _>>()?;

        Ok(counts)
    }

    fn row_to_tutor(row: &Row) -> rusqlite::Result<TutorProfile> {
        let modules_str: String = row.get("modules")?;
        let active: i64 = row.get("active")?;

        Ok(TutorProfile {
            id: row.get("id")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            email: row.get("email")?,
            modules: serde_json::from_str(&modules_str).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    row.as_ref().column_index("modules").unwrap_or(0),
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            active: active != 0,
        })
    }

    // ============================================
    // Collaborator records
    // ============================================

    /// Record a message thread opened between a student and a tutor
    pub fn create_message_thread(
        &self,
        thread_id: &str,
        student_id: &str,
        tutor_id: &str,
        opening_message: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO message_threads (id, student_id, tutor_id, opening_message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                thread_id,
                student_id,
                tutor_id,
                opening_message,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Record a fire-and-forget notification for a tutor
    pub fn insert_tutor_notification(
        &self,
        tutor_id: &str,
        escalation_id: &str,
        notification_type: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO tutor_notifications (tutor_id, escalation_id, notification_type, status, created_at)
            VALUES (?1, ?2, ?3, 'pending', ?4)
            "#,
            params![
                tutor_id,
                escalation_id,
                notification_type,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ============================================
    // Statistics
    // ============================================

    /// Count escalations by status
    pub fn count_by_status(&self) -> Result<EscalationStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM escalations GROUP BY status")?;

        let counts: HashMap<String, i64> = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count))
            })?
            .collect::<std::result::Result<_, _>>()?;

        let stats = EscalationStats {
            pending: counts.get("pending").copied().unwrap_or(0),
            assigned: counts.get("assigned").copied().unwrap_or(0),
            resolved: counts.get("resolved").copied().unwrap_or(0),
            cancelled: counts.get("cancelled").copied().unwrap_or(0),
            total: counts.values().sum(),
        };

        Ok(stats)
    }
}
