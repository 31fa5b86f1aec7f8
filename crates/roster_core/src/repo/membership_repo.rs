//! Per-grade membership index contracts and SQLite implementation.
//!
//! # Invariants
//! - `(grade_uuid, student_uuid)` is the primary key, so a second insert for
//!   the same pair is a no-op.
//! - `insert_membership` checks that both grade and student exist inside the
//!   same `IMMEDIATE` transaction as the insert. A concurrent cascading
//!   student delete therefore either runs first (the insert sees no student)
//!   or runs after and removes the new row.
//! - Listings are ordered `student_name COLLATE NOCASE ASC, student_uuid ASC`.

use crate::model::grade::GradeId;
use crate::model::membership::Membership;
use crate::model::student::StudentId;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::schema::{ensure_table_ready, parse_uuid};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const MEMBERSHIP_COLUMNS: &[&str] = &["grade_uuid", "student_uuid", "student_name", "added_at"];

/// Repository interface for grade membership rows.
pub trait MembershipRepository {
    /// Inserts the pair unless it already exists. Returns whether a row was
    /// written.
    fn insert_membership(
        &self,
        grade_id: GradeId,
        student_id: StudentId,
        student_name: &str,
    ) -> RepoResult<bool>;
    /// Deletes the pair if present. Returns whether a row was removed.
    fn delete_membership(&self, grade_id: GradeId, student_id: StudentId) -> RepoResult<bool>;
    fn list_memberships(&self, grade_id: GradeId) -> RepoResult<Vec<Membership>>;
    fn membership_exists(&self, grade_id: GradeId, student_id: StudentId) -> RepoResult<bool>;
    /// Every membership row referencing `student_id`, across all grades.
    fn list_for_student(&self, student_id: StudentId) -> RepoResult<Vec<Membership>>;
    /// Deletes the listed students from one grade in one batch.
    fn delete_memberships(&self, grade_id: GradeId, student_ids: &[StudentId])
        -> RepoResult<usize>;
}

/// SQLite-backed membership repository.
#[derive(Clone, Copy)]
pub struct SqliteMembershipRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMembershipRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table_ready(conn, "grade_memberships", MEMBERSHIP_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl MembershipRepository for SqliteMembershipRepository<'_> {
    fn insert_membership(
        &self,
        grade_id: GradeId,
        student_id: StudentId,
        student_name: &str,
    ) -> RepoResult<bool> {
        let grade_text = grade_id.to_string();
        let student_text = student_id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        if !row_exists(&tx, "SELECT EXISTS(SELECT 1 FROM grades WHERE uuid = ?1);", &grade_text)? {
            return Err(RepoError::GradeNotFound(grade_id));
        }
        if !row_exists(
            &tx,
            "SELECT EXISTS(SELECT 1 FROM students WHERE uuid = ?1);",
            &student_text,
        )? {
            return Err(RepoError::StudentNotFound(student_id));
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO grade_memberships (
                grade_uuid,
                student_uuid,
                student_name
            ) VALUES (?1, ?2, ?3);",
            params![grade_text.as_str(), student_text.as_str(), student_name],
        )?;
        tx.commit()?;
        Ok(inserted == 1)
    }

    fn delete_membership(&self, grade_id: GradeId, student_id: StudentId) -> RepoResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM grade_memberships
             WHERE grade_uuid = ?1
               AND student_uuid = ?2;",
            params![grade_id.to_string(), student_id.to_string()],
        )?;
        Ok(removed > 0)
    }

    fn list_memberships(&self, grade_id: GradeId) -> RepoResult<Vec<Membership>> {
        let mut stmt = self.conn.prepare(
            "SELECT grade_uuid, student_uuid, student_name, added_at
             FROM grade_memberships
             WHERE grade_uuid = ?1
             ORDER BY student_name COLLATE NOCASE ASC, student_uuid ASC;",
        )?;
        let mut rows = stmt.query([grade_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_membership_row(row)?);
        }
        Ok(items)
    }

    fn membership_exists(&self, grade_id: GradeId, student_id: StudentId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM grade_memberships
                WHERE grade_uuid = ?1
                  AND student_uuid = ?2
            );",
            params![grade_id.to_string(), student_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list_for_student(&self, student_id: StudentId) -> RepoResult<Vec<Membership>> {
        let mut stmt = self.conn.prepare(
            "SELECT grade_uuid, student_uuid, student_name, added_at
             FROM grade_memberships
             WHERE student_uuid = ?1
             ORDER BY grade_uuid ASC;",
        )?;
        let mut rows = stmt.query([student_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_membership_row(row)?);
        }
        Ok(items)
    }

    fn delete_memberships(
        &self,
        grade_id: GradeId,
        student_ids: &[StudentId],
    ) -> RepoResult<usize> {
        if student_ids.is_empty() {
            return Ok(0);
        }

        let grade_text = grade_id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut removed = 0;
        for student_id in student_ids {
            removed += tx.execute(
                "DELETE FROM grade_memberships
                 WHERE grade_uuid = ?1
                   AND student_uuid = ?2;",
                params![grade_text.as_str(), student_id.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }
}

fn row_exists(conn: &Connection, sql: &str, key: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(sql, [key], |row| row.get(0))?;
    Ok(exists == 1)
}

fn parse_membership_row(row: &Row<'_>) -> RepoResult<Membership> {
    let grade_text: String = row.get("grade_uuid")?;
    let student_text: String = row.get("student_uuid")?;
    Ok(Membership {
        grade_id: parse_uuid(&grade_text, "grade_memberships.grade_uuid")?,
        student_id: parse_uuid(&student_text, "grade_memberships.student_uuid")?,
        student_name: row.get("student_name")?,
        added_at: row.get("added_at")?,
    })
}
