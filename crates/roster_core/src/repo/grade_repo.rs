//! Grade directory contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist grade records and their cached `student_count`.
//! - Provide an atomic clamped counter adjustment so concurrent membership
//!   churn cannot lose updates.
//!
//! # Invariants
//! - `student_count` never goes below zero.
//! - `delete_grade` removes only the grade row. `delete_grade_cascade`
//!   removes the grade and its membership collection in one batch.

use crate::model::grade::{Grade, GradeId};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::schema::{bool_to_int, ensure_table_ready, parse_flag, parse_uuid};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const GRADE_SELECT_SQL: &str = "SELECT
    uuid,
    teacher_id,
    name,
    description,
    age_range,
    color,
    is_active,
    student_count,
    created_at,
    updated_at
FROM grades";

const GRADE_COLUMNS: &[&str] = &[
    "uuid",
    "teacher_id",
    "name",
    "description",
    "age_range",
    "color",
    "is_active",
    "student_count",
    "created_at",
    "updated_at",
];

/// Repository interface for grade records.
pub trait GradeRepository {
    fn insert_grade(&self, grade: &Grade) -> RepoResult<GradeId>;
    fn get_grade(&self, id: GradeId) -> RepoResult<Option<Grade>>;
    /// All grades of one teacher, ordered by creation.
    fn list_grades(&self, teacher_id: &str) -> RepoResult<Vec<Grade>>;
    /// Replaces descriptive fields. The cached count is left untouched.
    fn update_grade(&self, grade: &Grade) -> RepoResult<()>;
    fn delete_grade(&self, id: GradeId) -> RepoResult<()>;
    /// Deletes the grade and every membership row under it in one batch.
    /// Returns how many memberships were removed.
    fn delete_grade_cascade(&self, id: GradeId) -> RepoResult<usize>;
    fn set_student_count(&self, id: GradeId, count: u32) -> RepoResult<()>;
    /// Adds `delta` to the cached count in one statement, clamped at zero.
    /// Returns the stored value after the adjustment.
    fn adjust_student_count(&self, id: GradeId, delta: i64) -> RepoResult<u32>;
    /// Whether another grade of `teacher_id` already uses `name`.
    fn grade_name_taken(
        &self,
        teacher_id: &str,
        name: &str,
        excluding: Option<GradeId>,
    ) -> RepoResult<bool>;
}

/// SQLite-backed grade repository.
#[derive(Clone, Copy)]
pub struct SqliteGradeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGradeRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table_ready(conn, "grades", GRADE_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl GradeRepository for SqliteGradeRepository<'_> {
    fn insert_grade(&self, grade: &Grade) -> RepoResult<GradeId> {
        grade.validate()?;
        if self.grade_name_taken(&grade.teacher_id, &grade.name, None)? {
            return Err(RepoError::DuplicateGradeName {
                teacher_id: grade.teacher_id.clone(),
                name: grade.name.clone(),
            });
        }

        self.conn.execute(
            "INSERT INTO grades (
                uuid,
                teacher_id,
                name,
                description,
                age_range,
                color,
                is_active,
                student_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                grade.id.to_string(),
                grade.teacher_id.as_str(),
                grade.name.as_str(),
                grade.description.as_str(),
                grade.age_range.as_str(),
                grade.color.as_str(),
                bool_to_int(grade.is_active),
                i64::from(grade.student_count),
            ],
        )?;
        Ok(grade.id)
    }

    fn get_grade(&self, id: GradeId) -> RepoResult<Option<Grade>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{GRADE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_grade_row(row)?));
        }
        Ok(None)
    }

    fn list_grades(&self, teacher_id: &str) -> RepoResult<Vec<Grade>> {
        let mut stmt = self.conn.prepare(&format!(
            "{GRADE_SELECT_SQL}
             WHERE teacher_id = ?1
             ORDER BY created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([teacher_id])?;
        let mut grades = Vec::new();
        while let Some(row) = rows.next()? {
            grades.push(parse_grade_row(row)?);
        }
        Ok(grades)
    }

    fn update_grade(&self, grade: &Grade) -> RepoResult<()> {
        grade.validate()?;
        if self.grade_name_taken(&grade.teacher_id, &grade.name, Some(grade.id))? {
            return Err(RepoError::DuplicateGradeName {
                teacher_id: grade.teacher_id.clone(),
                name: grade.name.clone(),
            });
        }

        let changed = self.conn.execute(
            "UPDATE grades
             SET
                name = ?2,
                description = ?3,
                age_range = ?4,
                color = ?5,
                is_active = ?6,
                updated_at = MAX(strftime('%s', 'now') * 1000, updated_at + 1)
             WHERE uuid = ?1;",
            params![
                grade.id.to_string(),
                grade.name.as_str(),
                grade.description.as_str(),
                grade.age_range.as_str(),
                grade.color.as_str(),
                bool_to_int(grade.is_active),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::GradeNotFound(grade.id));
        }
        Ok(())
    }

    fn delete_grade(&self, id: GradeId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM grades WHERE uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::GradeNotFound(id));
        }
        Ok(())
    }

    fn delete_grade_cascade(&self, id: GradeId) -> RepoResult<usize> {
        let id_text = id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "DELETE FROM grade_memberships WHERE grade_uuid = ?1;",
            [id_text.as_str()],
        )?;
        let changed = tx.execute("DELETE FROM grades WHERE uuid = ?1;", [id_text.as_str()])?;
        if changed == 0 {
            return Err(RepoError::GradeNotFound(id));
        }
        tx.commit()?;
        Ok(removed)
    }

    fn set_student_count(&self, id: GradeId, count: u32) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE grades SET student_count = ?2 WHERE uuid = ?1;",
            params![id.to_string(), i64::from(count)],
        )?;
        if changed == 0 {
            return Err(RepoError::GradeNotFound(id));
        }
        Ok(())
    }

    fn adjust_student_count(&self, id: GradeId, delta: i64) -> RepoResult<u32> {
        let stored: Option<i64> = self
            .conn
            .query_row(
                "UPDATE grades
                 SET student_count = MAX(student_count + ?2, 0)
                 WHERE uuid = ?1
                 RETURNING student_count;",
                params![id.to_string(), delta],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            None => Err(RepoError::GradeNotFound(id)),
            Some(value) => u32::try_from(value).map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid student_count `{value}` in grades.student_count"
                ))
            }),
        }
    }

    fn grade_name_taken(
        &self,
        teacher_id: &str,
        name: &str,
        excluding: Option<GradeId>,
    ) -> RepoResult<bool> {
        let taken: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM grades
                WHERE teacher_id = ?1
                  AND name = ?2 COLLATE NOCASE
                  AND (?3 IS NULL OR uuid <> ?3)
            );",
            params![teacher_id, name, excluding.map(|id| id.to_string())],
            |row| row.get(0),
        )?;
        Ok(taken == 1)
    }
}

fn parse_grade_row(row: &Row<'_>) -> RepoResult<Grade> {
    let uuid_text: String = row.get("uuid")?;
    let student_count = u32::try_from(row.get::<_, i64>("student_count")?).map_err(|_| {
        RepoError::InvalidData("negative student_count in grades.student_count".to_string())
    })?;

    let grade = Grade {
        id: parse_uuid(&uuid_text, "grades.uuid")?,
        teacher_id: row.get("teacher_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        age_range: row.get("age_range")?,
        color: row.get("color")?,
        is_active: parse_flag(row.get("is_active")?, "grades.is_active")?,
        student_count,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    grade.validate()?;
    Ok(grade)
}
