//! Student collection contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist canonical student records scoped by owning teacher.
//! - Own the cascading student delete, which also clears every membership
//!   row that references the student.
//!
//! # Invariants
//! - Write paths call `Student::validate()` before SQL mutations.
//! - Multi-row writes (`insert_students`, `delete_student_cascade`) are one
//!   `IMMEDIATE` transaction each: all rows land or none do.
//! - Teacher listings are ordered `created_at DESC, uuid ASC`.

use crate::model::grade::GradeId;
use crate::model::student::{ParentLink, Performance, Student, StudentId, StudentStatus};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::schema::{ensure_table_ready, parse_enum, parse_uuid};
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::HashSet;

const STUDENT_SELECT_SQL: &str = "SELECT
    uuid,
    teacher_id,
    name,
    grade_label,
    reading_level,
    attendance,
    performance,
    status,
    parent_id,
    parent_name,
    created_at,
    updated_at
FROM students";

const STUDENT_COLUMNS: &[&str] = &[
    "uuid",
    "teacher_id",
    "name",
    "grade_label",
    "reading_level",
    "attendance",
    "performance",
    "status",
    "parent_id",
    "parent_name",
    "created_at",
    "updated_at",
];

const EXISTING_IDS_CHUNK: usize = 500;

/// Repository interface for the student collection.
pub trait StudentRepository {
    /// Inserts one student and returns its id.
    fn insert_student(&self, student: &Student) -> RepoResult<StudentId>;
    /// Inserts all students in one atomic batch; ids come back in input order.
    fn insert_students(&self, students: &[Student]) -> RepoResult<Vec<StudentId>>;
    fn get_student(&self, id: StudentId) -> RepoResult<Option<Student>>;
    /// Filtered, ordered query for one teacher.
    fn query_by_teacher(&self, teacher_id: &str) -> RepoResult<Vec<Student>>;
    /// Unfiltered scan of the whole collection.
    fn scan_all(&self) -> RepoResult<Vec<Student>>;
    /// Returns the subset of `ids` that currently resolve to a student.
    fn existing_ids(&self, ids: &[StudentId]) -> RepoResult<HashSet<StudentId>>;
    /// Replaces mutable fields, bumps `updated_at`, and refreshes the
    /// membership name cache.
    fn update_student(&self, student: &Student) -> RepoResult<()>;
    /// Deletes the student and every membership referencing it in one batch.
    /// Returns the grades whose membership index lost a row.
    fn delete_student_cascade(&self, id: StudentId) -> RepoResult<Vec<GradeId>>;
}

/// SQLite-backed student repository.
#[derive(Clone, Copy)]
pub struct SqliteStudentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStudentRepository<'conn> {
    /// Creates the repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table_ready(conn, "students", STUDENT_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl StudentRepository for SqliteStudentRepository<'_> {
    fn insert_student(&self, student: &Student) -> RepoResult<StudentId> {
        insert_student_row(self.conn, student)
    }

    fn insert_students(&self, students: &[Student]) -> RepoResult<Vec<StudentId>> {
        for student in students {
            student.validate()?;
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut ids = Vec::with_capacity(students.len());
        for student in students {
            ids.push(insert_student_row(&tx, student)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    fn get_student(&self, id: StudentId) -> RepoResult<Option<Student>> {
        load_student(self.conn, id)
    }

    fn query_by_teacher(&self, teacher_id: &str) -> RepoResult<Vec<Student>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STUDENT_SELECT_SQL}
             WHERE teacher_id = ?1
             ORDER BY created_at DESC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([teacher_id])?;
        let mut students = Vec::new();
        while let Some(row) = rows.next()? {
            students.push(parse_student_row(row)?);
        }
        Ok(students)
    }

    fn scan_all(&self) -> RepoResult<Vec<Student>> {
        let mut stmt = self.conn.prepare(&format!("{STUDENT_SELECT_SQL};"))?;
        let mut rows = stmt.query([])?;
        let mut students = Vec::new();
        while let Some(row) = rows.next()? {
            students.push(parse_student_row(row)?);
        }
        Ok(students)
    }

    fn existing_ids(&self, ids: &[StudentId]) -> RepoResult<HashSet<StudentId>> {
        let mut found = HashSet::new();
        for chunk in ids.chunks(EXISTING_IDS_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT uuid FROM students WHERE uuid IN ({placeholders});"
            ))?;
            let mut rows = stmt.query(params_from_iter(chunk.iter().map(|id| id.to_string())))?;
            while let Some(row) = rows.next()? {
                let value: String = row.get(0)?;
                found.insert(parse_uuid(&value, "students.uuid")?);
            }
        }
        Ok(found)
    }

    fn update_student(&self, student: &Student) -> RepoResult<()> {
        student.validate()?;
        let (parent_id, parent_name) = split_parent(student.parent.as_ref());
        let id_text = student.id.to_string();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE students
             SET
                name = ?2,
                grade_label = ?3,
                reading_level = ?4,
                attendance = ?5,
                performance = ?6,
                status = ?7,
                parent_id = ?8,
                parent_name = ?9,
                updated_at = MAX(strftime('%s', 'now') * 1000, updated_at + 1)
             WHERE uuid = ?1;",
            params![
                id_text.as_str(),
                student.name.as_str(),
                student.grade_label.as_str(),
                student.reading_level.as_str(),
                i64::from(student.attendance),
                student.performance.as_str(),
                student.status.as_str(),
                parent_id,
                parent_name,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::StudentNotFound(student.id));
        }

        tx.execute(
            "UPDATE grade_memberships
             SET student_name = ?2
             WHERE student_uuid = ?1
               AND student_name <> ?2;",
            params![id_text.as_str(), student.name.as_str()],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn delete_student_cascade(&self, id: StudentId) -> RepoResult<Vec<GradeId>> {
        let id_text = id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let exists: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM students WHERE uuid = ?1);",
            [id_text.as_str()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepoError::StudentNotFound(id));
        }

        let mut grades = Vec::new();
        {
            let mut stmt = tx.prepare(
                "SELECT grade_uuid
                 FROM grade_memberships
                 WHERE student_uuid = ?1
                 ORDER BY grade_uuid ASC;",
            )?;
            let mut rows = stmt.query([id_text.as_str()])?;
            while let Some(row) = rows.next()? {
                let value: String = row.get(0)?;
                grades.push(parse_uuid(&value, "grade_memberships.grade_uuid")?);
            }
        }

        tx.execute(
            "DELETE FROM grade_memberships WHERE student_uuid = ?1;",
            [id_text.as_str()],
        )?;
        tx.execute("DELETE FROM students WHERE uuid = ?1;", [id_text.as_str()])?;
        tx.commit()?;

        Ok(grades)
    }
}

/// Inserts one validated student row. Shared with the import journal so
/// saga batches write students exactly like direct creation.
pub(crate) fn insert_student_row(conn: &Connection, student: &Student) -> RepoResult<StudentId> {
    student.validate()?;
    let (parent_id, parent_name) = split_parent(student.parent.as_ref());

    conn.execute(
        "INSERT INTO students (
            uuid,
            teacher_id,
            name,
            grade_label,
            reading_level,
            attendance,
            performance,
            status,
            parent_id,
            parent_name
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
        params![
            student.id.to_string(),
            student.teacher_id.as_str(),
            student.name.as_str(),
            student.grade_label.as_str(),
            student.reading_level.as_str(),
            i64::from(student.attendance),
            student.performance.as_str(),
            student.status.as_str(),
            parent_id,
            parent_name,
        ],
    )?;

    Ok(student.id)
}

pub(crate) fn load_student(conn: &Connection, id: StudentId) -> RepoResult<Option<Student>> {
    let mut stmt = conn.prepare(&format!("{STUDENT_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_student_row(row)?));
    }
    Ok(None)
}

fn split_parent(parent: Option<&ParentLink>) -> (Option<&str>, Option<&str>) {
    match parent {
        Some(link) => (Some(link.id.as_str()), Some(link.name.as_str())),
        None => (None, None),
    }
}

fn parse_student_row(row: &Row<'_>) -> RepoResult<Student> {
    let uuid_text: String = row.get("uuid")?;
    let performance_text: String = row.get("performance")?;
    let status_text: String = row.get("status")?;

    let attendance = u8::try_from(row.get::<_, i64>("attendance")?).map_err(|_| {
        RepoError::InvalidData("attendance out of range in students.attendance".to_string())
    })?;

    let parent = match row.get::<_, Option<String>>("parent_id")? {
        Some(id) => Some(ParentLink {
            id,
            name: row
                .get::<_, Option<String>>("parent_name")?
                .unwrap_or_default(),
        }),
        None => None,
    };

    let student = Student {
        id: parse_uuid(&uuid_text, "students.uuid")?,
        teacher_id: row.get("teacher_id")?,
        name: row.get("name")?,
        grade_label: row.get("grade_label")?,
        reading_level: row.get("reading_level")?,
        attendance,
        performance: parse_enum(&performance_text, "students.performance", Performance::parse)?,
        status: parse_enum(&status_text, "students.status", StudentStatus::parse)?,
        parent,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    student.validate()?;
    Ok(student)
}
