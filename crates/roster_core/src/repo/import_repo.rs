//! Import saga journal contracts and SQLite implementation.
//!
//! # Responsibility
//! - Journal every import request before any student is written.
//! - Create the run's students and record their ids in the same batch, so a
//!   retry can tell which rows already produced a student.
//!
//! # Invariants
//! - `create_students_for_run` only touches rows whose `student_uuid` is
//!   still NULL and is a single `IMMEDIATE` transaction.
//! - Row states never move back to `pending`.

use crate::model::grade::GradeId;
use crate::model::import::{
    ImportLinkMode, ImportRow, ImportRowState, ImportRun, ImportRunId, ImportRunRow,
    ImportRunStatus,
};
use crate::model::student::{NewStudent, Student, StudentId};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::schema::{ensure_table_ready, parse_enum, parse_uuid};
use crate::repo::student_repo::insert_student_row;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const RUN_COLUMNS: &[&str] = &["uuid", "teacher_id", "grade_uuid", "link_mode", "status"];
const ROW_COLUMNS: &[&str] = &[
    "run_uuid",
    "row_index",
    "name",
    "grade_label",
    "reading_level",
    "student_uuid",
    "link_state",
    "linked_student_uuid",
];

/// Repository interface for the import journal.
pub trait ImportRunRepository {
    /// Writes the run header and one pending journal row per input row.
    fn create_run(
        &self,
        teacher_id: &str,
        grade_id: GradeId,
        link_mode: ImportLinkMode,
        rows: &[ImportRow],
    ) -> RepoResult<ImportRunId>;
    fn get_run(&self, id: ImportRunId) -> RepoResult<Option<ImportRun>>;
    /// Creates students for rows without one and stores their ids, in one
    /// batch. Returns the ids created by this call, in row order.
    fn create_students_for_run(&self, id: ImportRunId) -> RepoResult<Vec<StudentId>>;
    fn mark_row(
        &self,
        id: ImportRunId,
        row_index: u32,
        state: ImportRowState,
        linked_student_id: Option<StudentId>,
    ) -> RepoResult<()>;
    fn set_run_status(&self, id: ImportRunId, status: ImportRunStatus) -> RepoResult<()>;
}

/// SQLite-backed import journal.
#[derive(Clone, Copy)]
pub struct SqliteImportRunRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteImportRunRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table_ready(conn, "import_runs", RUN_COLUMNS)?;
        ensure_table_ready(conn, "import_run_rows", ROW_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl ImportRunRepository for SqliteImportRunRepository<'_> {
    fn create_run(
        &self,
        teacher_id: &str,
        grade_id: GradeId,
        link_mode: ImportLinkMode,
        rows: &[ImportRow],
    ) -> RepoResult<ImportRunId> {
        let run_id = Uuid::new_v4();
        let run_text = run_id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO import_runs (uuid, teacher_id, grade_uuid, link_mode, status)
             VALUES (?1, ?2, ?3, ?4, 'pending');",
            params![
                run_text.as_str(),
                teacher_id,
                grade_id.to_string(),
                link_mode.as_str(),
            ],
        )?;

        for (index, row) in rows.iter().enumerate() {
            tx.execute(
                "INSERT INTO import_run_rows (
                    run_uuid,
                    row_index,
                    name,
                    grade_label,
                    reading_level
                ) VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    run_text.as_str(),
                    index as i64,
                    row.name.as_str(),
                    row.grade.as_str(),
                    row.reading_level.as_str(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(run_id)
    }

    fn get_run(&self, id: ImportRunId) -> RepoResult<Option<ImportRun>> {
        load_run(self.conn, id)
    }

    fn create_students_for_run(&self, id: ImportRunId) -> RepoResult<Vec<StudentId>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let run = load_run(&tx, id)?.ok_or(RepoError::ImportRunNotFound(id))?;
        let run_text = id.to_string();

        let mut created = Vec::new();
        for row in run.rows.iter().filter(|row| row.student_id.is_none()) {
            let draft = NewStudent::named(row.name.as_str())
                .with_grade_label(row.grade_label.as_str())
                .with_reading_level(row.reading_level.as_str());
            let student = Student::new(run.teacher_id.as_str(), draft);
            let student_id = insert_student_row(&tx, &student)?;
            tx.execute(
                "UPDATE import_run_rows
                 SET student_uuid = ?3
                 WHERE run_uuid = ?1
                   AND row_index = ?2
                   AND student_uuid IS NULL;",
                params![
                    run_text.as_str(),
                    i64::from(row.row_index),
                    student_id.to_string()
                ],
            )?;
            created.push(student_id);
        }

        tx.execute(
            "UPDATE import_runs
             SET status = 'students_created',
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND status = 'pending';",
            [run_text.as_str()],
        )?;
        tx.commit()?;
        Ok(created)
    }

    fn mark_row(
        &self,
        id: ImportRunId,
        row_index: u32,
        state: ImportRowState,
        linked_student_id: Option<StudentId>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE import_run_rows
             SET link_state = ?3,
                 linked_student_uuid = ?4
             WHERE run_uuid = ?1
               AND row_index = ?2
               AND link_state = 'pending';",
            params![
                id.to_string(),
                i64::from(row_index),
                state.as_str(),
                linked_student_id.map(|value| value.to_string()),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::InvalidData(format!(
                "import row {row_index} of run {id} is missing or already resolved"
            )));
        }
        Ok(())
    }

    fn set_run_status(&self, id: ImportRunId, status: ImportRunStatus) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE import_runs
             SET status = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![id.to_string(), status.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::ImportRunNotFound(id));
        }
        Ok(())
    }
}

fn load_run(conn: &Connection, id: ImportRunId) -> RepoResult<Option<ImportRun>> {
    let run_text = id.to_string();
    let header: Option<(String, String, String, String)> = conn
        .query_row(
            "SELECT teacher_id, grade_uuid, link_mode, status
             FROM import_runs
             WHERE uuid = ?1;",
            [run_text.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;
    let Some((teacher_id, grade_text, mode_text, status_text)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT
            row_index,
            name,
            grade_label,
            reading_level,
            student_uuid,
            link_state,
            linked_student_uuid
         FROM import_run_rows
         WHERE run_uuid = ?1
         ORDER BY row_index ASC;",
    )?;
    let mut rows = stmt.query([run_text.as_str()])?;
    let mut journal = Vec::new();
    while let Some(row) = rows.next()? {
        journal.push(parse_run_row(row)?);
    }

    Ok(Some(ImportRun {
        id,
        teacher_id,
        grade_id: parse_uuid(&grade_text, "import_runs.grade_uuid")?,
        link_mode: parse_enum(&mode_text, "import_runs.link_mode", ImportLinkMode::parse)?,
        status: parse_enum(&status_text, "import_runs.status", ImportRunStatus::parse)?,
        rows: journal,
    }))
}

fn parse_run_row(row: &Row<'_>) -> RepoResult<ImportRunRow> {
    let row_index = u32::try_from(row.get::<_, i64>("row_index")?).map_err(|_| {
        RepoError::InvalidData("negative row_index in import_run_rows.row_index".to_string())
    })?;
    let state_text: String = row.get("link_state")?;

    Ok(ImportRunRow {
        row_index,
        name: row.get("name")?,
        grade_label: row.get("grade_label")?,
        reading_level: row.get("reading_level")?,
        student_id: row
            .get::<_, Option<String>>("student_uuid")?
            .map(|value| parse_uuid(&value, "import_run_rows.student_uuid"))
            .transpose()?,
        state: parse_enum(&state_text, "import_run_rows.link_state", ImportRowState::parse)?,
        linked_student_id: row
            .get::<_, Option<String>>("linked_student_uuid")?
            .map(|value| parse_uuid(&value, "import_run_rows.linked_student_uuid"))
            .transpose()?,
    })
}
