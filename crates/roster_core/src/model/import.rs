//! Bulk import rows, saga journal, and outcome summary.
//!
//! # Invariants
//! - A journal row with `student_id = Some(_)` already has a persisted
//!   student; resuming never creates a second one for that row.
//! - Row state only moves `Pending -> Linked` or `Pending -> Skipped`.

use crate::model::grade::GradeId;
use crate::model::student::StudentId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of one import run; doubles as the resume token.
pub type ImportRunId = Uuid;

/// Already-parsed spreadsheet row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    pub name: String,
    /// Grade label written onto the student. Blank falls back to the target
    /// grade's name.
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub reading_level: String,
}

impl ImportRow {
    pub fn new(
        name: impl Into<String>,
        grade: impl Into<String>,
        reading_level: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            grade: grade.into(),
            reading_level: reading_level.into(),
        }
    }
}

/// How imported rows are resolved back to student records before linking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportLinkMode {
    /// Use the id journaled for each row when its student was created.
    #[default]
    ById,
    /// Take the first student (newest first) whose `(name, grade_label)`
    /// matches the row. Duplicate names collapse onto one student.
    ByNameAndGrade,
}

impl ImportLinkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ById => "by_id",
            Self::ByNameAndGrade => "by_name_and_grade",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "by_id" => Some(Self::ById),
            "by_name_and_grade" => Some(Self::ByNameAndGrade),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportRunStatus {
    /// Journal written, students not yet created.
    Pending,
    /// Students committed; linking may be partial.
    StudentsCreated,
    Completed,
}

impl ImportRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::StudentsCreated => "students_created",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "students_created" => Some(Self::StudentsCreated),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportRowState {
    Pending,
    Linked,
    Skipped,
}

impl ImportRowState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Linked => "linked",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "linked" => Some(Self::Linked),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One journaled input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRunRow {
    pub row_index: u32,
    pub name: String,
    pub grade_label: String,
    pub reading_level: String,
    /// Student created for this row, once the creation batch committed.
    pub student_id: Option<StudentId>,
    pub state: ImportRowState,
    /// Student the row was linked to. Differs from `student_id` only in
    /// name-matching mode.
    pub linked_student_id: Option<StudentId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRun {
    pub id: ImportRunId,
    pub teacher_id: String,
    pub grade_id: GradeId,
    pub link_mode: ImportLinkMode,
    pub status: ImportRunStatus,
    pub rows: Vec<ImportRunRow>,
}

impl ImportRun {
    pub fn needs_student_creation(&self) -> bool {
        self.rows.iter().any(|row| row.student_id.is_none())
    }

    pub fn summary(&self) -> ImportSummary {
        let count = |state: ImportRowState| {
            self.rows.iter().filter(|row| row.state == state).count()
        };
        ImportSummary {
            run_id: self.id,
            grade_id: self.grade_id,
            total_rows: self.rows.len(),
            created: self.rows.iter().filter(|row| row.student_id.is_some()).count(),
            linked: count(ImportRowState::Linked),
            skipped: count(ImportRowState::Skipped),
        }
    }
}

/// Outcome of an import run. A partial import is a normal result, not an
/// error: callers report `linked` of `total_rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub run_id: ImportRunId,
    pub grade_id: GradeId,
    pub total_rows: usize,
    pub created: usize,
    pub linked: usize,
    pub skipped: usize,
}

impl ImportSummary {
    pub fn is_partial(&self) -> bool {
        self.linked < self.total_rows
    }
}
