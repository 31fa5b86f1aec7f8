//! Student domain model.
//!
//! # Invariants
//! - `id` is stable and never reused for another student.
//! - `name` and `teacher_id` are non-blank.
//! - `attendance` is a percentage in `0..=100`.
//! - `grade_label` is a display copy of a grade name, never a foreign key.

use crate::model::text::normalize_label;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a student record.
pub type StudentId = Uuid;

/// Upper bound for the attendance percentage.
pub const ATTENDANCE_MAX: u8 = 100;

/// Performance band shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Performance {
    Excellent,
    #[default]
    Good,
    NeedsImprovement,
}

impl Performance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::NeedsImprovement => "needs_improvement",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "excellent" => Some(Self::Excellent),
            "good" => Some(Self::Good),
            "needs_improvement" => Some(Self::NeedsImprovement),
            _ => None,
        }
    }
}

/// Enrollment status. Imports create `Pending`; promotion happens outside the
/// reconciliation engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    Active,
    #[default]
    Pending,
    Inactive,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "pending" => Some(Self::Pending),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Optional guardian reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub id: String,
    pub name: String,
}

/// Canonical student record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    /// Owning teacher; stamped from the caller identity at creation.
    pub teacher_id: String,
    pub name: String,
    pub grade_label: String,
    pub reading_level: String,
    pub attendance: u8,
    pub performance: Performance,
    pub status: StudentStatus,
    pub parent: Option<ParentLink>,
    /// Epoch ms, assigned by the store.
    pub created_at: i64,
    /// Epoch ms, bumped by the store on every update.
    pub updated_at: i64,
}

impl Student {
    /// Builds an unsaved record with a fresh id. Timestamps are filled by the
    /// store on insert.
    pub fn new(teacher_id: impl Into<String>, draft: NewStudent) -> Self {
        Self {
            id: Uuid::new_v4(),
            teacher_id: teacher_id.into().trim().to_string(),
            name: normalize_label(&draft.name),
            grade_label: normalize_label(&draft.grade_label),
            reading_level: draft.reading_level.trim().to_string(),
            attendance: draft.attendance,
            performance: draft.performance,
            status: draft.status,
            parent: draft.parent,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Checks field-level invariants before persistence.
    pub fn validate(&self) -> Result<(), StudentValidationError> {
        if self.teacher_id.trim().is_empty() {
            return Err(StudentValidationError::BlankTeacherId);
        }
        if self.name.trim().is_empty() {
            return Err(StudentValidationError::BlankName);
        }
        if self.attendance > ATTENDANCE_MAX {
            return Err(StudentValidationError::AttendanceOutOfRange(self.attendance));
        }
        if let Some(parent) = &self.parent {
            if parent.id.trim().is_empty() {
                return Err(StudentValidationError::BlankParentId);
            }
        }
        Ok(())
    }

    pub fn is_owned_by(&self, teacher_id: &str) -> bool {
        self.teacher_id == teacher_id.trim()
    }
}

/// Creation input for one student.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub name: String,
    #[serde(default)]
    pub grade_label: String,
    #[serde(default)]
    pub reading_level: String,
    #[serde(default)]
    pub attendance: u8,
    #[serde(default)]
    pub performance: Performance,
    #[serde(default)]
    pub status: StudentStatus,
    #[serde(default)]
    pub parent: Option<ParentLink>,
}

impl NewStudent {
    /// Draft with import defaults: attendance 0, `Good`, `Pending`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_grade_label(mut self, grade_label: impl Into<String>) -> Self {
        self.grade_label = grade_label.into();
        self
    }

    pub fn with_reading_level(mut self, reading_level: impl Into<String>) -> Self {
        self.reading_level = reading_level.into();
        self
    }
}

/// Partial update. `None` leaves the field untouched; `parent: Some(None)`
/// clears the parent link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub grade_label: Option<String>,
    pub reading_level: Option<String>,
    pub attendance: Option<u8>,
    pub performance: Option<Performance>,
    pub status: Option<StudentStatus>,
    pub parent: Option<Option<ParentLink>>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merges the patch into `student`. Identity, owner, and timestamps are
    /// never touched.
    pub fn apply_to(&self, student: &mut Student) {
        if let Some(name) = &self.name {
            student.name = normalize_label(name);
        }
        if let Some(grade_label) = &self.grade_label {
            student.grade_label = normalize_label(grade_label);
        }
        if let Some(reading_level) = &self.reading_level {
            student.reading_level = reading_level.trim().to_string();
        }
        if let Some(attendance) = self.attendance {
            student.attendance = attendance;
        }
        if let Some(performance) = self.performance {
            student.performance = performance;
        }
        if let Some(status) = self.status {
            student.status = status;
        }
        if let Some(parent) = &self.parent {
            student.parent = parent.clone();
        }
    }
}

/// Field-level validation failure for student records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentValidationError {
    BlankName,
    BlankTeacherId,
    BlankParentId,
    AttendanceOutOfRange(u8),
}

impl Display for StudentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "student name must not be blank"),
            Self::BlankTeacherId => write!(f, "student teacher_id must not be blank"),
            Self::BlankParentId => write!(f, "parent link id must not be blank"),
            Self::AttendanceOutOfRange(value) => write!(
                f,
                "attendance must be within 0..={ATTENDANCE_MAX}, got {value}"
            ),
        }
    }
}

impl Error for StudentValidationError {}
