//! Grade (class/cohort) domain model.
//!
//! # Invariants
//! - `name` is unique per teacher, compared case-insensitively.
//! - `student_count` is an advisory cache. The membership index is the
//!   source of truth and the count can always be recomputed from it.

use crate::model::text::normalize_label;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a grade record.
pub type GradeId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub teacher_id: String,
    /// Human label, e.g. "Grade 3 - Athena".
    pub name: String,
    pub description: String,
    pub age_range: String,
    pub color: String,
    pub is_active: bool,
    /// Cached member count; never negative.
    pub student_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Grade {
    pub fn new(teacher_id: impl Into<String>, draft: NewGrade) -> Self {
        Self {
            id: Uuid::new_v4(),
            teacher_id: teacher_id.into().trim().to_string(),
            name: normalize_label(&draft.name),
            description: draft.description.trim().to_string(),
            age_range: draft.age_range.trim().to_string(),
            color: draft.color.trim().to_string(),
            is_active: draft.is_active,
            student_count: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn validate(&self) -> Result<(), GradeValidationError> {
        if self.teacher_id.trim().is_empty() {
            return Err(GradeValidationError::BlankTeacherId);
        }
        if self.name.trim().is_empty() {
            return Err(GradeValidationError::BlankName);
        }
        Ok(())
    }

    pub fn is_owned_by(&self, teacher_id: &str) -> bool {
        self.teacher_id == teacher_id.trim()
    }
}

/// Creation input for one grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGrade {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub age_range: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl NewGrade {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            age_range: String::new(),
            color: String::new(),
            is_active: true,
        }
    }
}

fn default_active() -> bool {
    true
}

/// Partial grade update. The cached count is not patchable here; use the
/// directory's count operations instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub age_range: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

impl GradePatch {
    pub fn apply_to(&self, grade: &mut Grade) {
        if let Some(name) = &self.name {
            grade.name = normalize_label(name);
        }
        if let Some(description) = &self.description {
            grade.description = description.trim().to_string();
        }
        if let Some(age_range) = &self.age_range {
            grade.age_range = age_range.trim().to_string();
        }
        if let Some(color) = &self.color {
            grade.color = color.trim().to_string();
        }
        if let Some(is_active) = self.is_active {
            grade.is_active = is_active;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeValidationError {
    BlankName,
    BlankTeacherId,
}

impl Display for GradeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "grade name must not be blank"),
            Self::BlankTeacherId => write!(f, "grade teacher_id must not be blank"),
        }
    }
}

impl Error for GradeValidationError {}
