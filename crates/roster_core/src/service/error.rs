//! Use-case error taxonomy for roster stores and the reconciliation engine.

use crate::model::grade::{GradeId, GradeValidationError};
use crate::model::import::ImportRunId;
use crate::model::student::{StudentId, StudentValidationError};
use crate::repo::error::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RosterResult<T> = Result<T, RosterError>;

/// Entity named by a `NotFound` or `Unauthorized` failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Student(StudentId),
    Grade(GradeId),
    ImportRun(ImportRunId),
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Student(id) => write!(f, "student {id}"),
            Self::Grade(id) => write!(f, "grade {id}"),
            Self::ImportRun(id) => write!(f, "import run {id}"),
        }
    }
}

/// Roster use-case failure.
#[derive(Debug)]
pub enum RosterError {
    NotFound(EntityRef),
    /// The acting teacher does not own the entity.
    Unauthorized { teacher_id: String, entity: EntityRef },
    ValidationFailed(String),
    /// Underlying store call failed.
    StoreUnavailable(RepoError),
    /// Caller cancelled before the next batch was committed.
    Cancelled { stage: &'static str },
}

impl RosterError {
    /// Whether the failure came from the store rather than the request.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl Display for RosterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::Unauthorized { teacher_id, entity } => {
                write!(f, "teacher `{teacher_id}` does not own {entity}")
            }
            Self::ValidationFailed(message) => write!(f, "validation failed: {message}"),
            Self::StoreUnavailable(err) => write!(f, "store unavailable: {err}"),
            Self::Cancelled { stage } => write!(f, "operation cancelled before {stage}"),
        }
    }
}

impl Error for RosterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for RosterError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::StudentNotFound(id) => Self::NotFound(EntityRef::Student(id)),
            RepoError::GradeNotFound(id) => Self::NotFound(EntityRef::Grade(id)),
            RepoError::ImportRunNotFound(id) => Self::NotFound(EntityRef::ImportRun(id)),
            RepoError::StudentValidation(err) => Self::ValidationFailed(err.to_string()),
            RepoError::GradeValidation(err) => Self::ValidationFailed(err.to_string()),
            err @ RepoError::DuplicateGradeName { .. } => Self::ValidationFailed(err.to_string()),
            other => Self::StoreUnavailable(other),
        }
    }
}

impl From<StudentValidationError> for RosterError {
    fn from(value: StudentValidationError) -> Self {
        Self::ValidationFailed(value.to_string())
    }
}

impl From<GradeValidationError> for RosterError {
    fn from(value: GradeValidationError) -> Self {
        Self::ValidationFailed(value.to_string())
    }
}

/// Rejects blank caller identities; there is no shared "default" tenant.
pub(crate) fn require_teacher(teacher_id: &str) -> RosterResult<&str> {
    let trimmed = teacher_id.trim();
    if trimmed.is_empty() {
        return Err(RosterError::ValidationFailed(
            "teacher_id must not be blank".to_string(),
        ));
    }
    Ok(trimmed)
}
