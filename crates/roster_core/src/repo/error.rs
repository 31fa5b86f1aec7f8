//! Repository error shared by every roster collection.

use crate::db::DbError;
use crate::model::grade::{GradeId, GradeValidationError};
use crate::model::import::ImportRunId;
use crate::model::student::{StudentId, StudentValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error for roster repositories.
#[derive(Debug)]
pub enum RepoError {
    /// Transport or bootstrap failure of the underlying store.
    Db(DbError),
    StudentValidation(StudentValidationError),
    GradeValidation(GradeValidationError),
    StudentNotFound(StudentId),
    GradeNotFound(GradeId),
    ImportRunNotFound(ImportRunId),
    /// Another grade of the same teacher already uses this name.
    DuplicateGradeName { teacher_id: String, name: String },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::StudentValidation(err) => write!(f, "{err}"),
            Self::GradeValidation(err) => write!(f, "{err}"),
            Self::StudentNotFound(id) => write!(f, "student not found: {id}"),
            Self::GradeNotFound(id) => write!(f, "grade not found: {id}"),
            Self::ImportRunNotFound(id) => write!(f, "import run not found: {id}"),
            Self::DuplicateGradeName { teacher_id, name } => write!(
                f,
                "grade name `{name}` already exists for teacher `{teacher_id}`"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "roster repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "roster repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "roster repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted roster data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::StudentValidation(err) => Some(err),
            Self::GradeValidation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<StudentValidationError> for RepoError {
    fn from(value: StudentValidationError) -> Self {
        Self::StudentValidation(value)
    }
}

impl From<GradeValidationError> for RepoError {
    fn from(value: GradeValidationError) -> Self {
        Self::GradeValidation(value)
    }
}
