//! Roster consistency engine.
//!
//! Keeps students, grades and per-grade membership rows consistent on top of
//! a SQLite document store: bulk import with resumable linking, cascading
//! deletes and cached member counts with authoritative recomputation.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, RosterConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::grade::{Grade, GradeId, GradePatch, NewGrade};
pub use model::import::{ImportLinkMode, ImportRow, ImportRun, ImportRunId, ImportSummary};
pub use model::membership::Membership;
pub use model::student::{
    NewStudent, ParentLink, Performance, Student, StudentId, StudentPatch, StudentStatus,
};
pub use repo::error::{RepoError, RepoResult};
pub use service::cancel::CancelFlag;
pub use service::error::{EntityRef, RosterError, RosterResult};
pub use service::roster_engine::{RosterEngine, SqliteRosterEngine};
pub use service::student_store::BatchDeleteReport;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
