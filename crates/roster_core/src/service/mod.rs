//! Roster use-case services.
//!
//! # Responsibility
//! - Turn repository calls into teacher-scoped use-cases (student store,
//!   grade directory, membership index).
//! - Host the reconciliation engine that keeps the three collections
//!   consistent (imports, cascades, counts).

pub mod cancel;
pub mod error;
pub mod grade_directory;
pub mod membership_index;
pub mod roster_engine;
mod roster_import;
pub mod student_store;
