//! Repository layer: the roster's view of the document store.
//!
//! # Responsibility
//! - Define collection-scoped data access contracts (students, grades,
//!   per-grade memberships, import journal).
//! - Keep SQL details behind those contracts so stores and the engine stay
//!   storage-agnostic.
//!
//! # Invariants
//! - Each multi-document batch is exactly one SQLite transaction.
//! - Repository APIs return semantic errors (`*NotFound`) in addition to
//!   store transport errors.

pub mod error;
pub mod grade_repo;
pub mod import_repo;
pub mod membership_repo;
mod schema;
pub mod student_repo;
