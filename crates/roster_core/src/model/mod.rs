//! Roster domain model.
//!
//! # Responsibility
//! - Define student, grade, membership, and import records.
//! - Keep field-level validation next to the types it protects.
//!
//! # Invariants
//! - Students and grades are identified by stable UUIDs.
//! - Membership is the only edge between a grade and a student; grades hold
//!   no student references and students hold only a display label.

pub mod grade;
pub mod import;
pub mod membership;
pub mod student;
pub mod text;
