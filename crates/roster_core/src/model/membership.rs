//! Grade membership edge.
//!
//! The membership is the only link between a grade and a student. Its
//! identity is the `(grade_id, student_id)` pair; at most one row exists per
//! pair.

use crate::model::grade::GradeId;
use crate::model::student::StudentId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub grade_id: GradeId,
    pub student_id: StudentId,
    /// Display cache of the student name. Refreshed on student rename.
    pub student_name: String,
    /// Epoch ms.
    pub added_at: i64,
}
