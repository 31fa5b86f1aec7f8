//! Membership index use-cases.
//!
//! # Responsibility
//! - Maintain the per-grade `(grade, student)` edge collection.
//! - Keep the grade's cached count in step with successful mutations.
//!
//! # Invariants
//! - At most one entry per `(grade, student)` pair; a repeated add is a no-op.
//! - Count adjustments happen only when a row was actually written or
//!   removed, and their failures never fail the membership mutation.

use crate::model::grade::GradeId;
use crate::model::membership::Membership;
use crate::model::student::StudentId;
use crate::repo::grade_repo::GradeRepository;
use crate::repo::membership_repo::MembershipRepository;
use crate::service::error::RosterResult;
use crate::service::grade_directory::adjust_count_best_effort;
use log::info;
use std::collections::HashSet;

/// Membership index facade. Holds the grade repository only to maintain the
/// cached counter.
pub struct MembershipIndex<M: MembershipRepository, G: GradeRepository> {
    repo: M,
    grades: G,
}

impl<M: MembershipRepository, G: GradeRepository> MembershipIndex<M, G> {
    pub fn new(repo: M, grades: G) -> Self {
        Self { repo, grades }
    }

    /// Adds the pair unless present. Returns `true` when a new entry was
    /// written, in which case the grade count is incremented.
    pub fn add(
        &self,
        grade_id: GradeId,
        student_id: StudentId,
        student_name: &str,
    ) -> RosterResult<bool> {
        let inserted = self
            .repo
            .insert_membership(grade_id, student_id, student_name)?;
        if inserted {
            self.adjust_count(grade_id, 1);
            info!(
                "event=membership_add module=membership_index status=ok grade_id={grade_id} student_id={student_id}"
            );
        } else {
            info!(
                "event=membership_add module=membership_index status=skipped grade_id={grade_id} student_id={student_id} reason=exists"
            );
        }
        Ok(inserted)
    }

    /// Removes the pair if present. Absent pairs are not an error and leave
    /// the count untouched.
    pub fn remove(&self, grade_id: GradeId, student_id: StudentId) -> RosterResult<bool> {
        let removed = self.repo.delete_membership(grade_id, student_id)?;
        if removed {
            self.adjust_count(grade_id, -1);
            info!(
                "event=membership_remove module=membership_index status=ok grade_id={grade_id} student_id={student_id}"
            );
        }
        Ok(removed)
    }

    /// Entries ordered by student name (case-insensitive), then student id.
    pub fn list(&self, grade_id: GradeId) -> RosterResult<Vec<Membership>> {
        Ok(self.repo.list_memberships(grade_id)?)
    }

    pub fn exists(&self, grade_id: GradeId, student_id: StudentId) -> RosterResult<bool> {
        Ok(self.repo.membership_exists(grade_id, student_id)?)
    }

    /// Entries whose student is in `live_student_ids`.
    pub fn list_valid(
        &self,
        grade_id: GradeId,
        live_student_ids: &HashSet<StudentId>,
    ) -> RosterResult<Vec<Membership>> {
        Ok(self
            .list(grade_id)?
            .into_iter()
            .filter(|entry| live_student_ids.contains(&entry.student_id))
            .collect())
    }

    /// Memberships of `student_id` across all grades.
    pub fn list_for_student(&self, student_id: StudentId) -> RosterResult<Vec<Membership>> {
        Ok(self.repo.list_for_student(student_id)?)
    }

    /// Deletes entries of `grade_id` whose student is not in
    /// `live_student_ids`. Returns how many rows were removed. The cached
    /// count is not touched; callers recompute it.
    pub fn sweep(
        &self,
        grade_id: GradeId,
        live_student_ids: &HashSet<StudentId>,
    ) -> RosterResult<usize> {
        let stale: Vec<StudentId> = self
            .list(grade_id)?
            .into_iter()
            .map(|entry| entry.student_id)
            .filter(|student_id| !live_student_ids.contains(student_id))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let removed = self.repo.delete_memberships(grade_id, &stale)?;
        info!(
            "event=membership_sweep module=membership_index status=ok grade_id={grade_id} removed={removed}"
        );
        Ok(removed)
    }

    fn adjust_count(&self, grade_id: GradeId, delta: i64) {
        adjust_count_best_effort(&self.grades, grade_id, delta, "membership_index");
    }
}
