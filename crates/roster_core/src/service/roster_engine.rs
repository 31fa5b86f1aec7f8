//! Reconciliation engine.
//!
//! # Responsibility
//! - Orchestrate multi-collection workflows across the student store, the
//!   grade directory and the membership index: cascading deletes, counter
//!   maintenance and authoritative counts. Imports live in
//!   [`crate::service::roster_import`].
//! - Enforce teacher ownership on every grade and membership operation.
//!
//! # Invariants
//! - The engine owns no storage; every write goes through a repository.
//! - Authoritative counts only include memberships whose student still
//!   exists. The stored counter is a cache that `recompute_count` heals.

use crate::model::grade::{Grade, GradeId};
use crate::model::membership::Membership;
use crate::model::student::StudentId;
use crate::repo::error::RepoResult;
use crate::repo::grade_repo::{GradeRepository, SqliteGradeRepository};
use crate::repo::import_repo::{ImportRunRepository, SqliteImportRunRepository};
use crate::repo::membership_repo::{MembershipRepository, SqliteMembershipRepository};
use crate::repo::student_repo::{SqliteStudentRepository, StudentRepository};
use crate::service::error::{require_teacher, RosterResult};
use crate::service::grade_directory::{clamp_count, GradeDirectory};
use crate::service::membership_index::MembershipIndex;
use crate::service::student_store::{BatchDeleteReport, StudentStore};
use log::{info, warn};
use rusqlite::Connection;
use std::collections::HashSet;

/// Engine wired to SQLite repositories sharing one connection.
pub type SqliteRosterEngine<'conn> = RosterEngine<
    SqliteStudentRepository<'conn>,
    SqliteGradeRepository<'conn>,
    SqliteMembershipRepository<'conn>,
    SqliteImportRunRepository<'conn>,
>;

impl<'conn> SqliteRosterEngine<'conn> {
    /// Builds every repository over `conn` after schema readiness checks.
    pub fn open(conn: &'conn Connection) -> RepoResult<Self> {
        Ok(Self::new(
            SqliteStudentRepository::try_new(conn)?,
            SqliteGradeRepository::try_new(conn)?,
            SqliteMembershipRepository::try_new(conn)?,
            SqliteImportRunRepository::try_new(conn)?,
        ))
    }
}

/// Cross-collection roster workflows.
pub struct RosterEngine<S, G, M, I>
where
    S: StudentRepository,
    G: GradeRepository + Clone,
    M: MembershipRepository,
    I: ImportRunRepository,
{
    students: StudentStore<S, G>,
    grades: GradeDirectory<G>,
    memberships: MembershipIndex<M, G>,
    imports: I,
}

impl<S, G, M, I> RosterEngine<S, G, M, I>
where
    S: StudentRepository,
    G: GradeRepository + Clone,
    M: MembershipRepository,
    I: ImportRunRepository,
{
    pub fn new(students: S, grades: G, memberships: M, imports: I) -> Self {
        Self {
            students: StudentStore::new(students, grades.clone()),
            memberships: MembershipIndex::new(memberships, grades.clone()),
            grades: GradeDirectory::new(grades),
            imports,
        }
    }

    pub fn students(&self) -> &StudentStore<S, G> {
        &self.students
    }

    pub fn grades(&self) -> &GradeDirectory<G> {
        &self.grades
    }

    pub fn memberships(&self) -> &MembershipIndex<M, G> {
        &self.memberships
    }

    pub(crate) fn imports(&self) -> &I {
        &self.imports
    }

    /// Adds a student to a grade, both owned by `teacher_id`. The student's
    /// current name is cached on the entry.
    pub fn add_membership(
        &self,
        teacher_id: &str,
        grade_id: GradeId,
        student_id: StudentId,
    ) -> RosterResult<bool> {
        self.grades.get_by_id(teacher_id, grade_id)?;
        let student = self.students.get_owned(teacher_id, student_id)?;
        self.memberships.add(grade_id, student_id, &student.name)
    }

    /// Removes a student from a grade owned by `teacher_id`. The student
    /// itself may already be gone.
    pub fn remove_membership(
        &self,
        teacher_id: &str,
        grade_id: GradeId,
        student_id: StudentId,
    ) -> RosterResult<bool> {
        self.grades.get_by_id(teacher_id, grade_id)?;
        self.memberships.remove(grade_id, student_id)
    }

    /// Deletes the student and every membership referencing it in one batch.
    /// The store decrements the counters of the affected grades. Returns the
    /// affected grades.
    pub fn delete_student(
        &self,
        teacher_id: &str,
        student_id: StudentId,
    ) -> RosterResult<Vec<GradeId>> {
        let affected = self.students.delete(teacher_id, student_id)?;
        info!(
            "event=student_cascade_delete module=roster_engine status=ok student_id={student_id} grades={}",
            affected.len()
        );
        Ok(affected)
    }

    /// Deletes each student with its own cascade; failures do not stop the
    /// remaining ids.
    pub fn delete_students(
        &self,
        teacher_id: &str,
        ids: &[StudentId],
    ) -> BatchDeleteReport<StudentId> {
        self.students.batch_delete(teacher_id, ids)
    }

    /// Deletes the grade and its membership collection in one batch.
    /// Returns how many memberships were removed.
    pub fn delete_grade(&self, teacher_id: &str, grade_id: GradeId) -> RosterResult<usize> {
        self.grades.get_by_id(teacher_id, grade_id)?;
        let removed = self.grades.repo().delete_grade_cascade(grade_id)?;
        info!(
            "event=grade_delete module=roster_engine status=ok grade_id={grade_id} cascade=true memberships_removed={removed}"
        );
        Ok(removed)
    }

    pub fn delete_grades(&self, teacher_id: &str, ids: &[GradeId]) -> BatchDeleteReport<GradeId> {
        let mut report = BatchDeleteReport::new();
        for &id in ids {
            match self.delete_grade(teacher_id, id) {
                Ok(_) => report.deleted.push(id),
                Err(err) => {
                    warn!(
                        "event=grade_delete module=roster_engine status=error grade_id={id} error={err}"
                    );
                    report.failed.push((id, err));
                }
            }
        }
        report
    }

    /// Ids of every student the teacher currently owns.
    pub fn live_student_ids(&self, teacher_id: &str) -> RosterResult<HashSet<StudentId>> {
        Ok(self
            .students
            .list_by_teacher(teacher_id)?
            .into_iter()
            .map(|student| student.id)
            .collect())
    }

    /// Memberships of the grade whose student still exists.
    pub fn roster(&self, teacher_id: &str, grade_id: GradeId) -> RosterResult<Vec<Membership>> {
        self.grades.get_by_id(teacher_id, grade_id)?;
        let live = self.live_student_ids(teacher_id)?;
        self.memberships.list_valid(grade_id, &live)
    }

    /// Count of valid memberships. Does not write.
    pub fn authoritative_count(&self, teacher_id: &str, grade_id: GradeId) -> RosterResult<u32> {
        let valid = self.roster(teacher_id, grade_id)?;
        Ok(clamp_count(valid.len() as i64))
    }

    /// Recomputes the authoritative count and stores it on the grade.
    pub fn recompute_count(&self, teacher_id: &str, grade_id: GradeId) -> RosterResult<u32> {
        let count = self.authoritative_count(teacher_id, grade_id)?;
        self.grades.repo().set_student_count(grade_id, count)?;
        info!(
            "event=grade_count_recompute module=roster_engine status=ok grade_id={grade_id} count={count}"
        );
        Ok(count)
    }

    /// The teacher's grades with `student_count` replaced by the
    /// authoritative count. Stored counters are left as they are.
    pub fn list_grades_with_counts(&self, teacher_id: &str) -> RosterResult<Vec<Grade>> {
        let teacher_id = require_teacher(teacher_id)?;
        let mut grades = self.grades.list_all(teacher_id)?;
        let live = self.live_student_ids(teacher_id)?;
        for grade in &mut grades {
            let valid = self.memberships.list_valid(grade.id, &live)?;
            grade.student_count = clamp_count(valid.len() as i64);
        }
        Ok(grades)
    }

    /// Deletes memberships of the grade whose student no longer exists, then
    /// recomputes the stored count. Returns how many rows were removed.
    pub fn sweep_stale_memberships(
        &self,
        teacher_id: &str,
        grade_id: GradeId,
    ) -> RosterResult<usize> {
        self.grades.get_by_id(teacher_id, grade_id)?;
        let members: Vec<StudentId> = self
            .memberships
            .list(grade_id)?
            .into_iter()
            .map(|entry| entry.student_id)
            .collect();
        let live = self.students.existing_ids(&members)?;
        let removed = self.memberships.sweep(grade_id, &live)?;
        self.recompute_count(teacher_id, grade_id)?;
        Ok(removed)
    }
}
