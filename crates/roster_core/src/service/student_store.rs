//! Student store use-cases.
//!
//! # Responsibility
//! - Teacher-scoped CRUD over canonical student records.
//! - Degrade gracefully on listing: one local full-scan fallback before a
//!   store failure reaches the caller.
//!
//! # Invariants
//! - Only the owning teacher may update or delete a student.
//! - Deleting a student always cascades to every membership row (one batch)
//!   and then decrements the cached count of each grade that lost a row.
//! - Batch import writes all rows or none.

use crate::model::grade::GradeId;
use crate::model::import::ImportRow;
use crate::model::student::{NewStudent, Student, StudentId, StudentPatch, StudentStatus};
use crate::repo::grade_repo::GradeRepository;
use crate::repo::student_repo::StudentRepository;
use crate::service::grade_directory::adjust_count_best_effort;
use crate::service::error::{require_teacher, EntityRef, RosterError, RosterResult};
use log::{error, info, warn};
use std::collections::HashSet;

/// Per-id outcome of a best-effort bulk delete.
#[derive(Debug)]
pub struct BatchDeleteReport<Id> {
    pub deleted: Vec<Id>,
    pub failed: Vec<(Id, RosterError)>,
}

impl<Id> BatchDeleteReport<Id> {
    pub fn new() -> Self {
        Self {
            deleted: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<Id> Default for BatchDeleteReport<Id> {
    fn default() -> Self {
        Self::new()
    }
}

/// Student store facade over a [`StudentRepository`]. Holds the grade
/// repository only to keep cached counts in step with cascading deletes.
pub struct StudentStore<R: StudentRepository, G: GradeRepository> {
    repo: R,
    grades: G,
}

impl<R: StudentRepository, G: GradeRepository> StudentStore<R, G> {
    pub fn new(repo: R, grades: G) -> Self {
        Self { repo, grades }
    }

    /// Lists the teacher's students, newest first.
    ///
    /// When the filtered query fails, scans the whole collection and filters
    /// in memory. Only a failing scan is reported as `StoreUnavailable`.
    pub fn list_by_teacher(&self, teacher_id: &str) -> RosterResult<Vec<Student>> {
        let teacher_id = require_teacher(teacher_id)?;
        let query_err = match self.repo.query_by_teacher(teacher_id) {
            Ok(students) => return Ok(students),
            Err(err) => err,
        };

        warn!(
            "event=student_list module=student_store status=fallback error={}",
            query_err
        );
        let scanned = self.repo.scan_all().map_err(|err| {
            error!(
                "event=student_list module=student_store status=error stage=scan error={}",
                err
            );
            RosterError::StoreUnavailable(err)
        })?;

        let mut students: Vec<Student> = scanned
            .into_iter()
            .filter(|student| student.teacher_id == teacher_id)
            .collect();
        students.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(students)
    }

    pub fn get(&self, id: StudentId) -> RosterResult<Student> {
        self.repo
            .get_student(id)?
            .ok_or(RosterError::NotFound(EntityRef::Student(id)))
    }

    /// Loads a student and checks that `teacher_id` owns it.
    pub fn get_owned(&self, teacher_id: &str, id: StudentId) -> RosterResult<Student> {
        let teacher_id = require_teacher(teacher_id)?;
        let student = self.get(id)?;
        if !student.is_owned_by(teacher_id) {
            return Err(RosterError::Unauthorized {
                teacher_id: teacher_id.to_string(),
                entity: EntityRef::Student(id),
            });
        }
        Ok(student)
    }

    /// Creates one student stamped with the acting teacher.
    pub fn create(&self, teacher_id: &str, draft: NewStudent) -> RosterResult<StudentId> {
        let teacher_id = require_teacher(teacher_id)?;
        let student = Student::new(teacher_id, draft);
        student.validate()?;
        let id = self.repo.insert_student(&student)?;
        info!("event=student_create module=student_store status=ok student_id={id}");
        Ok(id)
    }

    /// Merges `patch` into the stored record and returns the updated record.
    pub fn update(
        &self,
        teacher_id: &str,
        id: StudentId,
        patch: &StudentPatch,
    ) -> RosterResult<Student> {
        let mut student = self.get_owned(teacher_id, id)?;
        if patch.is_empty() {
            return Ok(student);
        }
        patch.apply_to(&mut student);
        student.validate()?;
        self.repo.update_student(&student)?;
        info!("event=student_update module=student_store status=ok student_id={id}");
        self.get(id)
    }

    /// Moves a student between `pending`, `active`, and `inactive`.
    pub fn set_status(
        &self,
        teacher_id: &str,
        id: StudentId,
        status: StudentStatus,
    ) -> RosterResult<Student> {
        let patch = StudentPatch {
            status: Some(status),
            ..StudentPatch::default()
        };
        self.update(teacher_id, id, &patch)
    }

    /// Deletes the student and all of its memberships in one batch, then
    /// decrements the count of every grade that lost a row (best effort).
    /// Returns those grades.
    pub fn delete(&self, teacher_id: &str, id: StudentId) -> RosterResult<Vec<GradeId>> {
        self.get_owned(teacher_id, id)?;
        let grades = self.repo.delete_student_cascade(id)?;
        for &grade_id in &grades {
            adjust_count_best_effort(&self.grades, grade_id, -1, "student_store");
        }
        info!(
            "event=student_delete module=student_store status=ok student_id={id} memberships_removed={}",
            grades.len()
        );
        Ok(grades)
    }

    /// Inserts one student per row in a single batch with import defaults
    /// (attendance 0, `Good`, `Pending`). Ids are returned in input order.
    pub fn batch_import(
        &self,
        teacher_id: &str,
        rows: &[ImportRow],
    ) -> RosterResult<Vec<StudentId>> {
        let teacher_id = require_teacher(teacher_id)?;
        validate_import_rows(rows)?;

        let students: Vec<Student> = rows
            .iter()
            .map(|row| {
                let draft = NewStudent::named(row.name.as_str())
                    .with_grade_label(row.grade.as_str())
                    .with_reading_level(row.reading_level.as_str());
                Student::new(teacher_id, draft)
            })
            .collect();
        let ids = self.repo.insert_students(&students)?;
        info!(
            "event=student_batch_import module=student_store status=ok rows={}",
            ids.len()
        );
        Ok(ids)
    }

    /// Deletes each id with its own cascade. Failures are collected per id
    /// and never stop the remaining deletes.
    pub fn batch_delete(
        &self,
        teacher_id: &str,
        ids: &[StudentId],
    ) -> BatchDeleteReport<StudentId> {
        let mut report = BatchDeleteReport::new();
        for &id in ids {
            match self.delete(teacher_id, id) {
                Ok(_) => report.deleted.push(id),
                Err(err) => {
                    warn!(
                        "event=student_batch_delete module=student_store status=error student_id={id} error={err}"
                    );
                    report.failed.push((id, err));
                }
            }
        }
        report
    }

    /// Subset of `ids` that still resolve to a student record.
    pub fn existing_ids(&self, ids: &[StudentId]) -> RosterResult<HashSet<StudentId>> {
        Ok(self.repo.existing_ids(ids)?)
    }
}

/// Rejects rows without a name before anything is written.
pub(crate) fn validate_import_rows(rows: &[ImportRow]) -> RosterResult<()> {
    if rows.is_empty() {
        return Err(RosterError::ValidationFailed(
            "import requires at least one row".to_string(),
        ));
    }
    if let Some(index) = rows.iter().position(|row| row.name.trim().is_empty()) {
        return Err(RosterError::ValidationFailed(format!(
            "import row {index}: name is required"
        )));
    }
    Ok(())
}
