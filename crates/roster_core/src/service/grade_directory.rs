//! Grade directory use-cases.
//!
//! # Responsibility
//! - Teacher-scoped CRUD over grade records.
//! - Own the cached `student_count` writes (absolute set and atomic adjust).
//!
//! # Invariants
//! - Every operation checks that the acting teacher owns the grade.
//! - Grade names are unique per teacher, case-insensitively.
//! - `delete` removes the grade row only. Cascading deletes belong to the
//!   reconciliation engine.

use crate::model::grade::{Grade, GradeId, GradePatch, NewGrade};
use crate::repo::error::RepoError;
use crate::repo::grade_repo::GradeRepository;
use crate::service::error::{require_teacher, EntityRef, RosterError, RosterResult};
use log::{info, warn};

/// Grade directory facade over a [`GradeRepository`].
pub struct GradeDirectory<G: GradeRepository> {
    repo: G,
}

impl<G: GradeRepository> GradeDirectory<G> {
    pub fn new(repo: G) -> Self {
        Self { repo }
    }

    pub(crate) fn repo(&self) -> &G {
        &self.repo
    }

    pub fn create(&self, teacher_id: &str, draft: NewGrade) -> RosterResult<GradeId> {
        let teacher_id = require_teacher(teacher_id)?;
        let grade = Grade::new(teacher_id, draft);
        grade.validate()?;
        self.ensure_name_free(&grade, None)?;
        let id = self.repo.insert_grade(&grade)?;
        info!("event=grade_create module=grade_directory status=ok grade_id={id}");
        Ok(id)
    }

    /// Loads one grade owned by `teacher_id`.
    pub fn get_by_id(&self, teacher_id: &str, id: GradeId) -> RosterResult<Grade> {
        let teacher_id = require_teacher(teacher_id)?;
        let grade = self
            .repo
            .get_grade(id)?
            .ok_or(RosterError::NotFound(EntityRef::Grade(id)))?;
        if !grade.is_owned_by(teacher_id) {
            return Err(RosterError::Unauthorized {
                teacher_id: teacher_id.to_string(),
                entity: EntityRef::Grade(id),
            });
        }
        Ok(grade)
    }

    /// All grades of the teacher in creation order.
    pub fn list_all(&self, teacher_id: &str) -> RosterResult<Vec<Grade>> {
        let teacher_id = require_teacher(teacher_id)?;
        Ok(self.repo.list_grades(teacher_id)?)
    }

    /// Active grades sorted by name, ignoring case.
    pub fn list_active(&self, teacher_id: &str) -> RosterResult<Vec<Grade>> {
        let mut grades: Vec<Grade> = self
            .list_all(teacher_id)?
            .into_iter()
            .filter(|grade| grade.is_active)
            .collect();
        grades.sort_by_cached_key(|grade| (grade.name.to_lowercase(), grade.id));
        Ok(grades)
    }

    pub fn update(&self, teacher_id: &str, id: GradeId, patch: &GradePatch) -> RosterResult<Grade> {
        let mut grade = self.get_by_id(teacher_id, id)?;
        patch.apply_to(&mut grade);
        grade.validate()?;
        if patch.name.is_some() {
            self.ensure_name_free(&grade, Some(id))?;
        }
        self.repo.update_grade(&grade)?;
        info!("event=grade_update module=grade_directory status=ok grade_id={id}");
        self.get_by_id(teacher_id, id)
    }

    /// Removes the grade row. Membership rows are left in place.
    pub fn delete(&self, teacher_id: &str, id: GradeId) -> RosterResult<()> {
        self.get_by_id(teacher_id, id)?;
        self.repo.delete_grade(id)?;
        info!("event=grade_delete module=grade_directory status=ok grade_id={id} cascade=false");
        Ok(())
    }

    /// Stores an absolute count. Negative inputs are clamped to zero.
    pub fn set_student_count(
        &self,
        teacher_id: &str,
        id: GradeId,
        count: i64,
    ) -> RosterResult<u32> {
        self.get_by_id(teacher_id, id)?;
        let clamped = clamp_count(count);
        self.repo.set_student_count(id, clamped)?;
        Ok(clamped)
    }

    /// Applies `delta` atomically, clamped at zero. Returns the new value.
    pub fn adjust_student_count(
        &self,
        teacher_id: &str,
        id: GradeId,
        delta: i64,
    ) -> RosterResult<u32> {
        self.get_by_id(teacher_id, id)?;
        Ok(self.repo.adjust_student_count(id, delta)?)
    }

    fn ensure_name_free(&self, grade: &Grade, excluding: Option<GradeId>) -> RosterResult<()> {
        if self
            .repo
            .grade_name_taken(&grade.teacher_id, &grade.name, excluding)?
        {
            return Err(RepoError::DuplicateGradeName {
                teacher_id: grade.teacher_id.clone(),
                name: grade.name.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// Applies a counter delta after a committed mutation. Failures are logged
/// and swallowed; `recompute_count` heals the cache.
pub(crate) fn adjust_count_best_effort<G: GradeRepository>(
    grades: &G,
    grade_id: GradeId,
    delta: i64,
    module: &str,
) {
    if let Err(err) = grades.adjust_student_count(grade_id, delta) {
        warn!(
            "event=grade_count_adjust module={module} status=error grade_id={grade_id} delta={delta} error={err}"
        );
    }
}

pub(crate) fn clamp_count(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}
