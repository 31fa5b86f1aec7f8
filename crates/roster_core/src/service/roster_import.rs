//! Bulk import pipeline of the reconciliation engine.
//!
//! # Responsibility
//! - Turn parsed rows into students and link them to one target grade.
//! - Run the pipeline as a journaled, resumable saga:
//!   1. journal the run (`pending`)
//!   2. create students and record their ids in one batch (`students_created`)
//!   3. resolve each row to a student and add the membership (`completed`)
//!
//! # Invariants
//! - A journal row whose `student_uuid` is set never produces another student,
//!   so resuming a run cannot duplicate records.
//! - Cancellation is checked before each batch. Committed batches stay.
//! - Unresolvable rows are skipped, not errors; the summary reports them.

use crate::model::grade::GradeId;
use crate::model::import::{
    ImportLinkMode, ImportRow, ImportRowState, ImportRun, ImportRunId, ImportRunRow,
    ImportRunStatus, ImportSummary,
};
use crate::model::student::{Student, StudentId};
use crate::model::text::{match_key, normalize_label};
use crate::repo::grade_repo::GradeRepository;
use crate::repo::import_repo::ImportRunRepository;
use crate::repo::membership_repo::MembershipRepository;
use crate::repo::student_repo::StudentRepository;
use crate::service::cancel::CancelFlag;
use crate::service::error::{require_teacher, EntityRef, RosterError, RosterResult};
use crate::service::roster_engine::RosterEngine;
use crate::service::student_store::validate_import_rows;
use log::{info, warn};
use std::collections::HashSet;

/// Resolution of one journal row before linking.
struct RowTarget {
    row_index: u32,
    student: Option<(StudentId, String)>,
}

impl<S, G, M, I> RosterEngine<S, G, M, I>
where
    S: StudentRepository,
    G: GradeRepository + Clone,
    M: MembershipRepository,
    I: ImportRunRepository,
{
    /// Imports rows into `grade_id` with the default `ById` linking.
    pub fn import(
        &self,
        teacher_id: &str,
        grade_id: GradeId,
        rows: &[ImportRow],
    ) -> RosterResult<ImportSummary> {
        self.import_rows(
            teacher_id,
            grade_id,
            rows,
            ImportLinkMode::default(),
            &CancelFlag::new(),
        )
    }

    /// Journals and runs a full import.
    ///
    /// On `Cancelled` or a store failure the run keeps its committed progress.
    /// Callers that want to continue it later should split the call into
    /// [`RosterEngine::begin_import`] and [`RosterEngine::resume_import`] to
    /// hold on to the run id.
    pub fn import_rows(
        &self,
        teacher_id: &str,
        grade_id: GradeId,
        rows: &[ImportRow],
        link_mode: ImportLinkMode,
        cancel: &CancelFlag,
    ) -> RosterResult<ImportSummary> {
        let run_id = self.begin_import(teacher_id, grade_id, rows, link_mode)?;
        self.drive_run(run_id, cancel)
    }

    /// Validates the request and writes the journal without creating any
    /// student. Returns the resume token.
    pub fn begin_import(
        &self,
        teacher_id: &str,
        grade_id: GradeId,
        rows: &[ImportRow],
        link_mode: ImportLinkMode,
    ) -> RosterResult<ImportRunId> {
        let teacher_id = require_teacher(teacher_id)?;
        validate_import_rows(rows)?;
        let grade = self.grades().get_by_id(teacher_id, grade_id)?;

        let journal: Vec<ImportRow> = rows
            .iter()
            .map(|row| {
                let label = normalize_label(&row.grade);
                ImportRow {
                    name: normalize_label(&row.name),
                    grade: if label.is_empty() {
                        grade.name.clone()
                    } else {
                        label
                    },
                    reading_level: row.reading_level.trim().to_string(),
                }
            })
            .collect();

        let run_id = self
            .imports()
            .create_run(teacher_id, grade_id, link_mode, &journal)?;
        info!(
            "event=import_begin module=roster_import status=ok run_id={run_id} grade_id={grade_id} rows={} link_mode={}",
            journal.len(),
            link_mode.as_str()
        );
        Ok(run_id)
    }

    /// Continues an interrupted run. Completed runs return their summary
    /// unchanged.
    pub fn resume_import(
        &self,
        teacher_id: &str,
        run_id: ImportRunId,
        cancel: &CancelFlag,
    ) -> RosterResult<ImportSummary> {
        let teacher_id = require_teacher(teacher_id)?;
        let run = self.load_run(run_id)?;
        if run.teacher_id != teacher_id {
            return Err(RosterError::Unauthorized {
                teacher_id: teacher_id.to_string(),
                entity: EntityRef::ImportRun(run_id),
            });
        }
        if run.status == ImportRunStatus::Completed {
            return Ok(run.summary());
        }
        info!("event=import_resume module=roster_import status=start run_id={run_id}");
        self.drive_run(run_id, cancel)
    }

    /// Current journal state of a run.
    pub fn import_run(&self, teacher_id: &str, run_id: ImportRunId) -> RosterResult<ImportRun> {
        let teacher_id = require_teacher(teacher_id)?;
        let run = self.load_run(run_id)?;
        if run.teacher_id != teacher_id {
            return Err(RosterError::Unauthorized {
                teacher_id: teacher_id.to_string(),
                entity: EntityRef::ImportRun(run_id),
            });
        }
        Ok(run)
    }

    fn load_run(&self, run_id: ImportRunId) -> RosterResult<ImportRun> {
        self.imports()
            .get_run(run_id)?
            .ok_or(RosterError::NotFound(EntityRef::ImportRun(run_id)))
    }

    fn drive_run(&self, run_id: ImportRunId, cancel: &CancelFlag) -> RosterResult<ImportSummary> {
        let mut run = self.load_run(run_id)?;
        if run.status == ImportRunStatus::Completed {
            return Ok(run.summary());
        }

        if run.needs_student_creation() {
            cancel.check("student_batch")?;
            let created = self.imports().create_students_for_run(run_id)?;
            info!(
                "event=import_students module=roster_import status=ok run_id={run_id} created={}",
                created.len()
            );
            run = self.load_run(run_id)?;
        } else if run.status == ImportRunStatus::Pending {
            self.imports()
                .set_run_status(run_id, ImportRunStatus::StudentsCreated)?;
        }

        let targets = match run.link_mode {
            ImportLinkMode::ById => resolve_by_id(&run),
            ImportLinkMode::ByNameAndGrade => {
                cancel.check("resolve")?;
                let students = self.students().list_by_teacher(&run.teacher_id)?;
                resolve_by_name_and_grade(&run, &students)
            }
        };

        for target in targets {
            cancel.check("link")?;
            self.link_row(&run, target)?;
        }

        self.imports()
            .set_run_status(run_id, ImportRunStatus::Completed)?;
        let summary = self.load_run(run_id)?.summary();
        info!(
            "event=import_complete module=roster_import status=ok run_id={run_id} total={} created={} linked={} skipped={} partial={}",
            summary.total_rows,
            summary.created,
            summary.linked,
            summary.skipped,
            summary.is_partial()
        );
        Ok(summary)
    }

    fn link_row(&self, run: &ImportRun, target: RowTarget) -> RosterResult<()> {
        let Some((student_id, name)) = target.student else {
            warn!(
                "event=import_link module=roster_import status=skipped run_id={} row={} reason=unresolved",
                run.id, target.row_index
            );
            self.imports()
                .mark_row(run.id, target.row_index, ImportRowState::Skipped, None)?;
            return Ok(());
        };

        match self.memberships().add(run.grade_id, student_id, &name) {
            Ok(_) => {
                self.imports().mark_row(
                    run.id,
                    target.row_index,
                    ImportRowState::Linked,
                    Some(student_id),
                )?;
                Ok(())
            }
            Err(RosterError::NotFound(EntityRef::Student(_))) => {
                warn!(
                    "event=import_link module=roster_import status=skipped run_id={} row={} reason=student_missing",
                    run.id, target.row_index
                );
                self.imports()
                    .mark_row(run.id, target.row_index, ImportRowState::Skipped, None)?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

fn pending_rows(run: &ImportRun) -> impl Iterator<Item = &ImportRunRow> {
    run.rows
        .iter()
        .filter(|row| row.state == ImportRowState::Pending)
}

/// Links each row to the student created for it.
fn resolve_by_id(run: &ImportRun) -> Vec<RowTarget> {
    pending_rows(run)
        .map(|row| RowTarget {
            row_index: row.row_index,
            student: row.student_id.map(|id| (id, row.name.clone())),
        })
        .collect()
}

/// Legacy resolution: the first student (newest first) whose normalized name
/// and grade label match the row. A student claimed by an earlier row of the
/// same run is not reused and the later row is skipped.
fn resolve_by_name_and_grade(run: &ImportRun, students: &[Student]) -> Vec<RowTarget> {
    let mut claimed: HashSet<StudentId> = run
        .rows
        .iter()
        .filter_map(|row| row.linked_student_id)
        .collect();

    pending_rows(run)
        .map(|row| {
            let name_key = match_key(&row.name);
            let grade_key = match_key(&row.grade_label);
            let first_match = students.iter().find(|student| {
                match_key(&student.name) == name_key && match_key(&student.grade_label) == grade_key
            });
            let student = match first_match {
                Some(student) if claimed.insert(student.id) => {
                    Some((student.id, student.name.clone()))
                }
                _ => None,
            };
            RowTarget {
                row_index: row.row_index,
                student,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{resolve_by_id, resolve_by_name_and_grade};
    use crate::model::import::{
        ImportLinkMode, ImportRowState, ImportRun, ImportRunRow, ImportRunStatus,
    };
    use crate::model::student::{NewStudent, Student};
    use uuid::Uuid;

    fn journal_row(index: u32, name: &str, student_id: Option<Uuid>) -> ImportRunRow {
        ImportRunRow {
            row_index: index,
            name: name.to_string(),
            grade_label: "Grade 2".to_string(),
            reading_level: String::new(),
            student_id,
            state: ImportRowState::Pending,
            linked_student_id: None,
        }
    }

    fn run_with(rows: Vec<ImportRunRow>, link_mode: ImportLinkMode) -> ImportRun {
        ImportRun {
            id: Uuid::new_v4(),
            teacher_id: "t-1".to_string(),
            grade_id: Uuid::new_v4(),
            link_mode,
            status: ImportRunStatus::StudentsCreated,
            rows,
        }
    }

    fn student(name: &str) -> Student {
        Student::new("t-1", NewStudent::named(name).with_grade_label("grade  2"))
    }

    #[test]
    fn by_id_skips_already_resolved_rows() {
        let first = Uuid::new_v4();
        let mut done = journal_row(0, "Ana", Some(first));
        done.state = ImportRowState::Linked;
        let run = run_with(
            vec![done, journal_row(1, "Ben", Some(Uuid::new_v4()))],
            ImportLinkMode::ById,
        );

        let targets = resolve_by_id(&run);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].row_index, 1);
        assert!(targets[0].student.is_some());
    }

    #[test]
    fn by_name_never_reuses_a_claimed_student() {
        let sam = student("Sam");
        let run = run_with(
            vec![journal_row(0, "Sam", None), journal_row(1, "sam", None)],
            ImportLinkMode::ByNameAndGrade,
        );

        let targets = resolve_by_name_and_grade(&run, &[sam.clone(), student("Sam")]);
        assert_eq!(targets[0].student.as_ref().map(|(id, _)| *id), Some(sam.id));
        assert!(targets[1].student.is_none());
    }

    #[test]
    fn by_name_counts_previous_links_as_claimed() {
        let sam = student("Sam");
        let mut linked = journal_row(0, "Sam", None);
        linked.state = ImportRowState::Linked;
        linked.linked_student_id = Some(sam.id);
        let run = run_with(
            vec![linked, journal_row(1, "Sam", None)],
            ImportLinkMode::ByNameAndGrade,
        );

        let targets = resolve_by_name_and_grade(&run, &[sam]);
        assert_eq!(targets.len(), 1);
        assert!(targets[0].student.is_none());
    }
}
