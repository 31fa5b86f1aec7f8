use roster_core::db::open_db_in_memory;
use roster_core::repo::grade_repo::{GradeRepository, SqliteGradeRepository};
use roster_core::repo::membership_repo::SqliteMembershipRepository;
use roster_core::service::membership_index::MembershipIndex;
use roster_core::{
    Grade, GradeId, NewGrade, NewStudent, RepoError, RepoResult, RosterError, SqliteRosterEngine,
    StudentId,
};
use std::collections::HashSet;
use uuid::Uuid;

const TEACHER: &str = "teacher-a";

#[test]
fn add_is_idempotent_and_counts_once() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();

    assert!(engine.memberships().add(grade, ana, "Ana").unwrap());
    assert!(!engine.memberships().add(grade, ana, "Ana").unwrap());

    assert_eq!(engine.memberships().list(grade).unwrap().len(), 1);
    assert!(engine.memberships().exists(grade, ana).unwrap());
    assert_eq!(
        engine.grades().get_by_id(TEACHER, grade).unwrap().student_count,
        1
    );
}

#[test]
fn remove_of_absent_entry_keeps_count_floor() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();

    assert!(!engine.memberships().remove(grade, ana).unwrap());
    assert!(!engine.memberships().remove(grade, ana).unwrap());
    assert_eq!(
        engine.grades().get_by_id(TEACHER, grade).unwrap().student_count,
        0
    );

    engine.memberships().add(grade, ana, "Ana").unwrap();
    assert!(engine.memberships().remove(grade, ana).unwrap());
    assert!(!engine.memberships().remove(grade, ana).unwrap());
    assert_eq!(
        engine.grades().get_by_id(TEACHER, grade).unwrap().student_count,
        0
    );
}

#[test]
fn add_requires_existing_grade_and_student() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();

    assert!(matches!(
        engine.memberships().add(grade, Uuid::new_v4(), "Ghost"),
        Err(RosterError::NotFound(_))
    ));
    assert!(matches!(
        engine.memberships().add(Uuid::new_v4(), ana, "Ana"),
        Err(RosterError::NotFound(_))
    ));
    assert!(engine.memberships().list(grade).unwrap().is_empty());
}

#[test]
fn list_is_ordered_by_name_then_id() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    for name in ["carla", "Ben", "ana"] {
        let id = engine.students().create(TEACHER, NewStudent::named(name)).unwrap();
        engine.memberships().add(grade, id, name).unwrap();
    }

    let names: Vec<String> = engine
        .memberships()
        .list(grade)
        .unwrap()
        .into_iter()
        .map(|entry| entry.student_name)
        .collect();
    assert_eq!(names, vec!["ana", "Ben", "carla"]);
}

#[test]
fn list_valid_and_sweep_ignore_live_students() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();
    let ben = engine.students().create(TEACHER, NewStudent::named("Ben")).unwrap();
    engine.memberships().add(grade, ana, "Ana").unwrap();
    engine.memberships().add(grade, ben, "Ben").unwrap();

    let live: HashSet<StudentId> = HashSet::from([ana]);
    let valid = engine.memberships().list_valid(grade, &live).unwrap();
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].student_id, ana);

    assert_eq!(engine.memberships().sweep(grade, &live).unwrap(), 1);
    assert_eq!(engine.memberships().sweep(grade, &live).unwrap(), 0);
    assert!(!engine.memberships().exists(grade, ben).unwrap());
}

#[test]
fn list_for_student_spans_grades() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let first = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let second = engine.grades().create(TEACHER, NewGrade::named("Grade 2")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();
    engine.memberships().add(first, ana, "Ana").unwrap();
    engine.memberships().add(second, ana, "Ana").unwrap();

    let grades: HashSet<_> = engine
        .memberships()
        .list_for_student(ana)
        .unwrap()
        .into_iter()
        .map(|entry| entry.grade_id)
        .collect();
    assert_eq!(grades, HashSet::from([first, second]));
}

/// Grade repository whose counter writes always fail.
struct BrokenCounter<'conn> {
    inner: SqliteGradeRepository<'conn>,
}

impl GradeRepository for BrokenCounter<'_> {
    fn insert_grade(&self, grade: &Grade) -> RepoResult<GradeId> {
        self.inner.insert_grade(grade)
    }
    fn get_grade(&self, id: GradeId) -> RepoResult<Option<Grade>> {
        self.inner.get_grade(id)
    }
    fn list_grades(&self, teacher_id: &str) -> RepoResult<Vec<Grade>> {
        self.inner.list_grades(teacher_id)
    }
    fn update_grade(&self, grade: &Grade) -> RepoResult<()> {
        self.inner.update_grade(grade)
    }
    fn delete_grade(&self, id: GradeId) -> RepoResult<()> {
        self.inner.delete_grade(id)
    }
    fn delete_grade_cascade(&self, id: GradeId) -> RepoResult<usize> {
        self.inner.delete_grade_cascade(id)
    }
    fn set_student_count(&self, _id: GradeId, _count: u32) -> RepoResult<()> {
        Err(RepoError::InvalidData("counter unavailable".to_string()))
    }
    fn adjust_student_count(&self, _id: GradeId, _delta: i64) -> RepoResult<u32> {
        Err(RepoError::InvalidData("counter unavailable".to_string()))
    }
    fn grade_name_taken(
        &self,
        teacher_id: &str,
        name: &str,
        excluding: Option<GradeId>,
    ) -> RepoResult<bool> {
        self.inner.grade_name_taken(teacher_id, name, excluding)
    }
}

#[test]
fn counter_failure_does_not_fail_add_or_remove() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();
    let index = MembershipIndex::new(
        SqliteMembershipRepository::try_new(&conn).unwrap(),
        BrokenCounter {
            inner: SqliteGradeRepository::try_new(&conn).unwrap(),
        },
    );

    assert!(index.add(grade, ana, "Ana").unwrap());
    assert!(index.exists(grade, ana).unwrap());
    assert_eq!(engine.grades().get_by_id(TEACHER, grade).unwrap().student_count, 0);
    assert_eq!(engine.recompute_count(TEACHER, grade).unwrap(), 1);

    assert!(index.remove(grade, ana).unwrap());
    assert!(!index.exists(grade, ana).unwrap());
    assert_eq!(engine.grades().get_by_id(TEACHER, grade).unwrap().student_count, 1);
}
