use roster_core::db::{open_db, open_db_in_memory};
use roster_core::{
    CancelFlag, EntityRef, GradeId, ImportLinkMode, ImportRow, NewGrade, NewStudent,
    RosterError, SqliteRosterEngine, StudentId,
};
use rusqlite::Connection;
use std::thread;
use std::time::Duration;

const TEACHER: &str = "teacher-a";
const OTHER: &str = "teacher-b";

fn stored_count(conn: &Connection, grade: GradeId) -> i64 {
    conn.query_row(
        "SELECT student_count FROM grades WHERE uuid = ?1;",
        [grade.to_string()],
        |row| row.get(0),
    )
    .unwrap()
}

fn membership_rows(conn: &Connection, student: StudentId) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM grade_memberships WHERE student_uuid = ?1;",
        [student.to_string()],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn repeated_add_membership_keeps_one_entry() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();

    assert!(engine.add_membership(TEACHER, grade, ana).unwrap());
    assert!(!engine.add_membership(TEACHER, grade, ana).unwrap());

    assert_eq!(engine.memberships().list(grade).unwrap().len(), 1);
    assert_eq!(stored_count(&conn, grade), 1);
    assert_eq!(engine.recompute_count(TEACHER, grade).unwrap(), 1);
}

#[test]
fn student_delete_cascades_across_grades() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let first = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let second = engine.grades().create(TEACHER, NewGrade::named("Grade 2")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();
    let ben = engine.students().create(TEACHER, NewStudent::named("Ben")).unwrap();
    engine.add_membership(TEACHER, first, ana).unwrap();
    engine.add_membership(TEACHER, second, ana).unwrap();
    engine.add_membership(TEACHER, second, ben).unwrap();

    let mut affected = engine.delete_student(TEACHER, ana).unwrap();
    affected.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(affected, expected);

    assert_eq!(membership_rows(&conn, ana), 0);
    for grade in [first, second] {
        let roster = engine.roster(TEACHER, grade).unwrap();
        assert!(roster.iter().all(|entry| entry.student_id != ana));
    }
    assert!(matches!(
        engine.students().get(ana),
        Err(RosterError::NotFound(EntityRef::Student(_)))
    ));
    assert_eq!(stored_count(&conn, first), 0);
    assert_eq!(stored_count(&conn, second), 1);
    assert!(engine.memberships().exists(second, ben).unwrap());
}

#[test]
fn removing_absent_membership_never_goes_negative() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();

    for _ in 0..3 {
        assert!(!engine.remove_membership(TEACHER, grade, ana).unwrap());
    }
    assert_eq!(stored_count(&conn, grade), 0);
}

#[test]
fn import_links_every_row_and_recompute_matches() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 2")).unwrap();
    let rows = vec![
        ImportRow::new("Ana", "Grade 2", "B"),
        ImportRow::new("Ben", "Grade 2", "C"),
    ];

    let summary = engine.import(TEACHER, grade, &rows).unwrap();

    assert_eq!(summary.total_rows, 2);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.linked, 2);
    assert!(!summary.is_partial());
    assert_eq!(engine.recompute_count(TEACHER, grade).unwrap(), 2);
    assert_eq!(stored_count(&conn, grade), 2);

    let imported = engine.students().list_by_teacher(TEACHER).unwrap();
    assert!(imported.iter().all(|student| student.grade_label == "Grade 2"));
}

#[test]
fn authoritative_count_ignores_corrupted_cache_and_stale_rows() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    for name in ["Ana", "Ben", "Cy"] {
        let id = engine.students().create(TEACHER, NewStudent::named(name)).unwrap();
        engine.add_membership(TEACHER, grade, id).unwrap();
    }
    // Remove one student behind the engine's back to leave a stale row.
    let stale = engine.memberships().list(grade).unwrap()[2].student_id;
    conn.execute("DELETE FROM students WHERE uuid = ?1;", [stale.to_string()])
        .unwrap();
    engine.grades().set_student_count(TEACHER, grade, 99).unwrap();

    let listed = engine.list_grades_with_counts(TEACHER).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].student_count, 2);
    assert_eq!(stored_count(&conn, grade), 99);

    assert_eq!(engine.authoritative_count(TEACHER, grade).unwrap(), 2);
    assert_eq!(engine.recompute_count(TEACHER, grade).unwrap(), 2);
    assert_eq!(stored_count(&conn, grade), 2);
}

#[test]
fn duplicate_names_collapse_in_name_matching_but_not_by_id() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let legacy = engine.grades().create(TEACHER, NewGrade::named("Grade 3")).unwrap();
    let exact = engine.grades().create(TEACHER, NewGrade::named("Grade 4")).unwrap();

    let twins = vec![
        ImportRow::new("Sam", "Grade 3", ""),
        ImportRow::new("Sam", "Grade 3", ""),
    ];
    let summary = engine
        .import_rows(
            TEACHER,
            legacy,
            &twins,
            ImportLinkMode::ByNameAndGrade,
            &CancelFlag::new(),
        )
        .unwrap();
    assert_eq!(summary.created, 2);
    assert_eq!(summary.linked, 1);
    assert_eq!(summary.skipped, 1);
    assert!(summary.is_partial());
    assert_eq!(engine.memberships().list(legacy).unwrap().len(), 1);

    let twins = vec![
        ImportRow::new("Sam", "Grade 4", ""),
        ImportRow::new("Sam", "Grade 4", ""),
    ];
    let summary = engine.import(TEACHER, exact, &twins).unwrap();
    assert_eq!(summary.linked, 2);
    assert!(!summary.is_partial());
    assert_eq!(engine.memberships().list(exact).unwrap().len(), 2);
}

#[test]
fn import_then_delete_student_end_to_end() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine
        .grades()
        .create(TEACHER, NewGrade::named("Grade 1 - A"))
        .unwrap();

    let summary = engine
        .import(TEACHER, grade, &[ImportRow::new("Dan", "Grade 1 - A", "A")])
        .unwrap();
    assert_eq!(summary.linked, 1);

    let dan = engine.students().list_by_teacher(TEACHER).unwrap()[0].id;
    assert!(engine.memberships().exists(grade, dan).unwrap());
    assert_eq!(engine.recompute_count(TEACHER, grade).unwrap(), 1);

    engine.delete_student(TEACHER, dan).unwrap();
    assert!(engine.memberships().list(grade).unwrap().is_empty());
    assert_eq!(engine.recompute_count(TEACHER, grade).unwrap(), 0);
}

#[test]
fn membership_operations_enforce_ownership() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();
    let zoe = engine.students().create(OTHER, NewStudent::named("Zoe")).unwrap();

    match engine.add_membership(TEACHER, grade, zoe) {
        Err(RosterError::Unauthorized { entity, .. }) => {
            assert_eq!(entity, EntityRef::Student(zoe))
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        engine.add_membership(OTHER, grade, zoe),
        Err(RosterError::Unauthorized { entity: EntityRef::Grade(_), .. })
    ));
    engine.add_membership(TEACHER, grade, ana).unwrap();
    assert!(matches!(
        engine.remove_membership(OTHER, grade, ana),
        Err(RosterError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.delete_student(OTHER, ana),
        Err(RosterError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.add_membership("", grade, ana),
        Err(RosterError::ValidationFailed(_))
    ));
    assert!(engine.memberships().exists(grade, ana).unwrap());
}

#[test]
fn import_into_foreign_grade_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(OTHER, NewGrade::named("Grade 1")).unwrap();

    assert!(matches!(
        engine.import(TEACHER, grade, &[ImportRow::new("Ana", "", "")]),
        Err(RosterError::Unauthorized { .. })
    ));
    assert!(engine.students().list_by_teacher(TEACHER).unwrap().is_empty());
}

#[test]
fn grade_delete_cascades_memberships() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let first = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let second = engine.grades().create(TEACHER, NewGrade::named("Grade 2")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();
    engine.add_membership(TEACHER, first, ana).unwrap();
    engine.add_membership(TEACHER, second, ana).unwrap();

    assert_eq!(engine.delete_grade(TEACHER, first).unwrap(), 1);
    assert_eq!(membership_rows(&conn, ana), 1);
    assert!(engine.students().get(ana).is_ok());

    let foreign = engine.grades().create(OTHER, NewGrade::named("Grade 9")).unwrap();
    let report = engine.delete_grades(TEACHER, &[second, foreign]);
    assert_eq!(report.deleted, vec![second]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(membership_rows(&conn, ana), 0);
}

#[test]
fn sweep_removes_stale_memberships_and_heals_count() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();
    let ben = engine.students().create(TEACHER, NewStudent::named("Ben")).unwrap();
    engine.add_membership(TEACHER, grade, ana).unwrap();
    engine.add_membership(TEACHER, grade, ben).unwrap();
    conn.execute("DELETE FROM students WHERE uuid = ?1;", [ben.to_string()])
        .unwrap();

    assert_eq!(engine.sweep_stale_memberships(TEACHER, grade).unwrap(), 1);
    assert!(!engine.memberships().exists(grade, ben).unwrap());
    assert_eq!(stored_count(&conn, grade), 1);
    assert_eq!(engine.roster(TEACHER, grade).unwrap().len(), 1);
}

#[test]
fn delete_students_reports_per_id_failures() {
    let conn = open_db_in_memory().unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();
    let zoe = engine.students().create(OTHER, NewStudent::named("Zoe")).unwrap();
    engine.add_membership(TEACHER, grade, ana).unwrap();

    let report = engine.delete_students(TEACHER, &[zoe, ana]);

    assert_eq!(report.deleted, vec![ana]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, zoe);
    assert_eq!(stored_count(&conn, grade), 0);
}

#[test]
fn add_membership_waits_for_concurrent_cascade_and_writes_no_orphan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.sqlite3");
    let conn = open_db(&path).unwrap();
    let engine = SqliteRosterEngine::open(&conn).unwrap();
    let grade = engine.grades().create(TEACHER, NewGrade::named("Grade 1")).unwrap();
    let ana = engine.students().create(TEACHER, NewStudent::named("Ana")).unwrap();

    conn.execute_batch(&format!(
        "BEGIN IMMEDIATE;
         DELETE FROM grade_memberships WHERE student_uuid = '{ana}';
         DELETE FROM students WHERE uuid = '{ana}';"
    ))
    .unwrap();

    let writer_path = path.clone();
    let writer = thread::spawn(move || {
        let conn = open_db(&writer_path).unwrap();
        let engine = SqliteRosterEngine::open(&conn).unwrap();
        engine
            .add_membership(TEACHER, grade, ana)
            .map_err(|err| matches!(err, RosterError::NotFound(EntityRef::Student(id)) if id == ana))
    });

    thread::sleep(Duration::from_millis(200));
    conn.execute_batch("COMMIT;").unwrap();

    assert_eq!(writer.join().unwrap(), Err(true));
    assert_eq!(membership_rows(&conn, ana), 0);
    assert_eq!(stored_count(&conn, grade), 0);
}
