use roster_core::db::{latest_version, open_db, open_db_in_memory, schema_version, DbError};
use roster_core::repo::grade_repo::SqliteGradeRepository;
use roster_core::repo::student_repo::SqliteStudentRepository;
use roster_core::{RepoError, SqliteRosterEngine};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    for table in [
        "students",
        "grades",
        "grade_memberships",
        "import_runs",
        "import_run_rows",
    ] {
        assert_table_exists(&conn, table);
    }
    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1);
}

#[test]
fn reopening_file_database_keeps_schema_and_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.sqlite3");

    let conn = open_db(&path).unwrap();
    conn.execute(
        "INSERT INTO grades (uuid, teacher_id, name) VALUES ('g-1', 't-1', 'Grade 1');",
        [],
    )
    .unwrap();
    drop(conn);

    let reopened = open_db(&path).unwrap();
    assert_eq!(schema_version(&reopened).unwrap(), latest_version());
    let grades: i64 = reopened
        .query_row("SELECT COUNT(*) FROM grades;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(grades, 1);
    assert!(SqliteRosterEngine::open(&reopened).is_ok());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 42;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 42);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failing_migration_step_is_named_and_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE students (uuid TEXT PRIMARY KEY);")
        .unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::MigrationFailed { version, name, .. } => {
            assert_eq!(version, 1);
            assert_eq!(name, "roster_init");
        }
        other => panic!("unexpected error: {other}"),
    }

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), 0);
    let grades: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'grades';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(grades, 0);
}

#[test]
fn repositories_reject_unmigrated_connections() {
    let raw = Connection::open_in_memory().unwrap();

    match SqliteStudentRepository::try_new(&raw) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(expected_version, latest_version());
            assert_eq!(actual_version, 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unmigrated connection must be rejected"),
    }
}

#[test]
fn repositories_report_missing_columns() {
    let raw = Connection::open_in_memory().unwrap();
    raw.execute_batch(&format!(
        "CREATE TABLE grades (uuid TEXT PRIMARY KEY, teacher_id TEXT);
         PRAGMA user_version = {};",
        latest_version()
    ))
    .unwrap();

    match SqliteGradeRepository::try_new(&raw) {
        Err(RepoError::MissingRequiredColumn { table, column }) => {
            assert_eq!(table, "grades");
            assert_eq!(column, "name");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("incomplete table must be rejected"),
    }
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
