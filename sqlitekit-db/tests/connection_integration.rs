//! Opening connections, open flags, batch execution and lock contention.

mod common;

use std::sync::{Arc, Mutex};

use sqlitekit_db::{params, Connection, DbError, OpenMode, OpenOptions, Reader};

#[test]
fn test_read_only_open_of_missing_file_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("missing.db");

    let err = Connection::open_with(&path, &OpenOptions::read_only()).expect_err("missing file");
    // SQLITE_CANTOPEN
    assert_eq!(err.code().map(|c| c.primary()), Some(14));
    assert!(!path.exists());

    let invalid = OpenOptions::default().with_mode(OpenMode::READ_ONLY | OpenMode::CREATE);
    assert!(Connection::open_with(&path, &invalid).is_err());
}

#[test]
fn test_read_only_connection_rejects_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ro.db");
    drop(common::numbered_db(&path, 3));

    let conn = Connection::open_with(&path, &OpenOptions::read_only()).expect("open read-only");
    assert_eq!(common::count_rows(&conn, "t"), 3);

    let err = conn
        .execute("INSERT INTO t (val) VALUES (?1)", params!["nope"])
        .expect_err("read-only");
    assert!(matches!(err, DbError::Engine { .. }));
    // SQLITE_READONLY
    assert_eq!(err.code().map(|c| c.primary()), Some(8));
}

#[test]
fn test_file_database_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("persist.db");
    {
        let conn = common::numbered_db(&path, 5);
        assert_eq!(conn.last_insert_rowid(), 5);
    }
    let conn = Connection::open(&path).expect("reopen");
    let val = conn
        .query_row("SELECT val FROM t WHERE id = ?1", params![4_i64], |row| {
            row.get_text("val")
        })
        .expect("query");
    assert_eq!(val, "row-4");
}

#[test]
fn test_execute_callback() {
    let conn = common::people_db();
    conn.execute_batch("UPDATE people SET score = NULL WHERE id = 2;")
        .expect("update");

    let mut rows = Vec::new();
    conn.execute_callback("SELECT id, name, score FROM people ORDER BY id", |values, names| {
        assert_eq!(names, ["id", "name", "score"]);
        rows.push(values.iter().map(ToString::to_string).collect::<Vec<_>>());
        true
    })
    .expect("exec");
    assert_eq!(
        rows,
        [
            ["1", "ada", "36.5"],
            ["2", "grace", ""],
            ["3", "linus", "0.123"],
        ]
    );
}

#[test]
fn test_execute_callback_stops_early() {
    let conn = common::people_db();
    let mut calls = 0;
    conn.execute_callback(
        "SELECT name FROM people; INSERT INTO people (name) VALUES ('never');",
        |_, _| {
            calls += 1;
            false
        },
    )
    .expect("stopping is not an error");
    assert_eq!(calls, 1);
    assert_eq!(common::count_rows(&conn, "people"), 3);
}

#[test]
fn test_execute_batch_error() {
    let conn = Connection::memory().expect("open in-memory db");
    let err = conn
        .execute_batch("CREATE TABLE t (id); INSERT INTO missing VALUES (1);")
        .expect_err("unknown table");
    assert!(err.to_string().contains("missing"));
    // statements before the failing one have run
    assert_eq!(common::count_rows(&conn, "t"), 0);
}

#[test]
fn test_wide_memory_encoding() {
    let conn = Connection::wide_memory().expect("open wide in-memory db");
    let encoding = conn
        .query_row("PRAGMA encoding", &[], |row| row.get_text(0))
        .expect("pragma");
    assert!(encoding.starts_with("UTF-16"), "got {encoding}");

    let narrow = Connection::memory().expect("open in-memory db");
    let encoding = narrow
        .query_row("PRAGMA encoding", &[], |row| row.get_text(0))
        .expect("pragma");
    assert_eq!(encoding, "UTF-8");
}

#[test]
fn test_locked_database_is_busy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("locked.db");
    let holder = common::numbered_db(&path, 1);
    holder.execute_batch("BEGIN EXCLUSIVE;").expect("lock");

    let waiter = Connection::open_with(&path, &common::no_wait()).expect("open waiter");
    let err = waiter
        .query_row("SELECT COUNT(*) FROM t", &[], |row| row.get_int(0))
        .expect_err("database is locked");
    assert!(err.is_retryable(), "unexpected error {err:?}");
    assert!(matches!(err, DbError::Busy { .. }));

    holder.execute_batch("COMMIT;").expect("unlock");
    assert_eq!(common::count_rows(&waiter, "t"), 1);
}

#[test]
fn test_options_from_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("json.db");
    drop(common::numbered_db(&path, 2));

    let options: OpenOptions =
        serde_json::from_str(r#"{ "mode": 1, "busy_timeout_ms": 0 }"#).expect("parse options");
    assert_eq!(options.mode, OpenMode::READ_ONLY);
    assert!(options.vfs.is_none());

    let conn = Connection::open_with(&path, &options).expect("open");
    assert_eq!(common::count_rows(&conn, "t"), 2);
    assert!(conn.execute_batch("DELETE FROM t;").is_err());
}

#[test]
fn test_unknown_vfs() {
    let options = OpenOptions::default().with_vfs("no-such-vfs");
    let err = Connection::open_with(":memory:", &options).expect_err("unknown vfs");
    assert!(err.to_string().contains("no such vfs"), "got {err}");
}

#[test]
fn test_close_releases_file_lock() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("locked.db");
    let holder = common::numbered_db(&path, 1);
    holder
        .execute_batch("PRAGMA locking_mode = EXCLUSIVE; UPDATE t SET val = 'held';")
        .expect("take exclusive lock");
    let stmt = holder.prepare("SELECT val FROM t").expect("prepare");

    let other = Connection::open_with(&path, &common::no_wait()).expect("open second");
    assert!(matches!(
        other.execute("UPDATE t SET val = 'other'", &[]),
        Err(DbError::Busy { .. })
    ));

    // the statement keeps the handle open after the last clone is gone
    drop(holder);
    assert!(matches!(
        other.execute("UPDATE t SET val = 'other'", &[]),
        Err(DbError::Busy { .. })
    ));

    drop(stmt);
    assert_eq!(other.execute("UPDATE t SET val = 'other'", &[]), Ok(1));
}

#[test]
fn test_profile_reports_finished_statements() {
    let conn = Connection::memory().expect("open in-memory db");
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&seen);
    conn.profile(move |sql, _elapsed| {
        sink.lock().expect("profile mutex").push(sql.to_string());
    })
    .expect("install profile");

    conn.execute_batch("CREATE TABLE p (x INTEGER);")
        .expect("create table");
    conn.execute("INSERT INTO p (x) VALUES (?1)", params![7])
        .expect("insert");
    {
        let seen = seen.lock().expect("profile mutex");
        assert!(seen.iter().any(|sql| sql.starts_with("CREATE TABLE p")), "{seen:?}");
        assert!(seen.iter().any(|sql| sql == "INSERT INTO p (x) VALUES (?1)"), "{seen:?}");
    }

    conn.clear_profile().expect("clear profile");
    let before = seen.lock().expect("profile mutex").len();
    conn.execute("INSERT INTO p (x) VALUES (?1)", params![8])
        .expect("insert");
    assert_eq!(seen.lock().expect("profile mutex").len(), before);
}

#[test]
fn test_profile_callback_panic_is_contained() {
    let conn = Connection::memory().expect("open in-memory db");
    conn.profile(|_, _| panic!("profiler failed"))
        .expect("install profile");
    assert_eq!(conn.execute("CREATE TABLE p (x INTEGER)", &[]), Ok(0));

    // profiling enabled through the open options logs instead
    let conn = Connection::open_with(":memory:", &OpenOptions::default().with_profile(true))
        .expect("open with profiling");
    let one = conn
        .query_row("SELECT 1", &[], |row| row.get_int(0))
        .expect("query");
    assert_eq!(one, 1);
}
