//! Statement execution, binding and typed column access.

#![allow(clippy::float_cmp)]

mod common;

use sqlitekit_db::{params, Connection, DbError, Reader, Type, Value};

#[test]
fn test_value_by_index_matches_value_by_name() {
    let conn = common::people_db();
    let mut stmt = conn
        .prepare("SELECT id, name, score, avatar FROM people ORDER BY id")
        .expect("prepare");
    let mut rows = stmt.execute().expect("execute");
    let mut seen = 0;
    while let Some(row) = rows.next().expect("step") {
        for i in 0..row.column_count() {
            let name = row.column_name(i).expect("column name").to_string();
            assert_eq!(
                row.get_value(i).expect("by index"),
                row.get_value(name.as_str()).expect("by name")
            );
        }
        seen += 1;
    }
    assert_eq!(seen, 3);
}

#[test]
fn test_cursor_states() {
    let conn = common::people_db();
    let mut stmt = conn
        .prepare("SELECT name FROM people WHERE id = 1")
        .expect("prepare");

    // not started
    assert_eq!(stmt.get_text(0), Err(DbError::NoRow));

    assert!(stmt.next_row().expect("first row"));
    assert_eq!(stmt.get_text("name").expect("name"), "ada");

    assert!(!stmt.next_row().expect("exhausted"));
    assert_eq!(stmt.get_text(0), Err(DbError::NoRow));
    assert!(!stmt.next_row().expect("still exhausted"));
}

#[test]
fn test_unknown_column_and_out_of_range() {
    let conn = common::people_db();
    let mut stmt = conn.prepare("SELECT id, name FROM people").expect("prepare");

    // resolution errors take precedence over the missing row
    assert_eq!(
        stmt.get_int("nope"),
        Err(DbError::UnknownColumn("nope".into()))
    );
    assert!(stmt.next_row().expect("step"));
    assert_eq!(
        stmt.get_int("Name"),
        Err(DbError::UnknownColumn("Name".into()))
    );
    assert_eq!(
        stmt.get_int(2),
        Err(DbError::ColumnOutOfRange { index: 2, count: 2 })
    );
    assert_eq!(stmt.column_index("name"), Ok(1));
}

#[test]
fn test_reader_coercions() {
    let conn = Connection::memory().expect("open in-memory db");
    conn.execute_batch("CREATE TABLE v (f REAL, t TEXT, i INTEGER, b BLOB, n);")
        .expect("create table");
    conn.execute(
        "INSERT INTO v VALUES (?1, ?2, ?3, ?4, ?5)",
        params![0.123, "first", -123_i64, b"bl\0b".as_slice(), Value::Null],
    )
    .expect("insert");

    let mut stmt = conn.prepare("SELECT f, t, i, b, n FROM v").expect("prepare");
    assert!(stmt.next_row().expect("step"));

    assert_eq!(stmt.get_type("f"), Ok(Type::Float));
    assert_eq!(stmt.get_text("f").expect("f"), "0.123");
    assert_eq!(stmt.get_double("f").expect("f"), 0.123);

    assert_eq!(stmt.get_int("t").expect("t"), 0);
    assert_eq!(stmt.get_double("t").expect("t"), 0.0);

    assert_eq!(stmt.get_uint("i").expect("i"), u32::MAX - 122);
    assert_eq!(stmt.get_text("i").expect("i"), "-123");
    assert_eq!(stmt.get_double("i").expect("i"), -123.0);

    assert_eq!(stmt.get_type("b"), Ok(Type::Blob));
    assert_eq!(stmt.get_int("b").expect("b"), 0);
    assert_eq!(stmt.get_text("b").expect("b"), "bl\0b");
    assert_eq!(stmt.get_bytes("b").expect("b"), 4);

    assert_eq!(stmt.get_type("n"), Ok(Type::Null));
    assert_eq!(stmt.get_int("n").expect("n"), 0);
    assert_eq!(stmt.get_text("n").expect("n"), "");
    assert!(stmt.get_blob("n").expect("n").is_empty());

    // reading through a coercion leaves the stored class alone
    assert_eq!(stmt.get_type("f"), Ok(Type::Float));
}

#[test]
fn test_echo_round_trip() {
    let conn = Connection::memory().expect("open in-memory db");
    let mut stmt = conn.prepare("SELECT ?1").expect("prepare");

    for value in [
        Value::Integer(i64::MIN),
        Value::Integer(42),
        Value::Float(-2.5e-7),
        Value::Text("héllo wörld".into()),
    ] {
        stmt.reset_with(std::slice::from_ref(&value)).expect("rebind");
        let mut rows = stmt.execute().expect("execute");
        let row = rows.next().expect("step").expect("one row");
        assert_eq!(row.get_value(0).expect("read"), value);
    }
}

#[test]
fn test_bind_out_of_range() {
    let conn = Connection::memory().expect("open in-memory db");
    let mut stmt = conn.prepare("SELECT 1").expect("prepare");
    assert_eq!(stmt.parameter_count(), Ok(0));
    for index in [0, 1, 2] {
        assert!(
            matches!(stmt.bind(index, 1), Err(DbError::Binding { .. })),
            "index {index} should not bind"
        );
    }
    assert!(matches!(
        stmt.bind_by_name(":missing", 1),
        Err(DbError::Binding { .. })
    ));
}

#[test]
fn test_bind_by_name_and_reuse() {
    let conn = common::people_db();
    let mut stmt = conn
        .prepare("SELECT name FROM people WHERE id = :id")
        .expect("prepare");

    let mut names = Vec::new();
    for id in [3_i64, 1] {
        stmt.reset().expect("reset");
        stmt.bind_by_name(":id", id).expect("bind");
        let mut rows = stmt.execute().expect("execute");
        let row = rows.next().expect("step").expect("row");
        names.push(row.get_text(0).expect("name"));
    }
    assert_eq!(names, ["linus", "ada"]);
}

#[test]
fn test_constraint_violation_surfaces_on_step_and_reset() {
    let conn = common::people_db();
    let mut stmt = conn
        .prepare("INSERT INTO people (id, name) VALUES (?1, ?2)")
        .expect("prepare");
    stmt.bind_all(params![1_i64, "duplicate"]).expect("bind");

    let err = stmt.next_row().expect_err("duplicate primary key");
    let code = err.code().expect("engine code");
    // SQLITE_CONSTRAINT
    assert_eq!(code.primary(), 19);
    assert!(!err.is_retryable());

    assert!(stmt.reset().is_err());
    // the statement is usable again after the reset
    stmt.bind_all(params![4_i64, "margaret"]).expect("rebind");
    assert_eq!(stmt.execute_update(), Ok(1));
    assert_eq!(common::count_rows(&conn, "people"), 4);
}

#[test]
fn test_execute_rewinds() {
    let conn = common::people_db();
    let mut stmt = conn
        .prepare("SELECT id FROM people ORDER BY id")
        .expect("prepare");

    let first: Vec<i64> = stmt
        .execute()
        .expect("execute")
        .mapped(|row| row.get(0))
        .expect("rows");
    // stop part-way through
    {
        let mut rows = stmt.execute().expect("execute");
        assert!(rows.next_row().expect("step"));
    }
    let again: Vec<i64> = stmt
        .execute()
        .expect("execute")
        .mapped(|row| row.get(0))
        .expect("rows");
    assert_eq!(first, [1, 2, 3]);
    assert_eq!(again, first);
}

#[test]
fn test_metadata() {
    let conn = common::people_db();
    let stmt = conn
        .prepare("SELECT id AS ident, name FROM people WHERE score > ?1 AND id < ?2")
        .expect("prepare");
    assert_eq!(stmt.column_count(), 2);
    assert_eq!(stmt.column_names(), ["ident", "name"]);
    assert_eq!(stmt.parameter_count(), Ok(2));
    assert_eq!(stmt.is_readonly(), Ok(true));
    assert!(stmt.sql().expect("sql").starts_with("SELECT id AS ident"));

    let insert = conn
        .prepare("INSERT INTO people (name) VALUES ('x')")
        .expect("prepare");
    assert_eq!(insert.is_readonly(), Ok(false));
    assert_eq!(insert.column_count(), 0);
}

#[test]
fn test_wide_text() {
    let conn = Connection::wide_memory().expect("open wide in-memory db");
    conn.execute_batch("CREATE TABLE w (s TEXT);")
        .expect("create table");

    let text: Vec<u16> = "größe ✓".encode_utf16().collect();
    let mut insert = conn.prepare("INSERT INTO w (s) VALUES (?1)").expect("prepare");
    insert.bind_wide_text(1, &text).expect("bind");
    assert_eq!(insert.execute_update(), Ok(1));

    let mut stmt = conn.prepare("SELECT s FROM w").expect("prepare");
    assert!(stmt.next_row().expect("step"));
    assert_eq!(stmt.get_wide_text(0).expect("wide"), text);
    assert_eq!(stmt.get_text(0).expect("narrow"), "größe ✓");
}

#[test]
fn test_generic_get() {
    let conn = common::people_db();
    let (id, name, score, avatar): (u32, String, f64, Option<Vec<u8>>) = conn
        .query_row(
            "SELECT id, name, score, avatar FROM people WHERE name = ?1",
            params!["grace"],
            |row| Ok((row.get(0)?, row.get(1)?, row.get("score")?, row.get(3)?)),
        )
        .expect("query");
    assert_eq!(id, 2);
    assert_eq!(name, "grace");
    assert_eq!(score, 85.25);
    assert_eq!(avatar, Some(vec![0xAB, 0xAB]));
}

#[test]
fn test_compile_error() {
    let conn = Connection::memory().expect("open in-memory db");
    let err = conn.prepare("SELEC 1").expect_err("syntax error");
    assert!(matches!(err, DbError::Compile { .. }));
    assert!(err.to_string().contains("syntax error"));

    let err = conn.prepare("SELECT * FROM missing").expect_err("no table");
    assert!(matches!(err, DbError::Compile { .. }));
}
