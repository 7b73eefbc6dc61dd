//! User-defined scalar and aggregate functions.

#![allow(clippy::float_cmp)]

mod common;

use sqlitekit_db::{Aggregate, Connection, DbError, DbResult, Reader, Value};

fn multiply(args: &[Value]) -> DbResult<Value> {
    Ok(Value::Float(args.iter().map(Value::get_double).product()))
}

#[test]
fn test_scalar_function() {
    let conn = common::people_db();
    conn.create_scalar_function("multiply", 2, true, multiply)
        .expect("register");

    let product = conn
        .query_row("SELECT multiply(score, 2) FROM people WHERE id = 1", &[], |row| {
            row.get_double(0)
        })
        .expect("query");
    assert_eq!(product, 73.0);

    let err = conn
        .prepare("SELECT multiply(1, 2, 3)")
        .expect_err("wrong argument count");
    assert!(matches!(err, DbError::Compile { .. }));
    assert!(err.to_string().contains("multiply"));
}

#[test]
fn test_variadic_function() {
    let conn = Connection::memory().expect("open in-memory db");
    conn.create_scalar_function("concat_all", -1, true, |args| {
        Ok(Value::Text(args.iter().map(Value::get_text).collect()))
    })
    .expect("register");

    let joined = conn
        .query_row("SELECT concat_all('a', 1, 2.5, NULL, 'z')", &[], |row| {
            row.get_text(0)
        })
        .expect("query");
    assert_eq!(joined, "a12.5z");

    let empty = conn
        .query_row("SELECT concat_all()", &[], |row| row.get_text(0))
        .expect("query");
    assert_eq!(empty, "");
}

#[test]
fn test_function_error_surfaces_as_engine_error() {
    let conn = Connection::memory().expect("open in-memory db");
    conn.create_scalar_function("checked_sqrt", 1, true, |args| {
        let x = args[0].get_double();
        if x < 0.0 {
            return Err(DbError::Function(format!("negative input {x}")));
        }
        Ok(Value::Float(x.sqrt()))
    })
    .expect("register");

    let root = conn
        .query_row("SELECT checked_sqrt(16)", &[], |row| row.get_double(0))
        .expect("query");
    assert_eq!(root, 4.0);

    match conn.query_row("SELECT checked_sqrt(-4)", &[], |row| row.get_double(0)) {
        Err(DbError::Engine { message, .. }) => assert_eq!(message, "negative input -4"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn test_function_panic_is_caught() {
    let conn = Connection::memory().expect("open in-memory db");
    conn.create_scalar_function("explode", 0, false, |_| -> DbResult<Value> {
        panic!("boom")
    })
    .expect("register");

    let err = conn
        .query_row("SELECT explode()", &[], |row| row.get_value(0))
        .expect_err("panic reported as an error");
    assert!(err.to_string().contains("panicked"));

    // the connection survives
    let one = conn
        .query_row("SELECT 1", &[], |row| row.get_int(0))
        .expect("query");
    assert_eq!(one, 1);
}

#[test]
fn test_function_replaced_by_name() {
    let conn = Connection::memory().expect("open in-memory db");
    conn.create_scalar_function("answer", 0, true, |_| Ok(Value::Integer(41)))
        .expect("register");
    conn.create_scalar_function("answer", 0, true, |_| Ok(Value::Integer(42)))
        .expect("re-register");
    let answer = conn
        .query_row("SELECT answer()", &[], |row| row.get_int(0))
        .expect("query");
    assert_eq!(answer, 42);
}

#[derive(Default)]
struct Average {
    sum: f64,
    count: u32,
}

impl Aggregate for Average {
    fn step(&mut self, args: &[Value]) -> DbResult<()> {
        if args[0].is_null() {
            return Ok(());
        }
        self.sum += args[0].get_double();
        self.count += 1;
        Ok(())
    }

    fn finalize(self) -> DbResult<Value> {
        if self.count == 0 {
            return Ok(Value::Null);
        }
        Ok(Value::Float(self.sum / f64::from(self.count)))
    }
}

#[test]
fn test_aggregate_function_groups() {
    let conn = Connection::memory().expect("open in-memory db");
    conn.execute_batch(
        "CREATE TABLE scores (team TEXT, points REAL);
         INSERT INTO scores VALUES ('a', 1), ('a', 2), ('a', 6), ('b', 10), ('b', NULL);",
    )
    .expect("seed");
    conn.create_aggregate_function::<Average>("avg_points", 1, true)
        .expect("register");

    let averages: Vec<(String, f64)> = conn
        .query_map(
            "SELECT team, avg_points(points) FROM scores GROUP BY team ORDER BY team",
            &[],
            |row| Ok((row.get_text(0)?, row.get_double(1)?)),
        )
        .expect("query");
    assert_eq!(averages, [("a".to_string(), 3.0), ("b".to_string(), 10.0)]);

    // no input rows: the default state is finalized
    let empty = conn
        .query_row("SELECT avg_points(points) FROM scores WHERE 0", &[], |row| {
            row.is_null(0)
        })
        .expect("query");
    assert!(empty);
}

#[derive(Default)]
struct Strict;

impl Aggregate for Strict {
    fn step(&mut self, args: &[Value]) -> DbResult<()> {
        match &args[0] {
            Value::Integer(_) => Ok(()),
            other => Err(DbError::Function(format!(
                "expected integer, got {:?}",
                other.get_type()
            ))),
        }
    }

    fn finalize(self) -> DbResult<Value> {
        Ok(Value::Integer(1))
    }
}

#[test]
fn test_aggregate_step_error() {
    let conn = Connection::memory().expect("open in-memory db");
    conn.create_aggregate_function::<Strict>("strict", 1, true)
        .expect("register");

    let ok = conn
        .query_row("SELECT strict(x) FROM (SELECT 1 AS x UNION ALL SELECT 2)", &[], |row| {
            row.get_int(0)
        })
        .expect("integers accepted");
    assert_eq!(ok, 1);

    match conn.query_row("SELECT strict('text')", &[], |row| row.get_int(0)) {
        Err(DbError::Engine { message, .. }) => assert_eq!(message, "expected integer, got Text"),
        other => panic!("unexpected result {other:?}"),
    }
}

struct NoDefault;

impl Default for NoDefault {
    fn default() -> Self {
        panic!("state cannot be created")
    }
}

impl Aggregate for NoDefault {
    fn step(&mut self, _args: &[Value]) -> DbResult<()> {
        Ok(())
    }

    fn finalize(self) -> DbResult<Value> {
        Ok(Value::Null)
    }
}

#[test]
fn test_aggregate_default_panic_is_caught() {
    let conn = Connection::memory().expect("open in-memory db");
    conn.create_aggregate_function::<NoDefault>("no_default", 1, true)
        .expect("register");

    let err = conn
        .query_row("SELECT no_default(1)", &[], |row| row.get_value(0))
        .expect_err("panic in step reported as an error");
    assert!(err.to_string().contains("panicked"), "got {err}");

    // an empty group creates the state in finalize
    let err = conn
        .query_row("SELECT no_default(1) WHERE 0", &[], |row| row.get_value(0))
        .expect_err("panic in finalize reported as an error");
    assert!(err.to_string().contains("panicked"), "got {err}");

    let one = conn
        .query_row("SELECT 1", &[], |row| row.get_int(0))
        .expect("connection survives");
    assert_eq!(one, 1);
}
