//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::path::Path;

use sqlitekit_db::{params, Connection, OpenOptions};

/// One row per storage class, the shape used by the coercion tests.
pub const PEOPLE_SCHEMA: &str = "CREATE TABLE people (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    score REAL,
    avatar BLOB
);";

/// In-memory database with three people.
pub fn people_db() -> Connection {
    let conn = Connection::memory().expect("open in-memory db");
    conn.execute_batch(PEOPLE_SCHEMA).expect("create table");
    for (id, name, score) in [(1_i64, "ada", 36.5), (2, "grace", 85.25), (3, "linus", 0.123)] {
        conn.execute(
            "INSERT INTO people (id, name, score, avatar) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, score, vec![0xAB_u8; usize::try_from(id).unwrap_or(0)]],
        )
        .expect("insert person");
    }
    conn
}

/// Database with a single table `t` holding `rows` rows.
pub fn numbered_db(path: impl AsRef<Path>, rows: i64) -> Connection {
    let conn = Connection::open(path).expect("open db");
    fill_numbered(&conn, rows);
    conn
}

/// Create table `t` and insert `rows` numbered rows.
pub fn fill_numbered(conn: &Connection, rows: i64) {
    conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT);")
        .expect("create table");
    let tx = conn.transaction().expect("begin tx");
    for id in 1..=rows {
        tx.execute(
            "INSERT INTO t (id, val) VALUES (?1, ?2)",
            params![id, format!("row-{id}")],
        )
        .expect("insert");
    }
    tx.commit().expect("commit");
}

/// Count the rows in `table`.
pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    use sqlitekit_db::Reader;

    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), &[], |row| {
        row.get_int64(0)
    })
    .expect("count rows")
}

/// Options that fail immediately on a locked database.
pub fn no_wait() -> OpenOptions {
    OpenOptions::default().with_busy_timeout(std::time::Duration::ZERO)
}
