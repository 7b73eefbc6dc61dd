//! Subcommand implementations. Output goes to the given writer so tests can
//! capture it.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use eyre::WrapErr;
use sqlitekit_db::{Backup, Connection, OpenMode, OpenOptions, Reader};

use crate::render::RowObject;

fn open(path: &Path, options: &OpenOptions) -> eyre::Result<Connection> {
    Connection::open_with(path, options)
        .wrap_err_with(|| format!("failed to open {}", path.display()))
}

/// Runs `sql` and writes one JSON object per result row.
pub fn query(
    db: &Path,
    sql: &str,
    options: &OpenOptions,
    out: &mut impl Write,
) -> eyre::Result<()> {
    let conn = open(db, options)?;
    let mut stmt = conn.prepare(sql).wrap_err("failed to prepare query")?;
    let columns = stmt.column_names().to_vec();

    let mut count = 0_usize;
    let mut rows = stmt.execute()?;
    while let Some(row) = rows.next()? {
        let values = (0..row.column_count())
            .map(|i| row.get_value(i))
            .collect::<Result<Vec<_>, _>>()?;
        serde_json::to_writer(&mut *out, &RowObject::new(&columns, &values))?;
        writeln!(out)?;
        count += 1;
    }
    tracing::debug!(rows = count, "query finished");
    Ok(())
}

/// Runs a batch of statements and writes the number of rows they changed.
pub fn exec(
    db: &Path,
    sql: &str,
    options: &OpenOptions,
    out: &mut impl Write,
) -> eyre::Result<()> {
    let conn = open(db, options)?;
    let before = conn.total_changes();
    conn.execute_batch(sql).wrap_err("failed to execute batch")?;
    writeln!(out, "{}", conn.total_changes() - before)?;
    Ok(())
}

/// Copies `source` over `destination`, `pages` pages per step.
pub fn backup(
    source: &Path,
    destination: &Path,
    options: &OpenOptions,
    pages: i32,
    pause: Duration,
) -> eyre::Result<()> {
    let src = open(source, options)?;
    // the destination is always written, even under --read-only
    let dest = open(destination, &options.clone().with_mode(OpenMode::default()))?;

    let mut backup = Backup::new(&src, &dest).wrap_err("failed to start backup")?;
    backup
        .run(pages, pause, |progress| {
            tracing::info!(
                copied = progress.copied(),
                total = progress.total,
                "backup progress"
            );
        })
        .wrap_err("backup failed")?;
    backup.finish()?;

    tracing::info!(
        "copied {} to {}",
        source.display(),
        destination.display()
    );
    Ok(())
}
