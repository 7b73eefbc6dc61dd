//! Online backup between two connections.
//!
//! A [`Backup`] copies one database into another page by page. The copy can
//! be driven in chunks with [`Backup::step`], interleaved with other work,
//! and abandoned at any point by dropping the backup. Lock contention
//! ([`DbError::Busy`]) does not end the copy: stepping again later resumes
//! from the current remaining-page count.

use std::thread;
use std::time::Duration;

use crate::connection::Connection;
use crate::error::{DbError, DbResult};
use crate::ffi::RawBackup;

/// Lifecycle of a [`Backup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    /// Created; no pages copied yet.
    Initialized,
    /// At least one step succeeded and pages remain.
    Stepping,
    /// Every page has been copied.
    Completed,
    /// The last step failed. Stepping again retries.
    Failed,
}

/// Progress snapshot passed to [`Backup::run`] callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupProgress {
    /// Pages still to copy.
    pub remaining: usize,
    /// Pages in the source database.
    pub total: usize,
}

impl BackupProgress {
    /// Pages copied so far.
    #[must_use]
    pub const fn copied(&self) -> usize {
        self.total.saturating_sub(self.remaining)
    }
}

/// An in-progress copy from a source connection to a destination.
///
/// Both connections stay open while the backup is alive. The destination is
/// write-locked between steps once copying has started.
#[derive(Debug)]
pub struct Backup {
    raw: Option<RawBackup>,
    state: BackupState,
}

impl Backup {
    /// Prepares to copy the `main` schema of `source` over `destination`.
    ///
    /// # Errors
    ///
    /// Fails if the two connections are the same, or the destination has an
    /// open read transaction.
    pub fn new(source: &Connection, destination: &Connection) -> DbResult<Self> {
        Self::with_names(source, "main", destination, "main")
    }

    /// Like [`new`](Self::new) with explicit schema names (e.g. an attached
    /// database or `"temp"`).
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_names(
        source: &Connection,
        source_name: &str,
        destination: &Connection,
        destination_name: &str,
    ) -> DbResult<Self> {
        let raw = RawBackup::init(destination.raw(), destination_name, source.raw(), source_name)?;
        let mut backup = Self {
            raw: Some(raw),
            state: BackupState::Initialized,
        };
        backup.prime()?;
        log::debug!(
            "backup {source_name} -> {destination_name} initialized ({} pages)",
            backup.total_page_count()
        );
        Ok(backup)
    }

    /// A zero-page step fills in the page counts so that progress can be
    /// reported before the first real step.
    fn prime(&mut self) -> DbResult<()> {
        match self.raw()?.step(0) {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.state = BackupState::Completed;
                Ok(())
            }
            // Counts stay at zero until a later step gets the lock.
            Err(err) if err.is_retryable() => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn raw(&self) -> DbResult<&RawBackup> {
        self.raw
            .as_ref()
            .ok_or_else(|| DbError::Misuse("backup already finished".into()))
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> BackupState {
        self.state
    }

    /// Pages still to copy, as of the last step.
    #[must_use]
    pub fn remaining_page_count(&self) -> usize {
        self.raw.as_ref().map_or(0, RawBackup::remaining)
    }

    /// Pages in the source database, as of the last step.
    #[must_use]
    pub fn total_page_count(&self) -> usize {
        self.raw.as_ref().map_or(0, RawBackup::page_count)
    }

    /// Current progress.
    #[must_use]
    pub fn progress(&self) -> BackupProgress {
        BackupProgress {
            remaining: self.remaining_page_count(),
            total: self.total_page_count(),
        }
    }

    /// Copies up to `pages` pages; a negative count copies everything left.
    ///
    /// Returns `true` while pages remain and `false` once the copy is
    /// complete. Stepping a completed backup is a no-op returning `false`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Busy`] when either database is locked (retry after
    /// a pause) or the engine's error for I/O failures. Either way the state
    /// becomes [`BackupState::Failed`] and the backup stays usable.
    pub fn step(&mut self, pages: i32) -> DbResult<bool> {
        if self.state == BackupState::Completed {
            return Ok(false);
        }
        match self.raw()?.step(pages) {
            Ok(true) => {
                self.state = BackupState::Stepping;
                log::trace!(
                    "backup step: {} of {} pages remaining",
                    self.remaining_page_count(),
                    self.total_page_count()
                );
                Ok(true)
            }
            Ok(false) => {
                self.state = BackupState::Completed;
                log::debug!("backup completed ({} pages)", self.total_page_count());
                Ok(false)
            }
            Err(err) => {
                self.state = BackupState::Failed;
                log::debug!("backup step failed: {err}");
                Err(err)
            }
        }
    }

    /// Copies every remaining page in one step.
    ///
    /// # Errors
    ///
    /// See [`step`](Self::step).
    pub fn step_all(&mut self) -> DbResult<()> {
        while self.step(-1)? {}
        Ok(())
    }

    /// Drives the copy to completion `pages_per_step` pages at a time.
    ///
    /// `progress` is called after every successful step. Busy or locked
    /// steps are retried after sleeping for `pause`; any other error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable step error.
    pub fn run(
        &mut self,
        pages_per_step: i32,
        pause: Duration,
        mut progress: impl FnMut(BackupProgress),
    ) -> DbResult<()> {
        loop {
            match self.step(pages_per_step) {
                Ok(more) => {
                    progress(self.progress());
                    if !more {
                        return Ok(());
                    }
                }
                Err(err) if err.is_retryable() => {
                    log::debug!("backup busy, retrying in {pause:?}");
                    thread::sleep(pause);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Releases the backup handle. Dropping the backup does the same but
    /// discards the result.
    ///
    /// # Errors
    ///
    /// Reports a fatal error (I/O, out of memory) from an earlier step.
    pub fn finish(mut self) -> DbResult<()> {
        self.raw.take().map_or(Ok(()), RawBackup::finish)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with_rows(rows: i64) -> Connection {
        let conn = Connection::memory().expect("open source");
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT);")
            .expect("create table");
        for id in 0..rows {
            conn.execute("INSERT INTO t (id, val) VALUES (?1, 'row')", crate::params![id])
                .expect("insert");
        }
        conn
    }

    #[test]
    fn test_counts_primed_on_init() {
        let source = source_with_rows(2);
        let destination = Connection::memory().expect("open destination");
        let backup = Backup::new(&source, &destination).expect("init");
        assert_eq!(backup.state(), BackupState::Initialized);
        assert!(backup.total_page_count() > 0);
        assert_eq!(backup.total_page_count(), backup.remaining_page_count());
    }

    #[test]
    fn test_step_after_completion_is_noop() {
        let source = source_with_rows(1);
        let destination = Connection::memory().expect("open destination");
        let mut backup = Backup::new(&source, &destination).expect("init");
        assert!(!backup.step(-1).expect("step all"));
        assert_eq!(backup.state(), BackupState::Completed);
        assert!(!backup.step(1).expect("step again"));
        assert_eq!(backup.remaining_page_count(), 0);
    }

    #[test]
    fn test_progress_copied() {
        let progress = BackupProgress {
            remaining: 3,
            total: 10,
        };
        assert_eq!(progress.copied(), 7);
    }
}
