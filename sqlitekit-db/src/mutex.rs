//! Connection-level mutual exclusion.
//!
//! In serialized mode every connection owns a recursive mutex that the
//! engine takes around each API call. Holding it from Rust makes a sequence
//! of calls (e.g. a whole transaction) atomic with respect to other threads
//! sharing the same [`Connection`].

use std::marker::PhantomData;

use crate::connection::Connection;
use crate::error::{DbError, DbResult};
use crate::ffi::RawMutex;

/// Handle to a connection's mutex. Cloning shares the same mutex.
///
/// The mutex is recursive: a thread that holds it may lock it again and may
/// keep using the connection.
#[derive(Debug, Clone)]
pub struct DbMutex {
    raw: RawMutex,
}

/// Holds the connection mutex until dropped.
///
/// Not `Send`: the mutex must be released by the thread that took it.
#[derive(Debug)]
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct DbMutexGuard<'a> {
    mutex: &'a DbMutex,
    _not_send: PhantomData<*const ()>,
}

impl DbMutex {
    pub(crate) fn new(conn: &Connection) -> DbResult<Self> {
        conn.raw()
            .mutex()
            .map(|raw| Self { raw })
            .ok_or_else(|| DbError::Misuse("connection has no mutex".into()))
    }

    /// Blocks until the mutex is acquired.
    pub fn lock(&self) -> DbMutexGuard<'_> {
        self.raw.enter();
        DbMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    /// Acquires the mutex if no other thread holds it.
    #[must_use]
    pub fn try_lock(&self) -> Option<DbMutexGuard<'_>> {
        self.raw.try_enter().then(|| DbMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }
}

impl Drop for DbMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.raw.leave();
    }
}
