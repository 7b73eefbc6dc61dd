//! Connection configuration.

use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ffi;

/// Default busy timeout: ten minutes.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(600);

/// Flags controlling how a database is opened.
///
/// Combine with `|`. The engine's serialized threading mode is always added
/// on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenMode(i32);

impl OpenMode {
    /// Open for reading only. The file must exist.
    pub const READ_ONLY: Self = Self(ffi::SQLITE_OPEN_READONLY);
    /// Open for reading and writing.
    pub const READ_WRITE: Self = Self(ffi::SQLITE_OPEN_READWRITE);
    /// Create the file if it does not exist. Requires [`READ_WRITE`](Self::READ_WRITE).
    pub const CREATE: Self = Self(ffi::SQLITE_OPEN_CREATE);
    /// Interpret the path as a `file:` URI.
    pub const URI: Self = Self(ffi::SQLITE_OPEN_URI);
    /// Open a named in-memory database.
    pub const MEMORY: Self = Self(ffi::SQLITE_OPEN_MEMORY);
    /// Use the shared page cache.
    pub const SHARED_CACHE: Self = Self(ffi::SQLITE_OPEN_SHAREDCACHE);
    /// Use a private page cache.
    pub const PRIVATE_CACHE: Self = Self(ffi::SQLITE_OPEN_PRIVATECACHE);

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Returns `true` if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::READ_WRITE | Self::CREATE
    }
}

impl BitOr for OpenMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Options for [`Connection::open_with`](crate::Connection::open_with).
///
/// Deserializable so it can be embedded in an application's own
/// configuration; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    /// Open flags.
    pub mode: OpenMode,
    /// How long to wait on a locked database before failing with
    /// [`DbError::Busy`](crate::DbError::Busy). Zero fails immediately.
    pub busy_timeout_ms: u64,
    /// Name of the VFS to use, or the default VFS.
    pub vfs: Option<String>,
    /// Log every finished statement and its run time at trace level.
    pub profile: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            mode: OpenMode::default(),
            busy_timeout_ms: 600_000,
            vfs: None,
            profile: false,
        }
    }
}

impl OpenOptions {
    /// Read-only options with the default busy timeout.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            mode: OpenMode::READ_ONLY,
            ..Self::default()
        }
    }

    /// Replaces the open flags.
    #[must_use]
    pub const fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replaces the busy timeout.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Selects a VFS by name.
    #[must_use]
    pub fn with_vfs(mut self, vfs: impl Into<String>) -> Self {
        self.vfs = Some(vfs.into());
        self
    }

    /// Enables or disables statement profiling.
    #[must_use]
    pub const fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    /// The busy timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
