//! Safe handles over the `libsqlite3-sys` bindings.
//!
//! This is the **only** module that contains `unsafe` code or C types. Every
//! other module talks to the engine through [`RawDb`], [`RawStmt`],
//! [`RawBackup`] and [`RawMutex`].
//!
//! Connections are always opened with `SQLITE_OPEN_FULLMUTEX`, so the engine
//! serializes every call made through a `sqlite3*` handle with the
//! connection's own recursive mutex. That is what makes `RawDb` `Sync`.
//!
//! The engine releases that mutex between calls, while the error code and
//! message of a failed call live on the connection. Every call whose error
//! is reported therefore runs inside [`RawDb::locked`], which holds the mutex
//! until the message has been copied out.

use std::any::Any;
use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use libsqlite3_sys as sys;

use crate::error::{DbError, DbResult};
use crate::functions::Aggregate;
use crate::value::{Type, Value};

// ── SQLite constants ────────────────────────────────────────────────────

pub const SQLITE_OK: i32 = sys::SQLITE_OK;
pub const SQLITE_ERROR: i32 = sys::SQLITE_ERROR;
pub const SQLITE_BUSY: i32 = sys::SQLITE_BUSY;
pub const SQLITE_LOCKED: i32 = sys::SQLITE_LOCKED;
pub const SQLITE_MISUSE: i32 = sys::SQLITE_MISUSE;
pub const SQLITE_RANGE: i32 = sys::SQLITE_RANGE;
pub const SQLITE_ROW: i32 = sys::SQLITE_ROW;
pub const SQLITE_DONE: i32 = sys::SQLITE_DONE;

// Open flags
pub const SQLITE_OPEN_READONLY: i32 = sys::SQLITE_OPEN_READONLY;
pub const SQLITE_OPEN_READWRITE: i32 = sys::SQLITE_OPEN_READWRITE;
pub const SQLITE_OPEN_CREATE: i32 = sys::SQLITE_OPEN_CREATE;
pub const SQLITE_OPEN_URI: i32 = sys::SQLITE_OPEN_URI;
pub const SQLITE_OPEN_MEMORY: i32 = sys::SQLITE_OPEN_MEMORY;
pub const SQLITE_OPEN_SHAREDCACHE: i32 = sys::SQLITE_OPEN_SHAREDCACHE;
pub const SQLITE_OPEN_PRIVATECACHE: i32 = sys::SQLITE_OPEN_PRIVATECACHE;
pub const SQLITE_OPEN_FULLMUTEX: i32 = sys::SQLITE_OPEN_FULLMUTEX;

// Exported by the bundled library but absent from the generated bindings.
extern "C" {
    fn sqlite3_close_v2(db: *mut sys::sqlite3) -> c_int;
    fn sqlite3_bind_text16(
        stmt: *mut sys::sqlite3_stmt,
        index: c_int,
        data: *const c_void,
        n_bytes: c_int,
        destructor: sys::sqlite3_destructor_type,
    ) -> c_int;
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn c_string(what: &str, s: &str) -> DbResult<CString> {
    CString::new(s).map_err(|e| DbError::Misuse(format!("nul in {what}: {e}")))
}

fn to_c_int(n: usize) -> c_int {
    c_int::try_from(n).unwrap_or(c_int::MAX)
}

/// Copies a nul-terminated C string, or returns `""` for null.
///
/// # Safety
///
/// `ptr` must be null or point to a valid nul-terminated string.
unsafe fn lossy_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Copies `len` bytes starting at `ptr`, or returns an empty vector.
///
/// # Safety
///
/// `ptr` must be null or valid for reads of `len` bytes.
unsafe fn copy_bytes(ptr: *const c_void, len: c_int) -> Vec<u8> {
    match usize::try_from(len) {
        Ok(len) if len > 0 && !ptr.is_null() => {
            std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec()
        }
        _ => Vec::new(),
    }
}

/// Static description of a result code, e.g. `"database is locked"`.
pub fn errstr(rc: i32) -> String {
    unsafe { lossy_str(sys::sqlite3_errstr(rc)) }
}

const fn type_from_raw(code: c_int) -> Type {
    match code {
        sys::SQLITE_INTEGER => Type::Integer,
        sys::SQLITE_FLOAT => Type::Float,
        sys::SQLITE_TEXT => Type::Text,
        sys::SQLITE_BLOB => Type::Blob,
        _ => Type::Null,
    }
}

// ── Connection ──────────────────────────────────────────────────────────

/// Receives the SQL text and run time of every finished statement.
pub type ProfileFn = dyn Fn(&str, Duration) + Send + Sync;

/// Owned `sqlite3*` handle. Closed on drop.
pub struct RawDb {
    ptr: NonNull<sys::sqlite3>,
    /// Boxed so the engine can hold a thin pointer to it.
    profiler: Mutex<Option<Box<Arc<ProfileFn>>>>,
}

impl fmt::Debug for RawDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDb").field("ptr", &self.ptr).finish_non_exhaustive()
    }
}

/// Holds a connection mutex until dropped. A null mutex is a no-op.
struct EngineLock(*mut sys::sqlite3_mutex);

impl EngineLock {
    fn enter(db: &RawDb) -> Self {
        let mutex = unsafe { sys::sqlite3_db_mutex(db.as_ptr()) };
        unsafe { sys::sqlite3_mutex_enter(mutex) };
        Self(mutex)
    }
}

impl Drop for EngineLock {
    fn drop(&mut self) {
        unsafe { sys::sqlite3_mutex_leave(self.0) };
    }
}

// Safety: the handle is always opened with SQLITE_OPEN_FULLMUTEX, so the
// engine serializes concurrent calls on it.
unsafe impl Send for RawDb {}
unsafe impl Sync for RawDb {}

impl RawDb {
    /// Opens `path` with `flags` (FULLMUTEX is always added) and enables
    /// extended result codes.
    pub fn open(path: &str, flags: i32, vfs: Option<&str>) -> DbResult<Self> {
        let c_path = c_string("path", path)?;
        let c_vfs = vfs.map(|v| c_string("vfs name", v)).transpose()?;
        let mut db: *mut sys::sqlite3 = ptr::null_mut();
        let rc = unsafe {
            sys::sqlite3_open_v2(
                c_path.as_ptr(),
                &mut db,
                flags | SQLITE_OPEN_FULLMUTEX,
                c_vfs.as_ref().map_or(ptr::null(), |v| v.as_ptr()),
            )
        };
        if rc != SQLITE_OK {
            // If open failed but we got a handle, extract the error and close.
            let message = if db.is_null() {
                errstr(rc)
            } else {
                let m = unsafe { lossy_str(sys::sqlite3_errmsg(db)) };
                unsafe { sqlite3_close_v2(db) };
                m
            };
            return Err(DbError::from_code(rc, message));
        }
        let ptr = NonNull::new(db)
            .ok_or_else(|| DbError::from_code(sys::SQLITE_NOMEM, errstr(sys::SQLITE_NOMEM)))?;
        unsafe { sys::sqlite3_extended_result_codes(ptr.as_ptr(), 1) };
        Ok(Self {
            ptr,
            profiler: Mutex::new(None),
        })
    }

    fn as_ptr(&self) -> *mut sys::sqlite3 {
        self.ptr.as_ptr()
    }

    /// Runs `f` while holding the connection mutex, so that a failed call
    /// and the error message it leaves on the connection are read together.
    /// The mutex is recursive; nesting is fine.
    fn locked<T>(&self, f: impl FnOnce() -> T) -> T {
        let _lock = EngineLock::enter(self);
        f()
    }

    /// Most recent error message. Only meaningful inside [`locked`](Self::locked).
    fn errmsg(&self) -> String {
        unsafe { lossy_str(sys::sqlite3_errmsg(self.as_ptr())) }
    }

    /// Most recent extended result code. Only meaningful inside
    /// [`locked`](Self::locked).
    fn extended_errcode(&self) -> i32 {
        unsafe { sys::sqlite3_extended_errcode(self.as_ptr()) }
    }

    pub fn busy_timeout(&self, ms: i32) -> DbResult<()> {
        self.call(|| unsafe { sys::sqlite3_busy_timeout(self.as_ptr(), ms) })
    }

    pub fn changes(&self) -> i32 {
        unsafe { sys::sqlite3_changes(self.as_ptr()) }
    }

    pub fn total_changes(&self) -> i64 {
        unsafe { sys::sqlite3_total_changes64(self.as_ptr()) }
    }

    pub fn last_insert_rowid(&self) -> i64 {
        unsafe { sys::sqlite3_last_insert_rowid(self.as_ptr()) }
    }

    pub fn is_autocommit(&self) -> bool {
        unsafe { sys::sqlite3_get_autocommit(self.as_ptr()) != 0 }
    }

    /// Must run inside [`locked`](Self::locked).
    fn check(&self, rc: c_int) -> DbResult<()> {
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(DbError::from_code(rc, self.errmsg()))
        }
    }

    /// Makes an engine call under the connection mutex and checks its result.
    fn call(&self, f: impl FnOnce() -> c_int) -> DbResult<()> {
        self.locked(|| {
            let rc = f();
            self.check(rc)
        })
    }

    /// Runs one or more `;`-separated statements without a row callback.
    pub fn exec(&self, sql: &str) -> DbResult<()> {
        let c_sql = c_string("SQL", sql)?;
        self.locked(|| {
            let mut errmsg: *mut c_char = ptr::null_mut();
            let rc = unsafe {
                sys::sqlite3_exec(self.as_ptr(), c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
            };
            self.exec_result(rc, errmsg)
        })
    }

    /// Runs `sql`, calling `callback(values, names)` for every result row.
    /// NULL columns are passed as `""`. Returning `false` stops execution
    /// without an error. A panic in `callback` is resumed after the engine
    /// has unwound.
    pub fn exec_with<F>(&self, sql: &str, callback: F) -> DbResult<()>
    where
        F: FnMut(&[&str], &[&str]) -> bool,
    {
        let c_sql = c_string("SQL", sql)?;
        let mut context = ExecContext {
            callback,
            stopped: false,
            panic: None,
        };
        let result = self.locked(|| {
            let mut errmsg: *mut c_char = ptr::null_mut();
            let rc = unsafe {
                sys::sqlite3_exec(
                    self.as_ptr(),
                    c_sql.as_ptr(),
                    Some(exec_trampoline::<F>),
                    ptr::addr_of_mut!(context).cast(),
                    &mut errmsg,
                )
            };
            let interrupted = context.panic.is_some() || context.stopped;
            if interrupted && rc == sys::SQLITE_ABORT {
                if !errmsg.is_null() {
                    unsafe { sys::sqlite3_free(errmsg.cast()) };
                }
                return Ok(());
            }
            self.exec_result(rc, errmsg)
        });
        if let Some(payload) = context.panic {
            std::panic::resume_unwind(payload);
        }
        result
    }

    /// Must run inside [`locked`](Self::locked).
    fn exec_result(&self, rc: c_int, errmsg: *mut c_char) -> DbResult<()> {
        if rc == SQLITE_OK {
            return Ok(());
        }
        let message = if errmsg.is_null() {
            self.errmsg()
        } else {
            let m = unsafe { lossy_str(errmsg) };
            unsafe { sys::sqlite3_free(errmsg.cast()) };
            m
        };
        Err(DbError::from_code(rc, message))
    }

    /// Compiles the first statement in `sql`.
    pub fn prepare(self: &Arc<Self>, sql: &str) -> DbResult<RawStmt> {
        let c_sql = c_string("SQL", sql)?;
        let mut stmt: *mut sys::sqlite3_stmt = ptr::null_mut();
        self.locked(|| {
            let rc = unsafe {
                sys::sqlite3_prepare_v2(self.as_ptr(), c_sql.as_ptr(), -1, &mut stmt, ptr::null_mut())
            };
            if rc == SQLITE_OK {
                Ok(())
            } else {
                Err(DbError::compile(rc, self.errmsg()))
            }
        })?;
        // Whitespace or comment-only text compiles to a null statement.
        let ptr = NonNull::new(stmt)
            .ok_or_else(|| DbError::compile(SQLITE_ERROR, "no SQL statement to prepare"))?;
        Ok(RawStmt {
            ptr: ptr.as_ptr(),
            db: Arc::clone(self),
        })
    }

    /// The connection's recursive mutex, if the engine provides one.
    pub fn mutex(self: &Arc<Self>) -> Option<RawMutex> {
        let ptr = NonNull::new(unsafe { sys::sqlite3_db_mutex(self.as_ptr()) })?;
        Some(RawMutex {
            ptr,
            _db: Arc::clone(self),
        })
    }

    // ── User functions ──────────────────────────────────────────────────

    fn function_flags(deterministic: bool) -> c_int {
        if deterministic {
            sys::SQLITE_UTF8 | sys::SQLITE_DETERMINISTIC
        } else {
            sys::SQLITE_UTF8
        }
    }

    /// Registers a scalar function. `function` is boxed and owned by the
    /// engine, which drops it on replacement, on close or on failure.
    pub fn create_scalar_function<F>(
        &self,
        name: &str,
        n_args: i32,
        deterministic: bool,
        function: F,
    ) -> DbResult<()>
    where
        F: Fn(&[Value]) -> DbResult<Value> + Send + Sync + 'static,
    {
        let c_name = c_string("function name", name)?;
        let user_data = Box::into_raw(Box::new(function));
        self.call(|| unsafe {
            sys::sqlite3_create_function_v2(
                self.as_ptr(),
                c_name.as_ptr(),
                n_args,
                Self::function_flags(deterministic),
                user_data.cast(),
                Some(call_scalar::<F>),
                None,
                None,
                Some(drop_boxed::<F>),
            )
        })
    }

    /// Registers an aggregate function whose per-group state is `A`.
    pub fn create_aggregate_function<A: Aggregate>(
        &self,
        name: &str,
        n_args: i32,
        deterministic: bool,
    ) -> DbResult<()> {
        let c_name = c_string("function name", name)?;
        self.call(|| unsafe {
            sys::sqlite3_create_function_v2(
                self.as_ptr(),
                c_name.as_ptr(),
                n_args,
                Self::function_flags(deterministic),
                ptr::null_mut(),
                None,
                Some(aggregate_step::<A>),
                Some(aggregate_final::<A>),
                None,
            )
        })
    }

    // ── Profiling ───────────────────────────────────────────────────────

    /// Installs `profiler` as the statement profile hook, or removes the
    /// hook when `None`. Replaces any previous profiler.
    pub fn set_profiler(&self, profiler: Option<Arc<ProfileFn>>) -> DbResult<()> {
        let mut slot = self.profiler.lock().unwrap_or_else(PoisonError::into_inner);
        let boxed = profiler.map(Box::new);
        let context = boxed
            .as_deref()
            .map_or(ptr::null_mut(), |p| ptr::from_ref::<Arc<ProfileFn>>(p).cast_mut().cast());
        let (mask, callback) = if boxed.is_some() {
            (sys::SQLITE_TRACE_PROFILE, Some(profile_trampoline as TraceCallback))
        } else {
            (0, None)
        };
        self.call(|| unsafe { sys::sqlite3_trace_v2(self.as_ptr(), mask, callback, context) })?;
        // The old profiler is no longer reachable from the engine.
        *slot = boxed;
        Ok(())
    }
}

impl Drop for RawDb {
    fn drop(&mut self) {
        unsafe {
            sqlite3_close_v2(self.as_ptr());
        }
    }
}

// ── Profile hook ────────────────────────────────────────────────────────

type TraceCallback = unsafe extern "C" fn(c_uint, *mut c_void, *mut c_void, *mut c_void) -> c_int;

/// Runs with the connection mutex held, as part of the step, reset or
/// finalize that completed the statement.
unsafe extern "C" fn profile_trampoline(
    event: c_uint,
    context: *mut c_void,
    stmt: *mut c_void,
    elapsed_ns: *mut c_void,
) -> c_int {
    if event != sys::SQLITE_TRACE_PROFILE || context.is_null() || elapsed_ns.is_null() {
        return 0;
    }
    // Cloned first: the callback may replace the profiler it is running in.
    let profiler = Arc::clone(&*context.cast::<Arc<ProfileFn>>());
    let sql = lossy_str(sys::sqlite3_sql(stmt.cast()));
    let elapsed = Duration::from_nanos(u64::try_from(*elapsed_ns.cast::<i64>()).unwrap_or(0));
    if catch_unwind(AssertUnwindSafe(|| profiler(&sql, elapsed))).is_err() {
        log::warn!("profile callback panicked");
    }
    0
}

// ── exec callback ───────────────────────────────────────────────────────

struct ExecContext<F> {
    callback: F,
    stopped: bool,
    panic: Option<Box<dyn Any + Send>>,
}

unsafe extern "C" fn exec_trampoline<F>(
    arg: *mut c_void,
    n_columns: c_int,
    values: *mut *mut c_char,
    names: *mut *mut c_char,
) -> c_int
where
    F: FnMut(&[&str], &[&str]) -> bool,
{
    let context = &mut *arg.cast::<ExecContext<F>>();
    let n = usize::try_from(n_columns).unwrap_or(0);
    let collect = |array: *mut *mut c_char| -> Vec<String> {
        if array.is_null() {
            return vec![String::new(); n];
        }
        (0..n).map(|i| lossy_str(*array.add(i))).collect()
    };
    let values = collect(values);
    let names = collect(names);
    let values: Vec<&str> = values.iter().map(String::as_str).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    match catch_unwind(AssertUnwindSafe(|| (context.callback)(&values, &names))) {
        Ok(true) => 0,
        Ok(false) => {
            context.stopped = true;
            1
        }
        Err(payload) => {
            context.panic = Some(payload);
            1
        }
    }
}

// ── Statement ───────────────────────────────────────────────────────────

/// Owned `sqlite3_stmt*` handle. Finalized on drop.
///
/// Holds a reference to its connection so the connection outlives it.
#[derive(Debug)]
pub struct RawStmt {
    /// Null only after [`finalize`](Self::finalize).
    ptr: *mut sys::sqlite3_stmt,
    db: Arc<RawDb>,
}

// Safety: a statement has a single owner and its connection is serialized.
unsafe impl Send for RawStmt {}

impl RawStmt {
    /// Makes a bind call under the connection mutex.
    fn bind_with(&self, index: c_int, f: impl FnOnce() -> c_int) -> DbResult<()> {
        self.db.locked(|| match f() {
            SQLITE_OK => Ok(()),
            rc => Err(DbError::binding(index, rc, self.db.errmsg())),
        })
    }

    // ── Binding ─────────────────────────────────────────────────────────

    pub fn bind_null(&self, index: i32) -> DbResult<()> {
        self.bind_with(index, || unsafe { sys::sqlite3_bind_null(self.ptr, index) })
    }

    pub fn bind_i64(&self, index: i32, value: i64) -> DbResult<()> {
        self.bind_with(index, || unsafe { sys::sqlite3_bind_int64(self.ptr, index, value) })
    }

    pub fn bind_f64(&self, index: i32, value: f64) -> DbResult<()> {
        self.bind_with(index, || unsafe { sys::sqlite3_bind_double(self.ptr, index, value) })
    }

    pub fn bind_text(&self, index: i32, value: &str) -> DbResult<()> {
        let len = c_int::try_from(value.len())
            .map_err(|_| DbError::binding(index, sys::SQLITE_TOOBIG, errstr(sys::SQLITE_TOOBIG)))?;
        self.bind_with(index, || unsafe {
            sys::sqlite3_bind_text(
                self.ptr,
                index,
                value.as_ptr().cast(),
                len,
                sys::SQLITE_TRANSIENT(),
            )
        })
    }

    /// Binds UTF-16 code units; the engine converts to the database encoding.
    pub fn bind_text16(&self, index: i32, value: &[u16]) -> DbResult<()> {
        let len = value
            .len()
            .checked_mul(2)
            .and_then(|n| c_int::try_from(n).ok())
            .ok_or_else(|| DbError::binding(index, sys::SQLITE_TOOBIG, errstr(sys::SQLITE_TOOBIG)))?;
        self.bind_with(index, || unsafe {
            sqlite3_bind_text16(
                self.ptr,
                index,
                value.as_ptr().cast(),
                len,
                sys::SQLITE_TRANSIENT(),
            )
        })
    }

    pub fn bind_blob(&self, index: i32, value: &[u8]) -> DbResult<()> {
        let len = c_int::try_from(value.len())
            .map_err(|_| DbError::binding(index, sys::SQLITE_TOOBIG, errstr(sys::SQLITE_TOOBIG)))?;
        self.bind_with(index, || unsafe {
            sys::sqlite3_bind_blob(
                self.ptr,
                index,
                value.as_ptr().cast(),
                len,
                sys::SQLITE_TRANSIENT(),
            )
        })
    }

    pub fn bind_value(&self, index: i32, value: &Value) -> DbResult<()> {
        match value {
            Value::Integer(v) => self.bind_i64(index, *v),
            Value::Float(v) => self.bind_f64(index, *v),
            Value::Text(v) => self.bind_text(index, v),
            Value::Blob(v) => self.bind_blob(index, v),
            Value::Null => self.bind_null(index),
        }
    }

    pub fn bind_parameter_count(&self) -> usize {
        usize::try_from(unsafe { sys::sqlite3_bind_parameter_count(self.ptr) }).unwrap_or(0)
    }

    /// 1-based index of the named parameter (including its `:`/`@`/`$`
    /// prefix), or `None`.
    pub fn bind_parameter_index(&self, name: &str) -> Option<i32> {
        let c_name = CString::new(name).ok()?;
        let index = unsafe { sys::sqlite3_bind_parameter_index(self.ptr, c_name.as_ptr()) };
        (index > 0).then_some(index)
    }

    pub fn clear_bindings(&self) -> DbResult<()> {
        self.db.call(|| unsafe { sys::sqlite3_clear_bindings(self.ptr) })
    }

    // ── Execution ───────────────────────────────────────────────────────

    /// Steps once. `Ok(true)` means a row is available.
    pub fn step(&self) -> DbResult<bool> {
        self.db.locked(|| match unsafe { sys::sqlite3_step(self.ptr) } {
            SQLITE_ROW => Ok(true),
            SQLITE_DONE => Ok(false),
            rc => Err(DbError::from_code(rc, self.db.errmsg())),
        })
    }

    /// Steps to completion and returns the number of rows changed, read
    /// before another thread's statement can overwrite the count.
    pub fn run_to_end(&self) -> DbResult<i32> {
        self.db.locked(|| {
            while self.step()? {}
            Ok(self.db.changes())
        })
    }

    /// Rewinds the statement. Reports the error of a failed previous step.
    pub fn reset(&self) -> DbResult<()> {
        self.db.call(|| unsafe { sys::sqlite3_reset(self.ptr) })
    }

    pub fn sql(&self) -> String {
        unsafe { lossy_str(sys::sqlite3_sql(self.ptr)) }
    }

    pub fn is_readonly(&self) -> bool {
        unsafe { sys::sqlite3_stmt_readonly(self.ptr) != 0 }
    }

    /// Finalizes the statement, reporting any deferred error.
    pub fn finalize(mut self) -> DbResult<()> {
        let db = Arc::clone(&self.db);
        db.call(|| self.finalize_raw())
    }

    fn finalize_raw(&mut self) -> c_int {
        if self.ptr.is_null() {
            return SQLITE_OK;
        }
        let rc = unsafe { sys::sqlite3_finalize(self.ptr) };
        self.ptr = ptr::null_mut();
        rc
    }

    // ── Column reading ──────────────────────────────────────────────────

    pub fn column_count(&self) -> usize {
        usize::try_from(unsafe { sys::sqlite3_column_count(self.ptr) }).unwrap_or(0)
    }

    pub fn column_name(&self, index: usize) -> String {
        unsafe { lossy_str(sys::sqlite3_column_name(self.ptr, to_c_int(index))) }
    }

    pub fn column_type(&self, index: usize) -> Type {
        type_from_raw(unsafe { sys::sqlite3_column_type(self.ptr, to_c_int(index)) })
    }

    /// Snapshots the column in its native storage class, without asking the
    /// engine for any conversion.
    pub fn column_value(&self, index: usize) -> Value {
        let i = to_c_int(index);
        match self.column_type(index) {
            Type::Integer => Value::Integer(unsafe { sys::sqlite3_column_int64(self.ptr, i) }),
            Type::Float => Value::Float(unsafe { sys::sqlite3_column_double(self.ptr, i) }),
            Type::Text => {
                let text = unsafe { sys::sqlite3_column_text(self.ptr, i) };
                let len = unsafe { sys::sqlite3_column_bytes(self.ptr, i) };
                let bytes = unsafe { copy_bytes(text.cast(), len) };
                Value::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            Type::Blob => {
                let blob = unsafe { sys::sqlite3_column_blob(self.ptr, i) };
                let len = unsafe { sys::sqlite3_column_bytes(self.ptr, i) };
                Value::Blob(unsafe { copy_bytes(blob, len) })
            }
            Type::Null => Value::Null,
        }
    }
}

impl Drop for RawStmt {
    fn drop(&mut self) {
        self.finalize_raw();
    }
}

// ── Backup ──────────────────────────────────────────────────────────────

/// Owned `sqlite3_backup*` handle. Finished on drop.
#[derive(Debug)]
pub struct RawBackup {
    /// Null only after [`finish`](Self::finish).
    ptr: *mut sys::sqlite3_backup,
    destination: Arc<RawDb>,
    source: Arc<RawDb>,
}

// Safety: a backup has a single owner and both connections are serialized.
unsafe impl Send for RawBackup {}

impl RawBackup {
    /// Runs `f` holding the source then the destination mutex, the order the
    /// engine itself takes them in.
    fn locked_pair<T>(source: &RawDb, destination: &RawDb, f: impl FnOnce() -> T) -> T {
        source.locked(|| destination.locked(f))
    }

    pub fn init(
        destination: &Arc<RawDb>,
        destination_name: &str,
        source: &Arc<RawDb>,
        source_name: &str,
    ) -> DbResult<Self> {
        let c_dest = c_string("schema name", destination_name)?;
        let c_src = c_string("schema name", source_name)?;
        let ptr = Self::locked_pair(source, destination, || {
            let ptr = unsafe {
                sys::sqlite3_backup_init(
                    destination.as_ptr(),
                    c_dest.as_ptr(),
                    source.as_ptr(),
                    c_src.as_ptr(),
                )
            };
            if ptr.is_null() {
                Err(DbError::from_code(
                    destination.extended_errcode(),
                    destination.errmsg(),
                ))
            } else {
                Ok(ptr)
            }
        })?;
        Ok(Self {
            ptr,
            destination: Arc::clone(destination),
            source: Arc::clone(source),
        })
    }

    /// Copies up to `pages` pages (all if negative). `Ok(true)` means pages
    /// remain, `Ok(false)` means the copy is complete.
    pub fn step(&self, pages: i32) -> DbResult<bool> {
        if self.ptr.is_null() {
            return Err(DbError::Misuse("backup already finished".into()));
        }
        match unsafe { sys::sqlite3_backup_step(self.ptr, pages) } {
            SQLITE_OK => Ok(true),
            SQLITE_DONE => Ok(false),
            rc => Err(DbError::from_code(rc, errstr(rc))),
        }
    }

    pub fn remaining(&self) -> usize {
        if self.ptr.is_null() {
            return 0;
        }
        usize::try_from(unsafe { sys::sqlite3_backup_remaining(self.ptr) }).unwrap_or(0)
    }

    pub fn page_count(&self) -> usize {
        if self.ptr.is_null() {
            return 0;
        }
        usize::try_from(unsafe { sys::sqlite3_backup_pagecount(self.ptr) }).unwrap_or(0)
    }

    /// Releases the handle, reporting the error of a failed step if any.
    pub fn finish(mut self) -> DbResult<()> {
        let source = Arc::clone(&self.source);
        let destination = Arc::clone(&self.destination);
        Self::locked_pair(&source, &destination, || match self.finish_raw() {
            SQLITE_OK => Ok(()),
            rc => Err(DbError::from_code(rc, destination.errmsg())),
        })
    }

    fn finish_raw(&mut self) -> c_int {
        if self.ptr.is_null() {
            return SQLITE_OK;
        }
        let rc = unsafe { sys::sqlite3_backup_finish(self.ptr) };
        self.ptr = ptr::null_mut();
        rc
    }
}

impl Drop for RawBackup {
    fn drop(&mut self) {
        self.finish_raw();
    }
}

// ── Mutex ───────────────────────────────────────────────────────────────

/// The recursive mutex owned by a serialized connection.
#[derive(Debug, Clone)]
pub struct RawMutex {
    ptr: NonNull<sys::sqlite3_mutex>,
    _db: Arc<RawDb>,
}

// Safety: sqlite3_mutex objects are designed to be shared between threads.
unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    pub fn enter(&self) {
        unsafe { sys::sqlite3_mutex_enter(self.ptr.as_ptr()) };
    }

    pub fn try_enter(&self) -> bool {
        unsafe { sys::sqlite3_mutex_try(self.ptr.as_ptr()) == SQLITE_OK }
    }

    /// Must only be called by the thread that entered the mutex.
    pub fn leave(&self) {
        unsafe { sys::sqlite3_mutex_leave(self.ptr.as_ptr()) };
    }
}

// ── Function trampolines ────────────────────────────────────────────────

unsafe extern "C" fn drop_boxed<T>(p: *mut c_void) {
    drop(Box::from_raw(p.cast::<T>()));
}

unsafe fn value_from_raw(value: *mut sys::sqlite3_value) -> Value {
    match type_from_raw(sys::sqlite3_value_type(value)) {
        Type::Integer => Value::Integer(sys::sqlite3_value_int64(value)),
        Type::Float => Value::Float(sys::sqlite3_value_double(value)),
        Type::Text => {
            let text = sys::sqlite3_value_text(value);
            let len = sys::sqlite3_value_bytes(value);
            Value::Text(String::from_utf8_lossy(&copy_bytes(text.cast(), len)).into_owned())
        }
        Type::Blob => {
            let blob = sys::sqlite3_value_blob(value);
            let len = sys::sqlite3_value_bytes(value);
            Value::Blob(copy_bytes(blob, len))
        }
        Type::Null => Value::Null,
    }
}

unsafe fn collect_args(argc: c_int, argv: *mut *mut sys::sqlite3_value) -> Vec<Value> {
    let n = usize::try_from(argc).unwrap_or(0);
    if argv.is_null() {
        return Vec::new();
    }
    (0..n).map(|i| value_from_raw(*argv.add(i))).collect()
}

unsafe fn set_result(ctx: *mut sys::sqlite3_context, value: &Value) {
    match value {
        Value::Null => sys::sqlite3_result_null(ctx),
        Value::Integer(v) => sys::sqlite3_result_int64(ctx, *v),
        Value::Float(v) => sys::sqlite3_result_double(ctx, *v),
        Value::Text(s) => match c_int::try_from(s.len()) {
            Ok(len) => {
                sys::sqlite3_result_text(ctx, s.as_ptr().cast(), len, sys::SQLITE_TRANSIENT());
            }
            Err(_) => sys::sqlite3_result_error_toobig(ctx),
        },
        Value::Blob(b) => match c_int::try_from(b.len()) {
            Ok(len) => {
                sys::sqlite3_result_blob(ctx, b.as_ptr().cast(), len, sys::SQLITE_TRANSIENT());
            }
            Err(_) => sys::sqlite3_result_error_toobig(ctx),
        },
    }
}

unsafe fn set_error(ctx: *mut sys::sqlite3_context, message: &str) {
    let len = c_int::try_from(message.len()).unwrap_or(c_int::MAX);
    sys::sqlite3_result_error(ctx, message.as_ptr().cast(), len);
}

/// A [`DbError::Function`] message is reported verbatim, any other error by
/// its display text.
unsafe fn report_error(ctx: *mut sys::sqlite3_context, err: &DbError) {
    match err {
        DbError::Function(message) => set_error(ctx, message),
        other => set_error(ctx, &other.to_string()),
    }
}

unsafe fn set_outcome(
    ctx: *mut sys::sqlite3_context,
    outcome: std::thread::Result<DbResult<Value>>,
) {
    match outcome {
        Ok(Ok(value)) => set_result(ctx, &value),
        Ok(Err(err)) => report_error(ctx, &err),
        Err(_) => set_error(ctx, "user function panicked"),
    }
}

unsafe extern "C" fn call_scalar<F>(
    ctx: *mut sys::sqlite3_context,
    argc: c_int,
    argv: *mut *mut sys::sqlite3_value,
) where
    F: Fn(&[Value]) -> DbResult<Value>,
{
    let function = &*sys::sqlite3_user_data(ctx).cast::<F>();
    let args = collect_args(argc, argv);
    let outcome = catch_unwind(AssertUnwindSafe(|| function(&args)));
    set_outcome(ctx, outcome);
}

/// Returns the slot holding this group's boxed state. Allocates the slot
/// (zeroed) on first use when `create` is set.
unsafe fn aggregate_slot<A>(ctx: *mut sys::sqlite3_context, create: bool) -> *mut *mut A {
    let size = if create {
        to_c_int(std::mem::size_of::<*mut A>())
    } else {
        0
    };
    sys::sqlite3_aggregate_context(ctx, size).cast::<*mut A>()
}

unsafe extern "C" fn aggregate_step<A: Aggregate>(
    ctx: *mut sys::sqlite3_context,
    argc: c_int,
    argv: *mut *mut sys::sqlite3_value,
) {
    let slot = aggregate_slot::<A>(ctx, true);
    if slot.is_null() {
        sys::sqlite3_result_error_nomem(ctx);
        return;
    }
    let args = collect_args(argc, argv);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        if (*slot).is_null() {
            *slot = Box::into_raw(Box::<A>::default());
        }
        (**slot).step(&args)
    }));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => report_error(ctx, &err),
        Err(_) => set_error(ctx, "aggregate step panicked"),
    }
}

unsafe extern "C" fn aggregate_final<A: Aggregate>(ctx: *mut sys::sqlite3_context) {
    let slot = aggregate_slot::<A>(ctx, false);
    // No step ran (empty group) when the slot or the state is missing.
    let boxed = if slot.is_null() || (*slot).is_null() {
        None
    } else {
        let boxed = Box::from_raw(*slot);
        *slot = ptr::null_mut();
        Some(boxed)
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        boxed.map_or_else(A::default, |state| *state).finalize()
    }));
    set_outcome(ctx, outcome);
}
