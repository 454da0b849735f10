//! Safe wrapper over the engine's C entry points
//!
//! Everything that crosses the boundary goes through [`Engine::call`]: the
//! result structure is always released through `simple_lancedb_result_free`,
//! and every out-parameter is wrapped in a guard that releases it with the
//! matching engine function, whatever the outcome of the call.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::{Arc, Once, OnceLock};

use lancedb_native_sys::{
    EntryPoints, FreeIpcDataFn, FreeStringFn, FreeTableNamesFn, NativeLibrary, ResultFreeFn,
    SimpleResult,
};

use crate::config::NativeConfig;
use crate::error::{Error, Result};

const UNKNOWN_ERROR: &str = "unknown error";

static GLOBAL: OnceLock<Arc<Engine>> = OnceLock::new();

/// A loaded native engine: its entry points plus the library that backs them
pub struct Engine {
    entry: EntryPoints,
    library: Option<NativeLibrary>,
    init: Once,
}

impl Engine {
    /// Load the engine from a shared library on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let library = NativeLibrary::open(path)?;
        tracing::info!("loaded native engine from {:?}", library.path());
        Ok(Arc::new(Self {
            entry: *library.entry_points(),
            library: Some(library),
            init: Once::new(),
        }))
    }

    /// Wrap an entry-point table that is already resident in the process.
    ///
    /// # Safety
    /// Every pointer must implement the `simple_lancedb_*` contract and stay
    /// callable for as long as the returned engine (or anything opened through
    /// it) is alive.
    pub unsafe fn from_entry_points(entry: EntryPoints) -> Arc<Self> {
        Arc::new(Self {
            entry,
            library: None,
            init: Once::new(),
        })
    }

    /// The process-wide engine, loaded from [`NativeConfig::from_env`] on
    /// first use unless one was installed with [`Engine::set_global`].
    pub fn global() -> Result<Arc<Self>> {
        if let Some(engine) = GLOBAL.get() {
            return Ok(engine.clone());
        }
        let config = NativeConfig::from_env();
        let engine = Self::load(config.library_path()?)?;
        Ok(GLOBAL.get_or_init(|| engine).clone())
    }

    /// Install `engine` as the process-wide engine. Fails (handing the engine
    /// back) when one is already installed.
    pub fn set_global(engine: Arc<Self>) -> std::result::Result<(), Arc<Self>> {
        GLOBAL.set(engine)
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_ref().map(NativeLibrary::path)
    }

    /// Run the engine's init entry point; later calls are no-ops.
    pub(crate) fn ensure_init(&self) {
        self.init.call_once(|| {
            let code = unsafe { (self.entry.init)() };
            tracing::debug!(code, "native engine initialized");
        });
    }

    /// Invoke one entry point and translate its result structure.
    ///
    /// `op` names the operation for the error message
    /// (`failed to {op}: {native message}`).
    pub(crate) fn call<F>(&self, op: &str, f: F) -> Result<()>
    where
        F: FnOnce(&EntryPoints) -> *mut SimpleResult,
    {
        tracing::trace!(op, "native call");
        let result = ResultGuard {
            raw: f(&self.entry),
            free: self.entry.result_free,
        };
        result.check(op)
    }

    pub(crate) fn string_out(&self, ptr: *mut c_char) -> NativeString {
        NativeString {
            ptr,
            free: self.entry.free_string,
        }
    }

    pub(crate) fn bytes_out(&self, ptr: *mut u8, len: usize) -> NativeBytes {
        NativeBytes {
            ptr,
            len,
            free: self.entry.free_ipc_data,
        }
    }

    pub(crate) fn names_out(&self, names: *mut *mut c_char, count: c_int) -> NativeNames {
        NativeNames {
            names,
            count,
            free: self.entry.free_table_names,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("library", &self.library_path())
            .finish_non_exhaustive()
    }
}

struct ResultGuard {
    raw: *mut SimpleResult,
    free: ResultFreeFn,
}

impl ResultGuard {
    fn check(&self, op: &str) -> Result<()> {
        let Some(result) = (unsafe { self.raw.as_ref() }) else {
            return Err(native_error(op, None));
        };
        if result.success {
            return Ok(());
        }
        let message = (!result.error_message.is_null())
            .then(|| unsafe { CStr::from_ptr(result.error_message) }.to_string_lossy());
        Err(native_error(op, message.as_deref()))
    }
}

impl Drop for ResultGuard {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            unsafe { (self.free)(self.raw) };
        }
    }
}

fn native_error(op: &str, message: Option<&str>) -> Error {
    Error::Native {
        op: op.to_string(),
        message: message
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_ERROR)
            .to_string(),
    }
}

/// Engine-allocated C string, released on drop
pub(crate) struct NativeString {
    ptr: *mut c_char,
    free: FreeStringFn,
}

impl NativeString {
    /// Contents, or `None` when the engine left the pointer NULL.
    pub(crate) fn to_string_opt(&self) -> Option<String> {
        (!self.ptr.is_null())
            .then(|| unsafe { CStr::from_ptr(self.ptr) }.to_string_lossy().into_owned())
    }
}

impl Drop for NativeString {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { (self.free)(self.ptr) };
        }
    }
}

/// Engine-allocated byte buffer (Arrow IPC), released on drop
pub(crate) struct NativeBytes {
    ptr: *mut u8,
    len: usize,
    free: FreeIpcDataFn,
}

impl NativeBytes {
    pub(crate) fn as_slice(&self) -> Option<&[u8]> {
        (!self.ptr.is_null()).then(|| unsafe { std::slice::from_raw_parts(self.ptr, self.len) })
    }
}

impl Drop for NativeBytes {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { (self.free)(self.ptr) };
        }
    }
}

/// Engine-allocated array of table names, released on drop
pub(crate) struct NativeNames {
    names: *mut *mut c_char,
    count: c_int,
    free: FreeTableNamesFn,
}

impl NativeNames {
    pub(crate) fn to_vec(&self) -> Vec<String> {
        if self.names.is_null() || self.count <= 0 {
            return Vec::new();
        }
        let names = unsafe { std::slice::from_raw_parts(self.names, self.count as usize) };
        names
            .iter()
            .filter(|p| !p.is_null())
            .map(|&p| unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
            .collect()
    }
}

impl Drop for NativeNames {
    fn drop(&mut self) {
        if !self.names.is_null() {
            unsafe { (self.free)(self.names, self.count) };
        }
    }
}

/// Opaque engine handle; `None` in an owning slot means closed.
#[derive(Debug)]
pub(crate) struct RawHandle(NonNull<c_void>);

// The token is only an address; the engine serializes access internally.
unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

impl RawHandle {
    pub(crate) fn from_out(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub(crate) fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Borrowed C string argument; interior NUL bytes are rejected.
pub(crate) fn c_string(value: &str, what: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| Error::InvalidArgument(format!("{what} contains an interior NUL byte")))
}
