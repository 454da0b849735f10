//! Raw C ABI of the native LanceDB engine
//!
//! The engine exports a flat `simple_lancedb_*` surface. Every fallible entry
//! point returns a heap-allocated [`SimpleResult`] that the caller must hand
//! back to `simple_lancedb_result_free` after reading it. Connection and table
//! handles are opaque `*mut c_void` tokens owned by the engine.
//!
//! Memory returned through out-parameters belongs to the engine as well and
//! has a dedicated release function:
//!
//! | out-parameter              | release with                          |
//! |----------------------------|---------------------------------------|
//! | `*mut c_char` (JSON)       | `simple_lancedb_free_string`          |
//! | `*mut *mut c_char` (names) | `simple_lancedb_free_table_names`     |
//! | `*mut u8` (Arrow IPC)      | `simple_lancedb_free_ipc_data`        |

use std::ffi::{c_char, c_int, c_void};
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use thiserror::Error;

/// Directory holding the provisioned native library, when the `fetch`
/// feature ran provisioning at build time.
pub const BUNDLED_LIB_DIR: Option<&str> = option_env!("LANCEDB_NATIVE_LIB_DIR");

/// Result structure returned by every fallible entry point
#[repr(C)]
#[derive(Debug)]
pub struct SimpleResult {
    pub success: bool,
    /// NUL-terminated message owned by the engine, or NULL.
    pub error_message: *mut c_char,
}

pub type InitFn = unsafe extern "C" fn() -> c_int;
pub type ResultFreeFn = unsafe extern "C" fn(result: *mut SimpleResult);
pub type FreeStringFn = unsafe extern "C" fn(s: *mut c_char);
pub type FreeIpcDataFn = unsafe extern "C" fn(data: *mut u8);

pub type ConnectFn =
    unsafe extern "C" fn(uri: *const c_char, handle: *mut *mut c_void) -> *mut SimpleResult;
pub type ConnectWithOptionsFn = unsafe extern "C" fn(
    uri: *const c_char,
    options_json: *const c_char,
    handle: *mut *mut c_void,
) -> *mut SimpleResult;
pub type CloseFn = unsafe extern "C" fn(handle: *mut c_void) -> *mut SimpleResult;
pub type TableNamesFn = unsafe extern "C" fn(
    handle: *mut c_void,
    names: *mut *mut *mut c_char,
    count: *mut c_int,
) -> *mut SimpleResult;
pub type FreeTableNamesFn = unsafe extern "C" fn(names: *mut *mut c_char, count: c_int);
pub type OpenTableFn = unsafe extern "C" fn(
    handle: *mut c_void,
    table_name: *const c_char,
    table_handle: *mut *mut c_void,
) -> *mut SimpleResult;
pub type CreateTableWithIpcFn = unsafe extern "C" fn(
    handle: *mut c_void,
    table_name: *const c_char,
    schema_ipc: *const u8,
    schema_len: usize,
) -> *mut SimpleResult;
pub type DropTableFn =
    unsafe extern "C" fn(handle: *mut c_void, table_name: *const c_char) -> *mut SimpleResult;

pub type TableCloseFn = unsafe extern "C" fn(table_handle: *mut c_void) -> *mut SimpleResult;
pub type TableSchemaIpcFn = unsafe extern "C" fn(
    table_handle: *mut c_void,
    schema_ipc: *mut *mut u8,
    schema_len: *mut usize,
) -> *mut SimpleResult;
pub type TableAddIpcFn = unsafe extern "C" fn(
    table_handle: *mut c_void,
    ipc_data: *const u8,
    ipc_len: usize,
    added_count: *mut i64,
) -> *mut SimpleResult;
pub type TableCountRowsFn =
    unsafe extern "C" fn(table_handle: *mut c_void, count: *mut i64) -> *mut SimpleResult;
pub type TableVersionFn =
    unsafe extern "C" fn(table_handle: *mut c_void, version: *mut i64) -> *mut SimpleResult;
pub type TableUpdateFn = unsafe extern "C" fn(
    table_handle: *mut c_void,
    predicate: *const c_char,
    updates_json: *const c_char,
) -> *mut SimpleResult;
pub type TableDeleteFn = unsafe extern "C" fn(
    table_handle: *mut c_void,
    predicate: *const c_char,
    deleted_count: *mut i64,
) -> *mut SimpleResult;
pub type TableCreateIndexFn = unsafe extern "C" fn(
    table_handle: *mut c_void,
    columns_json: *const c_char,
    index_type: *const c_char,
    index_name: *const c_char,
) -> *mut SimpleResult;
pub type TableGetIndexesFn = unsafe extern "C" fn(
    table_handle: *mut c_void,
    indexes_json: *mut *mut c_char,
) -> *mut SimpleResult;
pub type TableIndexStatsFn = unsafe extern "C" fn(
    table_handle: *mut c_void,
    index_name: *const c_char,
    index_stats_json: *mut *mut c_char,
) -> *mut SimpleResult;
pub type TableOptimizeFn = unsafe extern "C" fn(
    table_handle: *mut c_void,
    optimize_stats_json: *mut *mut c_char,
) -> *mut SimpleResult;
pub type TableSelectQueryFn = unsafe extern "C" fn(
    table_handle: *mut c_void,
    query_config_json: *const c_char,
    result_json: *mut *mut c_char,
) -> *mut SimpleResult;

/// One function pointer per exported symbol.
///
/// Built either from a loaded [`NativeLibrary`] or by hand (an in-process
/// engine exporting the same ABI).
#[derive(Clone, Copy)]
pub struct EntryPoints {
    pub init: InitFn,
    pub result_free: ResultFreeFn,
    pub free_string: FreeStringFn,
    pub free_ipc_data: FreeIpcDataFn,
    pub connect: ConnectFn,
    pub connect_with_options: ConnectWithOptionsFn,
    pub close: CloseFn,
    pub table_names: TableNamesFn,
    pub free_table_names: FreeTableNamesFn,
    pub open_table: OpenTableFn,
    pub create_table_with_ipc: CreateTableWithIpcFn,
    pub drop_table: DropTableFn,
    pub table_close: TableCloseFn,
    pub table_schema_ipc: TableSchemaIpcFn,
    pub table_add_ipc: TableAddIpcFn,
    pub table_count_rows: TableCountRowsFn,
    pub table_version: TableVersionFn,
    pub table_update: TableUpdateFn,
    pub table_delete: TableDeleteFn,
    pub table_create_index: TableCreateIndexFn,
    pub table_get_indexes: TableGetIndexesFn,
    pub table_index_stats: TableIndexStatsFn,
    pub table_optimize: TableOptimizeFn,
    pub table_select_query: TableSelectQueryFn,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to load native library {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("native library {path:?} is missing symbol '{symbol}': {source}")]
    MissingSymbol {
        path: PathBuf,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
}

macro_rules! resolve {
    ($lib:expr, $path:expr, $name:literal, $ty:ty) => {{
        let symbol: Symbol<$ty> = $lib
            .get(concat!($name, "\0").as_bytes())
            .map_err(|source| LoadError::MissingSymbol {
                path: $path.to_path_buf(),
                symbol: $name,
                source,
            })?;
        *symbol
    }};
}

impl EntryPoints {
    /// Resolve every symbol from `lib`.
    ///
    /// # Safety
    /// `lib` must export the `simple_lancedb_*` ABI with the signatures
    /// declared in this module, and must outlive the returned table.
    pub unsafe fn resolve(lib: &Library, path: &Path) -> Result<Self, LoadError> {
        Ok(Self {
            init: resolve!(lib, path, "simple_lancedb_init", InitFn),
            result_free: resolve!(lib, path, "simple_lancedb_result_free", ResultFreeFn),
            free_string: resolve!(lib, path, "simple_lancedb_free_string", FreeStringFn),
            free_ipc_data: resolve!(lib, path, "simple_lancedb_free_ipc_data", FreeIpcDataFn),
            connect: resolve!(lib, path, "simple_lancedb_connect", ConnectFn),
            connect_with_options: resolve!(
                lib,
                path,
                "simple_lancedb_connect_with_options",
                ConnectWithOptionsFn
            ),
            close: resolve!(lib, path, "simple_lancedb_close", CloseFn),
            table_names: resolve!(lib, path, "simple_lancedb_table_names", TableNamesFn),
            free_table_names: resolve!(
                lib,
                path,
                "simple_lancedb_free_table_names",
                FreeTableNamesFn
            ),
            open_table: resolve!(lib, path, "simple_lancedb_open_table", OpenTableFn),
            create_table_with_ipc: resolve!(
                lib,
                path,
                "simple_lancedb_create_table_with_ipc",
                CreateTableWithIpcFn
            ),
            drop_table: resolve!(lib, path, "simple_lancedb_drop_table", DropTableFn),
            table_close: resolve!(lib, path, "simple_lancedb_table_close", TableCloseFn),
            table_schema_ipc: resolve!(
                lib,
                path,
                "simple_lancedb_table_schema_ipc",
                TableSchemaIpcFn
            ),
            table_add_ipc: resolve!(lib, path, "simple_lancedb_table_add_ipc", TableAddIpcFn),
            table_count_rows: resolve!(
                lib,
                path,
                "simple_lancedb_table_count_rows",
                TableCountRowsFn
            ),
            table_version: resolve!(lib, path, "simple_lancedb_table_version", TableVersionFn),
            table_update: resolve!(lib, path, "simple_lancedb_table_update", TableUpdateFn),
            table_delete: resolve!(lib, path, "simple_lancedb_table_delete", TableDeleteFn),
            table_create_index: resolve!(
                lib,
                path,
                "simple_lancedb_table_create_index",
                TableCreateIndexFn
            ),
            table_get_indexes: resolve!(
                lib,
                path,
                "simple_lancedb_table_get_indexes",
                TableGetIndexesFn
            ),
            table_index_stats: resolve!(
                lib,
                path,
                "simple_lancedb_table_index_stats",
                TableIndexStatsFn
            ),
            table_optimize: resolve!(lib, path, "simple_lancedb_table_optimize", TableOptimizeFn),
            table_select_query: resolve!(
                lib,
                path,
                "simple_lancedb_table_select_query",
                TableSelectQueryFn
            ),
        })
    }
}

/// A loaded native engine library together with its resolved entry points
pub struct NativeLibrary {
    entry: EntryPoints,
    path: PathBuf,
    // Declared last: the pointers in `entry` are only valid while this lives.
    _lib: Library,
}

impl NativeLibrary {
    /// Load the shared library at `path` and resolve the full ABI.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        let lib = unsafe { Library::new(&path) }.map_err(|source| LoadError::Open {
            path: path.clone(),
            source,
        })?;
        let entry = unsafe { EntryPoints::resolve(&lib, &path)? };
        Ok(Self {
            entry,
            path,
            _lib: lib,
        })
    }

    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
