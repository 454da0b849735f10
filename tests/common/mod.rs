//! In-process stand-in for the native engine.
//!
//! Every `simple_lancedb_*` entry point is implemented here as an
//! `extern "C"` function with the same allocation contract as the real
//! engine, so the binding's marshalling and release paths run unchanged.
//! Databases are keyed by URI and live for the whole test binary.

#![allow(dead_code)]

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;
use std::sync::{Arc, Mutex, OnceLock};

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{Float64Array, Int32Array, RecordBatch, StringArray};
use lancedb_native::codec::{self, Row};
use lancedb_native::{Engine, EntryPoints, QueryConfig, Schema, SchemaBuilder, VectorDataType};
use lancedb_native_sys::SimpleResult;
use serde_json::{json, Value};

pub const DIM: i32 = 4;

thread_local! {
    static CALLS: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    static LAST_OPTIONS: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Entry points called on this thread so far.
pub fn calls() -> Vec<&'static str> {
    CALLS.with(|c| c.borrow().clone())
}

pub fn call_count() -> usize {
    CALLS.with(|c| c.borrow().len())
}

/// Options JSON received by the last `connect_with_options` on this thread.
pub fn last_options() -> Option<String> {
    LAST_OPTIONS.with(|o| o.borrow().clone())
}

/// A fake engine. Also clears this thread's call log and captured options,
/// since the test harness may run several tests on one thread.
pub fn engine() -> Arc<Engine> {
    CALLS.with(|c| c.borrow_mut().clear());
    LAST_OPTIONS.with(|o| o.borrow_mut().take());
    unsafe { Engine::from_entry_points(entry_points()) }
}

/// A fresh database URI backed by a temporary directory.
pub fn temp_uri() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let uri = dir.path().to_string_lossy().into_owned();
    (dir, uri)
}

pub fn documents_schema() -> Schema {
    SchemaBuilder::new()
        .add_int32_field("id", false)
        .add_string_field("name", true)
        .add_float64_field("score", true)
        .add_vector_field("embedding", DIM, VectorDataType::Float32, false)
        .build()
}

/// One row per id; vector `i` is `[i, i, i, i]`.
pub fn documents_batch(ids: &[i32], scores: &[f64]) -> RecordBatch {
    let schema = documents_schema();
    let names: Vec<String> = ids.iter().map(|id| format!("doc-{id}")).collect();
    let mut vectors = FixedSizeListBuilder::new(Float32Builder::new(), DIM).with_field(
        Arc::new(arrow_schema::Field::new("item", arrow_schema::DataType::Float32, false)),
    );
    for &id in ids {
        vectors.values().append_slice(&[id as f32; DIM as usize]);
        vectors.append(true);
    }
    RecordBatch::try_new(
        schema.arrow_schema().clone(),
        vec![
            Arc::new(Int32Array::from(ids.to_vec())),
            Arc::new(StringArray::from(names)),
            Arc::new(Float64Array::from(scores.to_vec())),
            Arc::new(vectors.finish()),
        ],
    )
    .unwrap()
}

pub fn entry_points() -> EntryPoints {
    EntryPoints {
        init,
        result_free,
        free_string,
        free_ipc_data,
        connect,
        connect_with_options,
        close,
        table_names,
        free_table_names,
        open_table,
        create_table_with_ipc,
        drop_table,
        table_close,
        table_schema_ipc,
        table_add_ipc,
        table_count_rows,
        table_version,
        table_update,
        table_delete,
        table_create_index,
        table_get_indexes,
        table_index_stats,
        table_optimize,
        table_select_query,
    }
}

struct Database {
    tables: Mutex<HashMap<String, Arc<Mutex<TableData>>>>,
}

struct TableData {
    schema_ipc: Vec<u8>,
    rows: Vec<Row>,
    version: i64,
    indexes: Vec<Value>,
}

struct ConnectionHandle {
    db: Arc<Database>,
}

struct TableHandle {
    data: Arc<Mutex<TableData>>,
}

fn databases() -> &'static Mutex<HashMap<String, Arc<Database>>> {
    static DATABASES: OnceLock<Mutex<HashMap<String, Arc<Database>>>> = OnceLock::new();
    DATABASES.get_or_init(Default::default)
}

fn record(name: &'static str) {
    CALLS.with(|c| c.borrow_mut().push(name));
}

fn ok() -> *mut SimpleResult {
    Box::into_raw(Box::new(SimpleResult {
        success: true,
        error_message: ptr::null_mut(),
    }))
}

fn fail(message: impl Into<String>) -> *mut SimpleResult {
    let message = CString::new(message.into()).unwrap_or_default();
    Box::into_raw(Box::new(SimpleResult {
        success: false,
        error_message: message.into_raw(),
    }))
}

fn fail_silently() -> *mut SimpleResult {
    Box::into_raw(Box::new(SimpleResult {
        success: false,
        error_message: ptr::null_mut(),
    }))
}

unsafe fn text(p: *const c_char) -> String {
    CStr::from_ptr(p).to_string_lossy().into_owned()
}

unsafe fn conn<'a>(handle: *mut c_void) -> &'a ConnectionHandle {
    &*(handle as *const ConnectionHandle)
}

unsafe fn table<'a>(handle: *mut c_void) -> &'a TableHandle {
    &*(handle as *const TableHandle)
}

fn into_c_string(value: String) -> *mut c_char {
    CString::new(value).unwrap_or_default().into_raw()
}

// IPC buffers carry their length in an 8-byte prefix so that
// `free_ipc_data` can rebuild the allocation from the data pointer alone.
fn alloc_ipc(bytes: &[u8]) -> (*mut u8, usize) {
    let mut buf = Vec::with_capacity(bytes.len() + 8);
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
    let base = Box::into_raw(buf.into_boxed_slice()) as *mut u8;
    (unsafe { base.add(8) }, bytes.len())
}

unsafe extern "C" fn init() -> c_int {
    record("init");
    0
}

unsafe extern "C" fn result_free(result: *mut SimpleResult) {
    if result.is_null() {
        return;
    }
    let result = Box::from_raw(result);
    if !result.error_message.is_null() {
        drop(CString::from_raw(result.error_message));
    }
}

unsafe extern "C" fn free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

unsafe extern "C" fn free_ipc_data(data: *mut u8) {
    if data.is_null() {
        return;
    }
    let base = data.sub(8);
    let mut len = [0u8; 8];
    ptr::copy_nonoverlapping(base, len.as_mut_ptr(), 8);
    let len = u64::from_le_bytes(len) as usize;
    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(base, len + 8)));
}

unsafe fn open_database(uri: &str, handle: *mut *mut c_void) -> *mut SimpleResult {
    if uri.starts_with("fail://") {
        return fail(format!("cannot reach {uri}"));
    }
    if uri.starts_with("silent-fail://") {
        return fail_silently();
    }
    let db = databases()
        .lock()
        .unwrap()
        .entry(uri.to_string())
        .or_insert_with(|| {
            Arc::new(Database {
                tables: Mutex::new(HashMap::new()),
            })
        })
        .clone();
    *handle = Box::into_raw(Box::new(ConnectionHandle { db })) as *mut c_void;
    ok()
}

unsafe extern "C" fn connect(uri: *const c_char, handle: *mut *mut c_void) -> *mut SimpleResult {
    record("connect");
    open_database(&text(uri), handle)
}

unsafe extern "C" fn connect_with_options(
    uri: *const c_char,
    options_json: *const c_char,
    handle: *mut *mut c_void,
) -> *mut SimpleResult {
    record("connect_with_options");
    let options = text(options_json);
    if serde_json::from_str::<Value>(&options).is_err() {
        return fail("invalid storage options JSON");
    }
    LAST_OPTIONS.with(|o| *o.borrow_mut() = Some(options));
    open_database(&text(uri), handle)
}

unsafe extern "C" fn close(handle: *mut c_void) -> *mut SimpleResult {
    record("close");
    drop(Box::from_raw(handle as *mut ConnectionHandle));
    ok()
}

unsafe extern "C" fn table_names(
    handle: *mut c_void,
    names: *mut *mut *mut c_char,
    count: *mut c_int,
) -> *mut SimpleResult {
    record("table_names");
    let mut list: Vec<String> = conn(handle).db.tables.lock().unwrap().keys().cloned().collect();
    if list.is_empty() {
        *names = ptr::null_mut();
        *count = 0;
        return ok();
    }
    list.sort();
    let ptrs: Box<[*mut c_char]> = list.into_iter().map(into_c_string).collect();
    *count = ptrs.len() as c_int;
    *names = Box::into_raw(ptrs) as *mut *mut c_char;
    ok()
}

unsafe extern "C" fn free_table_names(names: *mut *mut c_char, count: c_int) {
    record("free_table_names");
    let ptrs = Box::from_raw(ptr::slice_from_raw_parts_mut(names, count as usize));
    for &p in ptrs.iter() {
        drop(CString::from_raw(p));
    }
}

unsafe extern "C" fn open_table(
    handle: *mut c_void,
    table_name: *const c_char,
    table_handle: *mut *mut c_void,
) -> *mut SimpleResult {
    record("open_table");
    let name = text(table_name);
    let Some(data) = conn(handle).db.tables.lock().unwrap().get(&name).cloned() else {
        return fail(format!("Table '{name}' was not found"));
    };
    *table_handle = Box::into_raw(Box::new(TableHandle { data })) as *mut c_void;
    ok()
}

unsafe extern "C" fn create_table_with_ipc(
    handle: *mut c_void,
    table_name: *const c_char,
    schema_ipc: *const u8,
    schema_len: usize,
) -> *mut SimpleResult {
    record("create_table_with_ipc");
    let name = text(table_name);
    let bytes = std::slice::from_raw_parts(schema_ipc, schema_len);
    if let Err(e) = codec::schema_from_ipc(bytes) {
        return fail(format!("Invalid schema IPC: {e}"));
    }
    let mut tables = conn(handle).db.tables.lock().unwrap();
    if tables.contains_key(&name) {
        return fail(format!("Table '{name}' already exists"));
    }
    tables.insert(
        name,
        Arc::new(Mutex::new(TableData {
            schema_ipc: bytes.to_vec(),
            rows: Vec::new(),
            version: 1,
            indexes: Vec::new(),
        })),
    );
    ok()
}

unsafe extern "C" fn drop_table(handle: *mut c_void, table_name: *const c_char) -> *mut SimpleResult {
    record("drop_table");
    let name = text(table_name);
    match conn(handle).db.tables.lock().unwrap().remove(&name) {
        Some(_) => ok(),
        None => fail(format!("Table '{name}' was not found")),
    }
}

unsafe extern "C" fn table_close(table_handle: *mut c_void) -> *mut SimpleResult {
    record("table_close");
    drop(Box::from_raw(table_handle as *mut TableHandle));
    ok()
}

unsafe extern "C" fn table_schema_ipc(
    table_handle: *mut c_void,
    schema_ipc: *mut *mut u8,
    schema_len: *mut usize,
) -> *mut SimpleResult {
    record("table_schema_ipc");
    let data = table(table_handle).data.lock().unwrap();
    let (p, len) = alloc_ipc(&data.schema_ipc);
    *schema_ipc = p;
    *schema_len = len;
    ok()
}

unsafe extern "C" fn table_add_ipc(
    table_handle: *mut c_void,
    ipc_data: *const u8,
    ipc_len: usize,
    added_count: *mut i64,
) -> *mut SimpleResult {
    record("table_add_ipc");
    let bytes = std::slice::from_raw_parts(ipc_data, ipc_len);
    let batches = match codec::batches_from_ipc(bytes) {
        Ok(batches) => batches,
        Err(e) => return fail(format!("Failed to read IPC data: {e}")),
    };
    let mut rows = Vec::new();
    for batch in &batches {
        match codec::rows_from_batch(batch) {
            Ok(r) => rows.extend(r),
            Err(e) => return fail(e.to_string()),
        }
    }
    let mut data = table(table_handle).data.lock().unwrap();
    *added_count = rows.len() as i64;
    data.rows.extend(rows);
    data.version += 1;
    ok()
}

unsafe extern "C" fn table_count_rows(table_handle: *mut c_void, count: *mut i64) -> *mut SimpleResult {
    record("table_count_rows");
    *count = table(table_handle).data.lock().unwrap().rows.len() as i64;
    ok()
}

unsafe extern "C" fn table_version(table_handle: *mut c_void, version: *mut i64) -> *mut SimpleResult {
    record("table_version");
    *version = table(table_handle).data.lock().unwrap().version;
    ok()
}

unsafe extern "C" fn table_update(
    table_handle: *mut c_void,
    predicate: *const c_char,
    updates_json: *const c_char,
) -> *mut SimpleResult {
    record("table_update");
    let predicate = text(predicate);
    let updates: serde_json::Map<String, Value> = match serde_json::from_str(&text(updates_json)) {
        Ok(updates) => updates,
        Err(e) => return fail(format!("Invalid updates JSON: {e}")),
    };
    let mut data = table(table_handle).data.lock().unwrap();
    for row in data.rows.iter_mut() {
        match matches(row, &predicate) {
            Ok(true) => {
                for (k, v) in &updates {
                    row.insert(k.clone(), v.clone());
                }
            }
            Ok(false) => {}
            Err(e) => return fail(e),
        }
    }
    data.version += 1;
    ok()
}

unsafe extern "C" fn table_delete(
    table_handle: *mut c_void,
    predicate: *const c_char,
    deleted_count: *mut i64,
) -> *mut SimpleResult {
    record("table_delete");
    let predicate = text(predicate);
    let mut data = table(table_handle).data.lock().unwrap();
    let mut doomed = Vec::with_capacity(data.rows.len());
    for row in &data.rows {
        match matches(row, &predicate) {
            Ok(hit) => doomed.push(hit),
            Err(e) => return fail(e),
        }
    }
    *deleted_count = doomed.iter().filter(|&&hit| hit).count() as i64;
    let mut doomed = doomed.into_iter();
    data.rows.retain(|_| !doomed.next().unwrap_or(false));
    data.version += 1;
    ok()
}

unsafe extern "C" fn table_create_index(
    table_handle: *mut c_void,
    columns_json: *const c_char,
    index_type: *const c_char,
    index_name: *const c_char,
) -> *mut SimpleResult {
    record("table_create_index");
    let columns: Vec<String> = match serde_json::from_str(&text(columns_json)) {
        Ok(columns) => columns,
        Err(e) => return fail(format!("Invalid columns JSON: {e}")),
    };
    let mut data = table(table_handle).data.lock().unwrap();
    let schema = match codec::schema_from_ipc(&data.schema_ipc) {
        Ok(schema) => schema,
        Err(e) => return fail(e.to_string()),
    };
    if let Some(missing) = columns.iter().find(|c| !schema.has_field(c)) {
        return fail(format!("column '{missing}' not found"));
    }
    let name = if index_name.is_null() {
        format!("{}_idx", columns.join("_"))
    } else {
        text(index_name)
    };
    data.indexes.push(json!({
        "name": name,
        "columns": columns,
        "index_type": text(index_type),
    }));
    ok()
}

unsafe extern "C" fn table_get_indexes(
    table_handle: *mut c_void,
    indexes_json: *mut *mut c_char,
) -> *mut SimpleResult {
    record("table_get_indexes");
    let data = table(table_handle).data.lock().unwrap();
    *indexes_json = if data.indexes.is_empty() {
        ptr::null_mut()
    } else {
        into_c_string(Value::Array(data.indexes.clone()).to_string())
    };
    ok()
}

unsafe extern "C" fn table_index_stats(
    table_handle: *mut c_void,
    index_name: *const c_char,
    index_stats_json: *mut *mut c_char,
) -> *mut SimpleResult {
    record("table_index_stats");
    let name = text(index_name);
    let data = table(table_handle).data.lock().unwrap();
    *index_stats_json = match data.indexes.iter().find(|i| i["name"] == name.as_str()) {
        Some(index) => into_c_string(
            json!({
                "num_indexed_rows": data.rows.len(),
                "num_unindexed_rows": 0,
                "index_type": index["index_type"],
                "distance_type": null,
                "num_indices": 1,
                "loss": null,
            })
            .to_string(),
        ),
        None => ptr::null_mut(),
    };
    ok()
}

unsafe extern "C" fn table_optimize(
    table_handle: *mut c_void,
    optimize_stats_json: *mut *mut c_char,
) -> *mut SimpleResult {
    record("table_optimize");
    let mut data = table(table_handle).data.lock().unwrap();
    let old_versions = data.version - 1;
    data.version += 1;
    *optimize_stats_json = into_c_string(
        json!({
            "compaction": {
                "fragments_removed": old_versions,
                "fragments_added": 1,
                "files_removed": old_versions,
                "files_added": 1,
            },
            "prune": { "bytes_removed": 0, "old_versions": old_versions },
        })
        .to_string(),
    );
    ok()
}

unsafe extern "C" fn table_select_query(
    table_handle: *mut c_void,
    query_config_json: *const c_char,
    result_json: *mut *mut c_char,
) -> *mut SimpleResult {
    record("table_select_query");
    let config: QueryConfig = match serde_json::from_str(&text(query_config_json)) {
        Ok(config) => config,
        Err(e) => return fail(format!("Failed to parse query config: {e}")),
    };
    let data = table(table_handle).data.lock().unwrap();
    match select(&data.rows, &config) {
        Ok(rows) => {
            *result_json = into_c_string(serde_json::to_string(&rows).unwrap_or_default());
            ok()
        }
        Err(e) => fail(e),
    }
}

fn select(rows: &[Row], config: &QueryConfig) -> Result<Vec<Row>, String> {
    let mut selected = Vec::new();
    for row in rows {
        let keep = match &config.filter {
            Some(filter) => matches(row, filter)?,
            None => true,
        };
        if keep {
            selected.push(row.clone());
        }
    }

    if let Some(search) = &config.vector_search {
        for row in selected.iter_mut() {
            let distance = match row.get(&search.column) {
                Some(Value::Array(values)) => values
                    .iter()
                    .zip(&search.vector)
                    .map(|(a, b)| {
                        let d = a.as_f64().unwrap_or(0.0) - *b as f64;
                        d * d
                    })
                    .sum::<f64>(),
                _ => return Err(format!("column '{}' is not a vector column", search.column)),
            };
            row.insert("_distance".into(), json!(distance));
        }
        selected.sort_by(|a, b| {
            let da = a["_distance"].as_f64().unwrap_or(f64::MAX);
            let db = b["_distance"].as_f64().unwrap_or(f64::MAX);
            da.partial_cmp(&db).unwrap_or(Ordering::Equal)
        });
        selected.truncate(config.limit.unwrap_or(search.k));
    } else if config.fts_search.is_some() {
        return Err("Full-text search is not currently supported".into());
    } else {
        let offset = config.offset.unwrap_or(0).min(selected.len());
        selected.drain(..offset);
        if let Some(limit) = config.limit {
            selected.truncate(limit);
        }
    }

    if let Some(columns) = config.columns.as_ref().filter(|c| !c.is_empty()) {
        for row in selected.iter_mut() {
            row.retain(|k, _| k == "_distance" || columns.contains(k));
        }
    }
    Ok(selected)
}

/// Conjunction of `column OP literal` clauses joined with ` AND `.
fn matches(row: &Row, filter: &str) -> Result<bool, String> {
    for clause in filter.split(" AND ") {
        if !clause_matches(row, clause.trim())? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clause_matches(row: &Row, clause: &str) -> Result<bool, String> {
    for op in [">=", "<=", "!=", "=", ">", "<"] {
        let Some((column, literal)) = clause.split_once(op) else {
            continue;
        };
        let column = column.trim();
        let literal = parse_literal(literal.trim())?;
        let value = row
            .get(column)
            .ok_or_else(|| format!("column '{column}' not found"))?;
        let ordering = match (value, &literal) {
            (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        };
        let Some(ordering) = ordering else {
            return Ok(false);
        };
        return Ok(match op {
            ">=" => ordering != Ordering::Less,
            "<=" => ordering != Ordering::Greater,
            "!=" => ordering != Ordering::Equal,
            "=" => ordering == Ordering::Equal,
            ">" => ordering == Ordering::Greater,
            _ => ordering == Ordering::Less,
        });
    }
    Err(format!("cannot parse filter '{clause}'"))
}

fn parse_literal(literal: &str) -> Result<Value, String> {
    if let Some(s) = literal.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Ok(Value::String(s.to_string()));
    }
    match literal {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    literal
        .parse::<f64>()
        .map(|n| json!(n))
        .map_err(|_| format!("cannot parse literal '{literal}'"))
}
