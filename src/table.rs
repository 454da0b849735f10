//! Tables
//!
//! A [`Table`] owns one native table handle and keeps its connection alive.
//! Every operation holds the table's read lock and the connection's read
//! lock for the length of its native call, so neither handle can be closed
//! underneath it.

use std::ffi::{c_char, c_void};
use std::ptr;
use std::sync::Arc;

use arrow_array::RecordBatch;
use lancedb_native_sys::{EntryPoints, SimpleResult};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec::{self, Row};
use crate::connection::ConnectionInner;
use crate::error::{Error, Result};
use crate::model::{
    AddDataOptions, FtsSearch, IndexInfo, IndexStatistics, IndexType, OptimizeStats, QueryConfig,
    VectorSearch,
};
use crate::native::{c_string, Engine, RawHandle};
use crate::query::{QueryBuilder, VectorQueryBuilder};
use crate::schema::Schema;

/// Handle to an open table. Clones share the same native table.
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

struct TableInner {
    name: String,
    connection: Arc<ConnectionInner>,
    handle: RwLock<Option<RawHandle>>,
}

impl Table {
    pub(crate) fn new(name: &str, connection: Arc<ConnectionInner>, handle: RawHandle) -> Self {
        Self {
            inner: Arc::new(TableInner {
                name: name.to_string(),
                connection,
                handle: RwLock::new(Some(handle)),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True while both the table and its connection are open.
    pub fn is_open(&self) -> bool {
        self.inner.handle.read().is_some() && !self.inner.connection.is_closed()
    }

    /// Release the native table. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    /// Run `f` with the live table handle, or fail with `TableClosed`.
    fn with_handle<T>(&self, f: impl FnOnce(&Engine, *mut c_void) -> Result<T>) -> Result<T> {
        let table = self.inner.handle.read();
        let table = table.as_ref().ok_or(Error::TableClosed)?;
        let connection = self.inner.connection.handle().read();
        if connection.is_none() {
            return Err(Error::TableClosed);
        }
        f(self.inner.connection.engine(), table.as_ptr())
    }

    pub fn schema(&self) -> Result<Schema> {
        self.with_handle(|engine, table| {
            let mut data: *mut u8 = ptr::null_mut();
            let mut len: usize = 0;
            let result = engine.call("get table schema", |ep| unsafe {
                (ep.table_schema_ipc)(table, &mut data, &mut len)
            });
            let bytes = engine.bytes_out(data, len);
            result?;
            let bytes = bytes.as_slice().ok_or(Error::NullOutput("schema IPC data"))?;
            codec::schema_from_ipc(bytes)
        })
    }

    pub fn add(&self, batch: RecordBatch, options: Option<&AddDataOptions>) -> Result<()> {
        self.add_records(std::slice::from_ref(&batch), options)
    }

    /// Append `batches` as one Arrow IPC file. An empty slice does nothing.
    ///
    /// The engine only appends; `options.mode` is carried for callers that
    /// share option values with other writers.
    pub fn add_records(
        &self,
        batches: &[RecordBatch],
        options: Option<&AddDataOptions>,
    ) -> Result<()> {
        self.with_handle(|engine, table| {
            if batches.is_empty() {
                return Ok(());
            }
            let ipc = codec::batches_to_ipc(batches)?;
            let mut added: i64 = 0;
            engine.call("add records", |ep| unsafe {
                (ep.table_add_ipc)(table, ipc.as_ptr(), ipc.len(), &mut added)
            })?;
            tracing::debug!(
                table = %self.inner.name,
                batches = batches.len(),
                added,
                mode = ?options.map(|o| o.mode).unwrap_or_default(),
                "added records"
            );
            Ok(())
        })
    }

    pub fn count(&self) -> Result<i64> {
        self.with_handle(|engine, table| {
            let mut count: i64 = 0;
            engine.call("count rows", |ep| unsafe {
                (ep.table_count_rows)(table, &mut count)
            })?;
            Ok(count)
        })
    }

    pub fn version(&self) -> Result<i64> {
        self.with_handle(|engine, table| {
            let mut version: i64 = 0;
            engine.call("get table version", |ep| unsafe {
                (ep.table_version)(table, &mut version)
            })?;
            Ok(version)
        })
    }

    /// Set columns to the given values on every row matching `filter`.
    pub fn update(&self, filter: &str, updates: &serde_json::Map<String, Value>) -> Result<()> {
        self.with_handle(|engine, table| {
            let json = serde_json::to_string(updates).map_err(Error::json("marshal updates"))?;
            let c_filter = c_string(filter, "filter")?;
            let c_json = c_string(&json, "updates")?;
            engine.call("update rows", |ep| unsafe {
                (ep.table_update)(table, c_filter.as_ptr(), c_json.as_ptr())
            })
        })
    }

    /// Delete every row matching `filter`.
    pub fn delete(&self, filter: &str) -> Result<()> {
        self.with_handle(|engine, table| {
            let c_filter = c_string(filter, "filter")?;
            let mut deleted: i64 = 0;
            engine.call("delete rows", |ep| unsafe {
                (ep.table_delete)(table, c_filter.as_ptr(), &mut deleted)
            })?;
            tracing::debug!(table = %self.inner.name, filter, deleted, "deleted rows");
            Ok(())
        })
    }

    pub fn create_index(&self, columns: &[&str], index_type: IndexType) -> Result<()> {
        self.create_index_inner(columns, index_type, None)
    }

    pub fn create_index_with_name(
        &self,
        columns: &[&str],
        index_type: IndexType,
        name: &str,
    ) -> Result<()> {
        self.create_index_inner(columns, index_type, Some(name))
    }

    fn create_index_inner(
        &self,
        columns: &[&str],
        index_type: IndexType,
        name: Option<&str>,
    ) -> Result<()> {
        self.with_handle(|engine, table| {
            if columns.is_empty() {
                return Err(Error::InvalidArgument("columns list cannot be empty".into()));
            }
            let columns_json =
                serde_json::to_string(columns).map_err(Error::json("marshal columns"))?;
            let c_columns = c_string(&columns_json, "columns")?;
            let c_type = c_string(index_type.as_str(), "index type")?;
            let c_name = name.map(|n| c_string(n, "index name")).transpose()?;
            engine.call("create index", |ep| unsafe {
                (ep.table_create_index)(
                    table,
                    c_columns.as_ptr(),
                    c_type.as_ptr(),
                    c_name.as_ref().map_or(ptr::null(), |n| n.as_ptr()),
                )
            })?;
            tracing::info!(table = %self.inner.name, ?columns, %index_type, "created index");
            Ok(())
        })
    }

    pub fn get_all_indexes(&self) -> Result<Vec<IndexInfo>> {
        self.with_handle(|engine, table| {
            let json = string_call(engine, "get indexes", |ep, out| unsafe {
                (ep.table_get_indexes)(table, out)
            })?;
            decode_list(json, "parse indexes JSON")
        })
    }

    /// Statistics for the index called `name`, or `None` when it does not exist.
    pub fn index_stats(&self, name: &str) -> Result<Option<IndexStatistics>> {
        self.with_handle(|engine, table| {
            let c_name = c_string(name, "index name")?;
            let json = string_call(engine, "get index stats", |ep, out| unsafe {
                (ep.table_index_stats)(table, c_name.as_ptr(), out)
            })?;
            match json {
                Some(json) => serde_json::from_str::<Option<IndexStatistics>>(&json)
                    .map_err(Error::json("parse index stats JSON")),
                None => Ok(None),
            }
        })
    }

    /// Compact files and prune old versions.
    pub fn optimize(&self) -> Result<OptimizeStats> {
        self.with_handle(|engine, table| {
            let json = string_call(engine, "optimize table", |ep, out| unsafe {
                (ep.table_optimize)(table, out)
            })?;
            let stats = match json {
                Some(json) => serde_json::from_str::<Option<OptimizeStats>>(&json)
                    .map_err(Error::json("parse optimize stats JSON"))?
                    .unwrap_or_default(),
                None => OptimizeStats::default(),
            };
            tracing::info!(table = %self.inner.name, ?stats, "optimized table");
            Ok(stats)
        })
    }

    pub fn select(&self, config: &QueryConfig) -> Result<Vec<Row>> {
        self.with_handle(|engine, table| {
            let config_json =
                serde_json::to_string(config).map_err(Error::json("marshal query config to JSON"))?;
            let c_config = c_string(&config_json, "query config")?;
            let json = string_call(engine, "execute select query", |ep, out| unsafe {
                (ep.table_select_query)(table, c_config.as_ptr(), out)
            })?;
            decode_list(json, "parse query results JSON")
        })
    }

    pub fn select_with_columns(&self, columns: &[&str]) -> Result<Vec<Row>> {
        self.select(&QueryConfig {
            columns: Some(columns.iter().map(|c| c.to_string()).collect()),
            ..Default::default()
        })
    }

    pub fn select_with_filter(&self, filter: &str) -> Result<Vec<Row>> {
        self.select(&QueryConfig {
            filter: Some(filter.to_string()),
            ..Default::default()
        })
    }

    pub fn select_with_limit(&self, limit: usize, offset: usize) -> Result<Vec<Row>> {
        self.select(&QueryConfig {
            limit: Some(limit),
            offset: Some(offset),
            ..Default::default()
        })
    }

    /// `k` nearest rows to `vector` in `column`.
    pub fn vector_search(&self, column: &str, vector: &[f32], k: usize) -> Result<Vec<Row>> {
        self.select(&QueryConfig {
            vector_search: Some(vector_search(column, vector, k)),
            ..Default::default()
        })
    }

    pub fn vector_search_with_filter(
        &self,
        column: &str,
        vector: &[f32],
        k: usize,
        filter: &str,
    ) -> Result<Vec<Row>> {
        self.select(&QueryConfig {
            vector_search: Some(vector_search(column, vector, k)),
            filter: Some(filter.to_string()),
            ..Default::default()
        })
    }

    pub fn full_text_search(&self, column: &str, query: &str) -> Result<Vec<Row>> {
        self.select(&QueryConfig {
            fts_search: Some(fts_search(column, query)),
            ..Default::default()
        })
    }

    pub fn full_text_search_with_filter(
        &self,
        column: &str,
        query: &str,
        filter: &str,
    ) -> Result<Vec<Row>> {
        self.select(&QueryConfig {
            fts_search: Some(fts_search(column, query)),
            filter: Some(filter.to_string()),
            ..Default::default()
        })
    }

    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(self.clone())
    }

    pub fn vector_query(&self, column: &str, vector: &[f32]) -> VectorQueryBuilder {
        VectorQueryBuilder::new(self.clone(), column, vector)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.inner.name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl TableInner {
    fn close(&self) -> Result<()> {
        let mut slot = self.handle.write();
        let Some(handle) = slot.take() else {
            return Ok(());
        };
        let result = self
            .connection
            .engine()
            .call("close table", |ep| unsafe { (ep.table_close)(handle.as_ptr()) });
        tracing::debug!(table = %self.name, ok = result.is_ok(), "table closed");
        result
    }
}

impl Drop for TableInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(table = %self.name, "close on drop failed: {e}");
        }
    }
}

/// Call an entry point that hands back an optional JSON string.
fn string_call(
    engine: &Engine,
    op: &str,
    f: impl FnOnce(&EntryPoints, *mut *mut c_char) -> *mut SimpleResult,
) -> Result<Option<String>> {
    let mut out: *mut c_char = ptr::null_mut();
    let result = engine.call(op, |ep| f(ep, &mut out));
    let out = engine.string_out(out);
    result?;
    Ok(out.to_string_opt())
}

/// Decode a JSON array. A NULL string and a JSON `null` both mean empty.
fn decode_list<T: DeserializeOwned>(json: Option<String>, context: &'static str) -> Result<Vec<T>> {
    let Some(json) = json else {
        return Ok(Vec::new());
    };
    let list = serde_json::from_str::<Option<Vec<T>>>(&json).map_err(Error::json(context))?;
    Ok(list.unwrap_or_default())
}

fn vector_search(column: &str, vector: &[f32], k: usize) -> VectorSearch {
    VectorSearch {
        column: column.to_string(),
        vector: vector.to_vec(),
        k,
        distance_type: None,
    }
}

fn fts_search(column: &str, query: &str) -> FtsSearch {
    FtsSearch {
        column: column.to_string(),
        query: query.to_string(),
    }
}
