//! Database connections
//!
//! A [`Connection`] owns one native connection handle. The handle sits in a
//! `RwLock<Option<_>>`: operations hold the read lock for the duration of
//! their native call, `close` takes the write lock and leaves `None` behind,
//! so a handle is never used during or after teardown.

use std::ffi::{c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec;
use crate::config::ConnectionOptions;
use crate::error::{Error, Result};
use crate::native::{c_string, Engine, RawHandle};
use crate::schema::Schema;
use crate::table::Table;

/// Connect with the process-wide engine (see [`Engine::global`]).
pub fn connect(uri: &str, options: Option<&ConnectionOptions>) -> Result<Connection> {
    Connection::connect_with(Engine::global()?, uri, options)
}

/// Handle to an open database. Clones share the same native connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    engine: Arc<Engine>,
    uri: String,
    handle: RwLock<Option<RawHandle>>,
}

impl Connection {
    pub fn connect_with(
        engine: Arc<Engine>,
        uri: &str,
        options: Option<&ConnectionOptions>,
    ) -> Result<Self> {
        engine.ensure_init();

        let c_uri = c_string(uri, "uri")?;
        let storage_json = options
            .and_then(ConnectionOptions::effective_storage_options)
            .map(|storage| serde_json::to_string(&storage))
            .transpose()
            .map_err(Error::json("marshal storage options"))?
            .map(|json| c_string(&json, "storage options"))
            .transpose()?;

        let mut raw: *mut c_void = ptr::null_mut();
        let op = format!("connect to LanceDB at {uri}");
        engine.call(&op, |ep| unsafe {
            match &storage_json {
                Some(json) => (ep.connect_with_options)(c_uri.as_ptr(), json.as_ptr(), &mut raw),
                None => (ep.connect)(c_uri.as_ptr(), &mut raw),
            }
        })?;
        let handle = RawHandle::from_out(raw).ok_or(Error::NullOutput("connection handle"))?;

        tracing::info!(uri, with_options = storage_json.is_some(), "connected");
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                engine,
                uri: uri.to_string(),
                handle: RwLock::new(Some(handle)),
            }),
        })
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Release the native connection. Closing twice is a no-op.
    ///
    /// The connection counts as closed afterwards even if the engine reports
    /// an error.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let handle = self.inner.handle.read();
        let handle = handle.as_ref().ok_or(Error::ConnectionClosed)?;

        let mut names: *mut *mut c_char = ptr::null_mut();
        let mut count: c_int = 0;
        let result = self.inner.engine.call("get table names", |ep| unsafe {
            (ep.table_names)(handle.as_ptr(), &mut names, &mut count)
        });
        let names = self.inner.engine.names_out(names, count);
        result?;
        Ok(names.to_vec())
    }

    pub fn open_table(&self, name: &str) -> Result<Table> {
        let handle = self.inner.handle.read();
        let handle = handle.as_ref().ok_or(Error::ConnectionClosed)?;

        let c_name = c_string(name, "table name")?;
        let mut raw: *mut c_void = ptr::null_mut();
        let op = format!("open table {name}");
        self.inner.engine.call(&op, |ep| unsafe {
            (ep.open_table)(handle.as_ptr(), c_name.as_ptr(), &mut raw)
        })?;
        let table = RawHandle::from_out(raw).ok_or(Error::NullOutput("table handle"))?;

        tracing::debug!(table = name, "opened table");
        Ok(Table::new(name, self.inner.clone(), table))
    }

    /// Create an empty table with `schema`, then open it.
    pub fn create_table(&self, name: &str, schema: &Schema) -> Result<Table> {
        {
            let handle = self.inner.handle.read();
            let handle = handle.as_ref().ok_or(Error::ConnectionClosed)?;

            let ipc = codec::schema_to_ipc(schema)?;
            let c_name = c_string(name, "table name")?;
            let op = format!("create table {name}");
            self.inner.engine.call(&op, |ep| unsafe {
                (ep.create_table_with_ipc)(handle.as_ptr(), c_name.as_ptr(), ipc.as_ptr(), ipc.len())
            })?;
        }
        tracing::info!(table = name, fields = schema.num_fields(), "created table");
        self.open_table(name)
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        let handle = self.inner.handle.read();
        let handle = handle.as_ref().ok_or(Error::ConnectionClosed)?;

        let c_name = c_string(name, "table name")?;
        let op = format!("drop table {name}");
        self.inner.engine.call(&op, |ep| unsafe {
            (ep.drop_table)(handle.as_ptr(), c_name.as_ptr())
        })?;
        tracing::info!(table = name, "dropped table");
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("uri", &self.inner.uri)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionInner {
    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn handle(&self) -> &RwLock<Option<RawHandle>> {
        &self.handle
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.handle.read().is_none()
    }

    fn close(&self) -> Result<()> {
        let mut slot = self.handle.write();
        let Some(handle) = slot.take() else {
            return Ok(());
        };
        let result = self
            .engine
            .call("close connection", |ep| unsafe { (ep.close)(handle.as_ptr()) });
        tracing::debug!(uri = %self.uri, ok = result.is_ok(), "connection closed");
        result
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(uri = %self.uri, "close on drop failed: {e}");
        }
    }
}
