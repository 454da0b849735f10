//! lancedb-native: safe Rust binding over the prebuilt LanceDB engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Connection / Table / QueryBuilder (safe API)       │
//! │        RwLock<Option<handle>>, idempotent close, Drop       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Codec (Arrow IPC / JSON)                  │
//! │     schemas + record batches out, JSON rows and stats in    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Engine (simple_lancedb_* entry points)         │
//! │     loaded with libloading, results freed by RAII guards    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lancedb_native::{connect, SchemaBuilder, VectorDataType};
//!
//! # fn main() -> lancedb_native::Result<()> {
//! let db = connect("/tmp/lancedb", None)?;
//! let schema = SchemaBuilder::new()
//!     .add_int32_field("id", false)
//!     .add_vector_field("embedding", 128, VectorDataType::Float32, false)
//!     .build();
//! let table = db.create_table("documents", &schema)?;
//! let hits = table.vector_search("embedding", &[0.0; 128], 5)?;
//! println!("{} hits", hits.len());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod model;
pub mod native;
pub mod query;
pub mod schema;
pub mod table;

pub use codec::Row;
pub use config::{
    AzureConfig, ConnectionOptions, GcsConfig, LocalConfig, NativeConfig, S3Config, StorageOptions,
};
pub use connection::{connect, Connection};
pub use error::{Error, Result};
pub use model::{
    AddDataOptions, CompactionMetrics, DistanceType, FtsSearch, IndexInfo, IndexStatistics,
    IndexType, OptimizeStats, QueryConfig, QueryOptions, RemovalStats, VectorSearch, WriteMode,
};
pub use native::Engine;
pub use query::{QueryBuilder, VectorQueryBuilder};
pub use schema::{Schema, SchemaBuilder, VectorDataType};
pub use table::Table;

pub use arrow_schema::{DataType, TimeUnit};
pub use lancedb_native_sys::EntryPoints;
