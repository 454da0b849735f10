//! Payloads exchanged with the engine as JSON
//!
//! Field names match the engine's wire keys exactly. Optional members are
//! omitted from outgoing JSON when unset.

use serde::{Deserialize, Serialize};

/// Index kinds accepted by `create_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    /// Let the engine pick a vector index.
    #[default]
    Auto,
    IvfPq,
    IvfFlat,
    HnswPq,
    HnswSq,
    BTree,
    Bitmap,
    LabelList,
    Fts,
}

impl IndexType {
    /// Tag the engine expects on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "vector",
            Self::IvfPq => "ivf_pq",
            Self::IvfFlat => "ivf_flat",
            Self::HnswPq => "hnsw_pq",
            Self::HnswSq => "hnsw_sq",
            Self::BTree => "btree",
            Self::Bitmap => "bitmap",
            Self::LabelList => "label_list",
            Self::Fts => "fts",
        }
    }
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub index_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub num_indexed_rows: i64,
    pub num_unindexed_rows: i64,
    pub index_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_indices: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragments_removed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragments_added: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_removed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_added: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_removed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_versions: Option<i64>,
}

/// Outcome of `Table::optimize`: file compaction plus old-version pruning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune: Option<RemovalStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceType {
    #[default]
    L2,
    Cosine,
    Dot,
    Hamming,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorSearch {
    pub column: String,
    pub vector: Vec<f32>,
    pub k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_type: Option<DistanceType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtsSearch {
    pub column: String,
    pub query: String,
}

/// Select query sent to `simple_lancedb_table_select_query`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search: Option<VectorSearch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fts_search: Option<FtsSearch>,
}

/// Extra knobs for the query builders. Only `max_results` reaches the
/// engine; the precision and index-bypass flags are accepted and ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub max_results: usize,
    pub use_full_precision: bool,
    pub bypass_vector_index: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    #[default]
    Append,
    Overwrite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddDataOptions {
    pub mode: WriteMode,
}
