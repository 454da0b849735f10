//! Fluent query builders over [`Table::select`]
//!
//! Builders accumulate filters and a limit, then run as a single select
//! query. Filters are combined with `AND` in the order they were added.

use crate::codec::Row;
use crate::error::Result;
use crate::model::{DistanceType, QueryConfig, QueryOptions, VectorSearch};
use crate::table::Table;

/// Neighbours returned by a vector query with no explicit limit.
pub const DEFAULT_VECTOR_K: usize = 10;

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: Table,
    filters: Vec<String>,
    limit: Option<usize>,
}

impl QueryBuilder {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.filters.push(condition.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// A positive `max_results` becomes the limit.
    pub fn apply_options(self, options: &QueryOptions) -> Self {
        if options.max_results > 0 {
            self.limit(options.max_results)
        } else {
            self
        }
    }

    fn config(&self) -> QueryConfig {
        QueryConfig {
            filter: (!self.filters.is_empty()).then(|| self.filters.join(" AND ")),
            limit: self.limit,
            ..Default::default()
        }
    }

    pub fn execute(&self) -> Result<Vec<Row>> {
        self.table.select(&self.config())
    }

    /// Run [`execute`](Self::execute) on the blocking thread pool.
    pub async fn execute_async(&self) -> Result<Vec<Row>> {
        let builder = self.clone();
        tokio::task::spawn_blocking(move || builder.execute()).await?
    }
}

#[derive(Debug, Clone)]
pub struct VectorQueryBuilder {
    base: QueryBuilder,
    column: String,
    vector: Vec<f32>,
    distance_type: Option<DistanceType>,
}

impl VectorQueryBuilder {
    pub(crate) fn new(table: Table, column: &str, vector: &[f32]) -> Self {
        Self {
            base: QueryBuilder::new(table),
            column: column.to_string(),
            vector: vector.to_vec(),
            distance_type: None,
        }
    }

    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.base = self.base.filter(condition);
        self
    }

    /// Number of neighbours to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.base = self.base.limit(limit);
        self
    }

    pub fn distance_type(mut self, distance_type: DistanceType) -> Self {
        self.distance_type = Some(distance_type);
        self
    }

    pub fn apply_options(mut self, options: &QueryOptions) -> Self {
        self.base = self.base.apply_options(options);
        self
    }

    fn config(&self) -> QueryConfig {
        let mut config = self.base.config();
        config.vector_search = Some(VectorSearch {
            column: self.column.clone(),
            vector: self.vector.clone(),
            k: config.limit.unwrap_or(DEFAULT_VECTOR_K),
            distance_type: self.distance_type,
        });
        config
    }

    pub fn execute(&self) -> Result<Vec<Row>> {
        self.base.table.select(&self.config())
    }

    pub async fn execute_async(&self) -> Result<Vec<Row>> {
        let builder = self.clone();
        tokio::task::spawn_blocking(move || builder.execute()).await?
    }
}
