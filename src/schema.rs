//! Table schemas
//!
//! A [`Schema`] is an immutable, ordered list of Arrow fields shared behind an
//! `Arc`. [`SchemaBuilder`] assembles one field at a time using the semantic
//! types the engine understands (scalars, timestamps, embedding vectors and
//! variable-length lists).

use std::fmt;
use std::sync::Arc;

use arrow_schema::{DataType, Field, SchemaRef, TimeUnit};

use crate::error::{Error, Result};

/// Element type of an embedding vector column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorDataType {
    /// Stored as Float32; the engine has no half-precision vectors.
    Float16,
    #[default]
    Float32,
    Float64,
}

impl VectorDataType {
    fn arrow_type(self) -> DataType {
        match self {
            Self::Float16 | Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
        }
    }
}

/// Accumulates fields in insertion order.
///
/// Duplicate names are kept as given; the engine decides whether to accept
/// them when a table is created.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(mut self, name: &str, data_type: DataType, nullable: bool) -> Self {
        self.fields.push(Field::new(name, data_type, nullable));
        self
    }

    pub fn add_int32_field(self, name: &str, nullable: bool) -> Self {
        self.add_field(name, DataType::Int32, nullable)
    }

    pub fn add_int64_field(self, name: &str, nullable: bool) -> Self {
        self.add_field(name, DataType::Int64, nullable)
    }

    pub fn add_float32_field(self, name: &str, nullable: bool) -> Self {
        self.add_field(name, DataType::Float32, nullable)
    }

    pub fn add_float64_field(self, name: &str, nullable: bool) -> Self {
        self.add_field(name, DataType::Float64, nullable)
    }

    pub fn add_string_field(self, name: &str, nullable: bool) -> Self {
        self.add_field(name, DataType::Utf8, nullable)
    }

    pub fn add_binary_field(self, name: &str, nullable: bool) -> Self {
        self.add_field(name, DataType::Binary, nullable)
    }

    pub fn add_boolean_field(self, name: &str, nullable: bool) -> Self {
        self.add_field(name, DataType::Boolean, nullable)
    }

    /// Timestamp without a time zone.
    pub fn add_timestamp_field(self, name: &str, unit: TimeUnit, nullable: bool) -> Self {
        self.add_field(name, DataType::Timestamp(unit, None), nullable)
    }

    /// Fixed-size list of `dimension` floats. The list items are always
    /// non-nullable; `nullable` applies to the vector as a whole.
    pub fn add_vector_field(
        self,
        name: &str,
        dimension: i32,
        element: VectorDataType,
        nullable: bool,
    ) -> Self {
        let item = Arc::new(Field::new("item", element.arrow_type(), false));
        self.add_field(name, DataType::FixedSizeList(item, dimension), nullable)
    }

    /// Variable-length list with nullable items of `item_type`.
    pub fn add_list_field(self, name: &str, item_type: DataType, nullable: bool) -> Self {
        let item = Arc::new(Field::new("item", item_type, true));
        self.add_field(name, DataType::List(item), nullable)
    }

    /// Never fails: an empty builder yields an empty schema.
    pub fn build(self) -> Schema {
        Schema {
            inner: Arc::new(arrow_schema::Schema::new(self.fields)),
        }
    }
}

/// Immutable table schema
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    inner: SchemaRef,
}

impl Schema {
    pub fn from_arrow(inner: SchemaRef) -> Self {
        Self { inner }
    }

    pub fn arrow_schema(&self) -> &SchemaRef {
        &self.inner
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.inner.fields().iter().map(|f| f.as_ref())
    }

    pub fn num_fields(&self) -> usize {
        self.inner.fields().len()
    }

    pub fn field(&self, index: usize) -> Result<&Field> {
        self.inner
            .fields()
            .get(index)
            .map(|f| f.as_ref())
            .ok_or_else(|| Error::FieldNotFound(format!("field index {index} out of range")))
    }

    /// First field named `name`.
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        self.fields()
            .find(|f| f.name() == name)
            .ok_or_else(|| Error::FieldNotFound(format!("field '{name}' not found")))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields().any(|f| f.name() == name)
    }
}

impl From<SchemaRef> for Schema {
    fn from(inner: SchemaRef) -> Self {
        Self::from_arrow(inner)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema({} fields)", self.num_fields())?;
        for field in self.fields() {
            write!(f, "\n  {}: {}", field.name(), field.data_type())?;
            if field.is_nullable() {
                f.write_str(" (nullable)")?;
            }
        }
        Ok(())
    }
}
