//! Arrow IPC and JSON row codecs
//!
//! Schemas and record batches travel to the engine as complete Arrow IPC
//! *file* images; query results come back as a JSON array of row objects.

use std::io::{self, Cursor, Seek, SeekFrom, Write};

use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Float64Type, Int32Type, Int64Type};
use arrow_array::{Array, RecordBatch};
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use arrow_schema::DataType;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::Schema;

/// One result row: column name to JSON value
pub type Row = serde_json::Map<String, Value>;

/// Append-only in-memory sink for the IPC file writer.
///
/// Seeking to the end or to the current position reports the length;
/// seeking to the start restarts the buffer from empty. Any other seek fails.
#[derive(Debug, Default)]
pub struct SpoolBuffer {
    buf: Vec<u8>,
}

impl SpoolBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Write for SpoolBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SpoolBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::End(0) | SeekFrom::Current(0) => Ok(self.buf.len() as u64),
            SeekFrom::Start(0) => {
                self.buf.clear();
                Ok(0)
            }
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("spool buffer cannot seek to {other:?}"),
            )),
        }
    }
}

/// IPC file image with the schema and no record batches.
pub fn schema_to_ipc(schema: &Schema) -> Result<Vec<u8>> {
    let mut writer = FileWriter::try_new(SpoolBuffer::new(), schema.arrow_schema())
        .map_err(Error::arrow("create IPC writer"))?;
    writer.finish().map_err(Error::arrow("close IPC writer"))?;
    let spool = writer
        .into_inner()
        .map_err(Error::arrow("close IPC writer"))?;
    Ok(spool.into_inner())
}

/// IPC file image holding every batch, written with the first batch's schema.
pub fn batches_to_ipc(batches: &[RecordBatch]) -> Result<Vec<u8>> {
    let first = batches
        .first()
        .ok_or_else(|| Error::InvalidArgument("no record batches to encode".into()))?;
    let mut writer = FileWriter::try_new(SpoolBuffer::new(), first.schema_ref())
        .map_err(Error::arrow("create IPC writer"))?;
    for batch in batches {
        writer.write(batch).map_err(Error::arrow("write record"))?;
    }
    writer.finish().map_err(Error::arrow("close IPC writer"))?;
    let spool = writer
        .into_inner()
        .map_err(Error::arrow("close IPC writer"))?;
    Ok(spool.into_inner())
}

pub fn schema_from_ipc(bytes: &[u8]) -> Result<Schema> {
    let reader =
        FileReader::try_new(Cursor::new(bytes), None).map_err(Error::arrow("read IPC schema"))?;
    Ok(Schema::from_arrow(reader.schema()))
}

pub fn batches_from_ipc(bytes: &[u8]) -> Result<Vec<RecordBatch>> {
    let reader =
        FileReader::try_new(Cursor::new(bytes), None).map_err(Error::arrow("read IPC file"))?;
    reader
        .map(|batch| batch.map_err(Error::arrow("read IPC record batch")))
        .collect()
}

/// Convert every row of `batch` into a name-to-value map.
pub fn rows_from_batch(batch: &RecordBatch) -> Result<Vec<Row>> {
    let schema = batch.schema();
    let columns = batch
        .columns()
        .iter()
        .map(|c| column_to_values(c.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = vec![Row::new(); batch.num_rows()];
    for (field, values) in schema.fields().iter().zip(columns) {
        for (row, value) in rows.iter_mut().zip(values) {
            row.insert(field.name().clone(), value);
        }
    }
    Ok(rows)
}

/// JSON values of one column; nulls become `Value::Null`.
pub fn column_to_values(column: &dyn Array) -> Result<Vec<Value>> {
    let len = column.len();
    let values = match column.data_type() {
        DataType::Int32 => {
            let a = column.as_primitive::<Int32Type>();
            collect(len, a, |i| Value::from(a.value(i)))
        }
        DataType::Int64 => {
            let a = column.as_primitive::<Int64Type>();
            collect(len, a, |i| Value::from(a.value(i)))
        }
        DataType::Float32 => {
            let a = column.as_primitive::<Float32Type>();
            collect(len, a, |i| Value::from(a.value(i)))
        }
        DataType::Float64 => {
            let a = column.as_primitive::<Float64Type>();
            collect(len, a, |i| Value::from(a.value(i)))
        }
        DataType::Boolean => {
            let a = column.as_boolean();
            collect(len, a, |i| Value::from(a.value(i)))
        }
        DataType::Utf8 => {
            let a = column.as_string::<i32>();
            collect(len, a, |i| Value::from(a.value(i)))
        }
        DataType::FixedSizeList(item, _) if item.data_type() == &DataType::Float32 => {
            let a = column.as_fixed_size_list();
            collect(len, a, |i| {
                let vector = a.value(i);
                let floats = vector.as_primitive::<Float32Type>();
                Value::Array(floats.iter().map(|v| v.map_or(Value::Null, Value::from)).collect())
            })
        }
        other => return Err(Error::UnsupportedType(other.to_string())),
    };
    Ok(values)
}

fn collect(len: usize, array: &dyn Array, value: impl Fn(usize) -> Value) -> Vec<Value> {
    (0..len)
        .map(|i| if array.is_null(i) { Value::Null } else { value(i) })
        .collect()
}
