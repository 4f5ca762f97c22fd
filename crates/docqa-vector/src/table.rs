//! LanceDB access for the `vectors` table of a saved index.

use std::path::Path;
use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};

use docqa_core::{Error, Result};

use crate::schema::{vectors_schema, CHUNK_ID_COLUMN, POSITION_COLUMN, VECTORS_TABLE, VECTOR_COLUMN};

const ROWS_PER_BATCH: usize = 1024;

/// One row of the `vectors` table.
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub position: usize,
    pub chunk_id: String,
    pub vector: Vec<f32>,
}

pub async fn open_db(dir: &Path) -> Result<Connection> {
    connect(dir.to_string_lossy().as_ref())
        .execute()
        .await
        .map_err(|e| Error::persistence(dir, format!("cannot open vector store: {e}")))
}

/// Create the `vectors` table from `rows`. `rows` must be non-empty and share `dimension`.
pub async fn write_vectors(conn: &Connection, dir: &Path, rows: &[VectorRow], dimension: usize) -> Result<()> {
    let width = i32::try_from(dimension).map_err(|_| Error::persistence(dir, format!("dimension {dimension} too large")))?;
    let schema = vectors_schema(width);
    let batches = rows
        .chunks(ROWS_PER_BATCH)
        .map(|slice| to_record_batch(slice, width))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::persistence(dir, format!("cannot encode vectors: {e}")))?;
    let reader = Box::new(RecordBatchIterator::new(batches.into_iter().map(Ok), schema));
    conn.create_table(VECTORS_TABLE, reader)
        .execute()
        .await
        .map_err(|e| Error::persistence(dir, format!("cannot write vectors table: {e}")))?;
    Ok(())
}

fn to_record_batch(rows: &[VectorRow], width: i32) -> std::result::Result<RecordBatch, arrow_schema::ArrowError> {
    let positions: Vec<i32> = rows.iter().map(|r| r.position as i32).collect();
    let ids: Vec<&str> = rows.iter().map(|r| r.chunk_id.as_str()).collect();
    let vectors = rows.iter().map(|r| Some(r.vector.iter().copied().map(Some).collect::<Vec<_>>()));
    RecordBatch::try_new(
        vectors_schema(width),
        vec![
            Arc::new(Int32Array::from(positions)),
            Arc::new(StringArray::from(ids)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, width)),
        ],
    )
}

/// Read every row of the `vectors` table. Row order is whatever Lance returns;
/// callers reorder by `position`.
pub async fn read_vectors(conn: &Connection, dir: &Path, dimension: usize) -> Result<Vec<VectorRow>> {
    let err = |reason: String| Error::persistence(dir, reason);
    let names = conn.table_names().execute().await.map_err(|e| err(format!("cannot list tables: {e}")))?;
    if !names.iter().any(|n| n == VECTORS_TABLE) {
        return Err(err(format!("`{VECTORS_TABLE}` table is missing")));
    }
    let table = conn
        .open_table(VECTORS_TABLE)
        .execute()
        .await
        .map_err(|e| err(format!("cannot open `{VECTORS_TABLE}`: {e}")))?;
    let mut stream = table.query().execute().await.map_err(|e| err(format!("cannot scan vectors: {e}")))?;

    let mut rows = Vec::new();
    while let Some(batch) = stream.try_next().await.map_err(|e| err(format!("cannot scan vectors: {e}")))? {
        let positions = batch
            .column_by_name(POSITION_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
            .ok_or_else(|| err(format!("{POSITION_COLUMN} column missing")))?;
        let ids = batch
            .column_by_name(CHUNK_ID_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| err(format!("{CHUNK_ID_COLUMN} column missing")))?;
        let vectors = batch
            .column_by_name(VECTOR_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| err(format!("{VECTOR_COLUMN} column missing")))?;
        if vectors.value_length() as usize != dimension {
            return Err(err(format!(
                "stored vectors have dimension {}, manifest says {dimension}",
                vectors.value_length()
            )));
        }
        for i in 0..batch.num_rows() {
            if positions.is_null(i) || vectors.is_null(i) {
                return Err(err(format!("null value in vectors row {i}")));
            }
            let values = vectors.value(i);
            let values = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| err("vector items are not float32".to_string()))?;
            let position = usize::try_from(positions.value(i)).map_err(|_| err(format!("negative position in row {i}")))?;
            rows.push(VectorRow { position, chunk_id: ids.value(i).to_string(), vector: values.values().to_vec() });
        }
    }
    Ok(rows)
}
