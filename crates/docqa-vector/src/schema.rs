use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Bumped whenever the on-disk layout changes; older directories are rejected on load.
pub const FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DOCSTORE_FILE: &str = "docstore.json";
pub const VECTORS_TABLE: &str = "vectors";

pub const POSITION_COLUMN: &str = "position";
pub const CHUNK_ID_COLUMN: &str = "chunk_id";
pub const VECTOR_COLUMN: &str = "vector";

/// Arrow schema of the `vectors` table for a given embedding width.
pub fn vectors_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(POSITION_COLUMN, DataType::Int32, false),
        Field::new(CHUNK_ID_COLUMN, DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension),
            true,
        ),
    ]))
}
