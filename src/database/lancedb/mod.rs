// LanceDB vector database module
// Arrow schema of the chunks table and the store built on it

#[cfg(test)]
mod tests;

pub mod vector_store;

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

pub use vector_store::VectorStore;

/// Name of the table holding every notebook's chunks
pub const TABLE_NAME: &str = "chunks";

/// Name of the embedding column
pub const VECTOR_COLUMN: &str = "vector";

/// Build the chunks table schema for vectors of `vector_dim` components
#[inline]
pub fn create_schema(vector_dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(vector_item_field(), vector_dim),
            false,
        ),
        Field::new("notebook_id", DataType::Utf8, false),
        Field::new("filename", DataType::Utf8, false),
        Field::new("status", DataType::Utf8, false),
        Field::new("upload_status", DataType::Utf8, true),
        Field::new("upload_path", DataType::Utf8, true),
        Field::new("document_index", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("total_chunks", DataType::UInt32, false),
        Field::new("chunk_size", DataType::UInt32, false),
        Field::new("truncated", DataType::Boolean, false),
        Field::new("embedding_model", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

/// Element field of the fixed size vector list
#[inline]
pub fn vector_item_field() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Float32, true))
}

/// Vector dimension encoded in a chunks table schema
#[inline]
pub fn schema_vector_dimension(schema: &Schema) -> Option<usize> {
    schema
        .field_with_name(VECTOR_COLUMN)
        .ok()
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
}
