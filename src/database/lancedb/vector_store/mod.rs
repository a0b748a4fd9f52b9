
use super::{TABLE_NAME, VECTOR_COLUMN, create_schema, schema_vector_dimension, vector_item_field};
use crate::config::Config;
use crate::database::{
    DocumentMetadata, MetadataFilter, SearchResult, StoredVector, VectorStorage,
};
use crate::{RagError, Result};
use arrow::array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Vector database store using LanceDB for notebook chunk similarity search.
///
/// All notebooks share one `chunks` table. The vector dimension is fixed when
/// the table is created and every write and query is checked against it.
pub struct VectorStore {
    table: Table,
    vector_dimension: usize,
}

impl VectorStore {
    /// Open the store under the configured base directory, creating it on first use
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let dimension = usize::try_from(config.ollama.embedding_dimension).map_err(|e| {
            RagError::Configuration(format!("Invalid embedding dimension: {}", e))
        })?;
        Self::open(&config.vector_database_path(), dimension).await
    }

    /// Open or create the chunks table at `db_path`.
    ///
    /// An existing table whose vectors have a different dimension is rejected;
    /// it is never dropped or recreated.
    #[inline]
    pub async fn open(db_path: &Path, vector_dimension: usize) -> Result<Self> {
        if vector_dimension == 0 {
            return Err(RagError::Configuration(
                "Vector dimension must be greater than 0".to_string(),
            ));
        }

        debug!("Initializing LanceDB at path: {}", db_path.display());
        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let table = Self::open_or_create_table(&connection, vector_dimension).await?;

        info!(
            "Vector store initialized with {} dimensional vectors",
            vector_dimension
        );
        Ok(Self {
            table,
            vector_dimension,
        })
    }

    async fn open_or_create_table(connection: &Connection, vector_dimension: usize) -> Result<Table> {
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.iter().any(|name| name == TABLE_NAME) {
            let table = connection
                .open_table(TABLE_NAME)
                .execute()
                .await
                .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

            let schema = table
                .schema()
                .await
                .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

            let existing = schema_vector_dimension(&schema).ok_or_else(|| {
                RagError::Database("Could not find vector column or determine dimension".to_string())
            })?;
            if existing != vector_dimension {
                return Err(RagError::Database(format!(
                    "Vector dimension mismatch: table stores {} dimensional vectors but {} were configured",
                    existing, vector_dimension
                )));
            }

            debug!("Opened existing chunks table with dimension {}", existing);
            return Ok(table);
        }

        let schema = create_schema(list_size(vector_dimension)?);
        let table = connection
            .create_empty_table(TABLE_NAME, schema)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        info!(
            "Chunks table created with {} dimensional vectors",
            vector_dimension
        );
        Ok(table)
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.vector_dimension {
            Ok(())
        } else {
            Err(RagError::Database(format!(
                "Vector dimension mismatch: expected {}, got {}",
                self.vector_dimension,
                vector.len()
            )))
        }
    }

    /// Create a RecordBatch from stored vectors
    fn create_record_batch(&self, rows: &[StoredVector]) -> Result<RecordBatch> {
        let len = rows.len();
        let vector_dim = list_size(self.vector_dimension)?;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.vector_dimension);
        let mut notebook_ids = Vec::with_capacity(len);
        let mut filenames = Vec::with_capacity(len);
        let mut statuses = Vec::with_capacity(len);
        let mut upload_statuses = Vec::with_capacity(len);
        let mut upload_paths = Vec::with_capacity(len);
        let mut document_indices = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut total_chunks = Vec::with_capacity(len);
        let mut chunk_sizes = Vec::with_capacity(len);
        let mut truncated = Vec::with_capacity(len);
        let mut models = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for row in rows {
            self.check_dimension(&row.vector)?;
            let metadata = &row.metadata;

            ids.push(row.id.as_str());
            flat_values.extend_from_slice(&row.vector);
            notebook_ids.push(metadata.notebook_id.as_str());
            filenames.push(metadata.filename.as_str());
            statuses.push(metadata.status.as_str());
            upload_statuses.push(metadata.upload_status.as_deref());
            upload_paths.push(metadata.upload_path.as_deref());
            document_indices.push(metadata.document_index);
            chunk_indices.push(metadata.chunk_index);
            total_chunks.push(metadata.total_chunks);
            chunk_sizes.push(metadata.chunk_size);
            truncated.push(metadata.truncated);
            models.push(metadata.embedding_model.as_str());
            contents.push(row.content.as_str());
            created_ats.push(metadata.created_at.as_str());
        }

        let vector_array = FixedSizeListArray::try_new(
            vector_item_field(),
            vector_dim,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(notebook_ids)),
            Arc::new(StringArray::from(filenames)),
            Arc::new(StringArray::from(statuses)),
            Arc::new(StringArray::from(upload_statuses)),
            Arc::new(StringArray::from(upload_paths)),
            Arc::new(UInt32Array::from(document_indices)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(UInt32Array::from(total_chunks)),
            Arc::new(UInt32Array::from(chunk_sizes)),
            Arc::new(BooleanArray::from(truncated)),
            Arc::new(StringArray::from(models)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(create_schema(vector_dim), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Parse search results from LanceDB stream into SearchResult structs
    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(parse_search_batch(&batch)?);
        }

        search_results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    /// Compact table fragments and prune old versions
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        debug!("Optimizing vector database");

        self.table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RagError::Database(format!("Failed to optimize table: {}", e)))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    /// Build an approximate nearest neighbour index on the vector column
    #[inline]
    pub async fn create_vector_index(&self) -> Result<()> {
        debug!("Creating vector index for improved search performance");

        self.table
            .create_index(&[VECTOR_COLUMN], lancedb::index::Index::Auto)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create vector index: {}", e)))?;

        info!("Vector index created successfully");
        Ok(())
    }
}

#[async_trait]
impl VectorStorage for VectorStore {
    async fn write(&self, rows: Vec<StoredVector>) -> Result<()> {
        if rows.is_empty() {
            debug!("No chunks to store");
            return Ok(());
        }

        debug!("Storing batch of {} chunks", rows.len());
        let record_batch = self.create_record_batch(&rows)?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert chunks: {}", e)))?;

        debug!("Stored {} chunks", rows.len());
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchResult>> {
        self.check_dimension(vector)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let predicate = filter.to_sql();
        debug!("Searching {} nearest chunks where {}", limit, predicate);

        let results = self
            .table
            .vector_search(vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::Cosine)
            .only_if(predicate)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        Self::parse_search_results_stream(results).await
    }

    async fn delete_matching(&self, filter: &MetadataFilter) -> Result<()> {
        let predicate = filter.to_sql();
        debug!("Deleting chunks where {}", predicate);

        self.table
            .delete(&predicate)
            .await
            .map_err(|e| RagError::Database(format!("Failed to delete chunks: {}", e)))?;

        info!("Deleted chunks where {}", predicate);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let count = self
            .table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

        u64::try_from(count).map_err(|e| RagError::Database(format!("Invalid row count: {}", e)))
    }
}

fn list_size(vector_dimension: usize) -> Result<i32> {
    i32::try_from(vector_dimension).map_err(|e| {
        RagError::Configuration(format!(
            "Vector dimension {} is too large: {}",
            vector_dimension, e
        ))
    })
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn optional_string(array: &StringArray, row: usize) -> Option<String> {
    (!array.is_null(row)).then(|| array.value(row).to_string())
}

/// Parse a single record batch from search results
fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let notebook_ids = column::<StringArray>(batch, "notebook_id")?;
    let filenames = column::<StringArray>(batch, "filename")?;
    let statuses = column::<StringArray>(batch, "status")?;
    let upload_statuses = column::<StringArray>(batch, "upload_status")?;
    let upload_paths = column::<StringArray>(batch, "upload_path")?;
    let document_indices = column::<UInt32Array>(batch, "document_index")?;
    let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
    let total_chunks = column::<UInt32Array>(batch, "total_chunks")?;
    let chunk_sizes = column::<UInt32Array>(batch, "chunk_size")?;
    let truncated = column::<BooleanArray>(batch, "truncated")?;
    let models = column::<StringArray>(batch, "embedding_model")?;
    let contents = column::<StringArray>(batch, "content")?;
    let created_ats = column::<StringArray>(batch, "created_at")?;

    let distances = column::<Float32Array>(batch, "_distance")?;

    (0..batch.num_rows())
        .map(|row| {
            if distances.is_null(row) {
                return Err(RagError::Database(format!(
                    "Missing _distance for row {}",
                    row
                )));
            }
            let distance = distances.value(row);

            let metadata = DocumentMetadata {
                notebook_id: notebook_ids.value(row).to_string(),
                filename: filenames.value(row).to_string(),
                status: statuses.value(row).to_string(),
                upload_status: optional_string(upload_statuses, row),
                upload_path: optional_string(upload_paths, row),
                document_index: document_indices.value(row),
                chunk_index: chunk_indices.value(row),
                total_chunks: total_chunks.value(row),
                chunk_size: chunk_sizes.value(row),
                created_at: created_ats.value(row).to_string(),
                truncated: truncated.value(row),
                embedding_model: models.value(row).to_string(),
            };

            Ok(SearchResult {
                content: contents.value(row).to_string(),
                metadata,
                similarity: 1.0 - distance,
                distance,
            })
        })
        .collect()
}
