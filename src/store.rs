//! Storage seams used by the pipeline. [`crate::db::Database`] implements
//! all of them; tests can swap in their own.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DataLogEntry, SensorType, TokenPair};
use crate::time::Timestamp;

/// Local durable store of entries waiting to be posted.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Insert or replace by id. Returns the number of rows written.
    async fn save_batched_data(&self, sensor: SensorType, entries: &[DataLogEntry])
        -> Result<usize>;

    /// All pending entries for `sensor`, ordered by start time.
    async fn get_batched_data(&self, sensor: SensorType) -> Result<Vec<DataLogEntry>>;

    async fn delete_batched_data(&self, ids: &[String]) -> Result<usize>;

    async fn delete_all_batched_data(&self) -> Result<usize>;

    /// Record a post attempt on every listed entry.
    async fn append_post_date_time(&self, ids: &[String], at: Timestamp) -> Result<()>;
}

/// Last-write-wins timestamp per record type.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get_checkpoint(&self, record_type: &str) -> Result<Option<Timestamp>>;

    async fn save_checkpoint(&self, record_type: &str, at: Timestamp) -> Result<()>;

    async fn clear_all_checkpoints(&self) -> Result<()>;
}

/// Opaque key-value secret storage. Every call is atomic.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn save_tokens(&self, tokens: &TokenPair) -> Result<()>;

    async fn get_token(&self) -> Result<Option<String>>;

    async fn get_refresh_token(&self) -> Result<Option<String>>;

    async fn clear_tokens(&self) -> Result<()>;
}
