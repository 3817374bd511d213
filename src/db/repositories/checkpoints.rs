use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use crate::db::{connection::Database, helpers::parse_datetime};
use crate::models::Checkpoint;
use crate::store::CheckpointStore;
use crate::time::{now_iso, to_iso, Timestamp};

#[async_trait]
impl CheckpointStore for Database {
    async fn get_checkpoint(&self, record_type: &str) -> Result<Option<Timestamp>> {
        let record_type = record_type.to_string();
        self.execute(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT last_successful_at FROM checkpoints WHERE record_type = ?1",
                    params![record_type],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|value| parse_datetime(&value, "last_successful_at"))
                .transpose()
        })
        .await
    }

    async fn save_checkpoint(&self, record_type: &str, at: Timestamp) -> Result<()> {
        let record_type = record_type.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (record_type, last_successful_at, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(record_type) DO UPDATE SET
                    last_successful_at = excluded.last_successful_at,
                    updated_at = excluded.updated_at",
                params![record_type, to_iso(&at), now_iso()],
            )
            .with_context(|| format!("failed to save checkpoint for {record_type}"))?;
            Ok(())
        })
        .await
    }

    async fn clear_all_checkpoints(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute("DELETE FROM checkpoints", [])
                .context("failed to clear checkpoints")?;
            Ok(())
        })
        .await
    }
}

impl Database {
    pub async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT record_type, last_successful_at FROM checkpoints ORDER BY record_type",
            )?;
            let mut rows = stmt.query([])?;
            let mut checkpoints = Vec::new();
            while let Some(row) = rows.next()? {
                let raw: String = row.get(1)?;
                checkpoints.push(Checkpoint {
                    record_type: row.get(0)?,
                    last_successful_at: parse_datetime(&raw, "last_successful_at")?,
                });
            }
            Ok(checkpoints)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_iso;
    use tempfile::TempDir;

    #[tokio::test]
    async fn last_write_wins_per_record_type() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("test.db")).unwrap();

        assert_eq!(db.get_checkpoint("steps").await.unwrap(), None);

        let first = parse_iso("2024-05-01T10:00:00.000+00:00").unwrap();
        let second = parse_iso("2024-05-02T10:00:00.000+00:00").unwrap();
        db.save_checkpoint("steps", first).await.unwrap();
        db.save_checkpoint("steps", second).await.unwrap();
        db.save_checkpoint("sleep", first).await.unwrap();

        assert_eq!(db.get_checkpoint("steps").await.unwrap(), Some(second));
        assert_eq!(db.list_checkpoints().await.unwrap().len(), 2);

        db.clear_all_checkpoints().await.unwrap();
        assert_eq!(db.get_checkpoint("steps").await.unwrap(), None);
        assert!(db.list_checkpoints().await.unwrap().is_empty());
    }
}
