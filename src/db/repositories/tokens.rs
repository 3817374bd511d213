use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use secrecy::ExposeSecret;

use crate::db::connection::Database;
use crate::models::TokenPair;
use crate::store::SecretStore;
use crate::time::now_iso;

impl Database {
    async fn token_column(&self, column: &'static str) -> Result<Option<String>> {
        self.execute(move |conn| {
            let value: Option<String> = conn
                .query_row(
                    &format!("SELECT {column} FROM auth_tokens WHERE id = 1"),
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }
}

#[async_trait]
impl SecretStore for Database {
    async fn save_tokens(&self, tokens: &TokenPair) -> Result<()> {
        let profile = tokens.profile_token.expose_secret().to_string();
        let refresh = tokens.refresh_token.expose_secret().to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO auth_tokens (id, profile_token, refresh_token, updated_at)
                 VALUES (1, ?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    profile_token = excluded.profile_token,
                    refresh_token = excluded.refresh_token,
                    updated_at = excluded.updated_at",
                params![profile, refresh, now_iso()],
            )
            .context("failed to save tokens")?;
            Ok(())
        })
        .await
    }

    async fn get_token(&self) -> Result<Option<String>> {
        self.token_column("profile_token").await
    }

    async fn get_refresh_token(&self) -> Result<Option<String>> {
        self.token_column("refresh_token").await
    }

    async fn clear_tokens(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute("DELETE FROM auth_tokens", [])
                .context("failed to clear tokens")?;
            Ok(())
        })
        .await
    }
}
