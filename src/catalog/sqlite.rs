//! SQLite catalog backend
//!
//! Owns the `devices` and `root_folders` tables. Schema creation is
//! idempotent so the backend can be pointed at a fresh or existing database
//! file. Paths are stored as TEXT in their platform string form.

use crate::catalog::Catalog;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use tracing::info;

/// Catalog backend over a SQLite connection pool
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
}

impl SqliteCatalog {
    /// Wrap a pool, creating the required tables if they are missing
    pub async fn new(pool: Pool<Sqlite>) -> Result<Self> {
        init_schema(&pool).await?;
        Ok(Self { pool })
    }
}

/// Create the catalog tables if they do not exist yet
async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            identifier TEXT NOT NULL,
            last_mount_point TEXT NOT NULL,
            UNIQUE(kind, identifier)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS root_folders (
            device_id INTEGER NOT NULL,
            relative_path TEXT NOT NULL,
            UNIQUE(device_id, relative_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn device_id(&self, kind: &str, identifier: &str) -> Result<Option<i64>> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM devices WHERE kind = ? AND identifier = ?")
                .bind(kind)
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    async fn register_device(
        &self,
        kind: &str,
        identifier: &str,
        mount_path: &Path,
    ) -> Result<i64> {
        if let Some(id) = self.device_id(kind, identifier).await? {
            self.set_last_mount_point(id, mount_path).await?;
            return Ok(id);
        }

        let result =
            sqlx::query("INSERT INTO devices (kind, identifier, last_mount_point) VALUES (?, ?, ?)")
                .bind(kind)
                .bind(identifier)
                .bind(mount_path.to_string_lossy().into_owned())
                .execute(&self.pool)
                .await?;

        let id = result.last_insert_rowid();
        info!(
            "registered device {} ({}:{}) at {}",
            id,
            kind,
            identifier,
            mount_path.display()
        );
        Ok(id)
    }

    async fn set_last_mount_point(&self, device_id: i64, mount_path: &Path) -> Result<()> {
        sqlx::query("UPDATE devices SET last_mount_point = ? WHERE id = ?")
            .bind(mount_path.to_string_lossy().into_owned())
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn last_mount_point(&self, device_id: i64) -> Result<Option<PathBuf>> {
        let path: Option<String> =
            sqlx::query_scalar("SELECT last_mount_point FROM devices WHERE id = ?")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(path.map(PathBuf::from))
    }

    async fn root_folder_entries(&self, device_id: i64) -> Result<Vec<String>> {
        let entries: Vec<String> = sqlx::query_scalar(
            "SELECT relative_path FROM root_folders WHERE device_id = ? ORDER BY relative_path",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn set_root_folder_entries(&self, device_id: i64, entries: &[String]) -> Result<()> {
        // Replace wholesale: the registry always hands the complete set
        sqlx::query("DELETE FROM root_folders WHERE device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await?;

        for entry in entries {
            sqlx::query("INSERT INTO root_folders (device_id, relative_path) VALUES (?, ?)")
                .bind(device_id)
                .bind(entry)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn remove_root_folder_entries(&self, device_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM root_folders WHERE device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn configured_device_ids(&self) -> Result<Vec<i64>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT device_id FROM root_folders ORDER BY device_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }
}
