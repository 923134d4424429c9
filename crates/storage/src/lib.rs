use anyhow::{Context, Result};
use async_trait::async_trait;
use portal::{PortalRow, PortalStore};
use shared::error::{PortalError, PortalResult};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::info;

const PORTAL_COLUMNS: &str = "chat_id, receiver, mxid, name, encrypted";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite database url '{database_url}'"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply portal migrations")?;
        info!(%database_url, "portal storage ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> PortalResult<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(PortalError::unavailable)?;
        Ok(())
    }
}

fn select_portals(filter: &str) -> String {
    format!("SELECT {PORTAL_COLUMNS} FROM portal WHERE {filter}")
}

fn portal_row(row: &SqliteRow) -> PortalResult<PortalRow> {
    Ok(PortalRow {
        chat_id: row.try_get("chat_id").map_err(store_error)?,
        receiver: row.try_get("receiver").map_err(store_error)?,
        mxid: row.try_get("mxid").map_err(store_error)?,
        name: row.try_get("name").map_err(store_error)?,
        encrypted: row.try_get("encrypted").map_err(store_error)?,
    })
}

fn portal_rows(rows: Vec<SqliteRow>) -> PortalResult<Vec<PortalRow>> {
    rows.iter().map(portal_row).collect()
}

fn store_error(error: sqlx::Error) -> PortalError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => PortalError::unavailable(error),
        sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => PortalError::InvalidRecord(error.to_string()),
        other => PortalError::store(other),
    }
}

fn insert_error(error: sqlx::Error, row: &PortalRow) -> PortalError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            return PortalError::Conflict {
                chat_id: row.chat_id.clone(),
                receiver: row.receiver.clone(),
            };
        }
    }
    store_error(error)
}

#[async_trait]
impl PortalStore for Storage {
    async fn insert(&self, row: &PortalRow) -> PortalResult<()> {
        sqlx::query(
            "INSERT INTO portal (chat_id, receiver, mxid, name, encrypted) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&row.chat_id)
        .bind(&row.receiver)
        .bind(&row.mxid)
        .bind(&row.name)
        .bind(row.encrypted)
        .execute(&self.pool)
        .await
        .map_err(|error| insert_error(error, row))?;
        Ok(())
    }

    async fn update(&self, row: &PortalRow) -> PortalResult<u64> {
        let result = sqlx::query(
            "UPDATE portal SET mxid = ?, name = ?, encrypted = ? WHERE chat_id = ? AND receiver = ?",
        )
        .bind(&row.mxid)
        .bind(&row.name)
        .bind(row.encrypted)
        .bind(&row.chat_id)
        .bind(&row.receiver)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(result.rows_affected())
    }

    async fn select_by_mxid(&self, mxid: &str) -> PortalResult<Option<PortalRow>> {
        let row = sqlx::query(&select_portals("mxid = ?"))
            .bind(mxid)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(portal_row).transpose()
    }

    async fn select_by_key(
        &self,
        chat_id: &str,
        receiver: &str,
    ) -> PortalResult<Option<PortalRow>> {
        let row = sqlx::query(&select_portals("chat_id = ? AND receiver = ?"))
            .bind(chat_id)
            .bind(receiver)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(portal_row).transpose()
    }

    async fn select_by_receiver(&self, receiver: &str) -> PortalResult<Vec<PortalRow>> {
        let rows = sqlx::query(&select_portals("receiver = ?"))
            .bind(receiver)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        portal_rows(rows)
    }

    async fn select_private_by_chat_id(&self, chat_id: &str) -> PortalResult<Vec<PortalRow>> {
        let rows = sqlx::query(&select_portals("chat_id = ? AND receiver <> ''"))
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        portal_rows(rows)
    }

    async fn select_with_mxid(&self) -> PortalResult<Vec<PortalRow>> {
        let rows = sqlx::query(&select_portals("mxid IS NOT NULL"))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        portal_rows(rows)
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
