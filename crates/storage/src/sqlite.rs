use std::{
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};

use crate::{SnapshotStore, StorageError};

/// Pool shared by every named snapshot living in one SQLite database.
#[derive(Clone)]
pub struct SqliteSnapshots {
    pool: Pool<Sqlite>,
}

impl SqliteSnapshots {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub fn store<T>(&self, name: &str) -> SqliteSnapshotStore<T> {
        SqliteSnapshotStore {
            pool: self.pool.clone(),
            name: name.to_string(),
            _record: PhantomData,
        }
    }
}

pub struct SqliteSnapshotStore<T> {
    pool: Pool<Sqlite>,
    name: String,
    _record: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T> SnapshotStore<T> for SqliteSnapshotStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn read(&self) -> Result<Option<T>, StorageError> {
        let row = sqlx::query("SELECT body FROM poll_snapshots WHERE name = ?")
            .bind(&self.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| StorageError::read(self.describe(), error))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let body: String = row
            .try_get(0)
            .map_err(|error| StorageError::corrupt(self.describe(), error))?;
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|error| StorageError::corrupt(self.describe(), error))
    }

    async fn write(&self, value: &T) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(value)
            .map_err(|error| StorageError::write(self.describe(), error))?;
        sqlx::query(
            "INSERT INTO poll_snapshots (name, body, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(name) DO UPDATE SET body = excluded.body, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&self.name)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|error| StorageError::write(self.describe(), error))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:poll_snapshots/{}", self.name)
    }

    async fn updated_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query("SELECT updated_at FROM poll_snapshots WHERE name = ?")
            .bind(&self.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| StorageError::read(self.describe(), error))?;
        row.map(|r| {
            r.try_get::<NaiveDateTime, _>(0)
                .map(|at| at.and_utc())
                .map_err(|error| StorageError::corrupt(self.describe(), error))
        })
        .transpose()
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    if parent.as_os_str().is_empty() {
        return Ok(());
    }

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
mod tests {
    use super::*;

    #[test]
    fn memory_url_has_no_path() {
        assert_eq!(sqlite_path("sqlite::memory:"), None);
        assert_eq!(sqlite_path("postgres://db"), None);
    }

    #[test]
    fn strips_scheme_and_query() {
        assert_eq!(
            sqlite_path("sqlite://./data/poll.db?mode=rwc"),
            Some(PathBuf::from("./data/poll.db"))
        );
    }
}
