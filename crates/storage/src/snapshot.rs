use std::{
    io::ErrorKind,
    marker::PhantomData,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::StorageError;

/// Whole-record persistence. `read` returns `None` when nothing has been
/// written yet; a reader never sees a partially written record.
#[async_trait]
pub trait SnapshotStore<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    async fn read(&self) -> Result<Option<T>, StorageError>;
    async fn write(&self, value: &T) -> Result<(), StorageError>;
    fn describe(&self) -> String;

    async fn updated_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(None)
    }
}

pub struct JsonFileStore<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
    }

    async fn write_bytes(&self, body: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(body).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, &self.path).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp).await;
        }
        result
    }
}

#[async_trait]
impl<T> SnapshotStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn read(&self) -> Result<Option<T>, StorageError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(StorageError::read(self.describe(), error)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|error| StorageError::corrupt(self.describe(), error))
    }

    async fn write(&self, value: &T) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(value)
            .map_err(|error| StorageError::write(self.describe(), error))?;
        self.write_bytes(&body)
            .await
            .map_err(|error| StorageError::write(self.describe(), error))?;
        debug!(path = %self.path.display(), bytes = body.len(), "snapshot written");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn updated_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.modified().ok().map(DateTime::<Utc>::from)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StorageError::read(self.describe(), error)),
        }
    }
}

/// In-process backend for ephemeral runs and tests. Writes can be made to
/// fail to exercise recovery paths.
pub struct MemoryStore<T> {
    name: String,
    value: Mutex<Option<T>>,
    fail_writes: AtomicBool,
}

impl<T> MemoryStore<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Mutex::new(None),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T> SnapshotStore<T> for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn read(&self) -> Result<Option<T>, StorageError> {
        Ok(self.value.lock().await.clone())
    }

    async fn write(&self, value: &T) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::write(self.describe(), "write rejected"));
        }
        *self.value.lock().await = Some(value.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }
}
