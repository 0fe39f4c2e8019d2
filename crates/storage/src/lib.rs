use std::{path::PathBuf, sync::Arc};

use shared::domain::Tally;
use thiserror::Error;

mod snapshot;
mod sqlite;
pub mod vote_store;
pub mod voter_ledger;

pub use snapshot::{JsonFileStore, MemoryStore, SnapshotStore};
pub use sqlite::{SqliteSnapshotStore, SqliteSnapshots};
pub use vote_store::{percentages, VoteStore};
pub use voter_ledger::{LedgerRecord, VoterLedger};

pub const TALLY_RECORD: &str = "votes";
pub const LEDGER_RECORD: &str = "voters";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {location}: {message}")]
    Read { location: String, message: String },
    #[error("corrupt snapshot at {location}: {message}")]
    Corrupt { location: String, message: String },
    #[error("failed to write {location}: {message}")]
    Write { location: String, message: String },
}

impl StorageError {
    pub(crate) fn read(location: impl Into<String>, error: impl ToString) -> Self {
        Self::Read {
            location: location.into(),
            message: error.to_string(),
        }
    }

    pub(crate) fn corrupt(location: impl Into<String>, error: impl ToString) -> Self {
        Self::Corrupt {
            location: location.into(),
            message: error.to_string(),
        }
    }

    pub(crate) fn write(location: impl Into<String>, error: impl ToString) -> Self {
        Self::Write {
            location: location.into(),
            message: error.to_string(),
        }
    }
}

/// How a persisted record came to be in memory after startup.
#[derive(Debug)]
pub enum LoadSource {
    Stored,
    Missing,
    Recovered(StorageError),
}

impl LoadSource {
    pub fn is_stored(&self) -> bool {
        matches!(self, LoadSource::Stored)
    }
}

/// Where the tally and voter ledger records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Json { data_dir: PathBuf },
    Sqlite { database_url: String },
    Memory,
}

#[derive(Clone)]
pub struct PollStores {
    pub votes: Arc<dyn SnapshotStore<Tally>>,
    pub voters: Arc<dyn SnapshotStore<LedgerRecord>>,
}

impl PollStores {
    pub async fn open(backend: &Backend) -> anyhow::Result<Self> {
        let stores = match backend {
            Backend::Json { data_dir } => Self {
                votes: Arc::new(JsonFileStore::<Tally>::new(
                    data_dir.join(format!("{TALLY_RECORD}.json")),
                )),
                voters: Arc::new(JsonFileStore::<LedgerRecord>::new(
                    data_dir.join(format!("{LEDGER_RECORD}.json")),
                )),
            },
            Backend::Sqlite { database_url } => {
                let snapshots = SqliteSnapshots::new(database_url).await?;
                Self {
                    votes: Arc::new(snapshots.store::<Tally>(TALLY_RECORD)),
                    voters: Arc::new(snapshots.store::<LedgerRecord>(LEDGER_RECORD)),
                }
            }
            Backend::Memory => Self {
                votes: Arc::new(MemoryStore::<Tally>::new(TALLY_RECORD)),
                voters: Arc::new(MemoryStore::<LedgerRecord>::new(LEDGER_RECORD)),
            },
        };
        Ok(stores)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
