use std::sync::Arc;

use shared::domain::{Percentages, Tally};
use tracing::{info, warn};

use crate::{LoadSource, SnapshotStore, StorageError};

/// Durable pair of candidate counters.
#[derive(Clone)]
pub struct VoteStore {
    backend: Arc<dyn SnapshotStore<Tally>>,
}

impl VoteStore {
    pub fn new(backend: Arc<dyn SnapshotStore<Tally>>) -> Self {
        Self { backend }
    }

    /// Never fails: a missing or unreadable record yields a zero tally.
    pub async fn load(&self) -> Tally {
        self.load_with_source().await.0
    }

    pub async fn load_with_source(&self) -> (Tally, LoadSource) {
        match self.backend.read().await {
            Ok(Some(tally)) => (tally, LoadSource::Stored),
            Ok(None) => {
                info!(store = %self.backend.describe(), "no tally stored yet, starting from zero");
                (Tally::default(), LoadSource::Missing)
            }
            Err(error) => {
                warn!(store = %self.backend.describe(), %error, "unreadable tally, starting from zero");
                (Tally::default(), LoadSource::Recovered(error))
            }
        }
    }

    pub async fn save(&self, tally: &Tally) -> Result<(), StorageError> {
        self.backend.write(tally).await
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }
}

/// Each candidate's share of the total, rounded half up. An empty tally is
/// 0% for both.
pub fn percentages(tally: &Tally) -> Percentages {
    let total = u128::from(tally.total());
    if total == 0 {
        return Percentages::default();
    }
    let share = |count: u64| -> u8 {
        let pct = (u128::from(count) * 200 + total) / (2 * total);
        u8::try_from(pct).unwrap_or(100)
    };
    Percentages {
        a: share(tally.a),
        b: share(tally.b),
    }
}
