use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use shared::{
    domain::{VoterId, VotingPolicy},
    error::VoteError,
};
use tracing::{info, warn};

use crate::{LoadSource, SnapshotStore, StorageError};

/// On-disk shape of the ledger: a plain set of ids under single-vote, or
/// id -> consumed votes under bounded-repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LedgerRecord {
    Voters(BTreeSet<VoterId>),
    Counts(BTreeMap<VoterId, u32>),
}

impl LedgerRecord {
    fn into_counts(self) -> BTreeMap<VoterId, u32> {
        match self {
            LedgerRecord::Voters(voters) => voters.into_iter().map(|id| (id, 1)).collect(),
            LedgerRecord::Counts(counts) => counts.into_iter().filter(|(_, n)| *n > 0).collect(),
        }
    }

    fn matches(&self, policy: VotingPolicy) -> bool {
        matches!(
            (self, policy),
            (LedgerRecord::Voters(_), VotingPolicy::SingleVote)
                | (LedgerRecord::Counts(_), VotingPolicy::BoundedRepeat { .. })
        )
    }
}

/// Tracks how many counted votes each voter has consumed. Mutations are
/// in memory until `save` is called.
#[derive(Clone)]
pub struct VoterLedger {
    policy: VotingPolicy,
    consumed: BTreeMap<VoterId, u32>,
    backend: Arc<dyn SnapshotStore<LedgerRecord>>,
}

impl VoterLedger {
    pub fn new(policy: VotingPolicy, backend: Arc<dyn SnapshotStore<LedgerRecord>>) -> Self {
        Self {
            policy,
            consumed: BTreeMap::new(),
            backend,
        }
    }

    /// Missing or corrupt records are replaced with an empty ledger on disk.
    pub async fn load(
        policy: VotingPolicy,
        backend: Arc<dyn SnapshotStore<LedgerRecord>>,
    ) -> (Self, LoadSource) {
        let (ledger, source) = Self::load_readonly(policy, backend).await;
        if !source.is_stored() {
            if let Err(error) = ledger.save().await {
                warn!(store = %ledger.describe(), %error, "failed to recreate voter ledger");
            }
        }
        (ledger, source)
    }

    /// Like `load`, but leaves the stored record untouched.
    pub async fn load_readonly(
        policy: VotingPolicy,
        backend: Arc<dyn SnapshotStore<LedgerRecord>>,
    ) -> (Self, LoadSource) {
        let mut ledger = Self::new(policy, backend);
        let source = match ledger.backend.read().await {
            Ok(Some(record)) => {
                if !record.matches(policy) {
                    info!(
                        store = %ledger.describe(),
                        ?policy,
                        "voter ledger stored under another policy, converting"
                    );
                }
                ledger.consumed = record.into_counts();
                LoadSource::Stored
            }
            Ok(None) => {
                info!(store = %ledger.describe(), "no voter ledger stored yet");
                LoadSource::Missing
            }
            Err(error) => {
                warn!(store = %ledger.describe(), %error, "unreadable voter ledger, starting empty");
                LoadSource::Recovered(error)
            }
        };
        (ledger, source)
    }

    pub fn policy(&self) -> VotingPolicy {
        self.policy
    }

    pub fn consumed(&self, voter_id: &VoterId) -> u32 {
        self.consumed.get(voter_id).copied().unwrap_or(0)
    }

    pub fn is_eligible(&self, voter_id: &VoterId) -> bool {
        self.consumed(voter_id) < self.policy.allowance()
    }

    pub fn remaining(&self, voter_id: &VoterId) -> u32 {
        self.policy
            .allowance()
            .saturating_sub(self.consumed(voter_id))
    }

    /// Consumes one vote. Once the allowance is used up every further call
    /// fails, so a redelivered request cannot count twice under single-vote.
    pub fn record_vote(&mut self, voter_id: &VoterId) -> Result<(), VoteError> {
        if !self.is_eligible(voter_id) {
            return Err(VoteError::AlreadyVoted {
                voter_id: voter_id.clone(),
            });
        }
        *self.consumed.entry(voter_id.clone()).or_insert(0) += 1;
        Ok(())
    }

    /// Gives back one vote taken by `record_vote` that was never persisted.
    pub fn revoke_vote(&mut self, voter_id: &VoterId) {
        if let Some(count) = self.consumed.get_mut(voter_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.consumed.remove(voter_id);
            }
        }
    }

    pub fn voter_count(&self) -> usize {
        self.consumed.len()
    }

    pub fn record(&self) -> LedgerRecord {
        match self.policy {
            VotingPolicy::SingleVote => LedgerRecord::Voters(self.consumed.keys().cloned().collect()),
            VotingPolicy::BoundedRepeat { .. } => LedgerRecord::Counts(self.consumed.clone()),
        }
    }

    pub async fn save(&self) -> Result<(), StorageError> {
        self.backend.write(&self.record()).await
    }

    pub fn clear(&mut self) {
        self.consumed.clear();
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }
}
