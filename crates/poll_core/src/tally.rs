use std::sync::Arc;

use shared::{
    domain::{Candidate, Percentages, Tally, VoterId, VotingPolicy},
    error::VoteError,
};
use storage::{
    percentages, LedgerRecord, LoadSource, SnapshotStore, StorageError, VoteStore, VoterLedger,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub policy: VotingPolicy,
    /// When false, interactions without a voter id still count.
    pub require_voter_id: bool,
}

struct EngineState {
    tally: Tally,
    ledger: VoterLedger,
}

/// Applies votes to the tally and the voter ledger. Eligibility check,
/// mutation and both writes happen under one lock, so a voter can never be
/// counted past their allowance by concurrent requests.
pub struct TallyEngine {
    votes: VoteStore,
    require_voter_id: bool,
    state: Mutex<EngineState>,
}

impl TallyEngine {
    pub async fn open(
        votes: VoteStore,
        voters: Arc<dyn SnapshotStore<LedgerRecord>>,
        options: EngineOptions,
    ) -> Self {
        let (tally, tally_source) = votes.load_with_source().await;
        let (ledger, ledger_source) = VoterLedger::load(options.policy, voters).await;
        if let LoadSource::Recovered(error) = &tally_source {
            warn!(%error, "tally reinitialised to zero");
        }
        info!(
            a = tally.a,
            b = tally.b,
            voters = ledger.voter_count(),
            policy = ?options.policy,
            require_voter_id = options.require_voter_id,
            tally_restored = tally_source.is_stored(),
            ledger_restored = ledger_source.is_stored(),
            "tally engine ready"
        );

        Self {
            votes,
            require_voter_id: options.require_voter_id,
            state: Mutex::new(EngineState { tally, ledger }),
        }
    }

    pub async fn tally(&self) -> Tally {
        self.state.lock().await.tally
    }

    pub async fn snapshot(&self) -> (Tally, Percentages) {
        let tally = self.tally().await;
        (tally, percentages(&tally))
    }

    pub async fn is_eligible(&self, voter_id: &VoterId) -> bool {
        self.state.lock().await.ledger.is_eligible(voter_id)
    }

    /// Counts one vote for `candidate`. On success the new tally is already
    /// durable. On any failure neither the in-memory nor the stored tally
    /// moves past the last committed value.
    pub async fn apply_vote(
        &self,
        candidate: Candidate,
        voter_id: Option<&VoterId>,
    ) -> Result<Tally, VoteError> {
        if voter_id.is_none() && self.require_voter_id {
            return Err(VoteError::VoterIdRequired);
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let pending = PendingVote::record(&mut state.ledger, voter_id)?;
        let mut next_tally = state.tally;
        next_tally.increment(candidate);

        self.votes.save(&next_tally).await.map_err(|e| {
            error!(%candidate, voter_id = ?voter_id.map(VoterId::as_str), error = %e, "failed to persist tally");
            VoteError::StorageWrite {
                message: e.to_string(),
            }
        })?;

        if let Err(e) = pending.save().await {
            error!(%candidate, voter_id = ?voter_id.map(VoterId::as_str), error = %e, "failed to persist voter ledger, reverting tally");
            if let Err(revert) = self.votes.save(&state.tally).await {
                error!(error = %revert, store = %self.votes.describe(), "failed to revert tally after ledger write failure");
            }
            return Err(VoteError::StorageWrite {
                message: e.to_string(),
            });
        }

        pending.commit();
        state.tally = next_tally;
        info!(
            %candidate,
            voter_id = ?voter_id.map(VoterId::as_str),
            a = next_tally.a,
            b = next_tally.b,
            "vote counted"
        );
        Ok(next_tally)
    }
}

/// A vote taken from the ledger in memory. Dropped without `commit`, the
/// vote is given back, so an early return or a cancelled request leaves the
/// ledger at its last committed value.
struct PendingVote<'a> {
    ledger: &'a mut VoterLedger,
    voter_id: Option<&'a VoterId>,
    committed: bool,
}

impl<'a> PendingVote<'a> {
    fn record(
        ledger: &'a mut VoterLedger,
        voter_id: Option<&'a VoterId>,
    ) -> Result<Self, VoteError> {
        if let Some(voter_id) = voter_id {
            ledger.record_vote(voter_id)?;
        }
        Ok(Self {
            ledger,
            voter_id,
            committed: false,
        })
    }

    async fn save(&self) -> Result<(), StorageError> {
        match self.voter_id {
            Some(_) => self.ledger.save().await,
            None => Ok(()),
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingVote<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Some(voter_id) = self.voter_id {
            self.ledger.revoke_vote(voter_id);
        }
    }
}
