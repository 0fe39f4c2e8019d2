use std::sync::Arc;

use shared::{
    domain::{Candidate, VoterId},
    error::ApiError,
    protocol::TallyResponse,
};
use storage::{PollStores, VoteStore};

pub mod ballot;
pub mod frame;
pub mod share;
pub mod tally;

pub use ballot::{Ballot, BallotEntry};
pub use frame::{buttons_for, handle_interaction, FrameImages, FrameOptions};
pub use tally::{EngineOptions, TallyEngine};

/// Process-wide poll state, built once at startup and shared by handle.
#[derive(Clone)]
pub struct PollContext {
    pub engine: Arc<TallyEngine>,
    pub ballot: Ballot,
    pub frame: FrameOptions,
}

impl PollContext {
    pub async fn open(
        stores: PollStores,
        options: EngineOptions,
        ballot: Ballot,
        frame: FrameOptions,
    ) -> Self {
        let engine = TallyEngine::open(VoteStore::new(stores.votes), stores.voters, options).await;
        Self {
            engine: Arc::new(engine),
            ballot,
            frame,
        }
    }
}

pub async fn current_tally(ctx: &PollContext) -> TallyResponse {
    let (tally, percentages) = ctx.engine.snapshot().await;
    TallyResponse {
        tally,
        percentages,
        total: tally.total(),
    }
}

/// Votes by candidate slug, outside the frame flow. Unknown slugs are
/// rejected without touching the tally.
pub async fn cast_vote(
    ctx: &PollContext,
    candidate_slug: &str,
    voter_id: Option<&VoterId>,
) -> Result<TallyResponse, ApiError> {
    let candidate: Candidate = ctx.ballot.candidate(candidate_slug)?;
    ctx.engine.apply_vote(candidate, voter_id).await?;
    Ok(current_tally(ctx).await)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
