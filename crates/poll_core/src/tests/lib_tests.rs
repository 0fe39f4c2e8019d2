use std::sync::Arc;

use shared::{
    domain::{PageState, Tally, VotingPolicy},
    error::ErrorCode,
    protocol::{ButtonAction, FrameInput},
};
use storage::{Backend, LedgerRecord, MemoryStore, SnapshotStore};

use super::*;

struct Harness {
    ctx: PollContext,
    votes: Arc<MemoryStore<Tally>>,
    voters: Arc<MemoryStore<LedgerRecord>>,
}

async fn harness(policy: VotingPolicy, require_voter_id: bool) -> Harness {
    let votes = Arc::new(MemoryStore::<Tally>::new("votes"));
    let voters = Arc::new(MemoryStore::<LedgerRecord>::new("voters"));
    let stores = PollStores {
        votes: votes.clone(),
        voters: voters.clone(),
    };
    let frame = FrameOptions {
        follow_url: Some("https://warpcast.com/jeyloo".into()),
        frame_url: Some("https://poll.example/frame".into()),
        ..FrameOptions::default()
    };
    let ctx = PollContext::open(
        stores,
        EngineOptions {
            policy,
            require_voter_id,
        },
        Ballot::default(),
        frame,
    )
    .await;
    Harness { ctx, votes, voters }
}

fn press(voter: Option<u64>, button: &str) -> FrameInput {
    FrameInput {
        voter_id: voter.map(VoterId::from),
        button_value: Some(button.to_string()),
        previous_state: None,
    }
}

#[tokio::test]
async fn fresh_interaction_renders_intro() {
    let h = harness(VotingPolicy::SingleVote, true).await;
    let view = handle_interaction(&h.ctx, FrameInput::default()).await;
    assert_eq!(view.state, PageState::Intro);
    assert_eq!(view.tally, Tally::default());
    assert_eq!(view.buttons.len(), 1);
    assert!(view.buttons[0].posts("select"));
    assert_eq!(view.image_url, "https://i.imgur.com/bLVqRNb.png");
}

#[tokio::test]
async fn select_offers_exactly_the_candidates() {
    let h = harness(VotingPolicy::SingleVote, true).await;
    let view = handle_interaction(&h.ctx, press(Some(1), "start")).await;
    assert_eq!(view.state, PageState::Choice);
    assert_eq!(view.buttons.len(), 2);
    assert!(view.buttons[0].posts("harris"));
    assert!(view.buttons[1].posts("trump"));
    assert_eq!(view.tally, Tally::default());
}

#[tokio::test]
async fn single_vote_policy_rejects_second_vote() {
    let h = harness(VotingPolicy::SingleVote, true).await;

    let first = handle_interaction(&h.ctx, press(Some(1), "harris")).await;
    assert_eq!(first.state, PageState::Result);
    assert_eq!(first.selected, Some(Candidate::A));

    let second = handle_interaction(&h.ctx, press(Some(2), "trump")).await;
    assert_eq!(second.state, PageState::Result);

    let third = handle_interaction(&h.ctx, press(Some(1), "harris")).await;
    assert_eq!(third.state, PageState::Ineligible);
    assert_eq!(third.tally, Tally::new(1, 1));
    assert!(third
        .buttons
        .iter()
        .all(|b| !b.posts("harris") && !b.posts("trump")));

    assert_eq!(h.votes.read().await.expect("read"), Some(Tally::new(1, 1)));
}

#[tokio::test]
async fn bounded_policy_counts_up_to_allowance() {
    let policy = VotingPolicy::bounded(10).expect("policy");
    let h = harness(policy, true).await;

    let mut last = None;
    for _ in 0..11 {
        last = Some(handle_interaction(&h.ctx, press(Some(7), "harris")).await);
    }
    let last = last.expect("view");
    assert_eq!(last.state, PageState::Ineligible);
    assert_eq!(last.tally, Tally::new(10, 0));
    assert_eq!(h.votes.read().await.expect("read"), Some(Tally::new(10, 0)));
    assert_eq!(
        h.voters.read().await.expect("read"),
        Some(LedgerRecord::Counts([(VoterId::from(7), 10)].into_iter().collect()))
    );
}

#[tokio::test]
async fn result_offers_share_and_follow() {
    let h = harness(VotingPolicy::SingleVote, true).await;
    let view = handle_interaction(&h.ctx, press(Some(1), "trump")).await;
    assert_eq!(view.state, PageState::Result);
    assert_eq!(view.percentages.b, 100);
    assert!(view.buttons[0].posts("share"));
    assert_eq!(
        view.buttons[1].action,
        ButtonAction::Link {
            target: "https://warpcast.com/jeyloo".into()
        }
    );
    assert!(view.share_text.is_none());
}

#[tokio::test]
async fn share_builds_prefilled_message() {
    let h = harness(VotingPolicy::SingleVote, true).await;
    for (voter, button) in [(1, "harris"), (2, "harris"), (3, "harris"), (4, "trump")] {
        handle_interaction(&h.ctx, press(Some(voter), button)).await;
    }

    let input = FrameInput {
        previous_state: Some(PageState::Result),
        ..press(Some(1), "share")
    };
    let view = handle_interaction(&h.ctx, input).await;
    assert_eq!(view.state, PageState::Result);
    assert_eq!(
        view.share_text.as_deref(),
        Some("I just voted! Harris 75% vs Trump 25% after 4 votes. Cast yours:")
    );
    let url = view.share_url.expect("share url");
    assert!(url.starts_with("https://warpcast.com/~/compose?text="));
    assert!(url.contains("embeds%5B%5D=https%3A%2F%2Fpoll.example%2Fframe"));
    assert_eq!(view.tally, Tally::new(3, 1));
}

#[tokio::test]
async fn share_is_only_offered_after_voting() {
    let h = harness(VotingPolicy::SingleVote, true).await;
    handle_interaction(&h.ctx, press(Some(1), "harris")).await;

    for previous in [None, Some(PageState::Intro), Some(PageState::Choice)] {
        let input = FrameInput {
            previous_state: previous,
            ..press(Some(5), "share")
        };
        let view = handle_interaction(&h.ctx, input).await;
        assert_eq!(view.state, previous.unwrap_or_default());
        assert!(view.share_text.is_none());
        assert!(view.share_url.is_none());
    }

    let input = FrameInput {
        previous_state: Some(PageState::Ineligible),
        ..press(Some(1), "share")
    };
    let view = handle_interaction(&h.ctx, input).await;
    assert_eq!(view.state, PageState::Result);
    assert!(view.share_text.is_some());
    assert_eq!(view.tally, Tally::new(1, 0));
}

#[tokio::test]
async fn unexpected_button_rerenders_previous_state() {
    let h = harness(VotingPolicy::SingleVote, true).await;
    let input = FrameInput {
        voter_id: Some(VoterId::from(1)),
        button_value: Some("biden".into()),
        previous_state: Some(PageState::Choice),
    };
    let view = handle_interaction(&h.ctx, input).await;
    assert_eq!(view.state, PageState::Choice);
    assert_eq!(view.tally, Tally::default());

    let view = handle_interaction(&h.ctx, press(Some(1), "biden")).await;
    assert_eq!(view.state, PageState::Intro);
    assert!(h.ctx.engine.is_eligible(&VoterId::from(1)).await);
}

#[tokio::test]
async fn anonymous_votes_follow_require_voter_id() {
    let strict = harness(VotingPolicy::SingleVote, true).await;
    let view = handle_interaction(&strict.ctx, press(None, "harris")).await;
    assert_eq!(view.state, PageState::Ineligible);
    assert_eq!(view.tally, Tally::default());

    let open = harness(VotingPolicy::SingleVote, false).await;
    handle_interaction(&open.ctx, press(None, "harris")).await;
    let view = handle_interaction(&open.ctx, press(None, "harris")).await;
    assert_eq!(view.state, PageState::Result);
    assert_eq!(view.tally, Tally::new(2, 0));
}

#[tokio::test]
async fn failed_tally_write_changes_nothing() {
    let h = harness(VotingPolicy::SingleVote, true).await;
    handle_interaction(&h.ctx, press(Some(1), "harris")).await;

    h.votes.set_fail_writes(true);
    let view = handle_interaction(&h.ctx, press(Some(2), "trump")).await;
    assert_eq!(view.state, PageState::Error);
    assert!(view.notice.is_some());
    assert_eq!(view.tally, Tally::new(1, 0));
    assert!(h.ctx.engine.is_eligible(&VoterId::from(2)).await);

    h.votes.set_fail_writes(false);
    let view = handle_interaction(&h.ctx, press(Some(2), "trump")).await;
    assert_eq!(view.state, PageState::Result);
    assert_eq!(view.tally, Tally::new(1, 1));
}

#[tokio::test]
async fn failed_ledger_write_reverts_stored_tally() {
    let h = harness(VotingPolicy::SingleVote, true).await;
    handle_interaction(&h.ctx, press(Some(1), "harris")).await;

    h.voters.set_fail_writes(true);
    let view = handle_interaction(&h.ctx, press(Some(2), "harris")).await;
    assert_eq!(view.state, PageState::Error);
    assert_eq!(h.ctx.engine.tally().await, Tally::new(1, 0));
    assert_eq!(h.votes.read().await.expect("read"), Some(Tally::new(1, 0)));
    assert!(h.ctx.engine.is_eligible(&VoterId::from(2)).await);
}

#[tokio::test]
async fn failed_writes_give_back_only_the_attempted_vote() {
    let policy = VotingPolicy::bounded(2).expect("policy");
    let h = harness(policy, true).await;
    let voter = VoterId::from(3);

    assert_eq!(
        handle_interaction(&h.ctx, press(Some(3), "harris")).await.state,
        PageState::Result
    );

    h.votes.set_fail_writes(true);
    let view = handle_interaction(&h.ctx, press(Some(3), "harris")).await;
    assert_eq!(view.state, PageState::Error);
    h.votes.set_fail_writes(false);

    h.voters.set_fail_writes(true);
    let view = handle_interaction(&h.ctx, press(Some(3), "trump")).await;
    assert_eq!(view.state, PageState::Error);
    h.voters.set_fail_writes(false);
    assert!(h.ctx.engine.is_eligible(&voter).await);

    assert_eq!(
        handle_interaction(&h.ctx, press(Some(3), "trump")).await.state,
        PageState::Result
    );
    assert_eq!(
        handle_interaction(&h.ctx, press(Some(3), "trump")).await.state,
        PageState::Ineligible
    );
    assert_eq!(h.ctx.engine.tally().await, Tally::new(1, 1));
    assert_eq!(
        h.voters.read().await.expect("read"),
        Some(LedgerRecord::Counts([(voter, 2)].into_iter().collect()))
    );
}

#[tokio::test]
async fn cast_vote_rejects_unknown_candidate() {
    let h = harness(VotingPolicy::SingleVote, true).await;
    let voter = VoterId::from(1);
    let err = cast_vote(&h.ctx, "biden", Some(&voter))
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::InvalidCandidate);
    assert!(h.ctx.engine.is_eligible(&voter).await);
    assert_eq!(current_tally(&h.ctx).await.total, 0);

    let ok = cast_vote(&h.ctx, "Trump", Some(&voter)).await.expect("vote");
    assert_eq!(ok.tally, Tally::new(0, 1));

    let err = cast_vote(&h.ctx, "trump", Some(&voter))
        .await
        .expect_err("second vote");
    assert_eq!(err.code, ErrorCode::AlreadyVoted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_votes_from_one_voter_count_once() {
    let h = harness(VotingPolicy::SingleVote, true).await;
    let mut tasks = Vec::new();
    for i in 0..32 {
        let ctx = h.ctx.clone();
        let button = if i % 2 == 0 { "harris" } else { "trump" };
        tasks.push(tokio::spawn(async move {
            handle_interaction(&ctx, press(Some(99), button)).await.state
        }));
    }

    let mut counted = 0;
    for task in tasks {
        if task.await.expect("join") == PageState::Result {
            counted += 1;
        }
    }
    assert_eq!(counted, 1);
    assert_eq!(h.ctx.engine.tally().await.total(), 1);
}

#[tokio::test]
async fn total_matches_counted_interactions() {
    let policy = VotingPolicy::bounded(2).expect("policy");
    let h = harness(policy, true).await;
    let mut counted = 0;
    for step in 0u64..60 {
        let voter = step % 7;
        let button = if step % 3 == 0 { "trump" } else { "harris" };
        let view = handle_interaction(&h.ctx, press(Some(voter), button)).await;
        if view.state == PageState::Result {
            counted += 1;
        }
    }
    assert_eq!(counted, 14);
    assert_eq!(h.ctx.engine.tally().await.total(), counted);
}

async fn open_json(backend: &Backend) -> PollContext {
    let stores = PollStores::open(backend).await.expect("stores");
    PollContext::open(
        stores,
        EngineOptions::default(),
        Ballot::default(),
        FrameOptions::default(),
    )
    .await
}

#[tokio::test]
async fn votes_and_voters_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = Backend::Json {
        data_dir: dir.path().to_path_buf(),
    };

    let ctx = open_json(&backend).await;
    handle_interaction(&ctx, press(Some(1), "harris")).await;
    handle_interaction(&ctx, press(Some(2), "trump")).await;
    drop(ctx);

    let ctx = open_json(&backend).await;
    assert_eq!(ctx.engine.tally().await, Tally::new(1, 1));
    let view = handle_interaction(&ctx, press(Some(1), "trump")).await;
    assert_eq!(view.state, PageState::Ineligible);
    assert_eq!(view.tally, Tally::new(1, 1));
}
