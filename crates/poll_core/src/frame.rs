use shared::{
    domain::{Candidate, PageState, Tally},
    error::VoteError,
    protocol::{ButtonValue, FrameButton, FrameInput, FrameView},
};
use storage::percentages;
use tracing::{info, warn};

use crate::{
    share::{render_share_text, share_url, DEFAULT_COMPOSE_URL, DEFAULT_SHARE_TEMPLATE},
    PollContext,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImages {
    pub intro: String,
    pub choice: String,
    pub result: String,
    pub ineligible: Option<String>,
    pub error: Option<String>,
}

impl Default for FrameImages {
    fn default() -> Self {
        Self {
            intro: "https://i.imgur.com/bLVqRNb.png".into(),
            choice: "https://i.imgur.com/be4kQO3.png".into(),
            result: "https://i.imgur.com/HZG1uOl.png".into(),
            ineligible: None,
            error: None,
        }
    }
}

impl FrameImages {
    pub fn for_state(&self, state: PageState) -> &str {
        match state {
            PageState::Intro => &self.intro,
            PageState::Choice => &self.choice,
            PageState::Result => &self.result,
            PageState::Ineligible => self.ineligible.as_deref().unwrap_or(&self.result),
            PageState::Error => self.error.as_deref().unwrap_or(&self.intro),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOptions {
    pub images: FrameImages,
    pub follow_url: Option<String>,
    pub compose_url: String,
    /// Public URL of the frame, embedded in share links.
    pub frame_url: Option<String>,
    pub share_template: String,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            images: FrameImages::default(),
            follow_url: None,
            compose_url: DEFAULT_COMPOSE_URL.into(),
            frame_url: None,
            share_template: DEFAULT_SHARE_TEMPLATE.into(),
        }
    }
}

#[derive(Debug, Default)]
struct ViewExtras {
    selected: Option<Candidate>,
    share: bool,
    notice: Option<String>,
}

/// Maps one interaction to the card to render, applying a vote when a
/// candidate was picked. Never fails: storage trouble renders
/// `PageState::Error` and the caller may retry.
pub async fn handle_interaction(ctx: &PollContext, input: FrameInput) -> FrameView {
    let button = ButtonValue::parse(input.button_value.as_deref(), |c| {
        ctx.ballot.slug(c).to_string()
    });

    match button {
        ButtonValue::None => render(ctx, PageState::Intro, ViewExtras::default()).await,
        ButtonValue::Select => render(ctx, PageState::Choice, ViewExtras::default()).await,
        ButtonValue::Share => match input.previous_state {
            Some(PageState::Result | PageState::Ineligible) => {
                let extras = ViewExtras {
                    share: true,
                    ..ViewExtras::default()
                };
                render(ctx, PageState::Result, extras).await
            }
            previous => {
                let state = previous.unwrap_or_default();
                warn!(
                    voter_id = ?input.voter_id.as_ref().map(|v| v.as_str()),
                    ?state,
                    "share pressed outside the result card, re-rendering"
                );
                render(ctx, state, ViewExtras::default()).await
            }
        },
        ButtonValue::Vote(candidate) => vote(ctx, candidate, input).await,
        ButtonValue::Unknown(value) => {
            let state = input.previous_state.unwrap_or_default();
            warn!(
                button_value = %value,
                voter_id = ?input.voter_id.as_ref().map(|v| v.as_str()),
                ?state,
                "unexpected button value, re-rendering"
            );
            render(ctx, state, ViewExtras::default()).await
        }
    }
}

async fn vote(ctx: &PollContext, candidate: Candidate, input: FrameInput) -> FrameView {
    let voter_id = input.voter_id.as_ref();
    match ctx.engine.apply_vote(candidate, voter_id).await {
        Ok(tally) => {
            let extras = ViewExtras {
                selected: Some(candidate),
                ..ViewExtras::default()
            };
            build_view(ctx, PageState::Result, tally, extras)
        }
        Err(VoteError::AlreadyVoted { voter_id }) => {
            info!(%voter_id, %candidate, "vote rejected, allowance used up");
            let extras = ViewExtras {
                notice: Some("You have already voted.".into()),
                ..ViewExtras::default()
            };
            render(ctx, PageState::Ineligible, extras).await
        }
        Err(VoteError::VoterIdRequired) => {
            info!(%candidate, "vote rejected, no verified voter id");
            let extras = ViewExtras {
                notice: Some("Voting requires a verified account.".into()),
                ..ViewExtras::default()
            };
            render(ctx, PageState::Ineligible, extras).await
        }
        Err(error @ VoteError::StorageWrite { .. }) => {
            warn!(%error, %candidate, "vote not recorded");
            let extras = ViewExtras {
                notice: Some("Your vote could not be saved. Please try again.".into()),
                ..ViewExtras::default()
            };
            render(ctx, PageState::Error, extras).await
        }
        Err(error @ VoteError::InvalidCandidate { .. }) => {
            warn!(%error, "ignoring vote");
            render(ctx, PageState::Choice, ViewExtras::default()).await
        }
    }
}

async fn render(ctx: &PollContext, state: PageState, extras: ViewExtras) -> FrameView {
    let tally = ctx.engine.tally().await;
    build_view(ctx, state, tally, extras)
}

fn build_view(ctx: &PollContext, state: PageState, tally: Tally, extras: ViewExtras) -> FrameView {
    let percentages = percentages(&tally);
    let (share_text, share_link) = if extras.share {
        let text = render_share_text(
            &ctx.frame.share_template,
            &ctx.ballot,
            &tally,
            &percentages,
        );
        let link = share_url(&ctx.frame.compose_url, &text, ctx.frame.frame_url.as_deref());
        if link.is_none() {
            warn!(compose_url = %ctx.frame.compose_url, "invalid compose url, sharing text only");
        }
        (Some(text), link.map(String::from))
    } else {
        (None, None)
    };

    FrameView {
        state,
        tally,
        percentages,
        selected: extras.selected,
        share_text,
        share_url: share_link,
        buttons: buttons_for(ctx, state),
        image_url: ctx.frame.images.for_state(state).to_string(),
        notice: extras.notice,
    }
}

/// Interactive options valid in `state`. Only `Choice` and `Error` offer
/// candidate buttons.
pub fn buttons_for(ctx: &PollContext, state: PageState) -> Vec<FrameButton> {
    let mut buttons = Vec::new();
    match state {
        PageState::Intro => buttons.push(FrameButton::post("Vote", "select")),
        PageState::Choice | PageState::Error => {
            for candidate in Candidate::ALL {
                let entry = ctx.ballot.entry(candidate);
                buttons.push(FrameButton::post(&entry.label, &entry.slug));
            }
        }
        PageState::Result | PageState::Ineligible => {
            buttons.push(FrameButton::post("Share Vote", "share"));
            if let Some(follow) = &ctx.frame.follow_url {
                buttons.push(FrameButton::link("Follow Me", follow));
            }
        }
    }
    buttons
}
