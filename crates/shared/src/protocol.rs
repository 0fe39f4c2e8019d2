use serde::{Deserialize, Serialize};

use crate::domain::{Candidate, PageState, Percentages, Tally, VoterId};

/// What the pressed button asked for, resolved against the ballot slugs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonValue {
    None,
    Select,
    Vote(Candidate),
    Share,
    Unknown(String),
}

impl ButtonValue {
    /// `slug_for` maps each candidate to the value its button posts.
    pub fn parse(raw: Option<&str>, slug_for: impl Fn(Candidate) -> String) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return ButtonValue::None;
        };
        if raw.eq_ignore_ascii_case("select") || raw.eq_ignore_ascii_case("start") {
            return ButtonValue::Select;
        }
        if raw.eq_ignore_ascii_case("share") {
            return ButtonValue::Share;
        }
        Candidate::ALL
            .into_iter()
            .find(|candidate| slug_for(*candidate).eq_ignore_ascii_case(raw))
            .map(ButtonValue::Vote)
            .unwrap_or_else(|| ButtonValue::Unknown(raw.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_id: Option<VoterId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<PageState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ButtonAction {
    Post { value: String },
    Link { target: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameButton {
    pub label: String,
    pub action: ButtonAction,
}

impl FrameButton {
    pub fn post(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Post {
                value: value.into(),
            },
        }
    }

    pub fn link(label: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Link {
                target: target.into(),
            },
        }
    }

    pub fn posts(&self, slug: &str) -> bool {
        matches!(&self.action, ButtonAction::Post { value } if value == slug)
    }
}

/// Everything the rendering layer needs to draw one card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameView {
    pub state: PageState,
    pub tally: Tally,
    pub percentages: Percentages,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
    pub buttons: Vec<FrameButton>,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyResponse {
    pub tally: Tally,
    pub percentages: Percentages,
    pub total: u64,
}
