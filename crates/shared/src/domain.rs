use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of options a voter can pick between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Candidate {
    A,
    B,
}

impl Candidate {
    pub const ALL: [Candidate; 2] = [Candidate::A, Candidate::B];
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::A => f.write_str("a"),
            Candidate::B => f.write_str("b"),
        }
    }
}

/// Platform supplied identity of the interacting user. Fids arrive as
/// integers, other platforms hand out strings, so both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawVoterId", into = "String")]
pub struct VoterId(String);

impl VoterId {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for VoterId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<VoterId> for String {
    fn from(value: VoterId) -> Self {
        value.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVoterId {
    Number(u64),
    Text(String),
}

impl TryFrom<RawVoterId> for VoterId {
    type Error = String;

    fn try_from(value: RawVoterId) -> Result<Self, Self::Error> {
        match value {
            RawVoterId::Number(n) => Ok(VoterId::from(n)),
            RawVoterId::Text(s) => {
                VoterId::parse(&s).ok_or_else(|| "voter id must not be empty".to_string())
            }
        }
    }
}

/// Persisted vote counters. Counts are unsigned, so a corrupt negative value
/// fails deserialization instead of loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tally {
    pub a: u64,
    pub b: u64,
}

impl Tally {
    pub fn new(a: u64, b: u64) -> Self {
        Self { a, b }
    }

    pub fn count(&self, candidate: Candidate) -> u64 {
        match candidate {
            Candidate::A => self.a,
            Candidate::B => self.b,
        }
    }

    pub fn total(&self) -> u64 {
        self.a.saturating_add(self.b)
    }

    pub fn increment(&mut self, candidate: Candidate) {
        let slot = match candidate {
            Candidate::A => &mut self.a,
            Candidate::B => &mut self.b,
        };
        *slot = slot.saturating_add(1);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Percentages {
    pub a: u8,
    pub b: u8,
}

/// Which card to render. Recomputed for every interaction, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    #[default]
    Intro,
    Choice,
    Result,
    Ineligible,
    Error,
}

pub const DEFAULT_REPEAT_ALLOWANCE: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VotingPolicy {
    #[default]
    SingleVote,
    BoundedRepeat {
        allowance: u32,
    },
}

impl VotingPolicy {
    /// Bounded-repeat policy; an allowance of zero would lock everyone out.
    pub fn bounded(allowance: u32) -> Option<Self> {
        (allowance > 0).then_some(VotingPolicy::BoundedRepeat { allowance })
    }

    pub fn allowance(&self) -> u32 {
        match self {
            VotingPolicy::SingleVote => 1,
            VotingPolicy::BoundedRepeat { allowance } => *allowance,
        }
    }
}
