use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::VoterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AlreadyVoted,
    InvalidCandidate,
    VoterIdRequired,
    StorageWrite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

/// Outcomes of a vote transition that did not count a vote.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("voter {voter_id} has no votes left")]
    AlreadyVoted { voter_id: VoterId },
    #[error("unknown candidate '{value}'")]
    InvalidCandidate { value: String },
    #[error("a verified voter id is required to vote")]
    VoterIdRequired,
    #[error("failed to persist vote: {message}")]
    StorageWrite { message: String },
}

impl VoteError {
    pub fn code(&self) -> ErrorCode {
        match self {
            VoteError::AlreadyVoted { .. } => ErrorCode::AlreadyVoted,
            VoteError::InvalidCandidate { .. } => ErrorCode::InvalidCandidate,
            VoteError::VoterIdRequired => ErrorCode::VoterIdRequired,
            VoteError::StorageWrite { .. } => ErrorCode::StorageWrite,
        }
    }
}

impl From<VoteError> for ApiError {
    fn from(value: VoteError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}
