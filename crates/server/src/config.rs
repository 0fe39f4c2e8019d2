use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use poll_core::{Ballot, BallotEntry, EngineOptions, FrameImages, FrameOptions, PollContext};
use shared::domain::{VotingPolicy, DEFAULT_REPEAT_ALLOWANCE};
use storage::{Backend, PollStores};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    /// `json`, `sqlite` or `memory`.
    pub storage: String,
    pub data_dir: String,
    pub database_url: String,
    /// `single` or `bounded`.
    pub policy: String,
    pub allowance: u32,
    pub require_voter_id: bool,
    pub candidate_a: String,
    pub candidate_a_label: String,
    pub candidate_b: String,
    pub candidate_b_label: String,
    pub follow_url: Option<String>,
    pub frame_url: Option<String>,
    pub compose_url: String,
    pub share_template: String,
    pub image_intro: String,
    pub image_choice: String,
    pub image_result: String,
}

impl Default for Settings {
    fn default() -> Self {
        let ballot = Ballot::default();
        let frame = FrameOptions::default();
        Self {
            server_bind: "127.0.0.1:3000".into(),
            storage: "json".into(),
            data_dir: "./data".into(),
            database_url: "sqlite://./data/poll.db".into(),
            policy: "single".into(),
            allowance: DEFAULT_REPEAT_ALLOWANCE,
            require_voter_id: true,
            candidate_a: ballot.a.slug,
            candidate_a_label: ballot.a.label,
            candidate_b: ballot.b.slug,
            candidate_b_label: ballot.b.label,
            follow_url: None,
            frame_url: None,
            compose_url: frame.compose_url,
            share_template: frame.share_template,
            image_intro: frame.images.intro,
            image_choice: frame.images.choice,
            image_result: frame.images.result,
        }
    }
}

/// Settings file key and the environment variables overriding it, later
/// entries winning.
const KEYS: &[(&str, &[&str])] = &[
    ("bind_addr", &["POLL_BIND", "APP__BIND_ADDR"]),
    ("storage", &["POLL_STORAGE"]),
    ("data_dir", &["POLL_DATA_DIR"]),
    ("database_url", &["DATABASE_URL", "APP__DATABASE_URL"]),
    ("policy", &["POLL_POLICY"]),
    ("allowance", &["POLL_ALLOWANCE"]),
    ("require_voter_id", &["POLL_REQUIRE_VOTER_ID"]),
    ("candidate_a", &["POLL_CANDIDATE_A"]),
    ("candidate_a_label", &["POLL_CANDIDATE_A_LABEL"]),
    ("candidate_b", &["POLL_CANDIDATE_B"]),
    ("candidate_b_label", &["POLL_CANDIDATE_B_LABEL"]),
    ("follow_url", &["POLL_FOLLOW_URL"]),
    ("frame_url", &["POLL_FRAME_URL"]),
    ("compose_url", &["POLL_COMPOSE_URL"]),
    ("share_template", &["POLL_SHARE_TEMPLATE"]),
    ("image_intro", &["POLL_IMAGE_INTRO"]),
    ("image_choice", &["POLL_IMAGE_CHOICE"]),
    ("image_result", &["POLL_IMAGE_RESULT"]),
];

pub fn load_settings() -> Settings {
    load_settings_from(Path::new("server.toml"), |key| std::env::var(key).ok())
}

pub(crate) fn load_settings_from(
    file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(file) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => {
                for (key, value) in file_cfg {
                    let value = match value {
                        toml::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    settings.set(&key, value);
                }
            }
            Err(error) => warn!(path = %file.display(), %error, "ignoring unparsable settings file"),
        }
    }

    for (key, vars) in KEYS {
        for var in *vars {
            if let Some(value) = env(var) {
                settings.set(key, value);
            }
        }
    }

    settings
}

impl Settings {
    fn set(&mut self, key: &str, value: String) {
        let optional = |v: String| Some(v).filter(|v| !v.trim().is_empty());
        match key {
            "bind_addr" => self.server_bind = value,
            "storage" => self.storage = value,
            "data_dir" => self.data_dir = value,
            "database_url" => self.database_url = value,
            "policy" => self.policy = value,
            "allowance" => match value.trim().parse() {
                Ok(parsed) => self.allowance = parsed,
                Err(_) => warn!(%value, "ignoring invalid allowance"),
            },
            "require_voter_id" => match parse_bool(&value) {
                Some(parsed) => self.require_voter_id = parsed,
                None => warn!(%value, "ignoring invalid require_voter_id"),
            },
            "candidate_a" => self.candidate_a = value,
            "candidate_a_label" => self.candidate_a_label = value,
            "candidate_b" => self.candidate_b = value,
            "candidate_b_label" => self.candidate_b_label = value,
            "follow_url" => self.follow_url = optional(value),
            "frame_url" => self.frame_url = optional(value),
            "compose_url" => self.compose_url = value,
            "share_template" => self.share_template = value,
            "image_intro" => self.image_intro = value,
            "image_choice" => self.image_choice = value,
            "image_result" => self.image_result = value,
            other => warn!(key = other, "ignoring unknown setting"),
        }
    }

    pub fn voting_policy(&self) -> anyhow::Result<VotingPolicy> {
        match self.policy.trim().to_ascii_lowercase().as_str() {
            "single" | "single-vote" | "single_vote" => Ok(VotingPolicy::SingleVote),
            "bounded" | "bounded-repeat" | "bounded_repeat" => {
                VotingPolicy::bounded(self.allowance)
                    .context("bounded-repeat policy needs an allowance of at least 1")
            }
            other => bail!("unknown voting policy '{other}'"),
        }
    }

    pub fn backend(&self) -> anyhow::Result<Backend> {
        match self.storage.trim().to_ascii_lowercase().as_str() {
            "json" | "file" => Ok(Backend::Json {
                data_dir: PathBuf::from(self.data_dir.trim()),
            }),
            "sqlite" => Ok(Backend::Sqlite {
                database_url: normalize_database_url(&self.database_url),
            }),
            "memory" => Ok(Backend::Memory),
            other => bail!("unknown storage backend '{other}'"),
        }
    }

    pub fn ballot(&self) -> anyhow::Result<Ballot> {
        let ballot = Ballot {
            a: BallotEntry {
                slug: self.candidate_a.trim().to_string(),
                label: self.candidate_a_label.clone(),
            },
            b: BallotEntry {
                slug: self.candidate_b.trim().to_string(),
                label: self.candidate_b_label.clone(),
            },
        };
        ballot.validate()?;
        Ok(ballot)
    }

    pub fn frame_options(&self) -> FrameOptions {
        FrameOptions {
            images: FrameImages {
                intro: self.image_intro.clone(),
                choice: self.image_choice.clone(),
                result: self.image_result.clone(),
                ineligible: None,
                error: None,
            },
            follow_url: self.follow_url.clone(),
            compose_url: self.compose_url.clone(),
            frame_url: self.frame_url.clone(),
            share_template: self.share_template.clone(),
        }
    }

    pub async fn open_context(&self) -> anyhow::Result<PollContext> {
        let backend = self.backend()?;
        let options = EngineOptions {
            policy: self.voting_policy()?,
            require_voter_id: self.require_voter_id,
        };
        let ballot = self.ballot()?;
        let stores = PollStores::open(&backend)
            .await
            .with_context(|| format!("failed to open poll storage {backend:?}"))?;
        Ok(PollContext::open(stores, options, ballot, self.frame_options()).await)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
