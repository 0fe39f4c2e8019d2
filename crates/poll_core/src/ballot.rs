use shared::{domain::Candidate, error::VoteError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotEntry {
    /// Button value posted back when this candidate is picked.
    pub slug: String,
    pub label: String,
}

/// Slugs and labels for the two candidates on the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub a: BallotEntry,
    pub b: BallotEntry,
}

impl Default for Ballot {
    fn default() -> Self {
        Self {
            a: BallotEntry {
                slug: "harris".into(),
                label: "Harris".into(),
            },
            b: BallotEntry {
                slug: "trump".into(),
                label: "Trump".into(),
            },
        }
    }
}

impl Ballot {
    pub fn entry(&self, candidate: Candidate) -> &BallotEntry {
        match candidate {
            Candidate::A => &self.a,
            Candidate::B => &self.b,
        }
    }

    pub fn slug(&self, candidate: Candidate) -> &str {
        &self.entry(candidate).slug
    }

    pub fn label(&self, candidate: Candidate) -> &str {
        &self.entry(candidate).label
    }

    pub fn candidate(&self, value: &str) -> Result<Candidate, VoteError> {
        let value = value.trim();
        Candidate::ALL
            .into_iter()
            .find(|c| self.slug(*c).eq_ignore_ascii_case(value))
            .ok_or_else(|| VoteError::InvalidCandidate {
                value: value.to_string(),
            })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for entry in [&self.a, &self.b] {
            let slug = entry.slug.trim();
            if slug.is_empty() {
                anyhow::bail!("candidate slug must not be empty");
            }
            if ["select", "start", "share"]
                .iter()
                .any(|reserved| slug.eq_ignore_ascii_case(reserved))
            {
                anyhow::bail!("candidate slug '{slug}' collides with a frame action");
            }
        }
        if self.a.slug.trim().eq_ignore_ascii_case(self.b.slug.trim()) {
            anyhow::bail!("candidate slugs must differ");
        }
        Ok(())
    }
}
