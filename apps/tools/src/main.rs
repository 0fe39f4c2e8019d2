use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use shared::domain::{Tally, VoterId, VotingPolicy, DEFAULT_REPEAT_ALLOWANCE};
use storage::{percentages, Backend, PollStores, SnapshotStore, VoteStore, VoterLedger};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageKind {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyKind {
    Single,
    Bounded,
}

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, value_enum, default_value = "json")]
    storage: StorageKind,
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    #[arg(long, default_value = "sqlite://./data/poll.db")]
    database_url: String,
    #[arg(long, value_enum, default_value = "single")]
    policy: PolicyKind,
    #[arg(long, default_value_t = DEFAULT_REPEAT_ALLOWANCE)]
    allowance: u32,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tally, percentages and number of recorded voters.
    Show,
    /// Zero the tally and forget every voter.
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Print how many votes a voter has used.
    Voter { voter_id: String },
}

impl Cli {
    fn backend(&self) -> Backend {
        match self.storage {
            StorageKind::Json => Backend::Json {
                data_dir: self.data_dir.clone(),
            },
            StorageKind::Sqlite => Backend::Sqlite {
                database_url: self.database_url.clone(),
            },
        }
    }

    fn policy(&self) -> Result<VotingPolicy> {
        match self.policy {
            PolicyKind::Single => Ok(VotingPolicy::SingleVote),
            PolicyKind::Bounded => match VotingPolicy::bounded(self.allowance) {
                Some(policy) => Ok(policy),
                None => bail!("--allowance must be at least 1"),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = run(&cli).await?;
    println!("{output}");
    Ok(())
}

async fn run(cli: &Cli) -> Result<String> {
    let stores = PollStores::open(&cli.backend()).await?;
    let policy = cli.policy()?;
    let votes = VoteStore::new(stores.votes.clone());

    match &cli.command {
        Command::Show => {
            let tally = votes.load().await;
            let (ledger, _) = VoterLedger::load_readonly(policy, stores.voters).await;
            let updated = stores.votes.updated_at().await.ok().flatten();
            Ok(describe(&tally, ledger.voter_count(), updated))
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("refusing to reset without --yes");
            }
            votes.save(&Tally::default()).await?;
            let mut ledger = VoterLedger::new(policy, stores.voters);
            ledger.clear();
            ledger.save().await?;
            Ok(format!("reset {} and {}", votes.describe(), ledger.describe()))
        }
        Command::Voter { voter_id } => {
            let Some(voter_id) = VoterId::parse(voter_id) else {
                bail!("voter id must not be empty");
            };
            let (ledger, _) = VoterLedger::load_readonly(policy, stores.voters).await;
            Ok(format!(
                "voter={voter_id} used={} remaining={} eligible={}",
                ledger.consumed(&voter_id),
                ledger.remaining(&voter_id),
                ledger.is_eligible(&voter_id)
            ))
        }
    }
}

fn describe(tally: &Tally, voters: usize, updated: Option<DateTime<Utc>>) -> String {
    let pct = percentages(tally);
    let mut out = format!(
        "a={} ({}%) b={} ({}%) total={} voters={voters}",
        tally.a,
        pct.a,
        tally.b,
        pct.b,
        tally.total()
    );
    if let Some(updated) = updated {
        out.push_str(&format!(" updated={}", updated.to_rfc3339()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(dir: &tempfile::TempDir, command: Command) -> Cli {
        Cli {
            storage: StorageKind::Json,
            data_dir: dir.path().to_path_buf(),
            database_url: String::new(),
            policy: PolicyKind::Single,
            allowance: DEFAULT_REPEAT_ALLOWANCE,
            command,
        }
    }

    #[tokio::test]
    async fn show_reports_stored_tally() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("votes.json"), r#"{"a": 3, "b": 1}"#).expect("write");
        std::fs::write(dir.path().join("voters.json"), r#"["1", "2", "3", "4"]"#).expect("write");

        let out = run(&cli(&dir, Command::Show)).await.expect("show");
        assert!(out.starts_with("a=3 (75%) b=1 (25%) total=4 voters=4"), "{out}");
    }

    #[tokio::test]
    async fn reset_requires_confirmation() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("votes.json"), r#"{"a": 3, "b": 1}"#).expect("write");

        assert!(run(&cli(&dir, Command::Reset { yes: false })).await.is_err());
        run(&cli(&dir, Command::Reset { yes: true }))
            .await
            .expect("reset");

        let out = run(&cli(&dir, Command::Show)).await.expect("show");
        assert!(out.starts_with("a=0 (0%) b=0 (0%) total=0 voters=0"), "{out}");
    }

    #[tokio::test]
    async fn read_only_commands_leave_damaged_ledger_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let voters = dir.path().join("voters.json");
        std::fs::write(dir.path().join("votes.json"), r#"{"a": 2, "b": 2}"#).expect("write");
        std::fs::write(&voters, "{not json").expect("write");

        let out = run(&cli(&dir, Command::Show)).await.expect("show");
        assert!(out.starts_with("a=2 (50%) b=2 (50%) total=4 voters=0"), "{out}");
        let out = run(&cli(
            &dir,
            Command::Voter {
                voter_id: "1".into(),
            },
        ))
        .await
        .expect("voter");
        assert_eq!(out, "voter=1 used=0 remaining=1 eligible=true");

        assert_eq!(std::fs::read_to_string(&voters).expect("read"), "{not json");
    }

    #[tokio::test]
    async fn voter_reports_remaining_allowance() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("voters.json"), r#"{"7": 4}"#).expect("write");

        let mut args = cli(
            &dir,
            Command::Voter {
                voter_id: "7".into(),
            },
        );
        args.policy = PolicyKind::Bounded;
        let out = run(&args).await.expect("voter");
        assert_eq!(out, "voter=7 used=4 remaining=6 eligible=true");
    }
}
