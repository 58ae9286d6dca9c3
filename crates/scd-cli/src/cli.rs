use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use scd_models::{EntityKind, JobStatus};

#[derive(Parser)]
#[command(
    name = "scd",
    about = "Type-2 slowly changing dimension store for jobs, timelogs and payments",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database file (`:memory:` for a throwaway database).
    #[arg(long, global = true, env = "SCD_DATABASE")]
    pub database: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

impl Cli {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }
}

pub const DEFAULT_DATABASE: &str = "scd.db";

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or drop the entity tables
    Migrate(MigrateArgs),
    /// Populate the database with sample version histories
    Seed(SeedArgs),
    /// Latest versions of a company's jobs
    LatestJobs(LatestJobsArgs),
    /// Latest payment line items tied to any version of a contractor's jobs
    Payments(PaymentsArgs),
    /// Every version of one entity
    History(EntityArgs),
    /// One version of an entity: latest, by number, or as of an instant
    Show(ShowArgs),
    /// Create version 1 of a job
    CreateJob(CreateJobArgs),
    /// Store a new version of a job with the given changes
    UpdateJob(UpdateJobArgs),
    /// Close the latest version of an entity
    Delete(EntityArgs),
    /// Audit versioning invariants across all tables
    Verify,
    /// Start the HTTP API
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct MigrateArgs {
    #[arg(value_enum)]
    pub direction: Direction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Args)]
pub struct SeedArgs {
    #[arg(long, default_value = "10")]
    pub jobs: usize,
    #[arg(long, default_value = "40")]
    pub timelogs: usize,
    #[arg(long, default_value = "40")]
    pub payments: usize,
    /// RNG seed for reproducible data.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct LatestJobsArgs {
    #[arg(long)]
    pub company: String,
    #[arg(long)]
    pub status: Option<JobStatus>,
}

#[derive(Args)]
pub struct PaymentsArgs {
    #[arg(long)]
    pub contractor: String,
}

#[derive(Args)]
pub struct EntityArgs {
    /// job, timelog or payment
    pub kind: EntityKind,
    /// Business key
    pub id: String,
}

#[derive(Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub entity: EntityArgs,
    #[arg(long, conflicts_with = "as_of")]
    pub version: Option<u32>,
    /// RFC 3339 instant, e.g. 2024-03-01T12:00:00Z
    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Args)]
pub struct CreateJobArgs {
    pub id: String,
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub company: String,
    #[arg(long)]
    pub contractor: String,
    #[arg(long)]
    pub rate: f64,
    #[arg(long)]
    pub status: Option<JobStatus>,
}

#[derive(Args)]
pub struct UpdateJobArgs {
    pub id: String,
    #[arg(long, required_unless_present_any = ["status", "title"])]
    pub rate: Option<f64>,
    #[arg(long)]
    pub status: Option<JobStatus>,
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<String>,
    /// TOML server configuration; `--database` overrides its database.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Serve from a volatile in-memory store.
    #[arg(long)]
    pub memory: bool,
}
