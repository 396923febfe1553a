use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "navmap",
    about = "navmap: review and merge navigation map diffs",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store directory. Overrides `[store] root` from the config file.
    #[arg(long, global = true, env = "NAVMAP_ROOT")]
    pub root: Option<PathBuf>,

    /// Path to `navmap.toml`.
    #[arg(long, global = true, env = "NAVMAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Show the current map of a project
    Map(MapArgs),
    /// List the diffs of a project
    Diffs(DiffsArgs),
    /// Show one diff with its items
    Show(ShowArgs),
    /// Submit a diff from a JSON file of items
    Submit(SubmitArgs),
    /// Merge a diff with reviewer decisions
    Merge(MergeArgs),
    /// Show the audit trail of a diff
    Audit(AuditArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Listen address. Overrides `[server] bind_addr`.
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Args)]
pub struct MapArgs {
    pub project: String,
}

#[derive(Args)]
pub struct DiffsArgs {
    pub project: String,
    /// pending, partially_applied, applied, rejected or all
    #[arg(long, default_value = "pending")]
    pub status: String,
}

#[derive(Args)]
pub struct ShowArgs {
    pub diff: String,
}

#[derive(Args)]
pub struct SubmitArgs {
    pub project: String,
    /// JSON file holding an array of items, or `{"items": [...]}`.
    pub items: PathBuf,
    #[arg(long)]
    pub base_version: Option<u64>,
}

#[derive(Args)]
pub struct MergeArgs {
    pub diff: String,
    /// Approve every item
    #[arg(long, conflicts_with_all = ["reject", "decision"])]
    pub approve: bool,
    /// Reject every item
    #[arg(long, conflicts_with = "decision")]
    pub reject: bool,
    /// Per-item decision, e.g. `route:R1=approved`
    #[arg(short, long = "decision", value_name = "KEY=DECISION")]
    pub decision: Vec<String>,
    #[arg(long)]
    pub actor: Option<String>,
    /// Show what the merge would do without committing it
    #[arg(long)]
    pub preview: bool,
}

#[derive(Args)]
pub struct AuditArgs {
    pub diff: String,
}
