use clap::{Parser, Subcommand, ValueEnum};
use trackref_registry::MissingPolicy;

#[derive(Parser)]
#[command(
    name = "trackref",
    about = "trackref: lazy, batched cross-reference resolution for issue-tracker records",
    version
)]
pub struct Cli {
    /// Log filter directive (overrides TRACKREF_LOG)
    #[arg(long, global = true)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse issue records and resolve their references against a backend
    Resolve {
        /// Path to issues JSONL
        #[arg(long, default_value = crate::support::DEFAULT_ISSUES_PATH)]
        issues: String,

        /// Snapshot JSONL to resolve against (overrides the config source)
        #[arg(long)]
        snapshot: Option<String>,

        /// Path to trackref.toml
        #[arg(long)]
        config: Option<String>,

        /// Resolve without a backend; every lookup fails
        #[arg(long, conflicts_with = "snapshot")]
        offline: bool,

        /// How keys the backend does not know are handled
        #[arg(long, value_enum)]
        missing: Option<MissingArg>,

        /// Also load comments and attachments
        #[arg(long)]
        children: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List reference categories and their key spaces
    Categories {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MissingArg {
    Memoize,
    Requery,
}

impl From<MissingArg> for MissingPolicy {
    fn from(arg: MissingArg) -> Self {
        match arg {
            MissingArg::Memoize => MissingPolicy::Memoize,
            MissingArg::Requery => MissingPolicy::Requery,
        }
    }
}
