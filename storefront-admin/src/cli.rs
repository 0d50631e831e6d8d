use clap::{Parser, Subcommand};
use storefront::SortMode;

#[derive(Parser)]
#[command(name = "storefront-admin")]
#[command(about = "Moderate storefront blog comments and inspect the leaderboard", long_about = None)]
pub struct Cli {
    /// Admin identity on the hosted backend; local-only without it
    #[arg(long, global = true, env = "STOREFRONT_ADMIN_UID")]
    pub uid: Option<String>,

    /// Token issued to the admin identity by the hosted auth provider
    #[arg(long, global = true, env = "STOREFRONT_ID_TOKEN", hide_env_values = true)]
    pub id_token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the comments of one entry
    Comments {
        /// Blog entry id
        entry: String,

        #[arg(long, default_value = "best")]
        sort: SortMode,
    },

    /// Totals across every entry
    Overview,

    /// Highlight a comment, or remove the highlight with --off
    Highlight {
        entry: String,
        comment: String,

        #[arg(long)]
        off: bool,
    },

    /// Permanently delete a comment
    Delete { entry: String, comment: String },

    /// Show the points leaderboard
    Leaderboard,

    /// Register a user as admin
    Grant { uid: String },

    /// Remove a user's admin record
    Revoke { uid: String },

    /// Print changes to an entry's comments until interrupted
    Watch { entry: String },
}
