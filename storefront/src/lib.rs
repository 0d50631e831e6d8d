//! # Storefront - Comments, Votes and Gamification for a Static Storefront Blog
//!
//! Storefront keeps the reader-facing state of a small shop blog: comments
//! with votes and admin highlights, emoji reactions, favorites and a points
//! and badges ledger with a leaderboard. Everything is persisted through one
//! store interface that runs either on a client-local JSON tree or on a
//! hosted realtime document store over REST.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use storefront::{SessionContext, SortMode, Storefront, StorefrontConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SessionContext::new_client().with_display_name("Ana");
//!     let shop = Storefront::open(StorefrontConfig::from_env()?, session).await?;
//!
//!     let comment = shop.comment("summer-sale", "Love the new sandals!").await?;
//!     shop.vote("summer-sale", &comment.id).await?;
//!
//!     for comment in shop.ranked_comments("summer-sale", SortMode::Best).await? {
//!         println!("{} ({} votes): {}", comment.name, comment.votes, comment.text);
//!     }
//!     Ok(())
//! }
//! ```

pub mod admins;
pub mod app;
pub mod clock;
pub mod comment;
pub mod config;
pub mod error;
pub mod favorites;
pub mod ledger;
pub mod ranking;
pub mod reactions;
pub mod repository;
pub mod session;
pub mod store;

pub use admins::AdminRegistry;
pub use app::{load_client_session, Storefront, Theme};
pub use clock::{Clock, ManualClock, SystemClock};
pub use comment::{Comment, VoteStatus};
pub use config::{CommentLimits, HostedConfig, RetryPolicy, StorefrontConfig};
pub use error::{Result, StoreError, StorefrontError};
pub use favorites::Favorites;
pub use ledger::{Ledger, LedgerEntry, LeaderboardRow, StatUpdate};
pub use ranking::{rank, SortMode};
pub use reactions::{ReactionBoard, ReactionState};
pub use repository::{CommentOverview, CommentRepository, EntryStats, VoteOutcome};
pub use session::{Identity, SessionContext};
pub use store::{select_backend, BackendKind, LocalStore, PersistedStore, StorePath};
