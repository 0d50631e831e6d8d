mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::Parser;
use storefront::{
    load_client_session, Comment, Identity, LocalStore, Storefront, StorefrontConfig, SystemClock,
};
use time::macros::format_description;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let time_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    tracing_subscriber::fmt()
        .with_timer(UtcTime::new(time_format))
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("storefront=info,storefront_admin=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = StorefrontConfig::from_env().context("loading configuration")?;

    let local = match &config.local_path {
        Some(file) => LocalStore::open(file)
            .with_context(|| format!("opening local store {}", file.display()))?,
        None => LocalStore::in_memory(),
    }
    .with_quota(config.local_quota_bytes);

    let mut session = load_client_session(&local)?.with_admin(true);
    if let Some(uid) = &cli.uid {
        let mut identity = Identity::new(uid);
        if let Some(token) = &cli.id_token {
            identity = identity.with_token(token);
        }
        session = session.with_identity(identity);
    }

    let shop = Storefront::with_local(config, session, Arc::new(local), Arc::new(SystemClock)).await?;
    info!("🛠️  Admin session on {} backend", shop.backend_kind().as_str());

    run(&shop, cli.command).await?;

    if shop.is_degraded() {
        warn!("⚠️  Hosted backend unreachable, results came from the local store");
    }
    Ok(())
}

async fn run(shop: &Storefront, command: Commands) -> Result<()> {
    match command {
        Commands::Comments { entry, sort } => {
            let comments = shop.ranked_comments(&entry, sort).await?;
            if comments.is_empty() {
                println!("No comments on {entry}");
            }
            for comment in &comments {
                print_comment(comment);
            }
        }
        Commands::Overview => {
            let overview = shop.comments().overview().await?;
            println!("{:<24} {:>8} {:>8} {:>11}  LATEST", "ENTRY", "COMMENTS", "VOTES", "HIGHLIGHTED");
            for (entry, stats) in &overview.entries {
                println!(
                    "{:<24} {:>8} {:>8} {:>11}  {}",
                    entry,
                    stats.comments,
                    stats.votes,
                    stats.highlighted,
                    stats.latest_timestamp.map(format_time).unwrap_or_default()
                );
            }
            println!(
                "{:<24} {:>8} {:>8} {:>11}",
                "TOTAL", overview.total_comments, overview.total_votes, overview.highlighted
            );
        }
        Commands::Highlight { entry, comment, off } => {
            shop.comments().set_highlighted(&entry, &comment, !off).await?;
            println!("{} {}", if off { "Unhighlighted" } else { "Highlighted" }, comment);
        }
        Commands::Delete { entry, comment } => {
            shop.comments().delete(&entry, &comment).await?;
            println!("Deleted {comment}");
        }
        Commands::Leaderboard => {
            for (rank, row) in shop.ledger().leaderboard().await?.iter().enumerate() {
                println!("{:>2}. {:<40} {:>6}", rank + 1, row.name, row.points);
            }
        }
        Commands::Grant { uid } => {
            shop.admins().claim(&uid).await?;
            println!("{uid} is now an admin");
        }
        Commands::Revoke { uid } => {
            shop.admins().revoke(&uid).await?;
            println!("{uid} is no longer an admin");
        }
        Commands::Watch { entry } => {
            let subscription = shop
                .comments()
                .watch_entry(
                    &entry,
                    Arc::new(|event| println!("{:?} {} {}", event.kind, event.path, event.data)),
                )
                .await?;
            info!("📡 Watching {}, press Ctrl-C to stop", subscription.path());
            tokio::signal::ctrl_c().await?;
            subscription.cancel();
        }
    }
    Ok(())
}

fn print_comment(comment: &Comment) {
    let mut flags = String::new();
    if comment.is_highlighted {
        flags.push('★');
    }
    if comment.is_admin_reply {
        flags.push('A');
    }
    println!(
        "{:<36} {:>2} {:>4}▲ {} {}: {}",
        comment.id,
        flags,
        comment.votes,
        format_time(comment.timestamp),
        comment.name,
        comment.text
    );
}

fn format_time(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}
