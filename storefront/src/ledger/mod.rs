//! # Gamification ledger
//!
//! Points, badges and free-form counters per user, keyed by display name,
//! plus the top-ten leaderboard. Every mutation re-runs the achievement
//! table from [`achievements`] and refreshes the leaderboard row.

pub mod achievements;
pub mod leaderboard;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{Result, StorefrontError};
use crate::store::{path, read_as, write_as, PersistedStore};

pub use achievements::{Achievement, EvaluationContext, ACHIEVEMENTS};
pub use leaderboard::LeaderboardRow;

/// Gamification record for one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub name: String,
    /// Never decreases
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub badges: BTreeSet<String>,
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
}

impl LedgerEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Counter value, zero when never recorded
    pub fn stat(&self, key: &str) -> i64 {
        self.stats.get(key).copied().unwrap_or(0)
    }

    pub fn has_badge(&self, id: &str) -> bool {
        self.badges.contains(id)
    }
}

/// Change applied to a stat counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatUpdate {
    Increment(i64),
    Set(i64),
}

/// What a ledger mutation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerChange {
    pub entry: LedgerEntry,
    /// Badges unlocked by this mutation
    pub unlocked: Vec<&'static str>,
}

/// Ledger over a persisted store
pub struct Ledger {
    store: Arc<dyn PersistedStore>,
    clock: Arc<dyn Clock>,
    leaderboard_size: usize,
}

impl Ledger {
    pub fn new(store: Arc<dyn PersistedStore>, clock: Arc<dyn Clock>, leaderboard_size: usize) -> Self {
        Self {
            store,
            clock,
            leaderboard_size,
        }
    }

    /// Current entry for `name`; an unknown user has an empty entry
    pub async fn entry(&self, name: &str) -> Result<LedgerEntry> {
        let path = path::ledger_entry(name)?;
        Ok(read_as(self.store.as_ref(), &path)
            .await?
            .unwrap_or_else(|| LedgerEntry::new(name)))
    }

    /// Add points and return the new total, bonuses included
    pub async fn award(&self, name: &str, points: u64, reason: &str) -> Result<u64> {
        let change = self
            .mutate(name, |entry| {
                entry.points = entry.points.saturating_add(points);
                Ok(())
            })
            .await?;
        info!("✨ {} earned {} points for {} (total {})", name, points, reason, change.entry.points);
        Ok(change.entry.points)
    }

    /// Grant a badge directly; returns whether it was newly unlocked
    pub async fn unlock(&self, name: &str, achievement_id: &str) -> Result<bool> {
        let achievement = achievements::find(achievement_id).ok_or_else(|| {
            StorefrontError::validation(format!("unknown achievement '{achievement_id}'"))
        })?;
        let mut newly_unlocked = false;
        self.mutate(name, |entry| {
            if entry.badges.insert(achievement.id.to_string()) {
                entry.points = entry.points.saturating_add(achievement.bonus_points);
                newly_unlocked = true;
            }
            Ok(())
        })
        .await?;
        Ok(newly_unlocked)
    }

    /// Update a stat counter and return the full change
    pub async fn record_stat(&self, name: &str, key: &str, update: StatUpdate) -> Result<LedgerChange> {
        self.mutate(name, |entry| {
            let counter = entry.stats.entry(key.to_string()).or_insert(0);
            *counter = match update {
                StatUpdate::Increment(delta) => counter.saturating_add(delta),
                StatUpdate::Set(value) => value,
            };
            Ok(())
        })
        .await
    }

    /// Top users by points, highest first
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardRow>> {
        let path = path::leaderboard()?;
        Ok(read_as(self.store.as_ref(), &path).await?.unwrap_or_default())
    }

    async fn mutate<F>(&self, name: &str, apply: F) -> Result<LedgerChange>
    where
        F: FnOnce(&mut LedgerEntry) -> Result<()>,
    {
        let mut entry = self.entry(name).await?;
        let points_before = entry.points;
        apply(&mut entry)?;

        let ctx = EvaluationContext {
            hour: self.clock.local_hour(),
        };
        let unlocked = achievements::evaluate(&mut entry, &ctx);
        for id in &unlocked {
            info!("🏆 {} unlocked {}", name, id);
        }

        write_as(self.store.as_ref(), &path::ledger_entry(name)?, &entry).await?;
        if entry.points != points_before {
            self.refresh_leaderboard(&entry).await?;
        }
        Ok(LedgerChange { entry, unlocked })
    }

    async fn refresh_leaderboard(&self, entry: &LedgerEntry) -> Result<()> {
        let path = path::leaderboard()?;
        let mut rows: Vec<LeaderboardRow> = read_as(self.store.as_ref(), &path).await?.unwrap_or_default();
        leaderboard::upsert(&mut rows, &entry.name, entry.points, self.leaderboard_size);
        write_as(self.store.as_ref(), &path, &rows).await?;
        debug!("Leaderboard refreshed, {} rows", rows.len());
        Ok(())
    }
}
