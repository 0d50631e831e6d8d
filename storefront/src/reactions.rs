use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Result, StorefrontError};
use crate::store::{path, PersistedStore};

/// Emojis readers can react with
pub const PALETTE: [&str; 5] = ["👍", "❤️", "😂", "😮", "🔥"];

/// A reader's reaction after a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReactionState {
    /// Whether the reader now has this reaction
    pub active: bool,
    /// Entry-wide count for the emoji
    pub count: u64,
}

/// Per-entry emoji counters plus a per-reader marker for each emoji
pub struct ReactionBoard {
    store: Arc<dyn PersistedStore>,
}

impl ReactionBoard {
    pub fn new(store: Arc<dyn PersistedStore>) -> Self {
        Self { store }
    }

    /// Add the reaction if the reader lacks it, remove it otherwise
    pub async fn toggle(&self, entry_id: &str, emoji: &str, uid: &str) -> Result<ReactionState> {
        if !PALETTE.contains(&emoji) {
            return Err(StorefrontError::validation(format!("'{emoji}' is not a reaction")));
        }

        let marker = path::reaction_by_user(entry_id, uid, emoji)?;
        let counter = path::reaction(entry_id, emoji)?;
        let active = self.store.get(&marker).await?.is_none();

        if active {
            self.store.set(&marker, json!(true)).await?;
        } else {
            self.store.remove(&marker).await?;
        }

        let step = move |current: Option<Value>| -> Option<Value> {
            let count = current.as_ref().and_then(Value::as_u64).unwrap_or(0);
            let next = if active { count + 1 } else { count.saturating_sub(1) };
            Some(json!(next))
        };
        let outcome = self.store.transact(&counter, &step).await?;
        let count = outcome.value().and_then(Value::as_u64).unwrap_or(0);

        debug!("Reaction {} on {} by {}: active={} count={}", emoji, entry_id, uid, active, count);
        Ok(ReactionState { active, count })
    }

    /// Count per emoji for an entry; emojis nobody used are absent
    pub async fn counts(&self, entry_id: &str) -> Result<BTreeMap<String, u64>> {
        let path = path::reactions(entry_id)?;
        let Some(Value::Object(counters)) = self.store.get(&path).await? else {
            return Ok(BTreeMap::new());
        };

        Ok(counters
            .into_iter()
            .filter_map(|(emoji, count)| match count.as_u64() {
                Some(0) => None,
                Some(n) => Some((emoji, n)),
                None => {
                    warn!("Ignoring non-numeric reaction count {} on {}", emoji, entry_id);
                    None
                }
            })
            .collect())
    }

    /// Emojis the reader currently has on an entry
    pub async fn reactions_of(&self, entry_id: &str, uid: &str) -> Result<BTreeSet<String>> {
        let path = path::reactions_by_user(entry_id, uid)?;
        Ok(match self.store.get(&path).await? {
            Some(Value::Object(markers)) => markers.into_iter().map(|(emoji, _)| emoji).collect(),
            _ => BTreeSet::new(),
        })
    }
}
