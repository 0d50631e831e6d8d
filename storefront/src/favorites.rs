use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;
use crate::store::{path, PersistedStore};

/// Per-entry, per-reader favorite flags
pub struct Favorites {
    store: Arc<dyn PersistedStore>,
}

impl Favorites {
    pub fn new(store: Arc<dyn PersistedStore>) -> Self {
        Self { store }
    }

    /// Flip the flag and return the new state
    pub async fn toggle(&self, entry_id: &str, uid: &str) -> Result<bool> {
        let path = path::favorite(entry_id, uid)?;
        let favorite = !self.is_favorite(entry_id, uid).await?;
        if favorite {
            self.store.set(&path, json!(true)).await?;
        } else {
            self.store.remove(&path).await?;
        }
        debug!("Favorite {} for {}: {}", entry_id, uid, favorite);
        Ok(favorite)
    }

    pub async fn is_favorite(&self, entry_id: &str, uid: &str) -> Result<bool> {
        let path = path::favorite(entry_id, uid)?;
        Ok(matches!(self.store.get(&path).await?, Some(Value::Bool(true))))
    }

    /// Readers who favorited the entry
    pub async fn count(&self, entry_id: &str) -> Result<usize> {
        let path = path::favorites(entry_id)?;
        Ok(match self.store.get(&path).await? {
            Some(Value::Object(flags)) => flags.values().filter(|v| **v == Value::Bool(true)).count(),
            _ => 0,
        })
    }
}
