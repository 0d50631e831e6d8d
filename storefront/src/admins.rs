use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::error::Result;
use crate::store::{path, PersistedStore};

/// Admin records at `/blog/admins/{uid}`.
///
/// The hosted backend's rules decide who may write here; a refused write
/// surfaces as a permission error.
pub struct AdminRegistry {
    store: Arc<dyn PersistedStore>,
}

impl AdminRegistry {
    pub fn new(store: Arc<dyn PersistedStore>) -> Self {
        Self { store }
    }

    pub async fn claim(&self, uid: &str) -> Result<()> {
        self.store.set(&path::admin(uid)?, json!(true)).await?;
        info!("🔑 {} registered as admin", uid);
        Ok(())
    }

    pub async fn revoke(&self, uid: &str) -> Result<()> {
        self.store.remove(&path::admin(uid)?).await?;
        info!("🔒 Admin rights revoked for {}", uid);
        Ok(())
    }

    pub async fn is_admin(&self, uid: &str) -> Result<bool> {
        Ok(matches!(
            self.store.get(&path::admin(uid)?).await?,
            Some(Value::Bool(true))
        ))
    }
}
