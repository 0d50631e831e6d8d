use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{
    BackendKind, ChangeCallback, LocalStore, PersistedStore, StorePath, Subscription,
    TransactionOutcome,
};
use crate::error::{StoreError, StoreResult};

/// Routes every call to the primary backend and lands on the local tree when
/// the primary fails with a recoverable error.
///
/// Nothing written to the local tree while degraded is ever copied back.
pub struct FallbackStore {
    primary: Arc<dyn PersistedStore>,
    local: Arc<LocalStore>,
    degraded: AtomicBool,
}

impl FallbackStore {
    pub fn new(primary: Arc<dyn PersistedStore>, local: Arc<LocalStore>) -> Self {
        Self {
            primary,
            local,
            degraded: AtomicBool::new(false),
        }
    }

    fn fall_back(&self, operation: &str, path: &StorePath, error: &StoreError) {
        warn!(
            "⚠️  {} on {} failed against {} backend, using local: {}",
            operation,
            path,
            self.primary.kind().as_str(),
            error
        );
        self.degraded.store(true, Ordering::SeqCst);
    }

    fn recovered(&self) {
        self.degraded.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistedStore for FallbackStore {
    fn kind(&self) -> BackendKind {
        self.primary.kind()
    }

    async fn get(&self, path: &StorePath) -> StoreResult<Option<Value>> {
        match self.primary.get(path).await {
            Ok(value) => {
                self.recovered();
                Ok(value)
            }
            Err(e) if e.is_recoverable() => {
                self.fall_back("get", path, &e);
                self.local.get(path).await
            }
            Err(e) => Err(e),
        }
    }

    async fn set(&self, path: &StorePath, value: Value) -> StoreResult<()> {
        match self.primary.set(path, value.clone()).await {
            Ok(()) => {
                self.recovered();
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                self.fall_back("set", path, &e);
                self.local.set(path, value).await
            }
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, path: &StorePath) -> StoreResult<()> {
        match self.primary.remove(path).await {
            Ok(()) => {
                self.recovered();
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                self.fall_back("remove", path, &e);
                self.local.remove(path).await
            }
            Err(e) => Err(e),
        }
    }

    async fn transact(
        &self,
        path: &StorePath,
        update: &(dyn Fn(Option<Value>) -> Option<Value> + Send + Sync),
    ) -> StoreResult<TransactionOutcome> {
        match self.primary.transact(path, update).await {
            Ok(outcome) => {
                self.recovered();
                Ok(outcome)
            }
            Err(e) if e.is_recoverable() => {
                self.fall_back("transact", path, &e);
                self.local.transact(path, update).await
            }
            Err(e) => Err(e),
        }
    }

    async fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> StoreResult<Subscription> {
        self.primary.subscribe(path, on_change).await
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }
}
