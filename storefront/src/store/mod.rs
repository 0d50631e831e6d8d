//! # Persisted store adapter
//!
//! One capability interface, [`PersistedStore`], with two implementations picked
//! once at startup:
//!
//! - [`LocalStore`]: synchronous JSON tree scoped to this client, optionally
//!   mirrored to a file. Last write wins; `transact` is a read-modify-write.
//! - [`HostedStore`]: REST client for the hosted realtime document store.
//!   `transact` is an optimistic compare-and-update with bounded retries and
//!   `subscribe` follows the server-sent event stream.
//!
//! The hosted store is wrapped in a [`FallbackStore`] so transient network
//! failures land on the local tree instead of failing the user action.

pub mod fallback;
pub mod hosted;
pub mod local;
pub mod path;
pub mod transaction;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::StorefrontConfig;
use crate::error::{StoreError, StoreResult};
use crate::session::SessionContext;

pub use fallback::FallbackStore;
pub use hosted::HostedStore;
pub use local::LocalStore;
pub use path::StorePath;
pub use transaction::{compare_and_update, Versioned, VersionedStore};

/// Which backend serves a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Hosted,
}

impl BackendKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Hosted => "hosted",
        }
    }
}

/// Result of a `transact` call
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    /// The update function produced this value and it was written
    Committed(Value),
    /// The update function declined; carries the value it was shown
    Aborted(Option<Value>),
}

impl TransactionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// Value at the path after the transaction
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Committed(value) => Some(value),
            Self::Aborted(current) => current.as_ref(),
        }
    }
}

/// How a watched location changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Data at `path` was replaced
    Put,
    /// Children of `path` were merged
    Patch,
}

/// Notification delivered to `subscribe` callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Location relative to the subscribed path, `/` for the path itself
    pub path: String,
    pub data: Value,
}

/// Callback invoked for each change on a subscribed path
pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Live subscription; dropping it stops delivery
#[derive(Debug)]
pub struct Subscription {
    path: StorePath,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(path: StorePath, handle: JoinHandle<()>) -> Self {
        Self {
            path,
            handle: Some(handle),
        }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop delivering changes
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Subscription on {} cancelled", self.path);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Uniform access to a JSON document tree
#[async_trait]
pub trait PersistedStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Value at `path`, `None` when absent
    async fn get(&self, path: &StorePath) -> StoreResult<Option<Value>>;

    /// Replace the value at `path`; writing `null` removes it
    async fn set(&self, path: &StorePath, value: Value) -> StoreResult<()>;

    async fn remove(&self, path: &StorePath) -> StoreResult<()>;

    /// Apply `update` to the current value and write the result.
    ///
    /// Returning `None` from `update` aborts without writing. The function may
    /// be called more than once and must not have side effects.
    async fn transact(
        &self,
        path: &StorePath,
        update: &(dyn Fn(Option<Value>) -> Option<Value> + Send + Sync),
    ) -> StoreResult<TransactionOutcome>;

    /// Watch `path` for changes
    async fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> StoreResult<Subscription> {
        let _ = (path, on_change);
        Err(StoreError::Unsupported {
            operation: "subscribe",
            backend: self.kind().as_str(),
        })
    }

    /// Whether writes have been landing on a stand-in backend
    fn is_degraded(&self) -> bool {
        false
    }
}

/// Read and decode the value at `path`
pub async fn read_as<T: DeserializeOwned>(
    store: &dyn PersistedStore,
    path: &StorePath,
) -> StoreResult<Option<T>> {
    match store.get(path).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode and write `value` at `path`
pub async fn write_as<T: Serialize + ?Sized + Sync>(
    store: &dyn PersistedStore,
    path: &StorePath,
    value: &T,
) -> StoreResult<()> {
    store.set(path, serde_json::to_value(value)?).await
}

/// Pick the backend for this session.
///
/// Hosted (with local fallback) when a hosted database is configured and the
/// session carries an authenticated identity, otherwise the local store.
pub fn select_backend(
    config: &StorefrontConfig,
    session: &SessionContext,
    local: Arc<LocalStore>,
) -> StoreResult<Arc<dyn PersistedStore>> {
    match (&config.hosted, session.identity()) {
        (Some(hosted_config), Some(identity)) => {
            let mut hosted_config = hosted_config.clone();
            if let Some(token) = &identity.id_token {
                hosted_config.auth_token = Some(token.clone());
            }
            let hosted = HostedStore::new(hosted_config)?;
            info!("🌐 Using hosted backend for {}", identity.uid);
            let store: Arc<dyn PersistedStore> =
                Arc::new(FallbackStore::new(Arc::new(hosted), local));
            Ok(store)
        }
        (Some(_), None) => {
            info!("💾 No authenticated identity, using local backend");
            Ok(local as Arc<dyn PersistedStore>)
        }
        (None, _) => {
            info!("💾 No hosted backend configured, using local backend");
            Ok(local as Arc<dyn PersistedStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostedConfig;
    use crate::session::Identity;
    use serde_json::json;

    #[test]
    fn test_select_backend() {
        let local = Arc::new(LocalStore::in_memory());
        let mut config = StorefrontConfig::default();

        let anonymous = SessionContext::anonymous("c1");
        let store = select_backend(&config, &anonymous, local.clone()).unwrap();
        assert_eq!(store.kind(), BackendKind::Local);

        config.hosted = Some(HostedConfig::new("http://127.0.0.1:9"));
        let store = select_backend(&config, &anonymous, local.clone()).unwrap();
        assert_eq!(store.kind(), BackendKind::Local);

        let signed_in = anonymous.with_identity(Identity::new("u1"));
        let store = select_backend(&config, &signed_in, local).unwrap();
        assert_eq!(store.kind(), BackendKind::Hosted);
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let store = LocalStore::in_memory();
        let path = path::client_key("theme").unwrap();

        write_as(&store, &path, "dark").await.unwrap();
        let theme: Option<String> = read_as(&store, &path).await.unwrap();
        assert_eq!(theme.as_deref(), Some("dark"));

        let outcome = TransactionOutcome::Aborted(Some(json!(1)));
        assert!(!outcome.is_committed());
        assert_eq!(outcome.value(), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_local_subscribe_unsupported() {
        let store = LocalStore::in_memory();
        let result = store
            .subscribe(&StorePath::root(), Arc::new(|_event| {}))
            .await;
        assert!(matches!(result, Err(StoreError::Unsupported { .. })));
    }
}
