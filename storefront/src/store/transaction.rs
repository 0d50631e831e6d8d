use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{StorePath, TransactionOutcome};
use crate::config::RetryPolicy;
use crate::error::{StoreError, StoreResult};

/// A value together with the version tag it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub value: Option<Value>,
    pub version: String,
}

/// Backend that can read with a version tag and write only if it still matches
#[async_trait]
pub trait VersionedStore: Send + Sync {
    async fn read_versioned(&self, path: &StorePath) -> StoreResult<Versioned>;

    /// Write `value` if the stored version is still `version`.
    ///
    /// `Ok(None)` means committed, `Ok(Some(latest))` means another writer got
    /// there first and `latest` is what is stored now.
    async fn write_if_match(
        &self,
        path: &StorePath,
        value: &Value,
        version: &str,
    ) -> StoreResult<Option<Versioned>>;
}

/// Optimistic compare-and-update with a bounded number of attempts.
///
/// The update function is re-applied to the freshest value after every
/// conflict. Running out of attempts is reported as [`StoreError::Contention`].
pub async fn compare_and_update<S>(
    store: &S,
    path: &StorePath,
    update: &(dyn Fn(Option<Value>) -> Option<Value> + Send + Sync),
    policy: &RetryPolicy,
) -> StoreResult<TransactionOutcome>
where
    S: VersionedStore + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut snapshot = store.read_versioned(path).await?;

    for attempt in 1..=max_attempts {
        let Some(next) = update(snapshot.value.clone()) else {
            debug!("Transaction on {} aborted by update function", path);
            return Ok(TransactionOutcome::Aborted(snapshot.value));
        };

        match store.write_if_match(path, &next, &snapshot.version).await? {
            None => {
                debug!("Transaction on {} committed on attempt {}", path, attempt);
                return Ok(TransactionOutcome::Committed(next));
            }
            Some(latest) => {
                debug!(
                    "Transaction on {} hit a conflict on attempt {}/{}",
                    path, attempt, max_attempts
                );
                snapshot = latest;
                if attempt < max_attempts {
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }

    warn!(
        "Transaction on {} gave up after {} attempts",
        path, max_attempts
    );
    Err(StoreError::Contention {
        path: path.to_string(),
        attempts: max_attempts,
    })
}
