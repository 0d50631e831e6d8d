use std::fs;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{BackendKind, PersistedStore, StorePath, TransactionOutcome};
use crate::error::{StoreError, StoreResult};

/// Client-scoped JSON tree, the stand-in for browser local storage.
///
/// Every write rebuilds the tree, checks the byte quota and, when a file is
/// attached, rewrites the file before the new tree becomes visible.
#[derive(Debug)]
pub struct LocalStore {
    tree: RwLock<Value>,
    file: Option<PathBuf>,
    quota_bytes: Option<usize>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            tree: RwLock::new(Value::Object(Map::new())),
            file: None,
            quota_bytes: None,
        }
    }

    /// Open a file-backed store, starting empty when the file does not exist yet
    pub fn open(file: impl Into<PathBuf>) -> StoreResult<Self> {
        let file = file.into();
        let tree = if file.exists() {
            let raw = fs::read(&file)?;
            let tree: Value = serde_json::from_slice(&raw)?;
            info!("Loaded local store from {}", file.display());
            normalize(tree)
        } else {
            debug!("No local store at {}, starting empty", file.display());
            Value::Null
        };

        Ok(Self {
            tree: RwLock::new(if tree.is_null() {
                Value::Object(Map::new())
            } else {
                tree
            }),
            file: Some(file),
            quota_bytes: None,
        })
    }

    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Bytes the tree occupies when serialized
    pub fn used_bytes(&self) -> StoreResult<usize> {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        Ok(serde_json::to_vec(&*tree)?.len())
    }

    pub fn read(&self, path: &StorePath) -> Option<Value> {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        lookup(&tree, path.segments()).cloned()
    }

    pub fn write(&self, path: &StorePath, value: Value) -> StoreResult<()> {
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = tree.clone();
        insert(&mut next, path.segments(), normalize(value));
        self.commit(&mut tree, next)
    }

    pub fn delete(&self, path: &StorePath) -> StoreResult<()> {
        self.write(path, Value::Null)
    }

    /// Read-modify-write under the tree lock
    pub fn update<F>(&self, path: &StorePath, update: F) -> StoreResult<TransactionOutcome>
    where
        F: FnOnce(Option<Value>) -> Option<Value>,
    {
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        let current = lookup(&tree, path.segments()).cloned();

        match update(current.clone()) {
            Some(value) => {
                let value = normalize(value);
                let mut next = tree.clone();
                insert(&mut next, path.segments(), value.clone());
                self.commit(&mut tree, next)?;
                Ok(TransactionOutcome::Committed(value))
            }
            None => Ok(TransactionOutcome::Aborted(current)),
        }
    }

    fn commit(&self, tree: &mut Value, mut next: Value) -> StoreResult<()> {
        if next.is_null() {
            next = Value::Object(Map::new());
        }

        let bytes = serde_json::to_vec(&next)?;
        if let Some(quota) = self.quota_bytes {
            if bytes.len() > quota {
                warn!("Local store quota exceeded: {} > {}", bytes.len(), quota);
                return Err(StoreError::QuotaExceeded {
                    used: bytes.len(),
                    quota,
                });
            }
        }

        if let Some(file) = &self.file {
            let tmp = file.with_extension("tmp");
            fs::write(&tmp, &bytes)?;
            fs::rename(&tmp, file)?;
        }

        *tree = next;
        Ok(())
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl PersistedStore for LocalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn get(&self, path: &StorePath) -> StoreResult<Option<Value>> {
        Ok(self.read(path))
    }

    async fn set(&self, path: &StorePath, value: Value) -> StoreResult<()> {
        self.write(path, value)
    }

    async fn remove(&self, path: &StorePath) -> StoreResult<()> {
        self.delete(path)
    }

    async fn transact(
        &self,
        path: &StorePath,
        update: &(dyn Fn(Option<Value>) -> Option<Value> + Send + Sync),
    ) -> StoreResult<TransactionOutcome> {
        self.update(path, update)
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Drop null members and empty objects, the way the hosted store never keeps them
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn lookup<'a>(node: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let found = segments
        .iter()
        .try_fold(node, |node, segment| node.as_object()?.get(segment))?;
    if is_empty(found) {
        None
    } else {
        Some(found)
    }
}

fn insert(node: &mut Value, segments: &[String], value: Value) {
    match segments.split_first() {
        None => *node = value,
        Some((head, rest)) => {
            if !node.is_object() {
                if value.is_null() {
                    return;
                }
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                let child = map.entry(head.clone()).or_insert(Value::Null);
                insert(child, rest, value);
                if is_empty(child) {
                    map.remove(head);
                }
            }
        }
    }
}
