use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, ETAG, IF_MATCH};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::transaction::{compare_and_update, Versioned, VersionedStore};
use super::{
    BackendKind, ChangeCallback, ChangeEvent, ChangeKind, PersistedStore, StorePath,
    Subscription, TransactionOutcome,
};
use crate::config::HostedConfig;
use crate::error::{StoreError, StoreResult};

const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";

/// REST client for the hosted realtime document store.
///
/// Every path maps to `{base}/{path}.json`; the auth token, when present, is
/// sent as the `auth` query parameter.
pub struct HostedStore {
    config: HostedConfig,
    base_url: Url,
    client: Client,
    stream_client: Client,
}

impl HostedStore {
    pub fn new(config: HostedConfig) -> StoreResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            StoreError::invalid_path(&config.base_url, format!("invalid database url: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::invalid_path(
                &config.base_url,
                "database url cannot be a base",
            ));
        }

        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = Client::builder().timeout(timeout).build()?;
        // event streams stay open indefinitely, only bound the connect phase
        let stream_client = Client::builder().connect_timeout(timeout).build()?;

        Ok(Self {
            config,
            base_url,
            client,
            stream_client,
        })
    }

    fn url(&self, path: &StorePath) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StoreError::invalid_path(&self.config.base_url, "database url cannot be a base")
            })?;
            segments.pop_if_empty();
            match path.segments().split_last() {
                None => {
                    segments.push(".json");
                }
                Some((last, parents)) => {
                    segments.extend(parents);
                    segments.push(&format!("{last}.json"));
                }
            }
        }
        if let Some(token) = &self.config.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    async fn check(&self, path: &StorePath, response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!("🔒 Hosted backend denied access to {}", path);
            return Err(StoreError::PermissionDenied {
                path: path.to_string(),
            });
        }
        let message = response.text().await.unwrap_or_default();
        error!("❌ Hosted backend returned {} for {}", status, path);
        Err(StoreError::Backend {
            status: status.as_u16(),
            message,
        })
    }

    fn etag_of(response: &Response) -> StoreResult<String> {
        response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Backend {
                status: response.status().as_u16(),
                message: "response carried no ETag".to_string(),
            })
    }
}

fn present(value: Value) -> Option<Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

#[async_trait]
impl PersistedStore for HostedStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Hosted
    }

    async fn get(&self, path: &StorePath) -> StoreResult<Option<Value>> {
        let response = self.client.get(self.url(path)?).send().await?;
        let response = self.check(path, response).await?;
        let value: Value = response.json().await?;
        Ok(present(value))
    }

    async fn set(&self, path: &StorePath, value: Value) -> StoreResult<()> {
        let response = self.client.put(self.url(path)?).json(&value).send().await?;
        self.check(path, response).await?;
        debug!("PUT {}", path);
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> StoreResult<()> {
        let response = self.client.delete(self.url(path)?).send().await?;
        self.check(path, response).await?;
        debug!("DELETE {}", path);
        Ok(())
    }

    async fn transact(
        &self,
        path: &StorePath,
        update: &(dyn Fn(Option<Value>) -> Option<Value> + Send + Sync),
    ) -> StoreResult<TransactionOutcome> {
        compare_and_update(self, path, update, &self.config.transaction_retry).await
    }

    async fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> StoreResult<Subscription> {
        let response = self
            .stream_client
            .get(self.url(path)?)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = self.check(path, response).await?;

        let watched = path.clone();
        let handle = tokio::spawn(async move {
            info!("📡 Watching {}", watched);
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        error!("Event stream for {} failed: {}", watched, e);
                        return;
                    }
                };
                buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

                while let Some(end) = buffer.windows(2).position(|w| w == b"\n\n") {
                    let frame: Vec<u8> = buffer.drain(..end + 2).collect();
                    match parse_sse_frame(&String::from_utf8_lossy(&frame)) {
                        Some(SseFrame::Change(event)) => on_change(event),
                        Some(SseFrame::KeepAlive) | None => {}
                        Some(SseFrame::Closed(reason)) => {
                            warn!("Event stream for {} closed by server: {}", watched, reason);
                            return;
                        }
                    }
                }
            }
            debug!("Event stream for {} ended", watched);
        });

        Ok(Subscription::new(path.clone(), handle))
    }
}

#[async_trait]
impl VersionedStore for HostedStore {
    async fn read_versioned(&self, path: &StorePath) -> StoreResult<Versioned> {
        let response = self
            .client
            .get(self.url(path)?)
            .header(ETAG_REQUEST_HEADER, "true")
            .send()
            .await?;
        let response = self.check(path, response).await?;
        let version = Self::etag_of(&response)?;
        let value: Value = response.json().await?;
        Ok(Versioned {
            value: present(value),
            version,
        })
    }

    async fn write_if_match(
        &self,
        path: &StorePath,
        value: &Value,
        version: &str,
    ) -> StoreResult<Option<Versioned>> {
        let response = self
            .client
            .put(self.url(path)?)
            .header(IF_MATCH, version)
            .json(value)
            .send()
            .await?;

        if response.status() == StatusCode::PRECONDITION_FAILED {
            let version = Self::etag_of(&response)?;
            let latest: Value = response.json().await?;
            return Ok(Some(Versioned {
                value: present(latest),
                version,
            }));
        }

        self.check(path, response).await?;
        Ok(None)
    }
}

impl std::fmt::Debug for HostedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedStore")
            .field("base_url", &self.config.base_url)
            .field("transaction_retry", &self.config.transaction_retry)
            .finish()
    }
}

/// One decoded server-sent event
#[derive(Debug, Clone, PartialEq)]
enum SseFrame {
    Change(ChangeEvent),
    KeepAlive,
    Closed(String),
}

#[derive(Deserialize)]
struct SsePayload {
    path: String,
    data: Value,
}

fn parse_sse_frame(frame: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.trim_start());
        }
    }

    let kind = match event? {
        "put" => ChangeKind::Put,
        "patch" => ChangeKind::Patch,
        "keep-alive" => return Some(SseFrame::KeepAlive),
        reason @ ("cancel" | "auth_revoked") => return Some(SseFrame::Closed(reason.to_string())),
        other => {
            debug!("Ignoring unknown event type {}", other);
            return None;
        }
    };

    let payload: SsePayload = match serde_json::from_str(&data.join("\n")) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Malformed event payload: {}", e);
            return None;
        }
    };

    Some(SseFrame::Change(ChangeEvent {
        kind,
        path: payload.path,
        data: payload.data,
    }))
}
