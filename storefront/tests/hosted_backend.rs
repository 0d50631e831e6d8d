//! Hosted backend tests against an in-process fake of the realtime database REST API.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{json, Value};

use storefront::store::{path, ChangeKind, FallbackStore, HostedStore, TransactionOutcome};
use storefront::{
    BackendKind, CommentLimits, CommentRepository, HostedConfig, Identity, LocalStore,
    ManualClock, PersistedStore, RetryPolicy, SessionContext, StoreError, StorePath, Storefront,
    StorefrontConfig, VoteStatus,
};

#[derive(Clone, Default)]
struct FakeDb {
    tree: Arc<LocalStore>,
    write_lock: Arc<Mutex<()>>,
    /// Conditional writes to reject before honoring If-Match
    forced_conflicts: Arc<AtomicU32>,
    conditional_writes: Arc<AtomicU32>,
    required_token: Option<String>,
}

fn etag(value: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    format!("\"{:x}\"", hasher.finish())
}

async fn handle(
    State(db): State<FakeDb>,
    method: Method,
    Path(raw): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(token) = &db.required_token {
        if query.get("auth") != Some(token) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Permission denied"})))
                .into_response();
        }
    }

    let Some(path) = raw.strip_suffix(".json").and_then(|p| StorePath::parse(p).ok()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let current = db.tree.read(&path).unwrap_or(Value::Null);

    match method {
        Method::GET if headers.get(header::ACCEPT).is_some_and(|v| v == "text/event-stream") => {
            let frame = format!(
                "event: keep-alive\ndata: null\n\nevent: put\ndata: {}\n\n",
                json!({"path": "/", "data": current})
            );
            ([(header::CONTENT_TYPE, "text/event-stream")], frame).into_response()
        }
        Method::GET => {
            if headers.contains_key("x-firebase-etag") {
                ([(header::ETAG, etag(&current))], Json(current)).into_response()
            } else {
                Json(current).into_response()
            }
        }
        Method::PUT => {
            let Ok(value) = serde_json::from_slice::<Value>(&body) else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            let _guard = db.write_lock.lock().unwrap();
            let current = db.tree.read(&path).unwrap_or(Value::Null);

            if let Some(expected) = headers.get(header::IF_MATCH) {
                db.conditional_writes.fetch_add(1, Ordering::SeqCst);
                let forced = db
                    .forced_conflicts
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if forced || expected.to_str().ok() != Some(etag(&current).as_str()) {
                    return (
                        StatusCode::PRECONDITION_FAILED,
                        [(header::ETAG, etag(&current))],
                        Json(current),
                    )
                        .into_response();
                }
            }

            db.tree.write(&path, value.clone()).unwrap();
            Json(value).into_response()
        }
        Method::DELETE => {
            let _guard = db.write_lock.lock().unwrap();
            db.tree.delete(&path).unwrap();
            Json(Value::Null).into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn serve(db: FakeDb) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/{*path}", any(handle)).with_state(db);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn hosted_config(base_url: String, max_attempts: u32) -> HostedConfig {
    let mut config = HostedConfig::new(base_url);
    config.request_timeout_ms = 5_000;
    config.transaction_retry = RetryPolicy {
        max_attempts,
        base_backoff_ms: 1,
    };
    config
}

fn increment(current: Option<Value>) -> Option<Value> {
    Some(json!(current.and_then(|v| v.as_u64()).unwrap_or(0) + 1))
}

#[tokio::test]
async fn test_crud_round_trip() {
    let db = FakeDb::default();
    let store = HostedStore::new(hosted_config(serve(db.clone()).await, 5)).unwrap();
    let favorite = path::favorite("post-1", "u1").unwrap();

    assert_eq!(store.get(&favorite).await.unwrap(), None);
    store.set(&favorite, json!(true)).await.unwrap();
    assert_eq!(store.get(&favorite).await.unwrap(), Some(json!(true)));
    assert_eq!(db.tree.read(&favorite), Some(json!(true)));

    let parent = path::favorites("post-1").unwrap();
    assert_eq!(store.get(&parent).await.unwrap(), Some(json!({"u1": true})));

    store.remove(&favorite).await.unwrap();
    assert_eq!(store.get(&favorite).await.unwrap(), None);
}

#[tokio::test]
async fn test_transact_retries_after_conflicts() {
    let db = FakeDb::default();
    db.forced_conflicts.store(2, Ordering::SeqCst);
    let store = HostedStore::new(hosted_config(serve(db.clone()).await, 5)).unwrap();
    let counter = path::reaction("post-1", "🔥").unwrap();
    db.tree.write(&counter, json!(5)).unwrap();

    let outcome = store.transact(&counter, &increment).await.unwrap();
    assert_eq!(outcome, TransactionOutcome::Committed(json!(6)));
    assert_eq!(db.conditional_writes.load(Ordering::SeqCst), 3);
    assert_eq!(db.tree.read(&counter), Some(json!(6)));
}

#[tokio::test]
async fn test_transact_reports_contention() {
    let db = FakeDb::default();
    db.forced_conflicts.store(u32::MAX, Ordering::SeqCst);
    let store = HostedStore::new(hosted_config(serve(db.clone()).await, 3)).unwrap();
    let counter = path::reaction("post-1", "👍").unwrap();

    let result = store.transact(&counter, &increment).await;
    assert!(matches!(result, Err(StoreError::Contention { attempts: 3, .. })));
    assert_eq!(db.tree.read(&counter), None);
}

#[tokio::test]
async fn test_concurrent_votes_converge() {
    let db = FakeDb::default();
    let hosted = HostedStore::new(hosted_config(serve(db.clone()).await, 25)).unwrap();
    let store: Arc<dyn PersistedStore> = Arc::new(hosted);
    let session = SessionContext::anonymous("client-ana").with_identity(Identity::new("ana"));

    let repo = Arc::new(CommentRepository::new(
        store,
        Arc::new(LocalStore::in_memory()),
        Arc::new(session),
        Arc::new(ManualClock::new(1_700_000_000_000)),
        CommentLimits::default(),
    ));
    let comment = repo.submit("post-1", "Ana", "busy thread").await.unwrap();

    let voters: Vec<_> = (0..8)
        .map(|i| {
            let repo = repo.clone();
            let id = comment.id.clone();
            tokio::spawn(async move { repo.vote("post-1", &id, &format!("voter-{i}")).await })
        })
        .collect();
    for voter in voters {
        assert_eq!(voter.await.unwrap().unwrap().status, VoteStatus::Counted);
    }

    let stored = repo.get("post-1", &comment.id).await.unwrap().unwrap();
    assert_eq!(stored.votes, 8);
    assert_eq!(stored.voted_by.len(), 8);
}

#[tokio::test]
async fn test_permission_denied_is_not_masked() {
    let db = FakeDb {
        required_token: Some("s3cret".to_string()),
        ..FakeDb::default()
    };
    let hosted = HostedStore::new(hosted_config(serve(db.clone()).await, 3)).unwrap();
    let local = Arc::new(LocalStore::in_memory());
    let store = FallbackStore::new(Arc::new(hosted), local.clone());
    let admin = path::admin("u1").unwrap();

    let result = store.set(&admin, json!(true)).await;
    assert!(matches!(result, Err(StoreError::PermissionDenied { .. })));
    assert!(!store.is_degraded());
    assert_eq!(local.read(&admin), None);
}

#[tokio::test]
async fn test_subscription_delivers_changes() {
    let db = FakeDb::default();
    let store = HostedStore::new(hosted_config(serve(db.clone()).await, 3)).unwrap();
    let counter = path::reaction("post-1", "😮").unwrap();
    db.tree.write(&counter, json!(4)).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let subscription = store
        .subscribe(&counter, Arc::new(move |event| {
            let _ = tx.send(event);
        }))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, ChangeKind::Put);
    assert_eq!(event.path, "/");
    assert_eq!(event.data, json!(4));
    assert_eq!(subscription.path(), &counter);
}

#[tokio::test]
async fn test_unreachable_backend_falls_back_locally() {
    let mut config = StorefrontConfig::default();
    // nothing listens on the discard port
    config.hosted = Some(hosted_config("http://127.0.0.1:9".to_string(), 3));
    let session = SessionContext::anonymous("client-ana")
        .with_identity(Identity::new("ana"))
        .with_display_name("Ana");

    let shop = Storefront::open(config, session).await.unwrap();
    assert_eq!(shop.backend_kind(), BackendKind::Hosted);

    let comment = shop.comment("post-1", "still works offline").await.unwrap();
    assert!(shop.is_degraded());

    let listed = shop.comments().list_by_entry("post-1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, comment.id);
}
