use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::comment::{validate_draft, Comment, VoteStatus};
use crate::config::CommentLimits;
use crate::error::{Result, StorefrontError};
use crate::session::SessionContext;
use crate::store::{
    path, read_as, write_as, ChangeCallback, LocalStore, PersistedStore, StorePath, Subscription,
    TransactionOutcome,
};

const LAST_COMMENT_KEY: &str = "lastCommentTime";

/// Result of a vote request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    /// Vote count after the request
    pub votes: u32,
    pub status: VoteStatus,
}

/// Aggregates for one entry on the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryStats {
    pub comments: usize,
    pub votes: u64,
    pub highlighted: usize,
    pub latest_timestamp: Option<i64>,
}

/// Admin dashboard view over every stored comment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommentOverview {
    pub entries: BTreeMap<String, EntryStats>,
    pub total_comments: usize,
    pub total_votes: u64,
    pub highlighted: usize,
}

/// Comments keyed by (entry id, comment id) on the selected backend
pub struct CommentRepository {
    store: Arc<dyn PersistedStore>,
    client_state: Arc<LocalStore>,
    session: Arc<SessionContext>,
    clock: Arc<dyn Clock>,
    limits: CommentLimits,
}

impl CommentRepository {
    /// `client_state` holds the per-client anti-spam timestamp whatever backend `store` is
    pub fn new(
        store: Arc<dyn PersistedStore>,
        client_state: Arc<LocalStore>,
        session: Arc<SessionContext>,
        clock: Arc<dyn Clock>,
        limits: CommentLimits,
    ) -> Self {
        Self {
            store,
            client_state,
            session,
            clock,
            limits,
        }
    }

    /// Create a comment authored by the session's identity.
    ///
    /// Validation and the anti-spam interval are checked before anything is written.
    pub async fn submit(&self, entry_id: &str, name: &str, text: &str) -> Result<Comment> {
        let draft = validate_draft(name, text, &self.limits)?;
        let entry_path = path::entry_comments(entry_id)?;

        let now = self.clock.now_ms();
        let last_path = path::client_key(LAST_COMMENT_KEY)?;
        if let Some(last) = self.client_state.read(&last_path).and_then(|v| v.as_i64()) {
            let elapsed = now - last;
            if elapsed < 0 {
                debug!("Clock moved back {}ms since the last comment, not throttling", -elapsed);
            } else if elapsed <= self.limits.min_interval_ms {
                debug!("Comment rejected, only {}ms since the last one", elapsed);
                return Err(StorefrontError::RateLimited {
                    retry_after_ms: self.limits.min_interval_ms - elapsed + 1,
                });
            }
        }

        let comment = Comment::new(
            entry_id,
            draft,
            self.session.identity().map(|i| i.uid.clone()),
            self.session.is_admin(),
            now,
        );
        write_as(self.store.as_ref(), &entry_path.child(&comment.id)?, &comment).await?;
        self.client_state.write(&last_path, json!(now))?;
        if comment.owner_id.is_none() {
            let marker = path::authored_comment(entry_id, &comment.id)?;
            self.client_state.write(&marker, json!(true))?;
        }

        info!("💬 Comment {} added to entry {} by {}", comment.id, entry_id, comment.name);
        Ok(comment)
    }

    /// Count a vote from `voter_id`.
    ///
    /// Authors cannot vote on their own comment and nobody votes twice; both
    /// cases leave the comment untouched and report the current count.
    /// Comments this client posted anonymously carry no owner, so they are
    /// recognized through the client-local authored marker instead.
    pub async fn vote(
        &self,
        entry_id: &str,
        comment_id: &str,
        voter_id: &str,
    ) -> Result<VoteOutcome> {
        let path = path::comment(entry_id, comment_id)?;
        if self.authored_by_this_client(entry_id, comment_id, voter_id)? {
            let comment: Comment = read_as(self.store.as_ref(), &path)
                .await?
                .ok_or_else(|| not_found(entry_id, comment_id))?;
            debug!("Vote on {} ignored: posted by this client", comment_id);
            return Ok(VoteOutcome {
                votes: comment.votes,
                status: VoteStatus::OwnComment,
            });
        }

        let voter = voter_id.to_string();
        let update = move |current: Option<Value>| -> Option<Value> {
            let mut comment: Comment = serde_json::from_value(current?).ok()?;
            if comment.apply_vote(&voter) != VoteStatus::Counted {
                return None;
            }
            serde_json::to_value(&comment).ok()
        };

        match self.store.transact(&path, &update).await? {
            TransactionOutcome::Committed(value) => {
                let comment: Comment = serde_json::from_value(value)?;
                info!("👍 Vote on {} counted, now {}", comment_id, comment.votes);
                Ok(VoteOutcome {
                    votes: comment.votes,
                    status: VoteStatus::Counted,
                })
            }
            TransactionOutcome::Aborted(Some(value)) => {
                let comment: Comment = serde_json::from_value(value)?;
                let status = comment.vote_status(voter_id);
                debug!("Vote on {} ignored: {:?}", comment_id, status);
                Ok(VoteOutcome {
                    votes: comment.votes,
                    status,
                })
            }
            TransactionOutcome::Aborted(None) => Err(not_found(entry_id, comment_id)),
        }
    }

    /// Promote or demote a comment; admin sessions only
    pub async fn set_highlighted(&self, entry_id: &str, comment_id: &str, flag: bool) -> Result<()> {
        self.session.require_admin("highlight comments")?;
        let path = path::comment(entry_id, comment_id)?;
        let update = move |current: Option<Value>| -> Option<Value> {
            let mut comment: Comment = serde_json::from_value(current?).ok()?;
            comment.is_highlighted = flag;
            serde_json::to_value(&comment).ok()
        };

        match self.store.transact(&path, &update).await? {
            TransactionOutcome::Committed(_) => {
                info!("⭐ Comment {} highlighted: {}", comment_id, flag);
                Ok(())
            }
            TransactionOutcome::Aborted(Some(_)) => Err(StorefrontError::validation(format!(
                "comment {comment_id} on {entry_id} is malformed"
            ))),
            TransactionOutcome::Aborted(None) => Err(not_found(entry_id, comment_id)),
        }
    }

    /// Hard delete; admin sessions only
    pub async fn delete(&self, entry_id: &str, comment_id: &str) -> Result<()> {
        self.session.require_admin("delete comments")?;
        let path = self.existing(entry_id, comment_id).await?;
        self.store.remove(&path).await?;
        info!("🗑️ Comment {} deleted from entry {}", comment_id, entry_id);
        Ok(())
    }

    pub async fn get(&self, entry_id: &str, comment_id: &str) -> Result<Option<Comment>> {
        let path = path::comment(entry_id, comment_id)?;
        Ok(read_as(self.store.as_ref(), &path).await?)
    }

    /// All comments of one entry, in storage order
    pub async fn list_by_entry(&self, entry_id: &str) -> Result<Vec<Comment>> {
        let path = path::entry_comments(entry_id)?;
        Ok(match self.store.get(&path).await? {
            Some(value) => decode_comments(&path, value),
            None => Vec::new(),
        })
    }

    /// Every comment across all entries
    pub async fn list_all(&self) -> Result<Vec<Comment>> {
        let root = path::comments_root()?;
        let Some(Value::Object(entries)) = self.store.get(&root).await? else {
            return Ok(Vec::new());
        };

        let mut comments = Vec::new();
        for (entry_id, value) in entries {
            let entry_path = root.child(&entry_id)?;
            comments.extend(decode_comments(&entry_path, value));
        }
        Ok(comments)
    }

    pub async fn overview(&self) -> Result<CommentOverview> {
        let mut overview = CommentOverview::default();
        for comment in self.list_all().await? {
            let stats = overview.entries.entry(comment.entry_id.clone()).or_default();
            stats.comments += 1;
            stats.votes += u64::from(comment.votes);
            if comment.is_highlighted {
                stats.highlighted += 1;
            }
            stats.latest_timestamp = stats.latest_timestamp.max(Some(comment.timestamp));

            overview.total_comments += 1;
            overview.total_votes += u64::from(comment.votes);
            if comment.is_highlighted {
                overview.highlighted += 1;
            }
        }
        Ok(overview)
    }

    /// Follow live changes to an entry's comments (hosted backend only)
    pub async fn watch_entry(&self, entry_id: &str, on_change: ChangeCallback) -> Result<Subscription> {
        let path = path::entry_comments(entry_id)?;
        Ok(self.store.subscribe(&path, on_change).await?)
    }

    fn authored_by_this_client(&self, entry_id: &str, comment_id: &str, voter_id: &str) -> Result<bool> {
        if voter_id != self.session.client_id() && voter_id != self.session.actor_id() {
            return Ok(false);
        }
        let marker = path::authored_comment(entry_id, comment_id)?;
        Ok(self.client_state.read(&marker) == Some(Value::Bool(true)))
    }

    async fn existing(&self, entry_id: &str, comment_id: &str) -> Result<StorePath> {
        let path = path::comment(entry_id, comment_id)?;
        match self.store.get(&path).await? {
            Some(_) => Ok(path),
            None => Err(not_found(entry_id, comment_id)),
        }
    }
}

fn not_found(entry_id: &str, comment_id: &str) -> StorefrontError {
    StorefrontError::CommentNotFound {
        entry_id: entry_id.to_string(),
        comment_id: comment_id.to_string(),
    }
}

fn decode_comments(path: &StorePath, value: Value) -> Vec<Comment> {
    let Value::Object(records) = value else {
        warn!("Expected an object of comments at {}", path);
        return Vec::new();
    };

    records
        .into_iter()
        .filter_map(|(id, record)| match serde_json::from_value::<Comment>(record) {
            Ok(comment) => Some(comment),
            Err(e) => {
                warn!("Skipping malformed comment {} at {}: {}", id, path, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::Identity;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    struct Fixture {
        store: Arc<LocalStore>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(LocalStore::in_memory()),
                clock: Arc::new(ManualClock::new(1_700_000_000_000)),
            }
        }

        /// Repository for a distinct client sharing the same comment store
        fn repo(&self, session: SessionContext) -> CommentRepository {
            CommentRepository::new(
                self.store.clone(),
                Arc::new(LocalStore::in_memory()),
                Arc::new(session),
                self.clock.clone(),
                CommentLimits::default(),
            )
        }
    }

    fn reader(uid: &str) -> SessionContext {
        SessionContext::anonymous(format!("client-{uid}")).with_identity(Identity::new(uid))
    }

    #[tokio::test]
    async fn test_submit_then_list() {
        let fx = Fixture::new();
        let repo = fx.repo(reader("ana"));

        let comment = repo.submit("post-1", "Ana", "Great post").await.unwrap();
        let listed = repo.list_by_entry("post-1").await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], comment);
        assert_eq!(listed[0].votes, 0);
        assert!(listed[0].voted_by.is_empty());
        assert_eq!(listed[0].owner_id.as_deref(), Some("ana"));
        assert!(!listed[0].is_admin_reply);
    }

    #[tokio::test]
    async fn test_overlong_text_is_not_persisted() {
        let fx = Fixture::new();
        let repo = fx.repo(reader("ana"));

        let result = repo.submit("post-1", "Ana", &"x".repeat(601)).await;
        assert!(matches!(result, Err(StorefrontError::Validation { .. })));
        assert!(repo.list_by_entry("post-1").await.unwrap().is_empty());

        // a rejected submission does not start the spam timer
        assert!(repo.submit("post-1", "Ana", "short").await.is_ok());
    }

    #[tokio::test]
    async fn test_spam_interval_boundary() {
        let fx = Fixture::new();
        let repo = fx.repo(reader("ana"));

        repo.submit("post-1", "Ana", "first").await.unwrap();

        fx.clock.advance(10_000);
        let err = repo.submit("post-1", "Ana", "second").await.unwrap_err();
        assert!(matches!(err, StorefrontError::RateLimited { retry_after_ms: 1 }));
        assert!(err.user_message().contains("wait"));

        fx.clock.advance(1);
        repo.submit("post-1", "Ana", "second").await.unwrap();
        assert_eq!(repo.list_by_entry("post-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_spam_interval_is_per_client() {
        let fx = Fixture::new();
        fx.repo(reader("ana")).submit("post-1", "Ana", "one").await.unwrap();
        fx.repo(reader("bob")).submit("post-1", "Bob", "two").await.unwrap();
    }

    #[tokio::test]
    async fn test_votes_from_distinct_identities() {
        let fx = Fixture::new();
        let author = fx.repo(reader("ana"));
        let comment = author.submit("post-1", "Ana", "vote me").await.unwrap();

        for (i, voter) in ["u1", "u2", "u3", "u2", "u1"].iter().enumerate() {
            let outcome = author.vote("post-1", &comment.id, voter).await.unwrap();
            let expected = if i < 3 { VoteStatus::Counted } else { VoteStatus::AlreadyVoted };
            assert_eq!(outcome.status, expected);
        }

        let stored = author.get("post-1", &comment.id).await.unwrap().unwrap();
        assert_eq!(stored.votes, 3);
        assert_eq!(stored.votes as usize, stored.voted_by.len());
    }

    #[tokio::test]
    async fn test_author_vote_is_ignored() {
        let fx = Fixture::new();
        let author = fx.repo(reader("ana"));
        let comment = author.submit("post-1", "Ana", "mine").await.unwrap();

        let outcome = author.vote("post-1", &comment.id, "ana").await.unwrap();
        assert_eq!(outcome, VoteOutcome { votes: 0, status: VoteStatus::OwnComment });
    }

    #[tokio::test]
    async fn test_vote_on_missing_comment() {
        let fx = Fixture::new();
        let repo = fx.repo(reader("ana"));
        let result = repo.vote("post-1", "nope", "u1").await;
        assert!(matches!(result, Err(StorefrontError::CommentNotFound { .. })));
    }

    #[tokio::test]
    async fn test_admin_gates_and_reply_flag() {
        let fx = Fixture::new();
        let reader_repo = fx.repo(reader("ana"));
        let admin_repo = fx.repo(reader("boss").with_admin(true));

        let comment = reader_repo.submit("post-1", "Ana", "hello").await.unwrap();
        assert!(matches!(
            reader_repo.set_highlighted("post-1", &comment.id, true).await,
            Err(StorefrontError::NotAuthorized { .. })
        ));
        assert!(matches!(
            reader_repo.delete("post-1", &comment.id).await,
            Err(StorefrontError::NotAuthorized { .. })
        ));

        admin_repo.set_highlighted("post-1", &comment.id, true).await.unwrap();
        let stored = admin_repo.get("post-1", &comment.id).await.unwrap().unwrap();
        assert!(stored.is_highlighted);

        let reply = admin_repo.submit("post-1", "Shop", "thanks!").await.unwrap();
        assert!(reply.is_admin_reply);

        admin_repo.delete("post-1", &comment.id).await.unwrap();
        assert!(admin_repo.get("post-1", &comment.id).await.unwrap().is_none());
        assert!(matches!(
            admin_repo.delete("post-1", &comment.id).await,
            Err(StorefrontError::CommentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_overview_and_malformed_records() {
        let fx = Fixture::new();
        let repo = fx.repo(reader("ana"));
        let first = repo.submit("post-1", "Ana", "a").await.unwrap();
        fx.clock.advance(20_000);
        repo.submit("post-2", "Ana", "b").await.unwrap();
        repo.vote("post-1", &first.id, "u1").await.unwrap();

        fx.store
            .write(&path::comment("post-2", "broken").unwrap(), json!({"text": 5}))
            .unwrap();

        let overview = repo.overview().await.unwrap();
        assert_eq!(overview.total_comments, 2);
        assert_eq!(overview.total_votes, 1);
        assert_eq!(overview.entries["post-1"].votes, 1);
        assert_eq!(overview.entries["post-2"].comments, 1);
    }

    #[tokio::test]
    async fn test_clock_moving_back_does_not_throttle() {
        let fx = Fixture::new();
        let repo = fx.repo(reader("ana"));
        repo.submit("post-1", "Ana", "first").await.unwrap();

        fx.clock.set(1_700_000_000_000 - 60_000);
        repo.submit("post-1", "Ana", "after a clock fix").await.unwrap();

        // the stamp follows the clock, so the interval applies again from here
        fx.clock.advance(5_000);
        let err = repo.submit("post-1", "Ana", "too soon").await.unwrap_err();
        assert!(matches!(err, StorefrontError::RateLimited { retry_after_ms: 5_001 }));
    }

    #[tokio::test]
    async fn test_highlight_missing_comment_writes_nothing() {
        let fx = Fixture::new();
        let admin = fx.repo(reader("boss").with_admin(true));
        let path = path::comment("post-1", "gone").unwrap();

        let result = admin.set_highlighted("post-1", "gone", true).await;
        assert!(matches!(result, Err(StorefrontError::CommentNotFound { .. })));
        assert_eq!(fx.store.read(&path), None);
        assert!(admin.list_by_entry("post-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_highlight_after_delete_leaves_no_stub() {
        let fx = Fixture::new();
        let admin = fx.repo(reader("boss").with_admin(true));
        let other_admin = fx.repo(reader("chief").with_admin(true));
        let comment = fx.repo(reader("ana")).submit("post-1", "Ana", "hi").await.unwrap();

        admin.set_highlighted("post-1", &comment.id, true).await.unwrap();
        other_admin.delete("post-1", &comment.id).await.unwrap();
        assert!(matches!(
            admin.set_highlighted("post-1", &comment.id, false).await,
            Err(StorefrontError::CommentNotFound { .. })
        ));
        assert_eq!(fx.store.read(&path::entry_comments("post-1").unwrap()), None);
    }

    #[tokio::test]
    async fn test_anonymous_author_cannot_vote_on_own_comment() {
        let fx = Fixture::new();
        let author = fx.repo(SessionContext::anonymous("client-ana"));
        let comment = author.submit("post-1", "Ana", "mine").await.unwrap();
        assert_eq!(comment.owner_id, None);

        let outcome = author.vote("post-1", &comment.id, "client-ana").await.unwrap();
        assert_eq!(outcome, VoteOutcome { votes: 0, status: VoteStatus::OwnComment });

        let stored = author.get("post-1", &comment.id).await.unwrap().unwrap();
        assert!(stored.voted_by.is_empty());

        // another anonymous client still counts
        let outcome = fx
            .repo(SessionContext::anonymous("client-bob"))
            .vote("post-1", &comment.id, "client-bob")
            .await
            .unwrap();
        assert_eq!(outcome, VoteOutcome { votes: 1, status: VoteStatus::Counted });
    }

    proptest! {
        #[test]
        fn test_vote_count_matches_distinct_voters(
            anonymous_author in any::<bool>(),
            voters in prop::collection::vec(0usize..6, 0..24),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let fx = Fixture::new();
                // voter "u0" is always the author
                let session = if anonymous_author {
                    SessionContext::anonymous("u0")
                } else {
                    reader("u0")
                };
                let author = fx.repo(session);
                let comment = author.submit("post-1", "Ana", "vote me").await.unwrap();

                let mut counted = BTreeSet::new();
                for voter in voters.iter().map(|v| format!("u{v}")) {
                    let outcome = author.vote("post-1", &comment.id, &voter).await.unwrap();
                    let expected = if voter == "u0" {
                        VoteStatus::OwnComment
                    } else if counted.insert(voter.clone()) {
                        VoteStatus::Counted
                    } else {
                        VoteStatus::AlreadyVoted
                    };
                    prop_assert_eq!(outcome.status, expected);
                    prop_assert_eq!(outcome.votes as usize, counted.len());
                }

                let stored = author.get("post-1", &comment.id).await.unwrap().unwrap();
                prop_assert_eq!(stored.votes as usize, stored.voted_by.len());
                prop_assert_eq!(&stored.voted_by, &counted);
                prop_assert!(!stored.voted_by.contains("u0"));
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
