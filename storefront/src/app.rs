use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::admins::AdminRegistry;
use crate::clock::{Clock, SystemClock};
use crate::comment::{Comment, VoteStatus};
use crate::config::StorefrontConfig;
use crate::error::Result;
use crate::favorites::Favorites;
use crate::ledger::achievements::{
    STAT_COMMENTS, STAT_PAGES_READ, STAT_THEME_SWITCHES, STAT_VOTES_CAST,
};
use crate::ledger::{Ledger, StatUpdate};
use crate::ranking::{rank, SortMode};
use crate::reactions::{ReactionBoard, ReactionState};
use crate::repository::{CommentRepository, VoteOutcome};
use crate::session::SessionContext;
use crate::store::{
    path, read_as, select_backend, write_as, BackendKind, LocalStore, PersistedStore,
};

const COMMENT_POINTS: u64 = 10;
const VOTE_POINTS: u64 = 2;
const READ_POINTS: u64 = 1;

/// Site color scheme remembered per client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

/// Restore the client's session from the local store, minting a client id on first run
pub fn load_client_session(local: &LocalStore) -> Result<SessionContext> {
    let key = path::client_key("id")?;
    if let Some(Value::String(client_id)) = local.read(&key) {
        return Ok(SessionContext::anonymous(client_id));
    }
    let session = SessionContext::new_client();
    local.write(&key, json!(session.client_id()))?;
    info!("🆕 New client {}", session.client_id());
    Ok(session)
}

/// Entry point wiring the session, the selected backend and every component.
///
/// User actions mutate the backend first; ledger credit is applied afterwards
/// and a ledger failure is logged without failing the action.
pub struct Storefront {
    session: Arc<SessionContext>,
    local: Arc<LocalStore>,
    store: Arc<dyn PersistedStore>,
    comments: CommentRepository,
    ledger: Ledger,
    reactions: ReactionBoard,
    favorites: Favorites,
    admins: AdminRegistry,
}

impl Storefront {
    pub async fn open(config: StorefrontConfig, session: SessionContext) -> Result<Self> {
        let local = match &config.local_path {
            Some(file) => LocalStore::open(file)?,
            None => LocalStore::in_memory(),
        }
        .with_quota(config.local_quota_bytes);
        Self::with_local(config, session, Arc::new(local), Arc::new(SystemClock)).await
    }

    /// Build on an existing local store and clock
    pub async fn with_local(
        config: StorefrontConfig,
        session: SessionContext,
        local: Arc<LocalStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = select_backend(&config, &session, local.clone())?;
        let admins = AdminRegistry::new(store.clone());
        let session = Arc::new(resolve_admin(session, store.kind(), &local, &admins).await);

        info!(
            "🚀 Storefront ready on {} backend (client {}, admin: {})",
            store.kind().as_str(),
            session.client_id(),
            session.is_admin()
        );

        Ok(Self {
            comments: CommentRepository::new(
                store.clone(),
                local.clone(),
                session.clone(),
                clock.clone(),
                config.comment_limits.clone(),
            ),
            ledger: Ledger::new(local.clone(), clock, config.leaderboard_size),
            reactions: ReactionBoard::new(store.clone()),
            favorites: Favorites::new(store.clone()),
            admins,
            session,
            local,
            store,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.store.kind()
    }

    /// Whether recent writes fell back to the local store
    pub fn is_degraded(&self) -> bool {
        self.store.is_degraded()
    }

    pub fn comments(&self) -> &CommentRepository {
        &self.comments
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn reactions(&self) -> &ReactionBoard {
        &self.reactions
    }

    pub fn favorites(&self) -> &Favorites {
        &self.favorites
    }

    pub fn admins(&self) -> &AdminRegistry {
        &self.admins
    }

    /// Post a comment under the session's display name
    pub async fn comment(&self, entry_id: &str, text: &str) -> Result<Comment> {
        let name = self.session.display_name().unwrap_or_default();
        let comment = self.comments.submit(entry_id, name, text).await?;
        self.credit(COMMENT_POINTS, "commenting", STAT_COMMENTS).await;
        Ok(comment)
    }

    pub async fn vote(&self, entry_id: &str, comment_id: &str) -> Result<VoteOutcome> {
        let outcome = self
            .comments
            .vote(entry_id, comment_id, self.session.actor_id())
            .await?;
        if outcome.status == VoteStatus::Counted {
            self.credit(VOTE_POINTS, "voting", STAT_VOTES_CAST).await;
        }
        Ok(outcome)
    }

    pub async fn react(&self, entry_id: &str, emoji: &str) -> Result<ReactionState> {
        self.reactions
            .toggle(entry_id, emoji, self.session.actor_id())
            .await
    }

    pub async fn toggle_favorite(&self, entry_id: &str) -> Result<bool> {
        self.favorites
            .toggle(entry_id, self.session.actor_id())
            .await
    }

    /// Credit the reader for opening an entry
    pub async fn read_entry(&self, entry_id: &str) -> Result<()> {
        info!("📖 {} opened {}", self.session.actor_id(), entry_id);
        self.credit(READ_POINTS, "reading", STAT_PAGES_READ).await;
        Ok(())
    }

    pub async fn theme(&self) -> Result<Theme> {
        let key = path::client_key("theme")?;
        Ok(read_as(&*self.local, &key).await?.unwrap_or_default())
    }

    /// Flip between light and dark, returning the new theme
    pub async fn switch_theme(&self) -> Result<Theme> {
        let theme = self.theme().await?.toggled();
        write_as(&*self.local, &path::client_key("theme")?, &theme).await?;

        if let Some(name) = self.session.display_name() {
            if let Err(e) = self
                .ledger
                .record_stat(name, STAT_THEME_SWITCHES, StatUpdate::Increment(1))
                .await
            {
                warn!("⚠️  Could not record theme switch for {}: {}", name, e);
            }
        }
        Ok(theme)
    }

    pub async fn ranked_comments(&self, entry_id: &str, mode: SortMode) -> Result<Vec<Comment>> {
        Ok(rank(self.comments.list_by_entry(entry_id).await?, mode))
    }

    async fn credit(&self, points: u64, reason: &str, stat: &str) {
        let Some(name) = self.session.display_name() else {
            return;
        };
        let result = async {
            self.ledger.award(name, points, reason).await?;
            self.ledger
                .record_stat(name, stat, StatUpdate::Increment(1))
                .await
        }
        .await;
        if let Err(e) = result {
            warn!("⚠️  Ledger update for {} failed: {}", name, e);
        }
    }
}

impl fmt::Debug for Storefront {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storefront")
            .field("session", &self.session)
            .field("backend", &self.store.kind())
            .field("degraded", &self.store.is_degraded())
            .finish()
    }
}

/// Admin when the session says so, when the local admin flag is set on a
/// local-only client, or when the hosted registry lists the identity
async fn resolve_admin(
    session: SessionContext,
    backend: BackendKind,
    local: &LocalStore,
    admins: &AdminRegistry,
) -> SessionContext {
    if session.is_admin() {
        return session;
    }

    let is_admin = match (backend, session.identity()) {
        (BackendKind::Local, _) => path::client_key("admin")
            .map(|key| local.read(&key) == Some(Value::Bool(true)))
            .unwrap_or(false),
        (BackendKind::Hosted, Some(identity)) => match admins.is_admin(&identity.uid).await {
            Ok(is_admin) => is_admin,
            Err(e) => {
                warn!("⚠️  Could not check admin status for {}: {}", identity.uid, e);
                false
            }
        },
        (BackendKind::Hosted, None) => false,
    };
    session.with_admin(is_admin)
}
