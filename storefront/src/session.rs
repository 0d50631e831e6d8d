use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StorefrontError};

/// An authenticated user reference on the hosted backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id assigned by the hosted auth provider
    pub uid: String,
    /// Token appended to hosted requests, if the provider issued one
    pub id_token: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            id_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }
}

/// Who is acting, built once at startup and handed to every component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    identity: Option<Identity>,
    display_name: Option<String>,
    is_admin: bool,
    client_id: String,
}

impl SessionContext {
    /// Anonymous session for a client known only by its local id
    pub fn anonymous(client_id: impl Into<String>) -> Self {
        Self {
            identity: None,
            display_name: None,
            is_admin: false,
            client_id: client_id.into(),
        }
    }

    /// Anonymous session with a freshly generated client id
    pub fn new_client() -> Self {
        Self::anonymous(format!("client-{}", Uuid::new_v4()))
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.display_name = if name.trim().is_empty() {
            None
        } else {
            Some(name.trim().to_string())
        };
        self
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Identity used for votes and reactions: the uid when signed in, else the client id
    pub fn actor_id(&self) -> &str {
        self.identity
            .as_ref()
            .map(|i| i.uid.as_str())
            .unwrap_or(&self.client_id)
    }

    pub fn require_admin(&self, action: &'static str) -> Result<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(StorefrontError::NotAuthorized { action })
        }
    }
}
