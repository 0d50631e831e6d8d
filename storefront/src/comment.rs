use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CommentLimits;
use crate::error::{Result, StorefrontError};

pub const ANONYMOUS_NAME: &str = "Anonymous";

/// A reader comment on one blog entry, stored at `/blog/comments/{entryId}/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub entry_id: String,
    pub name: String,
    pub text: String,
    /// Creation time, ms since epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub votes: u32,
    #[serde(default)]
    pub voted_by: BTreeSet<String>,
    #[serde(default)]
    pub is_highlighted: bool,
    #[serde(default)]
    pub is_admin_reply: bool,
}

/// What a vote did to a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    Counted,
    AlreadyVoted,
    OwnComment,
}

impl Comment {
    pub fn new(
        entry_id: impl Into<String>,
        draft: ValidDraft,
        owner_id: Option<String>,
        is_admin_reply: bool,
        timestamp: i64,
    ) -> Self {
        Self {
            id: generate_comment_id(),
            entry_id: entry_id.into(),
            name: draft.name,
            text: draft.text,
            timestamp,
            owner_id,
            votes: 0,
            voted_by: BTreeSet::new(),
            is_highlighted: false,
            is_admin_reply,
        }
    }

    pub fn is_owned_by(&self, voter_id: &str) -> bool {
        self.owner_id.as_deref() == Some(voter_id)
    }

    /// Decide whether `voter_id` may vote without changing anything
    pub fn vote_status(&self, voter_id: &str) -> VoteStatus {
        if self.is_owned_by(voter_id) {
            VoteStatus::OwnComment
        } else if self.voted_by.contains(voter_id) {
            VoteStatus::AlreadyVoted
        } else {
            VoteStatus::Counted
        }
    }

    /// Record a vote, keeping `votes == voted_by.len()`
    pub fn apply_vote(&mut self, voter_id: &str) -> VoteStatus {
        let status = self.vote_status(voter_id);
        if status == VoteStatus::Counted {
            self.voted_by.insert(voter_id.to_string());
        }
        self.votes = u32::try_from(self.voted_by.len()).unwrap_or(u32::MAX);
        status
    }
}

pub fn generate_comment_id() -> String {
    Uuid::new_v4().to_string()
}

/// Name and text after sanitizing and bounds checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub name: String,
    pub text: String,
}

/// Strip angle brackets and surrounding whitespace
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitize and validate a submission before anything is persisted
pub fn validate_draft(name: &str, text: &str, limits: &CommentLimits) -> Result<ValidDraft> {
    let text = sanitize(text);
    let length = text.chars().count();
    if length == 0 {
        return Err(StorefrontError::validation("Comment text cannot be empty"));
    }
    if length > limits.max_text_chars {
        return Err(StorefrontError::validation(format!(
            "Comment text is {} characters, the limit is {}",
            length, limits.max_text_chars
        )));
    }

    let name: String = sanitize(name).chars().take(limits.max_name_chars).collect();
    let name = name.trim();
    let name = if name.is_empty() {
        ANONYMOUS_NAME.to_string()
    } else {
        name.to_string()
    };

    Ok(ValidDraft { name, text })
}
