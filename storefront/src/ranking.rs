use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::comment::Comment;
use crate::error::StorefrontError;

/// Order in which an entry's comments are shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Highlighted first, then most votes, then oldest
    #[default]
    Best,
    Newest,
    Oldest,
}

impl SortMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Newest => "newest",
            Self::Oldest => "oldest",
        }
    }

    /// Total order over comments; ids break every remaining tie
    pub fn compare(self, a: &Comment, b: &Comment) -> Ordering {
        let primary = match self {
            Self::Best => b
                .is_highlighted
                .cmp(&a.is_highlighted)
                .then_with(|| b.votes.cmp(&a.votes))
                .then_with(|| a.timestamp.cmp(&b.timestamp)),
            Self::Newest => b.timestamp.cmp(&a.timestamp),
            Self::Oldest => a.timestamp.cmp(&b.timestamp),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = StorefrontError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            other => Err(StorefrontError::validation(format!(
                "unknown sort mode '{other}', expected best, newest or oldest"
            ))),
        }
    }
}

/// Sort comments for display
pub fn rank(mut comments: Vec<Comment>, mode: SortMode) -> Vec<Comment> {
    comments.sort_by(|a, b| mode.compare(a, b));
    comments
}
