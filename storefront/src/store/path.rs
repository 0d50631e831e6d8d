//! Store paths and the key layout shared by both backends.
//!
//! Hosted layout:
//! - `/blog/comments/{entryId}/{commentId}`
//! - `/blog/reactions/{entryId}/{emoji}`
//! - `/blog/reactionsByUser/{entryId}/{uid}/{emoji}`
//! - `/blog/favorites/{entryId}/{uid}`
//! - `/blog/admins/{uid}`
//!
//! Client-local keys live under `/client` and `/gamification`.

use std::fmt;

use crate::error::{StoreError, StoreResult};

const FORBIDDEN: [char; 6] = ['.', '#', '$', '[', ']', '/'];
const MAX_SEGMENT_BYTES: usize = 768;

/// A `/`-separated location in the document tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path such as `blog/comments/post-1`; leading and trailing slashes are ignored
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::from_segments(trimmed.split('/'))
    }

    pub fn from_segments<I, S>(segments: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = Self::root();
        for segment in segments {
            path = path.child(segment)?;
        }
        Ok(path)
    }

    pub fn child(&self, segment: impl AsRef<str>) -> StoreResult<Self> {
        let segment = segment.as_ref();
        validate_segment(segment).map_err(|reason| {
            StoreError::invalid_path(format!("{}/{}", self, segment), reason)
        })?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

fn validate_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("empty segment".to_string());
    }
    if segment.len() > MAX_SEGMENT_BYTES {
        return Err(format!("segment longer than {MAX_SEGMENT_BYTES} bytes"));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| FORBIDDEN.contains(c) || c.is_control())
    {
        return Err(format!("forbidden character {c:?}"));
    }
    Ok(())
}

/// Map free text (e.g. a display name) onto a valid path segment.
///
/// Forbidden characters, control characters and `%` are percent-encoded, so
/// distinct texts never share a key. Empty text maps to a lone `%`.
pub fn key_for(text: &str) -> String {
    if text.is_empty() {
        return "%".to_string();
    }
    let mut key = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '%' || FORBIDDEN.contains(&c) || c.is_control() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                key.push_str(&format!("%{byte:02X}"));
            }
        } else {
            key.push(c);
        }
    }
    key
}

pub fn comments_root() -> StoreResult<StorePath> {
    StorePath::from_segments(["blog", "comments"])
}

pub fn entry_comments(entry_id: &str) -> StoreResult<StorePath> {
    comments_root()?.child(entry_id)
}

pub fn comment(entry_id: &str, comment_id: &str) -> StoreResult<StorePath> {
    entry_comments(entry_id)?.child(comment_id)
}

pub fn reactions(entry_id: &str) -> StoreResult<StorePath> {
    StorePath::from_segments(["blog", "reactions", entry_id])
}

pub fn reaction(entry_id: &str, emoji: &str) -> StoreResult<StorePath> {
    reactions(entry_id)?.child(emoji)
}

pub fn reactions_by_user(entry_id: &str, uid: &str) -> StoreResult<StorePath> {
    StorePath::from_segments(["blog", "reactionsByUser", entry_id, uid])
}

pub fn reaction_by_user(entry_id: &str, uid: &str, emoji: &str) -> StoreResult<StorePath> {
    reactions_by_user(entry_id, uid)?.child(emoji)
}

pub fn favorites(entry_id: &str) -> StoreResult<StorePath> {
    StorePath::from_segments(["blog", "favorites", entry_id])
}

pub fn favorite(entry_id: &str, uid: &str) -> StoreResult<StorePath> {
    favorites(entry_id)?.child(uid)
}

pub fn admin(uid: &str) -> StoreResult<StorePath> {
    StorePath::from_segments(["blog", "admins", uid])
}

pub fn client_key(key: &str) -> StoreResult<StorePath> {
    StorePath::from_segments(["client", key])
}

/// Client-local marker for a comment this client posted without an identity
pub fn authored_comment(entry_id: &str, comment_id: &str) -> StoreResult<StorePath> {
    StorePath::from_segments(["client", "authored", entry_id, comment_id])
}

pub fn ledger_entry(name: &str) -> StoreResult<StorePath> {
    StorePath::from_segments(["gamification", "users"])?.child(key_for(name))
}

pub fn leaderboard() -> StoreResult<StorePath> {
    StorePath::from_segments(["gamification", "leaderboard"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = StorePath::parse("/blog/comments/post-1/").unwrap();
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.to_string(), "/blog/comments/post-1");
        assert_eq!(StorePath::parse("").unwrap().to_string(), "/");
    }

    #[test]
    fn test_rejects_forbidden_segments() {
        assert!(StorePath::parse("blog//comments").is_err());
        assert!(comment("post.1", "c1").is_err());
        assert!(comment("post-1", "c$1").is_err());
        assert!(reaction("post-1", "🔥").is_ok());
    }

    #[test]
    fn test_key_for_display_names() {
        assert_eq!(key_for("Ana María"), "Ana María");
        assert_eq!(key_for("a.b/c"), "a%2Eb%2Fc");
        assert_eq!(key_for("100%"), "100%25");
        assert_eq!(key_for(""), "%");
        assert_eq!(
            ledger_entry("j.doe").unwrap().to_string(),
            "/gamification/users/j%2Edoe"
        );
    }

    #[test]
    fn test_key_for_keeps_names_apart() {
        let names = ["a.b", "a_b", "a%2Eb", "a%b", "", "%", " ", "a\nb", "a\u{7}b"];
        for (i, a) in names.iter().enumerate() {
            assert!(StorePath::root().child(key_for(a)).is_ok(), "{a:?}");
            for b in &names[i + 1..] {
                assert_ne!(key_for(a), key_for(b), "{a:?} vs {b:?}");
            }
        }
    }
}
