//! The post record stored under primary keys.
//!
//! A `Post` is either a root post (empty reply path) or a reply. The record
//! is serialized with bincode; the `banned` flag is derived from the author's
//! ban marker at read time and is never stored.

use crate::board::constants::{
    CATEGORY_TAG_MARKER, MAX_CONTENT_SIZE, MAX_TAG_SIZE, MAX_TITLE_SIZE,
};
use crate::board::key::PostKey;
use crate::error::{BoardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Returns the index tag for a category name.
pub fn category_tag(category: &str) -> String {
    format!("{}{}", CATEGORY_TAG_MARKER, category)
}

/// A post or reply.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Primary key. Assigned by the repository on create.
    pub id: PostKey,
    /// Author name, also the author index tag.
    pub author: String,
    /// Category name (empty for replies).
    pub category: String,
    /// Title. Meaningful for root posts; replies derive theirs from the parent.
    pub title: String,
    /// Post body.
    pub content: String,
    /// Global root number for root posts, reply number within the parent for replies.
    pub index: u64,
    /// Number of direct replies.
    pub replies: u64,
    /// Replies are refused while set.
    pub locked: bool,
    pub highlighted: bool,
    /// Stored moderation flag; the engine itself does not act on it.
    pub saged: bool,
    /// Derived from the author's ban marker.
    #[serde(skip)]
    pub banned: bool,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub create_time: u64,
    /// Last-activity timestamp in milliseconds since Unix epoch.
    pub reply_time: u64,
    /// Author of the parent post, set when that author was notified of this reply.
    pub parent_author: Option<String>,
    /// Sequence of the notification entry under `parent_author`.
    pub notification_seq: Option<u64>,
}

impl fmt::Debug for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Post")
            .field("id", &self.id.short())
            .field("author", &self.author)
            .field("category", &self.category)
            .field("index", &self.index)
            .field("replies", &self.replies)
            .field("locked", &self.locked)
            .field("content_len", &self.content.len())
            .finish()
    }
}

impl Post {
    /// Creates an unsaved post. The repository assigns id, index and timestamps.
    pub fn new(
        author: impl Into<String>,
        category: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: PostKey::root(0),
            author: author.into(),
            category: category.into(),
            title: title.into(),
            content: content.into(),
            index: 0,
            replies: 0,
            locked: false,
            highlighted: false,
            saged: false,
            banned: false,
            create_time: 0,
            reply_time: 0,
            parent_author: None,
            notification_seq: None,
        }
    }

    /// Creates an unsaved reply body. Title and category are derived on create.
    pub fn reply(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(author, "", "", content)
    }

    /// Returns true if this post is a reply.
    pub fn is_reply(&self) -> bool {
        self.id.is_reply()
    }

    /// Returns the parent post key, derived from the id.
    pub fn parent(&self) -> Option<PostKey> {
        self.id.parent()
    }

    /// Returns the category index tag (`#category`).
    pub fn category_tag(&self) -> String {
        category_tag(&self.category)
    }

    /// Checks field sizes against the key and content limits.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Author is empty, starts with `#`, or does not fit in a key tag
    /// - `#category` does not fit in a key tag
    /// - Title or content exceed their maximum size
    pub fn validate(&self) -> Result<()> {
        if self.author.is_empty() {
            return Err(BoardError::invalid_input("Author cannot be empty"));
        }
        if self.author.starts_with(CATEGORY_TAG_MARKER) {
            return Err(BoardError::invalid_input(format!(
                "Author cannot start with '{}'",
                CATEGORY_TAG_MARKER
            )));
        }
        if self.author.len() > MAX_TAG_SIZE {
            return Err(BoardError::invalid_input(format!(
                "Author exceeds maximum size of {} bytes",
                MAX_TAG_SIZE
            )));
        }
        if self.category.len() + CATEGORY_TAG_MARKER.len_utf8() > MAX_TAG_SIZE {
            return Err(BoardError::invalid_input(format!(
                "Category exceeds maximum size of {} bytes",
                MAX_TAG_SIZE - CATEGORY_TAG_MARKER.len_utf8()
            )));
        }
        if self.author.contains('\0') || self.category.contains('\0') {
            return Err(BoardError::invalid_input(
                "Author and category cannot contain NUL bytes",
            ));
        }
        if self.title.len() > MAX_TITLE_SIZE {
            return Err(BoardError::invalid_input(format!(
                "Title exceeds maximum size of {} bytes",
                MAX_TITLE_SIZE
            )));
        }
        if self.content.len() > MAX_CONTENT_SIZE {
            return Err(BoardError::invalid_input(format!(
                "Content exceeds maximum size of {} bytes",
                MAX_CONTENT_SIZE
            )));
        }
        Ok(())
    }

    /// Serializes the record for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| BoardError::serialization(format!("Failed to serialize post: {}", e)))
    }

    /// Deserializes a stored record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| BoardError::serialization(format!("Failed to deserialize post: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_skips_banned() {
        let mut post = Post::new("alice", "general", "Hello", "First post");
        post.id = PostKey::root(12);
        post.index = 3;
        post.banned = true;

        let restored = Post::from_bytes(&post.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.id, post.id);
        assert_eq!(restored.author, "alice");
        assert_eq!(restored.index, 3);
        assert!(!restored.banned);
    }

    #[test]
    fn test_garbage_does_not_parse() {
        assert!(Post::from_bytes(b"definitely not a post").is_err());
        assert!(Post::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_parent_derived_from_id() {
        let mut post = Post::reply("bob", "hi");
        assert!(!post.is_reply());
        let mut id = PostKey::root(4);
        assert!(id.append_reply_index(2));
        post.id = id;
        assert!(post.is_reply());
        assert_eq!(post.parent(), Some(PostKey::root(4)));
    }

    #[test]
    fn test_validate() {
        assert!(Post::new("alice", "general", "t", "c").validate().is_ok());
        assert!(Post::new("", "general", "t", "c").validate().is_err());
        assert!(Post::new("#alice", "general", "t", "c").validate().is_err());
        assert!(Post::new("a".repeat(MAX_TAG_SIZE + 1), "", "t", "c")
            .validate()
            .is_err());
        assert!(Post::new("alice", "c".repeat(MAX_TAG_SIZE), "t", "c")
            .validate()
            .is_err());
        assert!(Post::new("alice", "", "t", "x".repeat(MAX_CONTENT_SIZE + 1))
            .validate()
            .is_err());
    }

    #[test]
    fn test_category_tag() {
        let post = Post::new("alice", "news", "t", "c");
        assert_eq!(post.category_tag(), "#news");
        assert_eq!(category_tag(""), "#");
    }
}
