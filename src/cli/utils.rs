//! Utility functions for CLI operations.

use crate::board::key::PostKey;
use crate::board::pagination::Cursor;
use crate::board::post::Post;
use crate::board::repository::PostRepository;
use crate::config::BoardConfig;
use crate::error::{BoardError, Result};
use std::time::{Duration, UNIX_EPOCH};

/// Open the repository configured by the environment
pub fn open_repository() -> Result<PostRepository> {
    let config = BoardConfig::from_env()?;
    PostRepository::open(&config)
}

/// Parse a hex post ID as printed by the CLI
pub fn parse_post_id(s: &str) -> Result<PostKey> {
    PostKey::from_hex(s.trim())
        .map_err(|e| BoardError::invalid_input(format!("Invalid post ID '{}': {}", s, e)))
}

/// Parse an encoded page cursor
pub fn parse_cursor(s: Option<&str>) -> Result<Option<Cursor>> {
    s.map(|s| {
        Cursor::decode(s).ok_or_else(|| BoardError::invalid_input(format!("Invalid cursor '{}'", s)))
    })
    .transpose()
}

/// Format a millisecond Unix timestamp for display
pub fn format_timestamp(millis: u64) -> String {
    let datetime = UNIX_EPOCH + Duration::from_millis(millis);
    format!("{:?}", datetime)
}

/// One-line summary of a post for listings
pub fn format_post_line(post: &Post) -> String {
    let mut flags = String::new();
    for (set, mark) in [
        (post.locked, 'L'),
        (post.highlighted, 'H'),
        (post.saged, 'S'),
        (post.banned, 'B'),
    ] {
        if set {
            flags.push(mark);
        }
    }
    format!(
        "{} #{:<5} {:<16} {:<12} [{:>3} replies] {:<4} {}",
        post.id,
        post.index,
        post.author,
        if post.category.is_empty() {
            "-"
        } else {
            post.category.as_str()
        },
        post.replies,
        flags,
        post.title
    )
}
