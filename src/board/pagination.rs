//! Cursor-based pagination over the board namespace.
//!
//! Pages are read straight from the key order: a listing is a range scan over
//! one tag's keys, and a cursor is simply the encoded key to resume at. Index
//! entries are resolved to their posts with a second lookup.

use crate::board::constants::MAX_PAGE_SIZE;
use crate::board::key::{Header, PostKey};
use crate::board::post::Post;
use crate::board::repository::{decode_post, load_post, CF_POSTS};
use crate::error::{BoardError, Result};
use crate::storage::{Direction, ReadTxn, RocksDbHandle};
use base64::Engine;
use tracing::{debug, warn};

/// Opaque position in a listing.
///
/// Holds the encoded key the next scan starts at. Callers should only
/// round-trip cursors, using [`Cursor::encode`] and [`Cursor::decode`] for
/// transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(Vec<u8>);

impl Cursor {
    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decodes the key this cursor points at.
    pub fn key(&self) -> Result<PostKey> {
        PostKey::from_bytes(&self.0)
    }

    /// Encodes the cursor as a base64 string for URL-safe transport.
    pub fn encode(&self) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&self.0)
    }

    /// Decodes a cursor from a base64 string.
    ///
    /// Returns `None` unless the payload is a well-formed key.
    pub fn decode(s: &str) -> Option<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(s)
            .ok()?;
        PostKey::from_bytes(&bytes).ok()?;
        Some(Self(bytes))
    }
}

impl From<&PostKey> for Cursor {
    fn from(key: &PostKey) -> Self {
        Self(key.to_bytes())
    }
}

/// Result of a paginated query.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    /// The items in this page.
    pub items: Vec<T>,
    /// Cursor reproducing the page before this one, if there is one.
    pub prev_cursor: Option<Cursor>,
    /// Cursor for the next page, if there are more items.
    pub next_cursor: Option<Cursor>,
}

impl<T> PaginatedResult<T> {
    /// Returns true if there are more pages after this one.
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    /// Returns true if there are pages before this one.
    pub fn has_prev(&self) -> bool {
        self.prev_cursor.is_some()
    }
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_PAGE_SIZE)
}

fn checked_start(cursor: Option<&Cursor>, prefix: &[u8], default: Vec<u8>) -> Result<Vec<u8>> {
    match cursor {
        None => Ok(default),
        Some(cursor) if cursor.as_bytes().starts_with(prefix) => Ok(cursor.as_bytes().to_vec()),
        Some(_) => Err(BoardError::invalid_input(
            "Cursor does not belong to the requested listing",
        )),
    }
}

/// Resolves a scanned entry to its post.
///
/// Primary keys carry the record itself; index keys carry the primary key of
/// their target. Entries that do not resolve are skipped with a warning.
fn resolve_entry(txn: &ReadTxn<'_>, key: &[u8], value: &[u8]) -> Result<Option<Post>> {
    let key = match PostKey::from_bytes(key) {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "Skipping malformed key in listing");
            return Ok(None);
        }
    };

    if key.header() == Header::Post {
        return decode_post(txn, &key, value);
    }
    if !key.header().is_index() {
        return Ok(None);
    }

    let target = match PostKey::from_bytes(value) {
        Ok(target) => target,
        Err(e) => {
            warn!(entry = %key.short(), error = %e, "Skipping index entry with malformed target");
            return Ok(None);
        }
    };
    match load_post(txn, &target) {
        Ok(post) => Ok(Some(post)),
        Err(e) if e.is_not_found() => {
            warn!(
                entry = %key.short(),
                tag = %key.tag(),
                "Skipping index entry whose post is missing"
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Lists posts under `tag`, newest first.
///
/// An empty `tag` lists root posts site-wide, `#name` lists the root posts of
/// category `name`, and any other tag lists the posts of that author
/// (including replies they were notified about).
///
/// The page holds the entries at or below `cursor` (or from the end of the
/// tag's range when `cursor` is `None`), at most `limit` of them. `next_cursor`
/// points at the entry following the page. `prev_cursor` points at the entry
/// that starts the page before this one, and is `None` on the first page.
///
/// In the site-wide listing replies occupy slots of the scan and are dropped
/// afterwards, so such a page may hold fewer than `limit` posts while
/// `next_cursor` is still set.
///
/// # Errors
/// `InvalidInput` if `tag` cannot be encoded or the cursor lies outside the
/// tag's range.
pub fn find_posts(
    db: &RocksDbHandle,
    tag: &str,
    cursor: Option<&Cursor>,
    limit: usize,
) -> Result<PaginatedResult<Post>> {
    let limit = clamp_limit(limit);
    let prefix = PostKey::range_prefix(Header::for_tag(tag), tag)?;
    let start = checked_start(cursor, &prefix, PostKey::range_end(&prefix))?;

    db.view(|txn| {
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(limit + 1);
        txn.scan(CF_POSTS, &start, &prefix, Direction::Descending, |key, value| {
            entries.push((key.to_vec(), value.to_vec()));
            entries.len() <= limit
        })?;

        let next = if entries.len() > limit {
            entries.pop().map(|(key, _)| Cursor(key))
        } else {
            None
        };

        let mut prev = None;
        if cursor.is_some() {
            let mut walked = 0;
            txn.scan(CF_POSTS, &start, &prefix, Direction::Ascending, |key, _| {
                if key == start.as_slice() {
                    return true;
                }
                walked += 1;
                prev = Some(Cursor(key.to_vec()));
                walked < limit
            })?;
        }

        let scanned = entries.len();
        let mut items = Vec::with_capacity(scanned);
        for (key, value) in &entries {
            if let Some(post) = resolve_entry(txn, key, value)? {
                items.push(post);
            }
        }
        if tag.is_empty() {
            items.retain(|post| !post.is_reply());
        }

        debug!(
            tag,
            scanned,
            returned = items.len(),
            has_next = next.is_some(),
            has_prev = prev.is_some(),
            "find_posts: page assembled"
        );

        Ok(PaginatedResult {
            items,
            prev_cursor: prev,
            next_cursor: next,
        })
    })
}

/// Lists the direct replies of `parent_id` in the order they were made.
///
/// Replies are found by key structure alone: they share the parent's key as
/// a prefix and are exactly one level deeper. Cursors work as in
/// [`find_posts`] with the direction reversed.
///
/// # Errors
/// `InvalidInput` if the cursor is not a reply position under `parent_id`.
pub fn find_replies(
    db: &RocksDbHandle,
    parent_id: &PostKey,
    cursor: Option<&Cursor>,
    limit: usize,
) -> Result<PaginatedResult<Post>> {
    let limit = clamp_limit(limit);
    let parent_id = parent_id.primary();
    let prefix = parent_id.descendant_prefix();
    let child_depth = parent_id.depth() + 1;
    let start = checked_start(cursor, &prefix, prefix.clone())?;

    let is_child = |key: &[u8]| {
        PostKey::from_bytes(key)
            .map(|key| key.depth() == child_depth)
            .unwrap_or(false)
    };

    db.view(|txn| {
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(limit + 1);
        txn.scan(CF_POSTS, &start, &prefix, Direction::Ascending, |key, value| {
            if is_child(key) {
                entries.push((key.to_vec(), value.to_vec()));
            }
            entries.len() <= limit
        })?;

        let next = if entries.len() > limit {
            entries.pop().map(|(key, _)| Cursor(key))
        } else {
            None
        };

        let mut prev = None;
        if cursor.is_some() {
            let mut walked = 0;
            txn.scan(CF_POSTS, &start, &prefix, Direction::Descending, |key, _| {
                if key == start.as_slice() || !is_child(key) {
                    return true;
                }
                walked += 1;
                prev = Some(Cursor(key.to_vec()));
                walked < limit
            })?;
        }

        let mut items = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            if let Some(post) = resolve_entry(txn, key, value)? {
                items.push(post);
            }
        }

        debug!(
            parent = %parent_id.short(),
            returned = items.len(),
            has_next = next.is_some(),
            "find_replies: page assembled"
        );

        Ok(PaginatedResult {
            items,
            prev_cursor: prev,
            next_cursor: next,
        })
    })
}
