//! Post persistence on top of the transactional key-value store.
//!
//! ## Storage Layout
//!
//! Uses two column families:
//! - `posts`: the flat board namespace (primary records, tag index entries, ban markers)
//! - `meta`: `root_counter` -> u64 BE, the number of root posts ever created;
//!   `sequence_mark` -> u64 BE, the highest sequence ever issued
//!
//! Within `posts`, a primary key maps to the serialized [`Post`] and every
//! index key maps to the primary key of the post it points at. Every mutation
//! of a post and its index entries is one atomic update.

use crate::board::constants::{MAX_REPLIES, MAX_TITLE_SIZE, REPLY_TITLE_PREFIX};
use crate::board::key::{Header, PostKey};
use crate::board::pagination::{self, Cursor, PaginatedResult};
use crate::board::post::{category_tag, Post};
use crate::board::sequence::{current_timestamp_millis, SequenceGenerator};
use crate::config::BoardConfig;
use crate::error::{BoardError, Result};
use crate::storage::{Direction, KvRead, RocksDbHandle, WriteTxn};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

/// Database subdirectory.
const DB_DIR: &str = "board_db";

/// Column family names.
pub(crate) const CF_POSTS: &str = "posts";
pub(crate) const CF_META: &str = "meta";

/// Key for the root post counter in the meta column family.
const META_ROOT_COUNTER: &[u8] = b"root_counter";

/// Key for the highest sequence ever issued, in the meta column family.
const META_SEQUENCE_MARK: &[u8] = b"sequence_mark";

// =============================================================================
// Record helpers shared by the board modules
// =============================================================================

/// Decodes a stored record found under `id`.
///
/// Returns `None` (and logs) when the bytes are not a post or belong to a
/// different key. The derived `banned` flag is filled in from the author's ban
/// marker.
pub(crate) fn decode_post<R: KvRead>(txn: &R, id: &PostKey, bytes: &[u8]) -> Result<Option<Post>> {
    let mut post = match Post::from_bytes(bytes) {
        Ok(post) => post,
        Err(e) => {
            warn!(id = %id.short(), error = %e, "Skipping corrupt post record");
            return Ok(None);
        }
    };
    if &post.id != id {
        warn!(
            id = %id.short(),
            stored_id = %post.id.short(),
            "Skipping post record stored under a foreign key"
        );
        return Ok(None);
    }
    post.banned = is_author_banned(txn, &post.author)?;
    Ok(Some(post))
}

/// Loads the post stored under `id`.
///
/// # Errors
/// `NotFound` if the record is absent or cannot be decoded.
pub(crate) fn load_post<R: KvRead>(txn: &R, id: &PostKey) -> Result<Post> {
    if id.header() != Header::Post {
        return Err(BoardError::not_found(format!("post {}", id.short())));
    }
    let bytes = txn
        .get(CF_POSTS, &id.to_bytes())?
        .ok_or_else(|| BoardError::not_found(format!("post {}", id.short())))?;
    decode_post(txn, id, &bytes)?
        .ok_or_else(|| BoardError::not_found(format!("post {}", id.short())))
}

/// Returns the key of an author's ban marker.
pub(crate) fn ban_key(author: &str) -> Result<PostKey> {
    PostKey::new(Header::Ban, author, 0)
}

pub(crate) fn is_author_banned<R: KvRead>(txn: &R, author: &str) -> Result<bool> {
    match ban_key(author) {
        Ok(key) => txn.exists(CF_POSTS, &key.to_bytes()),
        // A name that cannot be encoded cannot carry a marker.
        Err(_) => Ok(false),
    }
}

/// Returns the notification entry of a reply that notified its parent's author.
///
/// The entry is keyed by its own sequence, minted when the reply was made,
/// so it sorts by the time of the reply in the parent author's listing.
pub(crate) fn notification_key(post: &Post) -> Result<Option<PostKey>> {
    match (&post.parent_author, post.notification_seq) {
        (Some(author), Some(sequence)) => {
            Ok(Some(PostKey::new(Header::AuthorTag, author, sequence)?))
        }
        _ => Ok(None),
    }
}

/// Lists the index entries a stored post must be reachable from.
///
/// Every post has its author entry, root posts have their `#category` entry,
/// and replies that notified the parent author have a notification entry.
pub(crate) fn index_keys(post: &Post) -> Result<Vec<PostKey>> {
    let mut keys = vec![post.id.index_key(&post.author)?];
    if !post.is_reply() {
        keys.push(post.id.index_key(&post.category_tag())?);
    }
    if let Some(key) = notification_key(post)? {
        keys.push(key);
    }
    Ok(keys)
}

pub(crate) fn put_post(txn: &mut WriteTxn<'_>, post: &Post) -> Result<()> {
    txn.put(CF_POSTS, &post.id.to_bytes(), &post.to_bytes()?)
}

/// Writes the index entry `key` pointing at `id`.
pub(crate) fn insert_entry(txn: &mut WriteTxn<'_>, key: &PostKey, id: &PostKey) -> Result<()> {
    trace!(id = %id.short(), tag = %key.tag(), header = %key.header(), "Inserting index entry");
    txn.put(CF_POSTS, &key.to_bytes(), &id.primary().to_bytes())
}

fn delete_entry(txn: &mut WriteTxn<'_>, key: &PostKey) -> Result<()> {
    trace!(tag = %key.tag(), header = %key.header(), "Deleting index entry");
    txn.delete(CF_POSTS, &key.to_bytes())
}

fn read_meta_u64<R: KvRead>(txn: &R, key: &[u8]) -> Result<u64> {
    match txn.get(CF_META, key)? {
        None => Ok(0),
        Some(bytes) => {
            let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                BoardError::serialization(format!(
                    "meta value {:?} has {} bytes, expected 8",
                    String::from_utf8_lossy(key),
                    bytes.len()
                ))
            })?;
            Ok(u64::from_be_bytes(raw))
        }
    }
}

fn read_root_counter<R: KvRead>(txn: &R) -> Result<u64> {
    read_meta_u64(txn, META_ROOT_COUNTER)
}

/// Records `sequence` as issued so a reopened repository never reissues it.
fn raise_sequence_mark(txn: &mut WriteTxn<'_>, sequence: u64) -> Result<()> {
    if read_meta_u64(txn, META_SEQUENCE_MARK)? < sequence {
        txn.put(CF_META, META_SEQUENCE_MARK, &sequence.to_be_bytes())?;
    }
    Ok(())
}

/// Builds a reply title from the parent's, cut to the title limit on a char boundary.
fn reply_title(parent_title: &str) -> String {
    let mut title = format!("{}{}", REPLY_TITLE_PREFIX, parent_title);
    if title.len() > MAX_TITLE_SIZE {
        let mut end = MAX_TITLE_SIZE;
        while !title.is_char_boundary(end) {
            end -= 1;
        }
        title.truncate(end);
    }
    title
}

// =============================================================================
// Repository
// =============================================================================

/// RocksDB-backed post repository.
///
/// Safe to share between threads. Root post creation relies on the store's
/// single-writer updates alone; operations that read a record and write back
/// a derived value (replies, updates, deletes, index rebuilds) additionally
/// hold a repository-wide lock for their whole read-modify-write.
#[derive(Debug)]
pub struct PostRepository {
    db: RocksDbHandle,
    sequence: SequenceGenerator,
    lock: Mutex<()>,
}

impl PostRepository {
    /// Opens the repository described by `config`, creating its data
    /// directory if needed.
    ///
    /// # Errors
    /// `Io` if the data directory cannot be created.
    pub fn open(config: &BoardConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        let db_path = config.data_dir.join(DB_DIR);
        let db = RocksDbHandle::open(&db_path, &config.storage, &[CF_POSTS, CF_META])?;
        info!("Opened board RocksDB at {:?}", db_path);

        let last_sequence = Self::last_root_sequence(&db)?
            .max(db.view(|txn| read_meta_u64(txn, META_SEQUENCE_MARK))?);
        debug!(last_sequence, "Resuming sequence generator");

        Ok(Self {
            db,
            sequence: SequenceGenerator::starting_after(last_sequence),
            lock: Mutex::new(()),
        })
    }

    /// Opens a repository with default storage settings under `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(&BoardConfig::new(data_dir))
    }

    /// Opens a repository in the default data directory.
    pub fn new_default() -> Result<Self> {
        Self::open(&BoardConfig::default())
    }

    /// Highest sequence of any stored primary key, or 0 for an empty board.
    fn last_root_sequence(db: &RocksDbHandle) -> Result<u64> {
        let prefix = PostKey::range_prefix(Header::Post, "")?;
        let start = PostKey::range_end(&prefix);
        db.view(|txn| {
            let mut last = 0;
            txn.scan(CF_POSTS, &start, &prefix, Direction::Descending, |key, _| {
                match PostKey::from_bytes(key) {
                    Ok(key) => {
                        last = key.sequence();
                        false
                    }
                    Err(_) => true,
                }
            })?;
            Ok(last)
        })
    }

    pub(crate) fn db(&self) -> &RocksDbHandle {
        &self.db
    }

    /// Acquires the repository-wide mutation lock.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| BoardError::transaction("Repository lock poisoned"))
    }

    /// Stores a new root post with its author and category index entries.
    ///
    /// Assigns the key, `index` (root posts ever created + 1, never reused)
    /// and timestamps, and returns the stored record.
    pub fn create_root_post(&self, mut post: Post) -> Result<Post> {
        post.validate()?;

        let now = current_timestamp_millis();
        post.id = PostKey::root(self.sequence.next());
        post.replies = 0;
        post.create_time = now;
        post.reply_time = now;
        post.parent_author = None;
        post.notification_seq = None;
        post.banned = false;

        let post = self.db.update(|txn| {
            let index = read_root_counter(txn)? + 1;
            txn.put(CF_META, META_ROOT_COUNTER, &index.to_be_bytes())?;
            raise_sequence_mark(txn, post.id.sequence())?;

            post.index = index;
            put_post(txn, &post)?;
            for key in index_keys(&post)? {
                insert_entry(txn, &key, &post.id)?;
            }
            Ok(post)
        })?;

        info!(
            id = %post.id.short(),
            author = %post.author,
            category = %post.category,
            index = post.index,
            "Created root post"
        );
        Ok(post)
    }

    /// Stores `post` as the next reply to `parent_id`.
    ///
    /// # Errors
    /// - `NotFound` if the parent does not exist
    /// - `LockedParent` if the parent is locked
    /// - `TooManyReplies` if the parent already has `MAX_REPLIES` replies
    /// - `TooDeep` if the parent is at maximum nesting depth
    ///
    /// Nothing is written when an error is returned.
    pub fn create_reply(&self, parent_id: &PostKey, mut post: Post) -> Result<Post> {
        post.category.clear();
        post.title.clear();
        post.validate()?;

        let _guard = self.lock()?;
        let now = current_timestamp_millis();

        let post = self.db.update(|txn| {
            let mut parent = load_post(txn, parent_id)?;
            if parent.locked {
                return Err(BoardError::LockedParent);
            }
            if parent.replies >= MAX_REPLIES {
                return Err(BoardError::TooManyReplies);
            }

            let index = parent.replies + 1;
            let mut id = parent.id.clone();
            if !id.append_reply_index(index as u16) {
                return Err(BoardError::TooDeep);
            }

            parent.replies = index;
            parent.reply_time = now;

            post.id = id;
            post.index = index;
            post.title = reply_title(&parent.title);
            post.replies = 0;
            post.create_time = now;
            post.reply_time = now;
            post.banned = false;
            if parent.author != post.author {
                let sequence = self.sequence.next();
                raise_sequence_mark(txn, sequence)?;
                post.parent_author = Some(parent.author.clone());
                post.notification_seq = Some(sequence);
            } else {
                post.parent_author = None;
                post.notification_seq = None;
            }

            put_post(txn, &post)?;
            put_post(txn, &parent)?;
            for key in index_keys(&post)? {
                insert_entry(txn, &key, &post.id)?;
            }
            Ok(post)
        })?;

        info!(
            id = %post.id.short(),
            parent = %parent_id.short(),
            author = %post.author,
            index = post.index,
            "Created reply"
        );
        Ok(post)
    }

    /// Loads one post.
    ///
    /// # Errors
    /// `NotFound` if the post is absent or its record is corrupt.
    pub fn get_post(&self, id: &PostKey) -> Result<Post> {
        self.db.view(|txn| load_post(txn, id))
    }

    /// Loads several posts from one snapshot, skipping ids that do not resolve.
    pub fn get_posts(&self, ids: &[PostKey]) -> Result<Vec<Post>> {
        self.db.view(|txn| {
            let mut posts = Vec::with_capacity(ids.len());
            for id in ids {
                match load_post(txn, id) {
                    Ok(post) => posts.push(post),
                    Err(e) if e.is_not_found() => {
                        debug!(id = %id.short(), "get_posts: skipping missing post");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(posts)
        })
    }

    /// Rewrites a post's editable fields, moving its category index entry
    /// when the category changed.
    ///
    /// Author, index, reply count, timestamps and notification entry are kept
    /// from the stored record. Replies keep their derived title and an empty
    /// category. Any
    /// category entry for `old_category` or the stored category that no longer
    /// applies is removed in the same transaction.
    pub fn update_post(&self, post: &Post, old_category: &str) -> Result<Post> {
        let _guard = self.lock()?;

        let updated = self.db.update(|txn| {
            let stored = load_post(txn, &post.id)?;

            let mut updated = post.clone();
            updated.author = stored.author.clone();
            updated.index = stored.index;
            updated.replies = stored.replies;
            updated.create_time = stored.create_time;
            updated.reply_time = stored.reply_time;
            updated.parent_author = stored.parent_author.clone();
            updated.notification_seq = stored.notification_seq;
            updated.banned = stored.banned;
            if updated.is_reply() {
                updated.category.clear();
                updated.title = stored.title.clone();
            }
            updated.validate()?;

            if !updated.is_reply() {
                for stale in [old_category, stored.category.as_str()] {
                    if stale != updated.category {
                        delete_entry(txn, &updated.id.index_key(&category_tag(stale))?)?;
                    }
                }
                insert_entry(txn, &updated.id.index_key(&updated.category_tag())?, &updated.id)?;
            }

            put_post(txn, &updated)?;
            Ok(updated)
        })?;

        debug!(
            id = %updated.id.short(),
            category = %updated.category,
            "Updated post"
        );
        Ok(updated)
    }

    /// Applies `modify` to the stored record under the repository lock.
    ///
    /// For changes that do not touch indexed fields.
    pub(crate) fn modify_post<F>(&self, id: &PostKey, modify: F) -> Result<Post>
    where
        F: FnOnce(&mut Post),
    {
        let _guard = self.lock()?;
        self.db.update(|txn| {
            let mut post = load_post(txn, id)?;
            modify(&mut post);
            put_post(txn, &post)?;
            Ok(post)
        })
    }

    /// Removes a post's primary record and all index entries pointing at it.
    ///
    /// Which entries exist is decided from the stored record. Replies of the
    /// deleted post are kept.
    ///
    /// # Errors
    /// `NotFound` if the post does not exist.
    pub fn delete_post(&self, post: &Post) -> Result<()> {
        let _guard = self.lock()?;

        self.db.update(|txn| {
            let stored = load_post(txn, &post.id)?;
            txn.delete(CF_POSTS, &stored.id.to_bytes())?;
            for key in index_keys(&stored)? {
                delete_entry(txn, &key)?;
            }
            Ok(())
        })?;

        info!(id = %post.id.short(), "Deleted post");
        Ok(())
    }

    /// Returns the number of root posts ever created.
    pub fn root_post_count(&self) -> Result<u64> {
        self.db.view(|txn| read_root_counter(txn))
    }

    /// Lists posts under `tag` newest first. See [`pagination::find_posts`].
    pub fn find_posts(
        &self,
        tag: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<PaginatedResult<Post>> {
        pagination::find_posts(&self.db, tag, cursor, limit)
    }

    /// Lists direct replies of a post oldest first. See [`pagination::find_replies`].
    pub fn find_replies(
        &self,
        parent_id: &PostKey,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<PaginatedResult<Post>> {
        pagination::find_replies(&self.db, parent_id, cursor, limit)
    }
}
