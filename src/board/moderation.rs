//! Moderation operations: author bans and per-post flags.
//!
//! A ban is a marker key under the `Ban` header tagged with the author's
//! name. Posts are never rewritten when their author is banned; the `banned`
//! flag is derived from the marker whenever a post is read.

use crate::board::key::PostKey;
use crate::board::post::Post;
use crate::board::repository::{ban_key, is_author_banned, PostRepository, CF_POSTS};
use crate::board::sequence::current_timestamp_millis;
use crate::error::Result;
use tracing::info;

impl PostRepository {
    /// Marks `author` as banned. Banning twice keeps the first ban time.
    pub fn ban_author(&self, author: &str) -> Result<()> {
        let key = ban_key(author)?.to_bytes();
        let created = self.db().update(|txn| {
            if txn.exists(CF_POSTS, &key)? {
                return Ok(false);
            }
            txn.put(CF_POSTS, &key, &current_timestamp_millis().to_be_bytes())?;
            Ok(true)
        })?;

        if created {
            info!(author, "Banned author");
        }
        Ok(())
    }

    /// Lifts a ban. Unbanning an author that is not banned is a no-op.
    pub fn unban_author(&self, author: &str) -> Result<()> {
        let key = ban_key(author)?.to_bytes();
        let removed = self.db().update(|txn| {
            if !txn.exists(CF_POSTS, &key)? {
                return Ok(false);
            }
            txn.delete(CF_POSTS, &key)?;
            Ok(true)
        })?;

        if removed {
            info!(author, "Unbanned author");
        }
        Ok(())
    }

    pub fn is_banned(&self, author: &str) -> Result<bool> {
        self.db().view(|txn| is_author_banned(txn, author))
    }

    /// Locks or unlocks a post against new replies.
    pub fn set_locked(&self, id: &PostKey, locked: bool) -> Result<Post> {
        let post = self.modify_post(id, |post| post.locked = locked)?;
        info!(id = %id.short(), locked, "Changed post lock");
        Ok(post)
    }

    pub fn set_highlighted(&self, id: &PostKey, highlighted: bool) -> Result<Post> {
        self.modify_post(id, |post| post.highlighted = highlighted)
    }

    /// Sets the stored sage flag. Reply handling does not consult it.
    pub fn set_saged(&self, id: &PostKey, saged: bool) -> Result<Post> {
        self.modify_post(id, |post| post.saged = saged)
    }
}
