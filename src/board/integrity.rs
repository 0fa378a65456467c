//! Consistency checking and rebuilding of the secondary indexes.
//!
//! The indexes are fully derivable from the primary records: each post is
//! expected under its author tag, root posts under their `#category` tag, and
//! replies that notified their parent's author under a notification entry in
//! that author's tag.

use crate::board::key::{Header, PostKey};
use crate::board::post::Post;
use crate::board::repository::{index_keys, insert_entry, PostRepository, CF_POSTS};
use crate::error::Result;
use crate::storage::{Direction, ReadTxn, WriteTxn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{info, warn};

/// One index entry, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Encoded index key.
    pub key: Vec<u8>,
    /// Value found (or expected) under the key: the target's primary key.
    pub target: Vec<u8>,
}

impl IndexEntry {
    /// Decodes the index key, if well-formed.
    pub fn index_key(&self) -> Option<PostKey> {
        PostKey::from_bytes(&self.key).ok()
    }
}

impl fmt::Display for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.index_key(), PostKey::from_bytes(&self.target)) {
            (Some(key), Ok(target)) => {
                write!(f, "{} {:?} -> {}", key.header(), key.tag(), target.short())
            }
            _ => write!(f, "{} -> {}", hex::encode(&self.key), hex::encode(&self.target)),
        }
    }
}

/// Outcome of [`PostRepository::check_indexes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Primary records scanned.
    pub posts: usize,
    /// Index entries scanned.
    pub entries: usize,
    /// Entries whose target is missing or does not carry the entry's tag.
    pub dangling: Vec<IndexEntry>,
    /// Entries a stored post requires but the index lacks.
    pub missing: Vec<IndexEntry>,
}

impl IndexReport {
    pub fn is_consistent(&self) -> bool {
        self.dangling.is_empty() && self.missing.is_empty()
    }
}

fn scan_header<F>(txn: &ReadTxn<'_>, header: Header, mut callback: F) -> Result<usize>
where
    F: FnMut(&[u8], &[u8]),
{
    let prefix = [header.as_byte()];
    txn.scan(CF_POSTS, &prefix, &prefix, Direction::Ascending, |key, value| {
        callback(key, value);
        true
    })
}

fn scan_header_keys(txn: &WriteTxn<'_>, header: Header) -> Result<Vec<Vec<u8>>> {
    let prefix = [header.as_byte()];
    let mut keys = Vec::new();
    txn.scan(CF_POSTS, &prefix, &prefix, Direction::Ascending, |key, _| {
        keys.push(key.to_vec());
        true
    })?;
    Ok(keys)
}

/// Decodes a primary record, requiring it to be stored under its own id.
fn decode_primary(key: &[u8], value: &[u8]) -> Option<Post> {
    let id = PostKey::from_bytes(key).ok()?;
    let post = Post::from_bytes(value).ok()?;
    if post.id != id {
        return None;
    }
    Some(post)
}

impl PostRepository {
    /// Compares every index entry with the primary records.
    ///
    /// Reads one snapshot and never writes.
    pub fn check_indexes(&self) -> Result<IndexReport> {
        let report = self.db().view(|txn| {
            let mut report = IndexReport::default();
            let mut expected: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
            let mut failure = None;

            scan_header(txn, Header::Post, |key, value| {
                report.posts += 1;
                let Some(post) = decode_primary(key, value) else {
                    warn!(key = %hex::encode(key), "check_indexes: undecodable post record");
                    return;
                };
                match index_keys(&post) {
                    Ok(index_keys) => {
                        for index_key in index_keys {
                            expected.insert(index_key.to_bytes(), key.to_vec());
                        }
                    }
                    Err(e) => failure = Some(e),
                }
            })?;
            if let Some(e) = failure {
                return Err(e);
            }

            let mut seen = HashSet::new();
            for header in [Header::AuthorTag, Header::CategoryTag] {
                scan_header(txn, header, |key, value| {
                    report.entries += 1;
                    seen.insert(key.to_vec());
                    if expected.get(key).map(Vec::as_slice) != Some(value) {
                        report.dangling.push(IndexEntry {
                            key: key.to_vec(),
                            target: value.to_vec(),
                        });
                    }
                })?;
            }

            let mut missing: Vec<IndexEntry> = expected
                .into_iter()
                .filter(|(key, _)| !seen.contains(key))
                .map(|(key, target)| IndexEntry { key, target })
                .collect();
            missing.sort_by(|a, b| a.key.cmp(&b.key));
            report.missing = missing;

            Ok(report)
        })?;

        if report.is_consistent() {
            info!(
                posts = report.posts,
                entries = report.entries,
                "Index check passed"
            );
        } else {
            warn!(
                posts = report.posts,
                entries = report.entries,
                dangling = report.dangling.len(),
                missing = report.missing.len(),
                "Index check found inconsistencies"
            );
        }
        Ok(report)
    }

    /// Drops every author and category index entry and regenerates them from
    /// the primary records, in one transaction.
    ///
    /// Returns the number of entries written.
    pub fn rebuild_indexes(&self) -> Result<usize> {
        let _guard = self.lock()?;
        info!("Rebuilding board indexes...");

        let (removed, written) = self.db().update(|txn| {
            let mut removed = 0;
            for header in [Header::AuthorTag, Header::CategoryTag] {
                for key in scan_header_keys(txn, header)? {
                    txn.delete(CF_POSTS, &key)?;
                    removed += 1;
                }
            }

            let mut posts = Vec::new();
            let prefix = [Header::Post.as_byte()];
            txn.scan(CF_POSTS, &prefix, &prefix, Direction::Ascending, |key, value| {
                match decode_primary(key, value) {
                    Some(post) => posts.push(post),
                    None => warn!(key = %hex::encode(key), "rebuild_indexes: skipping post record"),
                }
                true
            })?;

            let mut written = 0;
            for post in &posts {
                for index_key in index_keys(post)? {
                    insert_entry(txn, &index_key, &post.id)?;
                    written += 1;
                }
            }
            Ok((removed, written))
        })?;

        info!(removed, written, "Index rebuild complete");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_repository() -> (PostRepository, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let repo = PostRepository::new(temp_dir.path().join("board_data"))
            .expect("Failed to open repository");
        (repo, temp_dir)
    }

    fn populate(repo: &PostRepository) -> (Post, Post) {
        let root = repo
            .create_root_post(Post::new("alice", "general", "Hello", "Root"))
            .unwrap();
        let reply = repo.create_reply(&root.id, Post::reply("bob", "Hi")).unwrap();
        (root, reply)
    }

    #[test]
    fn test_fresh_board_is_consistent() {
        let (repo, _temp) = create_test_repository();
        let (root, _reply) = populate(&repo);

        let mut moved = root.clone();
        moved.category = "news".to_string();
        repo.update_post(&moved, "general").unwrap();

        let report = repo.check_indexes().unwrap();
        assert!(report.is_consistent(), "{:?}", report);
        assert_eq!(report.posts, 2);
        // root: author + category, reply: author + notification
        assert_eq!(report.entries, 4);
    }

    #[test]
    fn test_detects_dangling_and_missing() {
        let (repo, _temp) = create_test_repository();
        let (root, reply) = populate(&repo);

        let stray = PostKey::root(1).index_key("ghost").unwrap();
        let category = root.id.index_key("#general").unwrap();
        repo.db()
            .update(|txn| {
                txn.put(CF_POSTS, &stray.to_bytes(), &PostKey::root(1).to_bytes())?;
                txn.delete(CF_POSTS, &category.to_bytes())?;
                txn.delete(CF_POSTS, &reply.id.to_bytes())
            })
            .unwrap();

        let report = repo.check_indexes().unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.posts, 1);
        // stray entry plus the reply's two entries
        assert_eq!(report.dangling.len(), 3);
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].index_key(), Some(category));
    }

    #[test]
    fn test_rebuild_restores_consistency() {
        let (repo, _temp) = create_test_repository();
        let (root, _reply) = populate(&repo);

        let author = root.id.index_key("alice").unwrap();
        let stray = PostKey::root(1).index_key("#old").unwrap();
        repo.db()
            .update(|txn| {
                txn.delete(CF_POSTS, &author.to_bytes())?;
                txn.put(CF_POSTS, &stray.to_bytes(), &PostKey::root(1).to_bytes())
            })
            .unwrap();
        assert!(!repo.check_indexes().unwrap().is_consistent());

        assert_eq!(repo.rebuild_indexes().unwrap(), 4);
        let report = repo.check_indexes().unwrap();
        assert!(report.is_consistent(), "{:?}", report);
        assert_eq!(report.entries, 4);
    }
}
