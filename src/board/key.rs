//! Composite binary keys for the board namespace.
//!
//! Every record in the store (post, reply, index entry, ban marker) lives in
//! one flat, byte-ordered namespace. Keys are fixed width so that a prefix
//! scan over a header and tag is bounded to exactly that tag's entries:
//!
//! ```text
//! ┌────────┬─────────┬──────────────────┬────────────┬─────────────────────────┐
//! │ header │ tag_len │ tag (zero padded)│  sequence  │ reply path (zero padded)│
//! │ 1 byte │ 1 byte  │     31 bytes     │ u64 BE (8) │   8 x u16 BE (16)       │
//! └────────┴─────────┴──────────────────┴────────────┴─────────────────────────┘
//! ```
//!
//! Within one header and tag, byte order equals `(sequence, path)` order. Path
//! segments are 1-based, so a zero segment terminates the path: a parent sorts
//! immediately before its descendants and siblings sort by reply index.

use crate::board::constants::{
    KEY_SIZE, MAX_REPLY_DEPTH, MAX_TAG_SIZE, SEQUENCE_SIZE, TAG_FIELD_SIZE,
};
use crate::error::{BoardError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const TAG_OFFSET: usize = 1;
const SEQUENCE_OFFSET: usize = TAG_OFFSET + TAG_FIELD_SIZE;
const PATH_OFFSET: usize = SEQUENCE_OFFSET + SEQUENCE_SIZE;

/// Kind of record a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Header {
    /// Primary post record (root post, or reply when the path is non-empty).
    Post = 0x01,
    /// Secondary index: posts by author.
    AuthorTag = 0x02,
    /// Secondary index: root posts by `#category`.
    CategoryTag = 0x03,
    /// Author ban marker.
    Ban = 0x04,
}

impl Header {
    /// Replies share the primary post header; they differ only by path.
    pub const REPLY: Header = Header::Post;

    /// Parses a header byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(Header::Post),
            0x02 => Ok(Header::AuthorTag),
            0x03 => Ok(Header::CategoryTag),
            0x04 => Ok(Header::Ban),
            other => Err(BoardError::invalid_key(format!(
                "unknown header 0x{:02x}",
                other
            ))),
        }
    }

    /// Returns the encoded header byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Picks the header whose range holds `tag`.
    ///
    /// The empty tag selects primary records, `#name` selects the category
    /// index, and anything else the author index.
    pub fn for_tag(tag: &str) -> Self {
        if tag.is_empty() {
            Header::Post
        } else if tag.starts_with('#') {
            Header::CategoryTag
        } else {
            Header::AuthorTag
        }
    }

    /// Returns true for secondary index headers.
    pub fn is_index(self) -> bool {
        matches!(self, Header::AuthorTag | Header::CategoryTag)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Header::Post => write!(f, "Post"),
            Header::AuthorTag => write!(f, "AuthorTag"),
            Header::CategoryTag => write!(f, "CategoryTag"),
            Header::Ban => write!(f, "Ban"),
        }
    }
}

fn validate_tag(tag: &str) -> Result<()> {
    if tag.len() > MAX_TAG_SIZE {
        return Err(BoardError::invalid_input(format!(
            "tag exceeds maximum size of {} bytes",
            MAX_TAG_SIZE
        )));
    }
    if tag.contains('\0') {
        return Err(BoardError::invalid_input("tag cannot contain NUL bytes"));
    }
    Ok(())
}

fn encode_tag_field(tag: &str, out: &mut Vec<u8>) {
    let bytes = tag.as_bytes();
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
    out.resize(out.len() + MAX_TAG_SIZE - bytes.len(), 0);
}

/// A decoded composite key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PostKey {
    header: Header,
    tag: String,
    sequence: u64,
    path: [u16; MAX_REPLY_DEPTH],
    depth: u8,
}

impl PostKey {
    /// Creates a key with an empty reply path.
    pub fn new(header: Header, tag: &str, sequence: u64) -> Result<Self> {
        validate_tag(tag)?;
        Ok(Self {
            header,
            tag: tag.to_string(),
            sequence,
            path: [0; MAX_REPLY_DEPTH],
            depth: 0,
        })
    }

    /// Creates the primary key of a root post.
    pub fn root(sequence: u64) -> Self {
        Self {
            header: Header::Post,
            tag: String::new(),
            sequence,
            path: [0; MAX_REPLY_DEPTH],
            depth: 0,
        }
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the reply-index path (empty for root keys).
    pub fn path(&self) -> &[u16] {
        &self.path[..self.depth as usize]
    }

    pub fn depth(&self) -> usize {
        self.depth as usize
    }

    /// Returns true if the path is non-empty.
    pub fn is_reply(&self) -> bool {
        self.depth > 0
    }

    /// Replaces the tag, keeping header, sequence and path.
    pub fn set_tag(&mut self, tag: &str) -> Result<()> {
        validate_tag(tag)?;
        self.tag = tag.to_string();
        Ok(())
    }

    /// Replaces the header, keeping tag, sequence and path.
    pub fn set_header(&mut self, header: Header) {
        self.header = header;
    }

    /// Derives the key of this record under another header and tag.
    pub fn retag(&self, header: Header, tag: &str) -> Result<Self> {
        let mut key = self.clone();
        key.set_tag(tag)?;
        key.set_header(header);
        Ok(key)
    }

    /// Derives the index key for `tag` (header picked by [`Header::for_tag`]).
    pub fn index_key(&self, tag: &str) -> Result<Self> {
        self.retag(Header::for_tag(tag), tag)
    }

    /// Returns the primary record key sharing this key's sequence and path.
    pub fn primary(&self) -> Self {
        Self {
            header: Header::Post,
            tag: String::new(),
            sequence: self.sequence,
            path: self.path,
            depth: self.depth,
        }
    }

    /// Appends one nesting level.
    ///
    /// Returns false (leaving the key unchanged) when the path is already at
    /// maximum depth or `index` is 0.
    pub fn append_reply_index(&mut self, index: u16) -> bool {
        if index == 0 || self.depth() >= MAX_REPLY_DEPTH {
            return false;
        }
        self.path[self.depth()] = index;
        self.depth += 1;
        true
    }

    /// Returns the key with its last path segment stripped, or `None` for roots.
    pub fn parent(&self) -> Option<Self> {
        if self.depth == 0 {
            return None;
        }
        let mut parent = self.clone();
        parent.depth -= 1;
        parent.path[parent.depth()] = 0;
        Some(parent)
    }

    /// Encodes the key into its fixed-width byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(KEY_SIZE);
        out.push(self.header.as_byte());
        encode_tag_field(&self.tag, &mut out);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        for segment in &self.path {
            out.extend_from_slice(&segment.to_be_bytes());
        }
        out
    }

    /// Decodes a key, rejecting anything [`PostKey::to_bytes`] could not produce.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != KEY_SIZE {
            return Err(BoardError::invalid_key(format!(
                "expected {} bytes, got {}",
                KEY_SIZE,
                data.len()
            )));
        }

        let header = Header::from_byte(data[0])?;

        let tag_len = data[TAG_OFFSET] as usize;
        if tag_len > MAX_TAG_SIZE {
            return Err(BoardError::invalid_key(format!(
                "tag length {} exceeds {}",
                tag_len, MAX_TAG_SIZE
            )));
        }
        let tag_start = TAG_OFFSET + 1;
        let tag_bytes = &data[tag_start..tag_start + tag_len];
        if data[tag_start + tag_len..SEQUENCE_OFFSET]
            .iter()
            .any(|b| *b != 0)
        {
            return Err(BoardError::invalid_key("non-zero tag padding"));
        }
        let tag = std::str::from_utf8(tag_bytes)
            .map_err(|_| BoardError::invalid_key("tag is not valid UTF-8"))?;
        validate_tag(tag).map_err(|e| BoardError::invalid_key(e.to_string()))?;

        let mut sequence_bytes = [0u8; SEQUENCE_SIZE];
        sequence_bytes.copy_from_slice(&data[SEQUENCE_OFFSET..PATH_OFFSET]);
        let sequence = u64::from_be_bytes(sequence_bytes);

        let mut path = [0u16; MAX_REPLY_DEPTH];
        let mut depth = 0u8;
        let mut terminated = false;
        for (i, chunk) in data[PATH_OFFSET..].chunks_exact(2).enumerate() {
            let segment = u16::from_be_bytes([chunk[0], chunk[1]]);
            if segment == 0 {
                terminated = true;
            } else if terminated {
                return Err(BoardError::invalid_key("path segment after terminator"));
            } else {
                path[i] = segment;
                depth += 1;
            }
        }

        Ok(Self {
            header,
            tag: tag.to_string(),
            sequence,
            path,
            depth,
        })
    }

    /// Returns the byte prefix shared by every key under `header` and `tag`.
    pub fn range_prefix(header: Header, tag: &str) -> Result<Vec<u8>> {
        validate_tag(tag)?;
        let mut out = Vec::with_capacity(1 + TAG_FIELD_SIZE);
        out.push(header.as_byte());
        encode_tag_field(tag, &mut out);
        Ok(out)
    }

    /// Returns a key-sized upper bound for everything starting with `prefix`.
    pub fn range_end(prefix: &[u8]) -> Vec<u8> {
        let mut end = prefix.to_vec();
        end.resize(KEY_SIZE, 0xff);
        end
    }

    /// Returns the byte prefix shared by this key and all of its descendants.
    pub fn descendant_prefix(&self) -> Vec<u8> {
        let mut bytes = self.to_bytes();
        bytes.truncate(PATH_OFFSET + 2 * self.depth());
        bytes
    }

    /// Returns a compact human-readable form, e.g. `1a2b3c/3/1`.
    pub fn short(&self) -> String {
        let mut out = format!("{:x}", self.sequence);
        for segment in self.path() {
            out.push('/');
            out.push_str(&segment.to_string());
        }
        out
    }

    /// Returns the hex encoding of the key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parses a key from its hex encoding.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| BoardError::invalid_key(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostKey")
            .field("header", &self.header)
            .field("tag", &self.tag)
            .field("sequence", &self.sequence)
            .field("path", &self.path())
            .finish()
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for PostKey {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for PostKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for PostKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PostKeyVisitor;

        impl<'de> serde::de::Visitor<'de> for PostKeyVisitor {
            type Value = PostKey;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a byte array of length {}", KEY_SIZE)
            }

            fn visit_bytes<E>(self, v: &[u8]) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                PostKey::from_bytes(v).map_err(E::custom)
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_bytes(&v)
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut bytes = Vec::with_capacity(KEY_SIZE);
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                PostKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_bytes(PostKeyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_key(sequence: u64, path: &[u16]) -> PostKey {
        let mut key = PostKey::root(sequence);
        for index in path {
            assert!(key.append_reply_index(*index));
        }
        key
    }

    #[test]
    fn test_header_values() {
        assert_eq!(Header::Post as u8, 0x01);
        assert_eq!(Header::AuthorTag as u8, 0x02);
        assert_eq!(Header::CategoryTag as u8, 0x03);
        assert_eq!(Header::Ban as u8, 0x04);
        assert_eq!(Header::REPLY, Header::Post);
    }

    #[test]
    fn test_header_for_tag() {
        assert_eq!(Header::for_tag(""), Header::Post);
        assert_eq!(Header::for_tag("#general"), Header::CategoryTag);
        assert_eq!(Header::for_tag("alice"), Header::AuthorTag);
        assert!(Header::for_tag("alice").is_index());
        assert!(!Header::Ban.is_index());
    }

    #[test]
    fn test_roundtrip() {
        let keys = vec![
            PostKey::root(0),
            PostKey::root(u64::MAX),
            reply_key(42, &[1, 7, 16000]),
            reply_key(42, &[1; MAX_REPLY_DEPTH]),
            PostKey::new(Header::AuthorTag, "alice", 99).unwrap(),
            PostKey::new(Header::CategoryTag, "#général", 5).unwrap(),
            PostKey::new(Header::Ban, "x".repeat(MAX_TAG_SIZE).as_str(), 0).unwrap(),
        ];

        for key in keys {
            let bytes = key.to_bytes();
            assert_eq!(bytes.len(), KEY_SIZE);
            let decoded = PostKey::from_bytes(&bytes).unwrap();
            assert_eq!(decoded, key);
            assert_eq!(decoded.header(), key.header());
            assert_eq!(decoded.tag(), key.tag());
            assert_eq!(decoded.sequence(), key.sequence());
            assert_eq!(decoded.path(), key.path());
        }
    }

    #[test]
    fn test_ordering_follows_sequence_then_path() {
        let ordered = vec![
            reply_key(1, &[]),
            reply_key(1, &[1]),
            reply_key(1, &[1, 1]),
            reply_key(1, &[1, 2]),
            reply_key(1, &[2]),
            reply_key(1, &[300]),
            reply_key(2, &[]),
            reply_key(256, &[]),
        ];

        for pair in ordered.windows(2) {
            assert!(
                pair[0].to_bytes() < pair[1].to_bytes(),
                "{:?} should sort before {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_empty_tag_sorts_before_other_tags() {
        let empty = PostKey::new(Header::AuthorTag, "", u64::MAX).unwrap();
        let tagged = PostKey::new(Header::AuthorTag, "a", 0).unwrap();
        assert!(empty.to_bytes() < tagged.to_bytes());

        let prefix = PostKey::range_prefix(Header::AuthorTag, "").unwrap();
        assert!(empty.to_bytes().starts_with(&prefix));
        assert!(!tagged.to_bytes().starts_with(&prefix));
    }

    #[test]
    fn test_tag_prefix_does_not_capture_longer_tags() {
        let prefix = PostKey::range_prefix(Header::AuthorTag, "bob").unwrap();
        let bob = PostKey::new(Header::AuthorTag, "bob", 1).unwrap();
        let bobby = PostKey::new(Header::AuthorTag, "bobby", 1).unwrap();
        assert!(bob.to_bytes().starts_with(&prefix));
        assert!(!bobby.to_bytes().starts_with(&prefix));

        let end = PostKey::range_end(&prefix);
        let last = PostKey::new(Header::AuthorTag, "bob", u64::MAX)
            .map(|mut k| {
                for _ in 0..MAX_REPLY_DEPTH {
                    k.append_reply_index(u16::MAX);
                }
                k
            })
            .unwrap();
        assert!(last.to_bytes() <= end);
    }

    #[test]
    fn test_set_tag_and_header_keep_position() {
        let key = reply_key(77, &[3, 4]);
        let tagged = key.retag(Header::AuthorTag, "carol").unwrap();
        assert_eq!(tagged.header(), Header::AuthorTag);
        assert_eq!(tagged.tag(), "carol");
        assert_eq!(tagged.sequence(), 77);
        assert_eq!(tagged.path(), &[3, 4]);
        assert_eq!(tagged.primary(), key);

        let category = key.index_key("#news").unwrap();
        assert_eq!(category.header(), Header::CategoryTag);
    }

    #[test]
    fn test_rejects_oversized_tag() {
        let long = "y".repeat(MAX_TAG_SIZE + 1);
        assert!(PostKey::new(Header::AuthorTag, &long, 1).is_err());
        let mut key = PostKey::root(1);
        assert!(key.set_tag(&long).is_err());
        assert_eq!(key.tag(), "");
        assert!(PostKey::new(Header::AuthorTag, "a\0b", 1).is_err());
    }

    #[test]
    fn test_append_until_max_depth() {
        let mut key = PostKey::root(5);
        assert!(!key.append_reply_index(0));
        for i in 1..=MAX_REPLY_DEPTH {
            assert!(key.append_reply_index(i as u16));
        }
        assert_eq!(key.depth(), MAX_REPLY_DEPTH);
        let before = key.clone();
        assert!(!key.append_reply_index(1));
        assert_eq!(key, before);
    }

    #[test]
    fn test_parent() {
        let key = reply_key(9, &[2, 5]);
        let parent = key.parent().unwrap();
        assert_eq!(parent, reply_key(9, &[2]));
        assert_eq!(parent.parent().unwrap(), PostKey::root(9));
        assert!(PostKey::root(9).parent().is_none());
        assert!(!PostKey::root(9).is_reply());
        assert!(key.is_reply());
    }

    #[test]
    fn test_descendant_prefix() {
        let parent = reply_key(9, &[2]);
        let prefix = parent.descendant_prefix();
        assert!(parent.to_bytes().starts_with(&prefix));
        assert!(reply_key(9, &[2, 1]).to_bytes().starts_with(&prefix));
        assert!(reply_key(9, &[2, 1, 4]).to_bytes().starts_with(&prefix));
        assert!(!reply_key(9, &[3]).to_bytes().starts_with(&prefix));
        assert!(!reply_key(10, &[2]).to_bytes().starts_with(&prefix));
    }

    #[test]
    fn test_from_bytes_rejects_malformed() {
        assert!(PostKey::from_bytes(&[]).is_err());
        assert!(PostKey::from_bytes(&[0u8; KEY_SIZE - 1]).is_err());

        let mut bad_header = PostKey::root(1).to_bytes();
        bad_header[0] = 0x7f;
        assert!(PostKey::from_bytes(&bad_header).is_err());

        let mut bad_padding = PostKey::root(1).to_bytes();
        bad_padding[TAG_OFFSET + 5] = b'x';
        assert!(PostKey::from_bytes(&bad_padding).is_err());

        let mut bad_path = PostKey::root(1).to_bytes();
        bad_path[KEY_SIZE - 1] = 1;
        assert!(PostKey::from_bytes(&bad_path).is_err());
    }

    #[test]
    fn test_hex_and_serde() {
        let key = reply_key(0xabcdef, &[1, 2]);
        let parsed: PostKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
        assert_eq!(key.short(), "abcdef/1/2");

        let bytes = bincode::serialize(&key).unwrap();
        let decoded: PostKey = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, key);
    }
}
