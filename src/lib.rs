//! # postboard - discussion board post storage and indexing
//!
//! An embedded storage engine for a discussion board. Every post, reply,
//! secondary-index entry and ban marker lives in one flat, byte-ordered
//! RocksDB namespace whose key encoding expresses creation order, reply
//! nesting and tag grouping at once.
//!
//! ## Features
//!
//! - **Composite keys**: fixed-width keys whose byte order is (header, tag, sequence, reply path)
//! - **Atomic index maintenance**: a post and all of its author/category entries change in one transaction
//! - **Bounded reply trees**: replies are addressed by key alone, with capped depth and fan-out
//! - **Cursor pagination**: resumable, bidirectional listings per author, category or site-wide
//!
//! ## Example
//!
//! ```rust,no_run
//! use postboard::{Post, PostRepository};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = PostRepository::new("board_data")?;
//! let root = repo.create_root_post(Post::new("alice", "general", "Hello", "First post"))?;
//! let reply = repo.create_reply(&root.id, Post::reply("bob", "Welcome!"))?;
//! assert_eq!(reply.title, "RE: Hello");
//!
//! let page = repo.find_posts("#general", None, 20)?;
//! for post in &page.items {
//!     println!("{} {}", post.index, post.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod board;
pub mod cli;
pub mod config;
pub mod error;
pub mod storage;

pub use board::{Cursor, Header, PaginatedResult, Post, PostKey, PostRepository};
pub use config::BoardConfig;
pub use error::{BoardError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
