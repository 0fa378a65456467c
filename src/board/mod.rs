//! The board post storage and indexing engine.
//!
//! ## Modules
//!
//! - `key`: composite binary keys defining the namespace order
//! - `post`: the stored post record
//! - `repository`: create, reply, update and delete with index maintenance
//! - `pagination`: cursor-based listings over tags and reply trees
//! - `moderation`: author bans and post flags
//! - `integrity`: index consistency check and rebuild

pub mod constants;
pub mod integrity;
pub mod key;
pub mod moderation;
pub mod pagination;
pub mod post;
pub mod repository;
pub mod sequence;

pub use integrity::{IndexEntry, IndexReport};
pub use key::{Header, PostKey};
pub use pagination::{Cursor, PaginatedResult};
pub use post::{category_tag, Post};
pub use repository::PostRepository;
pub use sequence::SequenceGenerator;
