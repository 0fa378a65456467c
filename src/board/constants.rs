//! Shared constants for board limits and key layout.

// =============================================================================
// Reply Tree Limits
// =============================================================================

/// Maximum number of direct replies a single post can receive.
pub const MAX_REPLIES: u64 = 16_000;

/// Maximum nesting depth of a reply path.
pub const MAX_REPLY_DEPTH: usize = 8;

/// Prefix prepended to the parent title to form a reply title.
pub const REPLY_TITLE_PREFIX: &str = "RE: ";

/// Marker that turns a category name into its index tag.
pub const CATEGORY_TAG_MARKER: char = '#';

// =============================================================================
// Key Layout
// =============================================================================

/// Maximum tag size in bytes (author name or `#category`).
pub const MAX_TAG_SIZE: usize = 31;

/// Tag field: 1 length byte followed by the zero-padded tag bytes.
pub const TAG_FIELD_SIZE: usize = 1 + MAX_TAG_SIZE;

/// Sequence field: big-endian u64.
pub const SEQUENCE_SIZE: usize = 8;

/// Reply path field: one big-endian u16 per nesting level.
pub const PATH_FIELD_SIZE: usize = 2 * MAX_REPLY_DEPTH;

/// Total encoded key size.
pub const KEY_SIZE: usize = 1 + TAG_FIELD_SIZE + SEQUENCE_SIZE + PATH_FIELD_SIZE;

// =============================================================================
// Content Size Limits
// =============================================================================

/// Maximum title size (512 bytes).
pub const MAX_TITLE_SIZE: usize = 512;

/// Maximum post content size (100KB).
pub const MAX_CONTENT_SIZE: usize = 100 * 1024;

// =============================================================================
// Pagination
// =============================================================================

/// Default page size for paginated queries.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Maximum items returned in a single page.
pub const MAX_PAGE_SIZE: usize = 1000;
