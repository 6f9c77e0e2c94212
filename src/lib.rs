//! # StatTrie - Static Succinct Trie Dictionary
//!
//! A build-once, read-many dictionary over byte-string keys, stored as a
//! succinct (bit-packed, rank/select-navigated) trie.
//!
//! ## Features
//!
//! - **Compact**: LOUDS bit-vector node encoding plus patricia edge
//!   compression, typically a few bytes per key
//! - **Exact lookup**: key -> dense integer id in O(key length)
//! - **Reverse lookup**: id -> key, the exact inverse
//! - **Common-prefix search**: all stored keys that are prefixes of a query
//! - **Predictive search**: all stored keys that extend a query prefix
//! - **Single-image persistence**: the in-memory structure *is* the on-disk
//!   image, so files can be loaded as an owned copy or memory-mapped with
//!   zero deserialization cost
//!
//! ## Architecture
//!
//! Keys are collected in a [`Keyset`], then frozen by [`Trie::build`] into a
//! cascade of one or more LOUDS tries. Each level collapses single-child
//! chains into multi-byte edges; the first byte of an edge lives in the
//! level's label array and the remainder is pushed down, reversed, as a key
//! of the next level (shared suffixes become shared prefixes there). The last
//! level spills its remainders into a flat tail block.
//!
//! Queries are mediated by a reusable [`Agent`] cursor, so repeated searches
//! do not reallocate.
//!
//! ## Example
//!
//! ```rust
//! use stattrie::{Agent, Keyset, Trie, TrieConfig};
//!
//! let mut keyset = Keyset::new();
//! keyset.push_back(b"cake").unwrap();
//! keyset.push_back(b"cookie").unwrap();
//! keyset.push_back(b"ice").unwrap();
//! keyset.push_back(b"ice-cream").unwrap();
//!
//! let trie = Trie::build(&keyset, &TrieConfig::default()).unwrap();
//! assert_eq!(trie.num_keys(), 4);
//!
//! let id = trie.lookup(b"ice").unwrap();
//! assert_eq!(trie.reverse_lookup(id).unwrap(), b"ice");
//!
//! let mut agent = Agent::new();
//! agent.set_query(b"ice-cream soda");
//! while trie.common_prefix_search(&mut agent).unwrap() {
//!     // yields "ice", then "ice-cream"
//!     let _key = agent.key_str().unwrap();
//! }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod bits;
pub mod builder;
pub mod image;
pub mod keyset;
pub mod trie;

#[cfg(test)]
mod proptests;

pub use agent::Agent;
pub use keyset::Keyset;
pub use trie::Trie;

/// Dense key identifier assigned at build time, in `[0, num_keys)`.
pub type KeyId = u32;

/// Sentinel returned by id-valued APIs for "no such key".
pub const INVALID_KEY_ID: KeyId = u32::MAX;

/// Maximum length of a single key in bytes. Longer keys are rejected at
/// [`Keyset::push_back`] time.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Maximum number of cascade levels a dictionary may be configured with.
pub const MAX_NUM_TRIES: usize = 16;

/// Error type for dictionary operations.
///
/// Lookup misses are *not* errors; they surface as `Option`/`bool` results.
#[derive(Debug)]
pub enum Error {
    /// A caller-supplied key, id or configuration value is unusable.
    InvalidArgument(&'static str),
    /// Construction failed on an inconsistent configuration or an input that
    /// exceeds the addressable limits of the encoding.
    Build(&'static str),
    /// Persistence I/O failed.
    Io(std::io::Error),
    /// A serialized image is corrupt or has an incompatible header.
    Format(&'static str),
    /// An [`Agent`] was used in the wrong query mode or before any match.
    InvalidState(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::Build(msg) => write!(f, "build error: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Format(msg) => write!(f, "format error: {}", msg),
            Error::InvalidState(msg) => write!(f, "invalid state: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result type for dictionary operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Child ordering inside every node, which also fixes key-id assignment.
///
/// Ids are assigned in level order (BFS) over the first trie's terminal
/// nodes, so the ordering mode decides which keys get the small ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrder {
    /// Children sorted by edge byte; ids follow breadth-first lexicographic
    /// order and predictive search yields keys lexicographically.
    Label,
    /// Children sorted by descending subtree weight (ties by ascending edge
    /// byte); frequent keys get small ids. This is the default.
    Weight,
}

/// Number of cascade levels to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumTries {
    /// Pick from the keyset size: 1 for empty input, 2 up to 1 MiB of key
    /// bytes, 3 beyond that.
    Auto,
    /// Exactly this many levels, in `1..=MAX_NUM_TRIES`. The stored level
    /// count can still be lower when the cascade runs out of multi-byte
    /// edges early.
    Fixed(usize),
}

/// Build-time configuration for [`Trie::build`].
#[derive(Debug, Clone, Copy)]
pub struct TrieConfig {
    /// Cascade depth.
    pub num_tries: NumTries,
    /// Child ordering / id assignment mode.
    pub order: NodeOrder,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            num_tries: NumTries::Auto,
            order: NodeOrder::Weight,
        }
    }
}
