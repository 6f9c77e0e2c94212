//! Reusable query cursor.
//!
//! An [`Agent`] carries one logical query context: the query itself (a byte
//! string or a key id), the progress of a multi-result search, and the last
//! match. Reusing one agent across queries is the intended idiom; its
//! internal buffers are recycled so repeated searches do not reallocate.
//!
//! Agents are plain mutable values. Share a trie across threads freely, but
//! give each thread its own agent.

use smallvec::SmallVec;

use crate::{Error, KeyId, Result, INVALID_KEY_ID};

/// Which kind of query the agent currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueryMode {
    /// No query set yet.
    None,
    /// Byte-string query for lookup / prefix / predictive searches.
    Str,
    /// Key-id query for reverse lookup.
    Id,
}

/// Progress of a resumable search bound to this agent.
///
/// A cursor belongs to the search operation (and trie) that started it;
/// `set_query` is the only way to rewind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cursor {
    /// No search step has run since the last `set_query`.
    Fresh,
    /// Mid common-prefix search: current node and consumed query bytes.
    CommonPrefix { node: u32, pos: u32 },
    /// Mid predictive search; the DFS state lives in `dfs_stack`/`path_buf`.
    Predictive,
    /// Search exhausted; every further step reports no match.
    Done,
}

/// Sentinel parent length marking a DFS entry whose path is already in
/// `path_buf` (the node the search started from).
pub(crate) const DFS_SELF: u32 = u32::MAX;

/// Mutable per-query state: query, cursor and last match.
#[derive(Debug)]
pub struct Agent {
    pub(crate) mode: QueryMode,
    pub(crate) query_buf: Vec<u8>,
    pub(crate) query_id: KeyId,
    pub(crate) key_buf: Vec<u8>,
    pub(crate) key_id: KeyId,
    pub(crate) has_key: bool,
    pub(crate) cursor: Cursor,
    /// Key string of the node a predictive search is currently visiting.
    pub(crate) path_buf: Vec<u8>,
    /// Scratch for resolving multi-byte edges while stepping.
    pub(crate) edge_buf: Vec<u8>,
    /// Pending `(node, parent path length)` entries of a predictive DFS.
    pub(crate) dfs_stack: SmallVec<[(u32, u32); 16]>,
}

impl Agent {
    /// Create an agent with no query.
    pub fn new() -> Self {
        Self {
            mode: QueryMode::None,
            query_buf: Vec::new(),
            query_id: INVALID_KEY_ID,
            key_buf: Vec::new(),
            key_id: INVALID_KEY_ID,
            has_key: false,
            cursor: Cursor::Fresh,
            path_buf: Vec::new(),
            edge_buf: Vec::new(),
            dfs_stack: SmallVec::new(),
        }
    }

    /// Switch to string-query mode, reset the cursor and clear the previous
    /// match.
    pub fn set_query(&mut self, query: impl AsRef<[u8]>) {
        self.query_buf.clear();
        self.query_buf.extend_from_slice(query.as_ref());
        self.mode = QueryMode::Str;
        self.reset_progress();
    }

    /// Switch to id-query mode (for reverse lookup), reset the cursor and
    /// clear the previous match.
    pub fn set_query_id(&mut self, id: KeyId) {
        self.query_id = id;
        self.mode = QueryMode::Id;
        self.reset_progress();
    }

    /// Forget the query, cursor and match entirely.
    pub fn clear(&mut self) {
        self.mode = QueryMode::None;
        self.query_buf.clear();
        self.query_id = INVALID_KEY_ID;
        self.reset_progress();
    }

    /// The current string query.
    ///
    /// Fails with [`Error::InvalidState`] unless the agent is in string-query
    /// mode.
    pub fn query_str(&self) -> Result<&[u8]> {
        match self.mode {
            QueryMode::Str => Ok(&self.query_buf),
            _ => Err(Error::InvalidState("agent holds no string query")),
        }
    }

    /// The current id query.
    ///
    /// Fails with [`Error::InvalidState`] unless the agent is in id-query
    /// mode.
    pub fn query_id(&self) -> Result<KeyId> {
        match self.mode {
            QueryMode::Id => Ok(self.query_id),
            _ => Err(Error::InvalidState("agent holds no id query")),
        }
    }

    /// Key string of the last successful match.
    ///
    /// Fails with [`Error::InvalidState`] if no search has succeeded since
    /// the last `set_query`.
    pub fn key_str(&self) -> Result<&[u8]> {
        if self.has_key {
            Ok(&self.key_buf)
        } else {
            Err(Error::InvalidState("no match recorded on this agent"))
        }
    }

    /// Key id of the last successful match.
    ///
    /// Fails with [`Error::InvalidState`] if no search has succeeded since
    /// the last `set_query`.
    pub fn key_id(&self) -> Result<KeyId> {
        if self.has_key {
            Ok(self.key_id)
        } else {
            Err(Error::InvalidState("no match recorded on this agent"))
        }
    }

    fn reset_progress(&mut self) {
        self.cursor = Cursor::Fresh;
        self.has_key = false;
        self.key_id = INVALID_KEY_ID;
        self.key_buf.clear();
        self.path_buf.clear();
        self.edge_buf.clear();
        self.dfs_stack.clear();
    }

    /// Record a match whose key is the first `len` bytes of the query.
    pub(crate) fn record_query_prefix_match(&mut self, len: usize, id: KeyId) {
        self.key_buf.clear();
        self.key_buf.extend_from_slice(&self.query_buf[..len]);
        self.key_id = id;
        self.has_key = true;
    }

    /// Record a match whose key is the current traversal path.
    pub(crate) fn record_path_match(&mut self, id: KeyId) {
        self.key_buf.clear();
        self.key_buf.extend_from_slice(&self.path_buf);
        self.key_id = id;
        self.has_key = true;
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_agent_has_no_query() {
        let agent = Agent::new();
        assert!(matches!(agent.query_str(), Err(Error::InvalidState(_))));
        assert!(matches!(agent.query_id(), Err(Error::InvalidState(_))));
        assert!(matches!(agent.key_str(), Err(Error::InvalidState(_))));
        assert!(matches!(agent.key_id(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_mode_switching() {
        let mut agent = Agent::new();

        agent.set_query(b"prefix");
        assert_eq!(agent.query_str().unwrap(), b"prefix");
        assert!(matches!(agent.query_id(), Err(Error::InvalidState(_))));

        agent.set_query_id(7);
        assert_eq!(agent.query_id().unwrap(), 7);
        assert!(matches!(agent.query_str(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_set_query_clears_match() {
        let mut agent = Agent::new();
        agent.set_query(b"abc");
        agent.record_query_prefix_match(2, 3);
        assert_eq!(agent.key_str().unwrap(), b"ab");
        assert_eq!(agent.key_id().unwrap(), 3);

        agent.set_query(b"next");
        assert!(matches!(agent.key_str(), Err(Error::InvalidState(_))));
        assert_eq!(agent.cursor, Cursor::Fresh);
    }

    #[test]
    fn test_clear() {
        let mut agent = Agent::new();
        agent.set_query(b"abc");
        agent.record_query_prefix_match(3, 0);
        agent.clear();
        assert!(matches!(agent.query_str(), Err(Error::InvalidState(_))));
        assert!(matches!(agent.key_str(), Err(Error::InvalidState(_))));
    }
}
