//! The immutable query engine.
//!
//! A [`Trie`] is a validated view over one serialized image: a header, one
//! LOUDS-encoded level per cascade stage and a flat tail block. The image is
//! the only state; `build` freezes straight into it, `load` owns a copy of
//! it and `map` borrows it from a read-only file mapping. All three expose
//! identical query semantics because every query runs against the same byte
//! layout.
//!
//! The structure is never mutated after construction, so a `Trie` can be
//! shared across threads freely. Searches carry their mutable state in a
//! caller-owned [`Agent`], one per thread.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use memmap2::Mmap;

use crate::agent::{Agent, Cursor, QueryMode, DFS_SELF};
use crate::bits::{BitSection, Bits};
use crate::builder;
use crate::image::{ByteSection, Header, Reader, U32Section};
use crate::keyset::Keyset;
use crate::{Error, KeyId, NodeOrder, Result, TrieConfig};

/// Backing bytes of an image: an owned buffer or a read-only file mapping.
#[derive(Debug)]
enum Storage {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Storage {
    #[inline]
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(buf) => buf,
            Storage::Mapped(map) => map,
        }
    }
}

/// Section offsets of one stored level.
#[derive(Debug, Clone, Copy)]
struct LevelSections {
    louds: BitSection,
    terms: BitSection,
    links: BitSection,
    labels: ByteSection,
    link_vals: U32Section,
}

/// An immutable succinct trie dictionary.
///
/// Built once from a [`Keyset`], then queried through ids, byte strings or a
/// reusable [`Agent`] cursor. See the crate docs for the overall model.
#[derive(Debug)]
pub struct Trie {
    storage: Storage,
    header: Header,
    levels: Vec<LevelSections>,
    tail_offsets: U32Section,
    tail_bytes: ByteSection,
}

/// Borrowed navigation handle over one level.
#[derive(Clone, Copy)]
struct LevelView<'a> {
    data: &'a [u8],
    louds: Bits<'a>,
    terms: Bits<'a>,
    links: Bits<'a>,
    labels: &'a [u8],
    link_vals: U32Section,
}

impl<'a> LevelView<'a> {
    /// Byte of the incoming edge stored inline (its first byte).
    #[inline]
    fn label(&self, node: u32) -> u8 {
        self.labels[node as usize - 1]
    }

    #[inline]
    fn is_terminal(&self, node: u32) -> bool {
        self.terms.get(node as usize)
    }

    /// Dense id of the key ending at `node` (which must be terminal).
    #[inline]
    fn key_id(&self, node: u32) -> KeyId {
        self.terms.rank1(node as usize) as KeyId
    }

    /// Terminal node of key `id`.
    #[inline]
    fn terminal_node(&self, id: KeyId) -> u32 {
        self.terms
            .select1(id as usize)
            .expect("key id validated against terminal count") as u32
    }

    #[inline]
    fn has_link(&self, node: u32) -> bool {
        self.links.get(node as usize)
    }

    /// Link value of `node` (which must have its link bit set).
    #[inline]
    fn link(&self, node: u32) -> u32 {
        let nth = self.links.rank1(node as usize);
        self.link_vals.get(self.data, nth)
    }

    /// LOUDS position and node id of the first child slot of `node`.
    ///
    /// The slot may hold a zero bit when the node is a leaf; callers probe
    /// with `louds.get`.
    #[inline]
    fn child_start(&self, node: u32) -> (usize, u32) {
        let pos = self
            .louds
            .select0(node as usize)
            .expect("louds shape validated")
            + 1;
        (pos, self.louds.rank1(pos) as u32)
    }

    /// Parent node id; `node` must not be the root.
    #[inline]
    fn parent(&self, node: u32) -> u32 {
        let pos = self
            .louds
            .select1(node as usize)
            .expect("louds shape validated");
        (pos - node as usize - 1) as u32
    }
}

impl Trie {
    /// Build an immutable dictionary from `keyset`.
    ///
    /// The keyset is only read; duplicates collapse to one key id. Fails with
    /// [`Error::Build`] on an inconsistent configuration or inputs beyond the
    /// addressable limits of the encoding.
    pub fn build(keyset: &Keyset, config: &TrieConfig) -> Result<Self> {
        let image = builder::build_image(keyset, config)?;
        Self::from_storage(Storage::Owned(image))
    }

    /// Read a serialized dictionary into an owned copy.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_storage(Storage::Owned(std::fs::read(path)?))
    }

    /// Read a serialized dictionary from an arbitrary stream.
    pub fn read_from(reader: &mut impl Read) -> Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Self::from_storage(Storage::Owned(buf))
    }

    /// Open a serialized dictionary as a zero-copy read-only file mapping.
    ///
    /// The mapping stays open for the lifetime of the returned trie. Query
    /// semantics are identical to [`Trie::load`].
    pub fn map(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is private and read-only. As with any mapped
        // file, truncation by another process invalidates it; callers own
        // that contract.
        let mmap = unsafe { Mmap::map(&file) }?;
        Self::from_storage(Storage::Mapped(mmap))
    }

    /// Write the full image to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.image())?;
        Ok(())
    }

    /// Write the full image to an arbitrary stream.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(self.image())?;
        Ok(())
    }

    /// The serialized byte image backing this dictionary.
    pub fn image(&self) -> &[u8] {
        self.storage.bytes()
    }

    /// Number of stored keys.
    pub fn num_keys(&self) -> usize {
        self.header.num_keys as usize
    }

    /// True if the dictionary stores no keys.
    pub fn is_empty(&self) -> bool {
        self.header.num_keys == 0
    }

    /// Number of cascade levels actually stored.
    pub fn num_tries(&self) -> usize {
        self.levels.len()
    }

    /// Total node count across all levels, roots included.
    pub fn num_nodes(&self) -> usize {
        self.levels.iter().map(|lv| lv.louds.num_ones()).sum()
    }

    /// Serialized size in bytes (what `save` writes).
    pub fn io_size(&self) -> usize {
        self.image().len()
    }

    /// Child ordering the dictionary was built with.
    pub fn order(&self) -> NodeOrder {
        self.header.order
    }

    /// Exact-match lookup. Returns the key's id, or `None` when the query is
    /// not a stored key. Misses are not errors.
    pub fn lookup(&self, key: impl AsRef<[u8]>) -> Option<KeyId> {
        let query = key.as_ref();
        let lv = self.level(0);
        let mut node = 0u32;
        let mut pos = 0usize;
        let mut edge = Vec::new();
        while pos < query.len() {
            let (next, next_pos) = self.step(node, query, pos, &mut edge)?;
            node = next;
            pos = next_pos;
        }
        lv.is_terminal(node).then(|| lv.key_id(node))
    }

    /// Inverse of [`Trie::lookup`]. Returns the key string for `id`, or
    /// `None` when `id` is outside `[0, num_keys)`.
    pub fn reverse_lookup(&self, id: KeyId) -> Option<Vec<u8>> {
        if (id as usize) < self.num_keys() {
            let mut out = Vec::new();
            self.key_into(0, id, &mut out);
            Some(out)
        } else {
            None
        }
    }

    /// Agent-mediated exact lookup. On success the agent records the matched
    /// key string and id; on a miss the previous match is left in place.
    ///
    /// Fails with [`Error::InvalidState`] unless the agent holds a string
    /// query.
    pub fn lookup_with(&self, agent: &mut Agent) -> Result<bool> {
        if agent.mode != QueryMode::Str {
            return Err(Error::InvalidState("lookup requires a string query"));
        }
        match self.lookup(&agent.query_buf) {
            Some(id) => {
                agent.record_query_prefix_match(agent.query_buf.len(), id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Agent-mediated reverse lookup; the agent must hold an id query. The
    /// restored key string and the id are recorded as the agent's match.
    ///
    /// Fails with [`Error::InvalidArgument`] when the id is outside
    /// `[0, num_keys)`.
    pub fn reverse_lookup_with(&self, agent: &mut Agent) -> Result<()> {
        if agent.mode != QueryMode::Id {
            return Err(Error::InvalidState("reverse lookup requires an id query"));
        }
        let id = agent.query_id;
        if id as usize >= self.num_keys() {
            return Err(Error::InvalidArgument("key id out of range"));
        }
        agent.key_buf.clear();
        self.key_into(0, id, &mut agent.key_buf);
        agent.key_id = id;
        agent.has_key = true;
        Ok(())
    }

    /// Yield the next stored key that is a prefix of the agent's query, in
    /// increasing length order. Returns `Ok(false)` once exhausted; each call
    /// resumes from the agent's cursor, and only `set_query` rewinds it.
    pub fn common_prefix_search(&self, agent: &mut Agent) -> Result<bool> {
        if agent.mode != QueryMode::Str {
            return Err(Error::InvalidState(
                "common-prefix search requires a string query",
            ));
        }
        match agent.cursor {
            Cursor::Done => return Ok(false),
            Cursor::Predictive => {
                return Err(Error::InvalidState(
                    "agent cursor is bound to a predictive search",
                ))
            }
            Cursor::Fresh => {
                agent.cursor = Cursor::CommonPrefix { node: 0, pos: 0 };
                let lv = self.level(0);
                if lv.is_terminal(0) {
                    // The empty key is a prefix of every query.
                    agent.record_query_prefix_match(0, lv.key_id(0));
                    return Ok(true);
                }
            }
            Cursor::CommonPrefix { .. } => {}
        }

        let Cursor::CommonPrefix { mut node, mut pos } = agent.cursor else {
            unreachable!()
        };
        let lv = self.level(0);
        while (pos as usize) < agent.query_buf.len() {
            let stepped = self.step(
                node,
                &agent.query_buf,
                pos as usize,
                &mut agent.edge_buf,
            );
            match stepped {
                Some((next, next_pos)) => {
                    node = next;
                    pos = next_pos as u32;
                    if lv.is_terminal(node) {
                        agent.cursor = Cursor::CommonPrefix { node, pos };
                        agent.record_query_prefix_match(pos as usize, lv.key_id(node));
                        return Ok(true);
                    }
                }
                None => break,
            }
        }
        agent.cursor = Cursor::Done;
        Ok(false)
    }

    /// Yield the next stored key that has the agent's query as a prefix, in
    /// depth-first traversal order (lexicographic under
    /// [`NodeOrder::Label`]). Same cursor/resume contract as
    /// [`Trie::common_prefix_search`].
    pub fn predictive_search(&self, agent: &mut Agent) -> Result<bool> {
        if agent.mode != QueryMode::Str {
            return Err(Error::InvalidState(
                "predictive search requires a string query",
            ));
        }
        match agent.cursor {
            Cursor::Done => return Ok(false),
            Cursor::CommonPrefix { .. } => {
                return Err(Error::InvalidState(
                    "agent cursor is bound to a common-prefix search",
                ))
            }
            Cursor::Fresh => {
                agent.path_buf.clear();
                agent.dfs_stack.clear();
                let found = self.locate_prefix_node(
                    &agent.query_buf,
                    &mut agent.path_buf,
                    &mut agent.edge_buf,
                );
                match found {
                    Some(node) => {
                        agent.dfs_stack.push((node, DFS_SELF));
                        agent.cursor = Cursor::Predictive;
                    }
                    None => {
                        agent.cursor = Cursor::Done;
                        return Ok(false);
                    }
                }
            }
            Cursor::Predictive => {}
        }

        let lv = self.level(0);
        while let Some((node, parent_len)) = agent.dfs_stack.pop() {
            if parent_len != DFS_SELF {
                agent.path_buf.truncate(parent_len as usize);
                agent.path_buf.push(lv.label(node));
                self.edge_rest_into(0, node, &mut agent.path_buf);
            }

            let (bit, first_child) = lv.child_start(node);
            let mut degree = 0u32;
            while lv.louds.get(bit + degree as usize) {
                degree += 1;
            }
            let child_parent_len = agent.path_buf.len() as u32;
            for i in (0..degree).rev() {
                agent.dfs_stack.push((first_child + i, child_parent_len));
            }

            if lv.is_terminal(node) {
                agent.record_path_match(lv.key_id(node));
                return Ok(true);
            }
        }
        agent.cursor = Cursor::Done;
        Ok(false)
    }

    // ---- internal navigation -------------------------------------------

    #[inline]
    fn data(&self) -> &[u8] {
        self.storage.bytes()
    }

    fn level(&self, k: usize) -> LevelView<'_> {
        let data = self.data();
        let sec = &self.levels[k];
        LevelView {
            data,
            louds: sec.louds.slice(data),
            terms: sec.terms.slice(data),
            links: sec.links.slice(data),
            labels: sec.labels.slice(data),
            link_vals: sec.link_vals,
        }
    }

    /// Descend one edge from `node` in the first level, requiring the whole
    /// edge to match `query` at `pos`. Returns the child and the new query
    /// position, or `None` when no edge matches.
    fn step(
        &self,
        node: u32,
        query: &[u8],
        pos: usize,
        edge: &mut Vec<u8>,
    ) -> Option<(u32, usize)> {
        let lv = self.level(0);
        let (mut bit, mut child) = lv.child_start(node);
        loop {
            if !lv.louds.get(bit) {
                return None;
            }
            if lv.label(child) == query[pos] {
                if !lv.has_link(child) {
                    return Some((child, pos + 1));
                }
                edge.clear();
                self.edge_rest_into(0, child, edge);
                let after = pos + 1;
                // Sibling labels are distinct, so a rest mismatch is final.
                if query.len() - after < edge.len() || query[after..after + edge.len()] != edge[..] {
                    return None;
                }
                return Some((child, after + edge.len()));
            }
            bit += 1;
            child += 1;
        }
    }

    /// Walk down the first level until `query` is consumed, allowing the
    /// query to end inside a multi-byte edge. On success `path` holds the
    /// full string of the reached node (>= the query).
    fn locate_prefix_node(
        &self,
        query: &[u8],
        path: &mut Vec<u8>,
        edge: &mut Vec<u8>,
    ) -> Option<u32> {
        let lv = self.level(0);
        let mut node = 0u32;
        let mut pos = 0usize;
        'descend: while pos < query.len() {
            let (mut bit, mut child) = lv.child_start(node);
            loop {
                if !lv.louds.get(bit) {
                    return None;
                }
                if lv.label(child) == query[pos] {
                    path.push(query[pos]);
                    pos += 1;
                    if lv.has_link(child) {
                        edge.clear();
                        self.edge_rest_into(0, child, edge);
                        let shared = edge.len().min(query.len() - pos);
                        if edge[..shared] != query[pos..pos + shared] {
                            return None;
                        }
                        path.extend_from_slice(edge);
                        pos += shared;
                    }
                    node = child;
                    continue 'descend;
                }
                bit += 1;
                child += 1;
            }
        }
        Some(node)
    }

    /// Append the bytes of `node`'s incoming edge past its first byte.
    ///
    /// Inner levels store them reversed as a key of the next level; the last
    /// level stores them in the tail block.
    fn edge_rest_into(&self, level: usize, node: u32, out: &mut Vec<u8>) {
        let lv = self.level(level);
        if !lv.has_link(node) {
            return;
        }
        let link = lv.link(node);
        if level + 1 < self.levels.len() {
            let start = out.len();
            self.key_into(level + 1, link, out);
            out[start..].reverse();
        } else {
            let data = self.data();
            let lo = self.tail_offsets.get(data, link as usize) as usize;
            let hi = self.tail_offsets.get(data, link as usize + 1) as usize;
            out.extend_from_slice(&self.tail_bytes.slice(data)[lo..hi]);
        }
    }

    /// Append the key string of `id` within `level`, restored by walking
    /// from its terminal node to the root.
    fn key_into(&self, level: usize, id: KeyId, out: &mut Vec<u8>) {
        let lv = self.level(level);
        let mut node = lv.terminal_node(id);
        let start = out.len();
        while node != 0 {
            // Push the edge reversed; the whole key is flipped once at the
            // end.
            let edge_start = out.len();
            self.edge_rest_into(level, node, out);
            out[edge_start..].reverse();
            out.push(lv.label(node));
            node = lv.parent(node);
        }
        out[start..].reverse();
    }

    /// Validate an image and compute its section offsets.
    fn from_storage(storage: Storage) -> Result<Self> {
        let data = storage.bytes();
        let mut r = Reader::new(data);
        let header = Header::read(&mut r)?;

        let mut levels = Vec::with_capacity(header.num_tries as usize);
        for _ in 0..header.num_tries {
            let louds = BitSection::read(&mut r)?;
            let terms = BitSection::read(&mut r)?;
            let links = BitSection::read(&mut r)?;
            let labels = ByteSection::read(&mut r)?;
            let link_vals = U32Section::read(&mut r)?;

            let nodes = louds.num_ones();
            if nodes == 0 || louds.len() != 2 * nodes + 1 {
                return Err(Error::Format("malformed LOUDS bits"));
            }
            if terms.len() != nodes || links.len() != nodes {
                return Err(Error::Format("flag vector size mismatch"));
            }
            if labels.len() != nodes - 1 {
                return Err(Error::Format("label array size mismatch"));
            }
            if link_vals.len() != links.num_ones() {
                return Err(Error::Format("link array size mismatch"));
            }
            levels.push(LevelSections {
                louds,
                terms,
                links,
                labels,
                link_vals,
            });
        }
        let tail_offsets = U32Section::read(&mut r)?;
        let tail_bytes = ByteSection::read(&mut r)?;
        if r.remaining() != 0 {
            return Err(Error::Format("trailing bytes after image"));
        }

        if tail_offsets.is_empty() || tail_offsets.get(data, 0) != 0 {
            return Err(Error::Format("malformed tail offsets"));
        }
        let mut prev = 0u32;
        for i in 1..tail_offsets.len() {
            let off = tail_offsets.get(data, i);
            if off < prev {
                return Err(Error::Format("tail offsets not monotonic"));
            }
            prev = off;
        }
        if prev as usize != tail_bytes.len() {
            return Err(Error::Format("tail offsets do not cover tail bytes"));
        }

        if levels[0].terms.num_ones() != header.num_keys as usize {
            return Err(Error::Format("key count mismatch"));
        }
        for k in 0..levels.len() {
            let bound = if k + 1 < levels.len() {
                levels[k + 1].terms.num_ones()
            } else {
                tail_offsets.len() - 1
            };
            let link_vals = levels[k].link_vals;
            for i in 0..link_vals.len() {
                if link_vals.get(data, i) as usize >= bound {
                    return Err(Error::Format("link target out of range"));
                }
            }
        }

        Ok(Self {
            storage,
            header,
            levels,
            tail_offsets,
            tail_bytes,
        })
    }
}


#[cfg(test)]
mod stress_tests {
    use super::*;
    use crate::NumTries;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_large_scale_round_trip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xD1C7);
        let mut keys: Vec<Vec<u8>> = (0..5000)
            .map(|_| {
                let len = rng.gen_range(0..24);
                (0..len).map(|_| rng.gen_range(b'a'..=b'f')).collect()
            })
            .collect();
        keys.sort();
        keys.dedup();

        let mut keyset = Keyset::new();
        for key in &keys {
            keyset.push_back(key).unwrap();
        }

        for num_tries in [NumTries::Fixed(1), NumTries::Fixed(3), NumTries::Auto] {
            let trie = Trie::build(
                &keyset,
                &TrieConfig {
                    num_tries,
                    ..TrieConfig::default()
                },
            )
            .unwrap();
            assert_eq!(trie.num_keys(), keys.len());

            let mut seen = vec![false; keys.len()];
            for key in &keys {
                let id = trie.lookup(key).unwrap() as usize;
                assert!(!seen[id]);
                seen[id] = true;
                assert_eq!(trie.reverse_lookup(id as u32).unwrap(), *key);
            }

            // A prefix query agrees with a brute-force scan.
            let mut agent = Agent::new();
            agent.set_query(b"abc");
            let mut hits = Vec::new();
            while trie.predictive_search(&mut agent).unwrap() {
                hits.push(agent.key_str().unwrap().to_vec());
            }
            let mut expected: Vec<Vec<u8>> = keys
                .iter()
                .filter(|k| k.starts_with(b"abc"))
                .cloned()
                .collect();
            hits.sort();
            expected.sort();
            assert_eq!(hits, expected);
        }
    }
}
