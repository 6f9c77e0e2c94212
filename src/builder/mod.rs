//! Dictionary construction.
//!
//! Build pipeline:
//! 1. Sort and deduplicate the keyset (duplicate weights are summed)
//! 2. Collapse single-child chains into multi-byte edges (patricia)
//! 3. Emit each level breadth-first as LOUDS bits + per-node flag vectors
//! 4. Cascade: the bytes of an edge past its first byte are pushed down,
//!    reversed, as keys of the next level; the last level spills them into
//!    a flat tail block instead
//! 5. Freeze everything straight into the serialized image
//!
//! Key ids fall out of step 3: terminal nodes are numbered in BFS order of
//! the first level, so the configured child ordering decides id assignment.

use std::collections::{HashMap, VecDeque};

use crate::bits::BitBuilder;
use crate::image::{ByteSection, Header, U32Section};
use crate::keyset::Keyset;
use crate::{Error, NodeOrder, NumTries, Result, TrieConfig, MAX_NUM_TRIES};

/// One in-memory node of the intermediate patricia trie.
struct PatNode {
    /// Incoming edge bytes; empty only for the root.
    edge: Vec<u8>,
    /// Index (into the level's key list) of the key ending at this node.
    term: Option<u32>,
    /// Sum of key weights in this subtree, used for `NodeOrder::Weight`.
    weight: f64,
    children: Vec<PatNode>,
}

/// Succinct encoding of one level, pending link resolution.
struct LevelParts {
    louds: BitBuilder,
    terms: BitBuilder,
    links: BitBuilder,
    labels: Vec<u8>,
    /// Rest-string index per linked node, in link-bit order. Resolved into
    /// `link_vals` once the next level (or the tail) has assigned ids.
    pending: Vec<u32>,
    link_vals: Vec<u32>,
}

/// Build the full serialized image for `keyset` under `config`.
pub(crate) fn build_image(keyset: &Keyset, config: &TrieConfig) -> Result<Vec<u8>> {
    let max_levels = match config.num_tries {
        NumTries::Auto => auto_num_tries(keyset),
        NumTries::Fixed(n) if (1..=MAX_NUM_TRIES).contains(&n) => n,
        NumTries::Fixed(_) => {
            return Err(Error::Build("level count must be in 1..=MAX_NUM_TRIES"))
        }
    };

    let mut keys = dedup(keyset)?;
    let num_keys = keys.len() as u32;

    let mut levels: Vec<LevelParts> = Vec::new();
    let mut tail_entries: Vec<Vec<u8>> = Vec::new();
    loop {
        let (parts, rests, ids) = emit_level(&keys, config.order);
        if let Some(prev) = levels.last_mut() {
            prev.link_vals = prev.pending.iter().map(|&i| ids[i as usize]).collect();
        }
        levels.push(parts);

        if rests.is_empty() {
            break;
        }
        if levels.len() == max_levels {
            // No deeper trie to delegate to: rests go to the tail verbatim
            // and link values are tail entry indices.
            let last = levels.last_mut().unwrap();
            last.link_vals = last.pending.clone();
            tail_entries = rests.into_iter().map(|(bytes, _)| bytes).collect();
            break;
        }
        // Reversal turns shared suffixes into shared prefixes for the next
        // level's trie.
        keys = rests
            .into_iter()
            .map(|(mut bytes, weight)| {
                bytes.reverse();
                (bytes, weight)
            })
            .collect();
    }

    write_image(&levels, &tail_entries, num_keys, config.order)
}

fn auto_num_tries(keyset: &Keyset) -> usize {
    if keyset.is_empty() {
        1
    } else if keyset.total_key_bytes() <= 1 << 20 {
        2
    } else {
        3
    }
}

/// Sort lexicographically and collapse duplicates, summing their weights.
fn dedup(keyset: &Keyset) -> Result<Vec<(Vec<u8>, f64)>> {
    let mut entries: Vec<(Vec<u8>, f64)> = keyset
        .entries()
        .iter()
        .map(|(key, weight)| (key.clone(), f64::from(*weight)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut deduped: Vec<(Vec<u8>, f64)> = Vec::with_capacity(entries.len());
    for (key, weight) in entries {
        match deduped.last_mut() {
            Some(last) if last.0 == key => last.1 += weight,
            _ => deduped.push((key, weight)),
        }
    }
    if deduped.len() >= u32::MAX as usize {
        return Err(Error::Build("too many keys for 32-bit ids"));
    }
    Ok(deduped)
}

/// Encode one level over `keys` (unique, any order).
///
/// Returns the encoded parts, the deduplicated rest strings (edge bytes past
/// the first, in first-assigned index order, weights summed) and the key id
/// assigned to each input key.
fn emit_level(
    keys: &[(Vec<u8>, f64)],
    order: NodeOrder,
) -> (LevelParts, Vec<(Vec<u8>, f64)>, Vec<u32>) {
    let mut sorted: Vec<u32> = (0..keys.len() as u32).collect();
    sorted.sort_by(|&a, &b| keys[a as usize].0.cmp(&keys[b as usize].0));

    let total_weight: f64 = keys.iter().map(|(_, w)| w).sum();
    let term = sorted
        .first()
        .filter(|&&i| keys[i as usize].0.is_empty())
        .copied();
    let root = PatNode {
        edge: Vec::new(),
        term,
        weight: total_weight,
        children: children_at(keys, &sorted, 0, order),
    };

    let mut parts = LevelParts {
        louds: BitBuilder::new(),
        terms: BitBuilder::new(),
        links: BitBuilder::new(),
        labels: Vec::new(),
        pending: Vec::new(),
        link_vals: Vec::new(),
    };
    parts.louds.push(true);
    parts.louds.push(false);

    let mut ids = vec![0u32; keys.len()];
    let mut next_id = 0u32;
    let mut rest_index: HashMap<Vec<u8>, u32> = HashMap::new();
    let mut rests: Vec<(Vec<u8>, f64)> = Vec::new();

    // Pop order is node id order, so per-node bits are pushed on pop while
    // the LOUDS degree bits are pushed for the children.
    let mut queue: VecDeque<PatNode> = VecDeque::new();
    queue.push_back(root);
    while let Some(mut node) = queue.pop_front() {
        parts.terms.push(node.term.is_some());
        if let Some(key_idx) = node.term {
            ids[key_idx as usize] = next_id;
            next_id += 1;
        }

        if node.edge.len() > 1 {
            parts.links.push(true);
            let rest = node.edge[1..].to_vec();
            let idx = *rest_index.entry(rest.clone()).or_insert_with(|| {
                rests.push((rest, 0.0));
                rests.len() as u32 - 1
            });
            rests[idx as usize].1 += node.weight;
            parts.pending.push(idx);
        } else {
            parts.links.push(false);
        }

        for child in &node.children {
            parts.louds.push(true);
            parts.labels.push(child.edge[0]);
        }
        parts.louds.push(false);
        for child in node.children.drain(..) {
            queue.push_back(child);
        }
    }
    debug_assert_eq!(next_id as usize, keys.len());

    (parts, rests, ids)
}

/// Child subtrees of the node spelled by `idxs[..][..depth]`.
///
/// `idxs` is sorted by key and shares its first `depth` bytes; a key ending
/// exactly at `depth` belongs to the parent and must already be excluded.
fn children_at(keys: &[(Vec<u8>, f64)], idxs: &[u32], depth: usize, order: NodeOrder) -> Vec<PatNode> {
    let rest: &[u32] = match idxs.first() {
        Some(&first) if keys[first as usize].0.len() == depth => &idxs[1..],
        _ => idxs,
    };

    let mut children = Vec::new();
    let mut start = 0;
    while start < rest.len() {
        let byte = keys[rest[start] as usize].0[depth];
        let mut end = start + 1;
        while end < rest.len() && keys[rest[end] as usize].0[depth] == byte {
            end += 1;
        }
        children.push(make_child(keys, &rest[start..end], depth, order));
        start = end;
    }

    if order == NodeOrder::Weight {
        // Stable: equal (weight, label) pairs cannot occur since sibling
        // labels are distinct.
        children.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then(a.edge[0].cmp(&b.edge[0]))
        });
    }
    children
}

/// Build the subtree for a run of keys sharing `keys[..][depth]`, extending
/// the edge while the chain stays unary.
fn make_child(keys: &[(Vec<u8>, f64)], run: &[u32], depth: usize, order: NodeOrder) -> PatNode {
    let first = &keys[run[0] as usize].0;
    let mut len = 1;
    loop {
        let pos = depth + len;
        if first.len() == pos {
            break;
        }
        let byte = first[pos];
        if !run
            .iter()
            .all(|&i| keys[i as usize].0.len() > pos && keys[i as usize].0[pos] == byte)
        {
            break;
        }
        len += 1;
    }

    let end = depth + len;
    let term = (first.len() == end).then_some(run[0]);
    PatNode {
        edge: first[depth..end].to_vec(),
        term,
        weight: run.iter().map(|&i| keys[i as usize].1).sum(),
        children: children_at(keys, run, end, order),
    }
}

fn write_image(
    levels: &[LevelParts],
    tail_entries: &[Vec<u8>],
    num_keys: u32,
    order: NodeOrder,
) -> Result<Vec<u8>> {
    let tail_bytes: usize = tail_entries.iter().map(|e| e.len()).sum();
    if tail_bytes >= u32::MAX as usize {
        return Err(Error::Build("total key bytes exceed addressable size"));
    }

    let mut out = Vec::new();
    Header {
        num_tries: levels.len() as u32,
        num_keys,
        order,
    }
    .write_into(&mut out);

    for level in levels {
        level.louds.write_into(&mut out);
        level.terms.write_into(&mut out);
        level.links.write_into(&mut out);
        ByteSection::write_into(&mut out, &level.labels);
        U32Section::write_into(&mut out, &level.link_vals);
    }

    let mut offsets = Vec::with_capacity(tail_entries.len() + 1);
    let mut flat = Vec::with_capacity(tail_bytes);
    offsets.push(0u32);
    for entry in tail_entries {
        flat.extend_from_slice(entry);
        offsets.push(flat.len() as u32);
    }
    U32Section::write_into(&mut out, &offsets);
    ByteSection::write_into(&mut out, &flat);
    Ok(out)
}
