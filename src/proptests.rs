//! Property tests comparing the dictionary against naive models.

use std::collections::BTreeSet;

use proptest::prelude::*;

use crate::{Agent, Keyset, NodeOrder, NumTries, Trie, TrieConfig};

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // Short keys over a small alphabet force heavy prefix/suffix sharing,
    // which is where the cascade logic actually gets exercised.
    prop::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(b'c'), any::<u8>()], 0..=16)
}

fn keys_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(key_strategy(), 0..=100)
}

fn config_strategy() -> impl Strategy<Value = TrieConfig> {
    (1usize..=4, any::<bool>()).prop_map(|(levels, weighted)| TrieConfig {
        num_tries: NumTries::Fixed(levels),
        order: if weighted {
            NodeOrder::Weight
        } else {
            NodeOrder::Label
        },
    })
}

fn build(keys: &[Vec<u8>], config: &TrieConfig) -> Trie {
    let mut keyset = Keyset::new();
    for key in keys {
        keyset.push_back(key).unwrap();
    }
    Trie::build(&keyset, config).unwrap()
}

fn predictive_hits(trie: &Trie, query: &[u8]) -> Vec<Vec<u8>> {
    let mut agent = Agent::new();
    agent.set_query(query);
    let mut out = Vec::new();
    while trie.predictive_search(&mut agent).unwrap() {
        out.push(agent.key_str().unwrap().to_vec());
    }
    out
}

fn common_prefix_hits(trie: &Trie, query: &[u8]) -> Vec<Vec<u8>> {
    let mut agent = Agent::new();
    agent.set_query(query);
    let mut out = Vec::new();
    while trie.common_prefix_search(&mut agent).unwrap() {
        out.push(agent.key_str().unwrap().to_vec());
    }
    out
}

proptest! {
    #[test]
    fn prop_lookup_matches_set_model(
        keys in keys_strategy(),
        config in config_strategy(),
    ) {
        let model: BTreeSet<Vec<u8>> = keys.iter().cloned().collect();
        let trie = build(&keys, &config);

        prop_assert_eq!(trie.num_keys(), model.len());

        let mut seen_ids = BTreeSet::new();
        for key in &model {
            let id = trie.lookup(key);
            prop_assert!(id.is_some(), "stored key must be found");
            let id = id.unwrap();
            prop_assert!((id as usize) < model.len());
            prop_assert!(seen_ids.insert(id), "ids must be distinct");
            prop_assert_eq!(&trie.reverse_lookup(id).unwrap(), key);
        }

        // Perturbed keys that are not in the set must miss.
        for key in keys.iter().take(16) {
            let mut longer = key.clone();
            longer.push(0xFE);
            if !model.contains(&longer) {
                prop_assert_eq!(trie.lookup(&longer), None);
            }
            if !key.is_empty() {
                let shorter = key[..key.len() - 1].to_vec();
                if !model.contains(&shorter) {
                    prop_assert_eq!(trie.lookup(&shorter), None);
                }
            }
        }
    }

    #[test]
    fn prop_reverse_lookup_is_inverse(
        keys in keys_strategy(),
        config in config_strategy(),
    ) {
        let trie = build(&keys, &config);
        for id in 0..trie.num_keys() as u32 {
            let key = trie.reverse_lookup(id).unwrap();
            prop_assert_eq!(trie.lookup(&key), Some(id));
        }
        prop_assert_eq!(trie.reverse_lookup(trie.num_keys() as u32), None);
    }

    #[test]
    fn prop_prefix_searches_match_model(
        keys in keys_strategy(),
        query in key_strategy(),
        config in config_strategy(),
    ) {
        let model: BTreeSet<Vec<u8>> = keys.iter().cloned().collect();
        let trie = build(&keys, &config);

        // Common-prefix: stored keys that are prefixes of the query, shortest
        // first.
        let expected: Vec<Vec<u8>> = model
            .iter()
            .filter(|k| query.starts_with(k.as_slice()))
            .cloned()
            .collect();
        let mut expected_by_len = expected;
        expected_by_len.sort_by_key(|k| k.len());
        prop_assert_eq!(common_prefix_hits(&trie, &query), expected_by_len);

        // Predictive: stored keys extending the query. Order is traversal
        // order, so compare as sets and check it lexicographically when the
        // build ordering makes that guarantee.
        let hits = predictive_hits(&trie, &query);
        let expected: BTreeSet<Vec<u8>> = model
            .iter()
            .filter(|k| k.starts_with(query.as_slice()))
            .cloned()
            .collect();
        prop_assert_eq!(hits.len(), expected.len());
        if config.order == NodeOrder::Label {
            let in_order: Vec<Vec<u8>> = expected.iter().cloned().collect();
            prop_assert_eq!(hits, in_order);
        } else {
            let as_set: BTreeSet<Vec<u8>> = hits.into_iter().collect();
            prop_assert_eq!(as_set, expected);
        }
    }

    #[test]
    fn prop_serialization_round_trip(
        keys in keys_strategy(),
        config in config_strategy(),
    ) {
        let built = build(&keys, &config);

        let mut image = Vec::new();
        built.write_to(&mut image).unwrap();
        let reread = Trie::read_from(&mut image.as_slice()).unwrap();

        prop_assert_eq!(reread.num_keys(), built.num_keys());
        prop_assert_eq!(reread.num_tries(), built.num_tries());
        prop_assert_eq!(reread.num_nodes(), built.num_nodes());
        prop_assert_eq!(reread.io_size(), built.io_size());
        prop_assert_eq!(reread.image(), built.image());
        for key in &keys {
            prop_assert_eq!(reread.lookup(key), built.lookup(key));
        }
    }

    #[test]
    fn prop_cascade_depth_is_transparent(
        keys in keys_strategy(),
    ) {
        // Query results must not depend on how deep the cascade goes.
        let shallow = build(&keys, &TrieConfig {
            num_tries: NumTries::Fixed(1),
            order: NodeOrder::Label,
        });
        let deep = build(&keys, &TrieConfig {
            num_tries: NumTries::Fixed(4),
            order: NodeOrder::Label,
        });

        prop_assert_eq!(shallow.num_keys(), deep.num_keys());
        for key in &keys {
            prop_assert_eq!(shallow.lookup(key), deep.lookup(key));
        }
        for id in 0..shallow.num_keys() as u32 {
            prop_assert_eq!(shallow.reverse_lookup(id), deep.reverse_lookup(id));
        }
    }
}
