//! Pre-build key collection.
//!
//! A [`Keyset`] is append-only: callers push keys (optionally weighted)
//! before construction, the builder consumes it read-only. There are no
//! query operations here; ordering, deduplication and id assignment all
//! happen inside the builder.

use crate::{Error, Result, MAX_KEY_LEN};

/// An ordered collection of `(key, weight)` pairs awaiting construction.
///
/// Duplicates are allowed; they collapse to a single key id at build time
/// with their weights summed. Keys are arbitrary byte strings, including
/// empty keys and keys containing zero bytes.
#[derive(Debug, Default)]
pub struct Keyset {
    entries: Vec<(Vec<u8>, f32)>,
    total_key_bytes: usize,
}

impl Keyset {
    /// Create an empty keyset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key with the default weight of 1.0.
    pub fn push_back(&mut self, key: impl AsRef<[u8]>) -> Result<()> {
        self.push_back_weighted(key, 1.0)
    }

    /// Append a key with an explicit non-negative weight.
    ///
    /// Weights only matter when building with [`crate::NodeOrder::Weight`],
    /// where heavier keys receive smaller ids.
    pub fn push_back_weighted(&mut self, key: impl AsRef<[u8]>, weight: f32) -> Result<()> {
        let key = key.as_ref();
        if key.len() > MAX_KEY_LEN {
            return Err(Error::InvalidArgument("key exceeds maximum length"));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::InvalidArgument("weight must be finite and non-negative"));
        }
        self.total_key_bytes += key.len();
        self.entries.push((key.to_vec(), weight));
        Ok(())
    }

    /// Reset to empty, keeping nothing. Usable for rebuilding.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_key_bytes = 0;
    }

    /// Number of pushed entries (before deduplication).
    pub fn num_keys(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all pushed key lengths, used by the auto level heuristic.
    pub fn total_key_bytes(&self) -> usize {
        self.total_key_bytes
    }

    pub(crate) fn entries(&self) -> &[(Vec<u8>, f32)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_clear() {
        let mut keyset = Keyset::new();
        assert!(keyset.is_empty());

        keyset.push_back(b"apple").unwrap();
        keyset.push_back_weighted(b"banana", 2.5).unwrap();
        keyset.push_back(b"apple").unwrap(); // duplicates are fine here
        assert_eq!(keyset.num_keys(), 3);
        assert_eq!(keyset.total_key_bytes(), 16);

        keyset.clear();
        assert!(keyset.is_empty());
        assert_eq!(keyset.total_key_bytes(), 0);
    }

    #[test]
    fn test_empty_and_binary_keys() {
        let mut keyset = Keyset::new();
        keyset.push_back(b"").unwrap();
        keyset.push_back(b"\x00\xFF\x00").unwrap();
        assert_eq!(keyset.num_keys(), 2);
    }

    #[test]
    fn test_key_length_limit() {
        let mut keyset = Keyset::new();
        keyset.push_back(vec![b'a'; MAX_KEY_LEN]).unwrap();

        let too_long = vec![b'a'; MAX_KEY_LEN + 1];
        assert!(matches!(
            keyset.push_back(&too_long),
            Err(Error::InvalidArgument(_))
        ));
        // The failed push must not have been recorded.
        assert_eq!(keyset.num_keys(), 1);
    }

    #[test]
    fn test_weight_validation() {
        let mut keyset = Keyset::new();
        assert!(matches!(
            keyset.push_back_weighted(b"x", -1.0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            keyset.push_back_weighted(b"x", f32::NAN),
            Err(Error::InvalidArgument(_))
        ));
        assert!(keyset.push_back_weighted(b"x", 0.0).is_ok());
    }
}
