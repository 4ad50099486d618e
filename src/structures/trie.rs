//! Byte-wise trie map.
//!
//! Backs the term dictionary and the tag value maps: exact find plus the
//! random-access operations the garbage collector needs (`random_key`,
//! weighted sampling). Save/load carries an encoding version so hosts can
//! persist the autocomplete trie across format revisions.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::Rng;

use super::varint;

/// Legacy encoding: keys only, payloads defaulted on load.
pub const TRIE_ENCVER_NOPAYLOADS: u32 = 0;
/// Current encoding: keys with payloads.
pub const TRIE_ENCVER_CURRENT: u32 = 1;

#[derive(Debug, Clone)]
struct TrieNode<V> {
    /// Sorted by byte for deterministic traversal.
    children: Vec<(u8, TrieNode<V>)>,
    value: Option<V>,
}

impl<V> Default for TrieNode<V> {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            value: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrieMap<V> {
    root: TrieNode<V>,
    len: usize,
}

impl<V> Default for TrieMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TrieMap<V> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::default(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert, returning the previous value if the key existed.
    pub fn insert(&mut self, key: &[u8], value: V) -> Option<V> {
        let slot = self.slot_mut(key);
        let old = slot.value.replace(value);
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    /// Resolve the value for `key`, inserting `default()` if absent.
    pub fn get_or_insert_with(&mut self, key: &[u8], default: impl FnOnce() -> V) -> &mut V {
        // two-phase to keep the len bookkeeping next to the insertion
        let created = {
            let slot = self.slot_mut(key);
            if slot.value.is_none() {
                slot.value = Some(default());
                true
            } else {
                false
            }
        };
        if created {
            self.len += 1;
        }
        self.slot_mut(key)
            .value
            .as_mut()
            .expect("value inserted above")
    }

    fn slot_mut(&mut self, key: &[u8]) -> &mut TrieNode<V> {
        let mut node = &mut self.root;
        for &b in key {
            let idx = match node.children.binary_search_by_key(&b, |(c, _)| *c) {
                Ok(i) => i,
                Err(i) => {
                    node.children.insert(i, (b, TrieNode::default()));
                    i
                }
            };
            node = &mut node.children[idx].1;
        }
        node
    }

    pub fn find(&self, key: &[u8]) -> Option<&V> {
        let mut node = &self.root;
        for &b in key {
            let idx = node.children.binary_search_by_key(&b, |(c, _)| *c).ok()?;
            node = &node.children[idx].1;
        }
        node.value.as_ref()
    }

    pub fn find_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let mut node = &mut self.root;
        for &b in key {
            let idx = node.children.binary_search_by_key(&b, |(c, _)| *c).ok()?;
            node = &mut node.children[idx].1;
        }
        node.value.as_mut()
    }

    /// Visit every `(key, value)` pair in lexicographic order.
    pub fn for_each<'a>(&'a self, mut f: impl FnMut(&[u8], &'a V)) {
        let mut prefix = Vec::new();
        Self::walk(&self.root, &mut prefix, &mut f);
    }

    fn walk<'a>(
        node: &'a TrieNode<V>,
        prefix: &mut Vec<u8>,
        f: &mut impl FnMut(&[u8], &'a V),
    ) {
        if let Some(v) = &node.value {
            f(prefix, v);
        }
        for (b, child) in &node.children {
            prefix.push(*b);
            Self::walk(child, prefix, f);
            prefix.pop();
        }
    }

    /// Uniformly random key (reservoir over one traversal).
    pub fn random_key(&self, rng: &mut impl Rng) -> Option<(Vec<u8>, &V)> {
        let mut picked: Option<(Vec<u8>, &V)> = None;
        let mut seen = 0usize;
        self.for_each(|key, value| {
            seen += 1;
            if rng.gen_range(0..seen) == 0 {
                picked = Some((key.to_vec(), value));
            }
        });
        picked
    }

    /// Draw `trials` uniform samples in one traversal and return the one
    /// maximizing `weight`. Approximates weighted-random selection with
    /// probability rising with weight; an empty trie yields `None`.
    pub fn sample_weighted(
        &self,
        rng: &mut impl Rng,
        trials: usize,
        weight: impl Fn(&V) -> u64,
    ) -> Option<(Vec<u8>, &V)> {
        if trials == 0 {
            return None;
        }
        let mut reservoir: Vec<(Vec<u8>, &V)> = Vec::with_capacity(trials);
        let mut seen = 0usize;
        self.for_each(|key, value| {
            seen += 1;
            if reservoir.len() < trials {
                reservoir.push((key.to_vec(), value));
            } else {
                let j = rng.gen_range(0..seen);
                if j < trials {
                    reservoir[j] = (key.to_vec(), value);
                }
            }
        });
        reservoir.into_iter().max_by_key(|(_, v)| weight(v))
    }

    /// Persist under [`TRIE_ENCVER_CURRENT`].
    pub fn save<W: Write>(
        &self,
        writer: &mut W,
        mut write_value: impl FnMut(&mut W, &V) -> io::Result<()>,
    ) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(TRIE_ENCVER_CURRENT)?;
        varint::write_io(writer, self.len as u64)?;
        let mut entries: Vec<(Vec<u8>, &V)> = Vec::with_capacity(self.len);
        self.for_each(|key, value| entries.push((key.to_vec(), value)));
        for (key, value) in entries {
            varint::write_io(writer, key.len() as u64)?;
            writer.write_all(&key)?;
            write_value(writer, value)?;
        }
        Ok(())
    }

    /// Load any supported encoding version. [`TRIE_ENCVER_NOPAYLOADS`]
    /// entries get `V::default()`; unknown versions are rejected.
    pub fn load<R: Read>(
        reader: &mut R,
        mut read_value: impl FnMut(&mut R) -> io::Result<V>,
    ) -> io::Result<Self>
    where
        V: Default,
    {
        let version = reader.read_u32::<LittleEndian>()?;
        if version != TRIE_ENCVER_NOPAYLOADS && version != TRIE_ENCVER_CURRENT {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported trie encoding version {}", version),
            ));
        }
        let count = varint::read_io(reader)? as usize;
        let mut map = TrieMap::new();
        let mut key = Vec::new();
        for _ in 0..count {
            let key_len = varint::read_io(reader)? as usize;
            key.resize(key_len, 0);
            reader.read_exact(&mut key)?;
            let value = if version == TRIE_ENCVER_CURRENT {
                read_value(reader)?
            } else {
                V::default()
            };
            map.insert(&key, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use byteorder::{ReadBytesExt, WriteBytesExt};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_insert_find() {
        let mut trie = TrieMap::new();
        assert_eq!(trie.insert(b"hello", 1), None);
        assert_eq!(trie.insert(b"help", 2), None);
        assert_eq!(trie.insert(b"hello", 3), Some(1));
        assert_eq!(trie.len(), 2);
        assert_eq!(trie.find(b"hello"), Some(&3));
        assert_eq!(trie.find(b"help"), Some(&2));
        assert_eq!(trie.find(b"hel"), None);
    }

    #[test]
    fn test_get_or_insert_with() {
        let mut trie: TrieMap<Vec<u32>> = TrieMap::new();
        trie.get_or_insert_with(b"k", Vec::new).push(1);
        trie.get_or_insert_with(b"k", Vec::new).push(2);
        assert_eq!(trie.find(b"k"), Some(&vec![1, 2]));
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_for_each_lexicographic() {
        let mut trie = TrieMap::new();
        for key in ["b", "a", "ab", "aa"] {
            trie.insert(key.as_bytes(), ());
        }
        let mut keys = Vec::new();
        trie.for_each(|k, _| keys.push(String::from_utf8(k.to_vec()).unwrap()));
        assert_eq!(keys, vec!["a", "aa", "ab", "b"]);
    }

    #[test]
    fn test_random_key_empty() {
        let trie: TrieMap<u32> = TrieMap::new();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(trie.random_key(&mut rng).is_none());
    }

    #[test]
    fn test_sample_weighted_prefers_heavy() {
        let mut trie = TrieMap::new();
        for i in 0..50u64 {
            trie.insert(format!("term{:02}", i).as_bytes(), i);
        }
        trie.insert(b"heavy", 1_000_000u64);
        let mut rng = StdRng::seed_from_u64(42);
        // with trials >= len the heaviest term always wins
        let (key, _) = trie.sample_weighted(&mut rng, 64, |w| *w).unwrap();
        assert_eq!(key, b"heavy");
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut trie = TrieMap::new();
        trie.insert(b"alpha", 1.5f64);
        trie.insert(b"beta", -2.0f64);
        let mut buf = Vec::new();
        trie.save(&mut buf, |w, v| w.write_f64::<LittleEndian>(*v)).unwrap();

        let loaded =
            TrieMap::<f64>::load(&mut &buf[..], |r| r.read_f64::<LittleEndian>()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.find(b"alpha"), Some(&1.5));
        assert_eq!(loaded.find(b"beta"), Some(&-2.0));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&99u32.to_le_bytes());
        let err = TrieMap::<f64>::load(&mut &buf[..], |r| r.read_f64::<LittleEndian>());
        assert!(err.is_err());
    }
}
