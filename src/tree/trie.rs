//! Byte-at-a-time trie stored in a compact arena.
//!
//! Every node holds one byte of its key and a sorted child table, and knows
//! its parent so that dead branches can be pruned bottom-up after removal.

struct TrieNode<V> {
    byte: u8,
    parent: Option<usize>,
    /// Sorted by byte.
    children: Vec<(u8, usize)>,
    value: Option<V>,
}

impl<V> TrieNode<V> {
    fn empty() -> Self {
        Self {
            byte: 0,
            parent: None,
            children: Vec::new(),
            value: None,
        }
    }

    fn child(&self, byte: u8) -> Option<usize> {
        self.children
            .binary_search_by_key(&byte, |&(b, _)| b)
            .ok()
            .map(|i| self.children[i].1)
    }
}

const ROOT: usize = 0;

/// A trie mapping byte strings to values.
pub struct Trie<V> {
    nodes: Vec<TrieNode<V>>,
    /// Released slots, reset to an empty node.
    free: Vec<usize>,
    len: usize,
}

impl<V> Default for Trie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Trie<V> {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::empty()],
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of nodes below the root.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len() - self.free.len() - 1
    }

    /// Return the value at `key`, creating it with `init` if absent.
    pub fn get_or_insert_with<F>(&mut self, key: &str, init: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let mut idx = ROOT;
        for &byte in key.as_bytes() {
            idx = match self.nodes[idx].child(byte) {
                Some(child) => child,
                None => self.add_child(idx, byte),
            };
        }

        let node = &mut self.nodes[idx];
        if node.value.is_none() {
            self.len += 1;
        }
        node.value.get_or_insert_with(init)
    }

    /// Exact-match lookup.
    pub fn get(&self, key: &str) -> Option<&V> {
        let mut idx = ROOT;
        for &byte in key.as_bytes() {
            idx = self.nodes[idx].child(byte)?;
        }
        self.nodes[idx].value.as_ref()
    }

    /// Return the value of the shortest stored key that is `key` itself or
    /// a `.`-separated prefix of it.
    ///
    /// With reversed host names a stored domain matches its subdomains but
    /// not hosts that merely share leading bytes (`com.example` does not
    /// match `com.examples`).
    pub fn get_prefix(&self, key: &str) -> Option<&V> {
        let mut idx = ROOT;
        for (i, &byte) in key.as_bytes().iter().enumerate() {
            if byte == b'.' && i > 0 {
                if let Some(value) = self.nodes[idx].value.as_ref() {
                    return Some(value);
                }
            }
            idx = self.nodes[idx].child(byte)?;
        }
        self.nodes[idx].value.as_ref()
    }

    /// Visit every value mutably, removing keys for which `f` returns false
    /// along with any ancestors left without a value or children.
    ///
    /// Returns the number of removed keys.
    pub fn retain<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&str, &mut V) -> bool,
    {
        let holders: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.value.is_some())
            .map(|(i, _)| i)
            .collect();

        let mut removed = 0;
        for idx in holders {
            let key = self.key_of(idx);
            let Some(value) = self.nodes[idx].value.as_mut() else {
                continue;
            };

            if !f(&key, value) {
                self.nodes[idx].value = None;
                self.len -= 1;
                removed += 1;
                self.prune_from(idx);
            }
        }

        removed
    }

    fn add_child(&mut self, parent: usize, byte: u8) -> usize {
        let node = TrieNode {
            byte,
            parent: Some(parent),
            children: Vec::new(),
            value: None,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        let children = &mut self.nodes[parent].children;
        let pos = children
            .binary_search_by_key(&byte, |&(b, _)| b)
            .unwrap_or_else(|pos| pos);
        children.insert(pos, (byte, idx));

        idx
    }

    fn key_of(&self, mut idx: usize) -> String {
        let mut bytes = Vec::new();
        while let Some(parent) = self.nodes[idx].parent {
            bytes.push(self.nodes[idx].byte);
            idx = parent;
        }
        bytes.reverse();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Walk up from `idx`, releasing nodes that carry nothing.
    fn prune_from(&mut self, mut idx: usize) {
        while let Some(parent) = self.nodes[idx].parent {
            let node = &self.nodes[idx];
            if node.value.is_some() || !node.children.is_empty() {
                return;
            }

            let byte = node.byte;
            self.nodes[idx] = TrieNode::empty();
            self.free.push(idx);
            self.nodes[parent].children.retain(|&(b, _)| b != byte);
            idx = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut trie = Trie::new();
        *trie.get_or_insert_with("www.example.com", || 0) = 1;

        assert_eq!(trie.get("www.example.com"), Some(&1));
        assert_eq!(trie.get("example.com"), None);
        assert_eq!(trie.get("www.example.com.sub"), None);
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.num_nodes(), "www.example.com".len());

        *trie.get_or_insert_with("www.example.com", || 0) += 1;
        assert_eq!(trie.get("www.example.com"), Some(&2));
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn get_prefix_matches_stored_prefixes() {
        let mut trie = Trie::new();
        trie.get_or_insert_with("www.example.com", || "value");

        assert_eq!(trie.get_prefix("www.example.com"), Some(&"value"));
        assert_eq!(trie.get_prefix("www.example.com.sub"), Some(&"value"));
        assert_eq!(trie.get_prefix("www.example.com2"), None);
        assert_eq!(trie.get_prefix("www.example.com2.sub"), None);
        assert_eq!(trie.get_prefix("example.com"), None);
        assert_eq!(trie.get_prefix("ww.example.com"), None);
        assert_eq!(trie.get_prefix("www"), None);
    }

    #[test]
    fn shared_prefixes_share_nodes() {
        let mut trie = Trie::new();
        trie.get_or_insert_with("abc", || true);
        trie.get_or_insert_with("abd", || true);

        assert_eq!(trie.len(), 2);
        assert_eq!(trie.num_nodes(), "abc".len() + 1);
        assert_eq!(trie.get("ab"), None);
        assert_eq!(trie.get_prefix("ab"), None);
    }

    #[test]
    fn retain_prunes_dead_branches() {
        let mut trie = Trie::new();
        trie.get_or_insert_with("abc", || 1);
        trie.get_or_insert_with("abd", || 2);
        trie.get_or_insert_with("ab", || 3);

        let mut seen = Vec::new();
        let removed = trie.retain(|key, value| {
            seen.push(key.to_string());
            *value != 1
        });

        seen.sort();
        assert_eq!(seen, vec!["ab", "abc", "abd"]);
        assert_eq!(removed, 1);
        assert_eq!(trie.num_nodes(), 3);

        trie.retain(|_, _| false);
        assert!(trie.is_empty());
        assert_eq!(trie.num_nodes(), 0);

        trie.get_or_insert_with("xyz", || 4);
        assert_eq!(trie.get("xyz"), Some(&4));
        assert_eq!(trie.num_nodes(), 3);
    }
}
