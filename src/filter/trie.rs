//! Byte trie block store.

use std::sync::RwLock;

use super::{HostAdder, Sources, reverse_host};
use crate::tree::Trie;

/// Block store backed by a byte trie of reversed host names.
///
/// Removing the last source of a host also releases every ancestor node that
/// no longer leads anywhere.
#[derive(Default)]
pub struct TrieStore {
    trie: RwLock<Trie<Sources>>,
}

impl TrieStore {
    /// Whether `host` or any domain above it is blocked.
    ///
    /// Not part of [`HostAdder::block`], which matches exactly.
    pub fn block_subdomain(&self, host: &str) -> bool {
        let key = reverse_host(host);
        self.trie
            .read()
            .map(|trie| trie.get_prefix(&key).is_some())
            .unwrap_or(false)
    }

    #[cfg(test)]
    fn num_nodes(&self) -> usize {
        self.trie.read().map(|trie| trie.num_nodes()).unwrap_or(0)
    }
}

impl HostAdder for TrieStore {
    fn add_host(&self, source: &str, host: &str) {
        let key = reverse_host(host);
        let Ok(mut trie) = self.trie.write() else {
            return;
        };

        trie.get_or_insert_with(&key, Sources::default).add(source);
    }

    fn reset(&self, source: &str) {
        let Ok(mut trie) = self.trie.write() else {
            return;
        };

        trie.retain(|_, sources| {
            sources.remove(source);
            !sources.is_empty()
        });
    }

    fn block(&self, host: &str) -> bool {
        let key = reverse_host(host);
        self.trie
            .read()
            .map(|trie| trie.get(&key).is_some())
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.trie.read().map(|trie| trie.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_prunes_dead_nodes() {
        let store = TrieStore::default();
        store.add_host("the source", "www.example.com");
        store.add_host("another source", "www.example.com");
        assert_eq!(store.num_nodes(), "www.example.com".len());

        store.reset("the source");
        assert_eq!(store.len(), 1);
        assert_eq!(store.num_nodes(), "www.example.com".len());

        store.reset("another source");
        assert_eq!(store.len(), 0);
        assert_eq!(store.num_nodes(), 0);
    }

    #[test]
    fn block_subdomain_matches_parent_labels() {
        let store = TrieStore::default();
        store.add_host("list", "www.example.com");

        assert!(store.block_subdomain("www.example.com"));
        assert!(store.block_subdomain("sub.www.example.com"));
        assert!(!store.block_subdomain("example.com"));
        assert!(!store.block_subdomain("ww.example.com"));

        assert!(!store.block("sub.www.example.com"));
    }

    #[test]
    fn block_subdomain_respects_label_boundaries() {
        let store = TrieStore::default();
        store.add_host("list", "example.com");

        assert!(store.block_subdomain("www.example.com"));
        assert!(!store.block_subdomain("examples.com"));
        assert!(!store.block_subdomain("www.examples.com"));
        assert!(!store.block_subdomain("myexample.com"));
    }
}
