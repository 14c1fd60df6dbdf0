//! Radix tree block store.

use std::sync::RwLock;

use super::{HostAdder, Sources, reverse_host};
use crate::tree::RadixTree;

/// Block store backed by a radix tree of reversed host names, so sibling
/// subdomains share their common parent labels.
#[derive(Default)]
pub struct RadixStore {
    tree: RwLock<RadixTree<Sources>>,
}

impl HostAdder for RadixStore {
    fn add_host(&self, source: &str, host: &str) {
        let key = reverse_host(host);
        let Ok(mut tree) = self.tree.write() else {
            return;
        };

        match tree.get_mut(&key) {
            Some(sources) => sources.add(source),
            None => {
                tree.insert(&key, Sources::new(source));
            }
        }
    }

    fn reset(&self, source: &str) {
        let Ok(mut tree) = self.tree.write() else {
            return;
        };

        tree.retain(|_, sources| {
            sources.remove(source);
            !sources.is_empty()
        });
    }

    fn block(&self, host: &str) -> bool {
        let key = reverse_host(host);
        self.tree
            .read()
            .map(|tree| tree.contains_key(&key))
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.tree.read().map(|tree| tree.len()).unwrap_or(0)
    }
}
