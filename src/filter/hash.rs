//! Hash map block store.

use std::sync::RwLock;

use rustc_hash::FxHashMap;

use super::{HostAdder, Sources, reverse_host};

/// Block store backed by a hash map of reversed host names.
#[derive(Default)]
pub struct HashStore {
    hosts: RwLock<FxHashMap<String, Sources>>,
}

impl HostAdder for HashStore {
    fn add_host(&self, source: &str, host: &str) {
        let key = reverse_host(host);
        let Ok(mut hosts) = self.hosts.write() else {
            return;
        };

        hosts
            .entry(key)
            .and_modify(|sources| sources.add(source))
            .or_insert_with(|| Sources::new(source));
    }

    fn reset(&self, source: &str) {
        let Ok(mut hosts) = self.hosts.write() else {
            return;
        };

        hosts.retain(|_, sources| {
            sources.remove(source);
            !sources.is_empty()
        });
    }

    fn block(&self, host: &str) -> bool {
        self.hosts
            .read()
            .map(|hosts| hosts.contains_key(&reverse_host(host)))
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.hosts.read().map(|hosts| hosts.len()).unwrap_or(0)
    }
}
