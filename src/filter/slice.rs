//! Sorted slice block store.

use std::sync::RwLock;

use super::{HostAdder, Sources, reverse_host};

/// Block store backed by a sorted vector searched with binary search.
///
/// Cheapest in memory; inserts shift the tail of the vector.
#[derive(Default)]
pub struct SliceStore {
    hosts: RwLock<Vec<(String, Sources)>>,
}

fn search(hosts: &[(String, Sources)], key: &str) -> Result<usize, usize> {
    hosts.binary_search_by(|(k, _)| k.as_str().cmp(key))
}

impl HostAdder for SliceStore {
    fn add_host(&self, source: &str, host: &str) {
        let key = reverse_host(host);
        let Ok(mut hosts) = self.hosts.write() else {
            return;
        };

        match search(&hosts, &key) {
            Ok(i) => hosts[i].1.add(source),
            Err(i) => hosts.insert(i, (key, Sources::new(source))),
        }
    }

    fn reset(&self, source: &str) {
        let Ok(mut hosts) = self.hosts.write() else {
            return;
        };

        hosts.retain_mut(|(_, sources)| {
            sources.remove(source);
            !sources.is_empty()
        });
    }

    fn block(&self, host: &str) -> bool {
        let key = reverse_host(host);
        self.hosts
            .read()
            .map(|hosts| search(&hosts, &key).is_ok())
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.hosts.read().map(|hosts| hosts.len()).unwrap_or(0)
    }
}
