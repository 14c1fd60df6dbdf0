//! Static host to address overrides.

use std::net::IpAddr;

use tracing::warn;

use crate::filter::{normalize_host, reverse_host};
use crate::tree::RadixTree;

/// Read-only table of hosts answered with fixed addresses.
#[derive(Default)]
pub struct Override {
    tree: RadixTree<Vec<IpAddr>>,
}

impl Override {
    /// Build the table from `host -> [ip]` pairs.
    ///
    /// Addresses that fail to parse are dropped with a warning; a host left
    /// with no address is not added.
    pub fn new<I, H, A, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (H, A)>,
        H: AsRef<str>,
        A: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = RadixTree::new();

        for (host, addrs) in entries {
            let host = normalize_host(host.as_ref());
            let ips: Vec<IpAddr> = addrs
                .into_iter()
                .filter_map(|addr| {
                    let addr = addr.as_ref().trim();
                    match addr.parse() {
                        Ok(ip) => Some(ip),
                        Err(_) => {
                            warn!(host = %host, addr, "ignoring invalid override address");
                            None
                        }
                    }
                })
                .collect();

            if host.is_empty() || ips.is_empty() {
                continue;
            }
            tree.insert(&reverse_host(&host), ips);
        }

        Self { tree }
    }

    /// Addresses configured for `host`. The returned list is a copy.
    pub fn get(&self, host: &str) -> Option<Vec<IpAddr>> {
        self.tree.get(&reverse_host(host)).cloned()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}
