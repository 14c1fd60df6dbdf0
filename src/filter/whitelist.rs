//! Hosts exempt from blocking.

use rustc_hash::FxHashSet;

use super::{Passer, normalize_host};

/// Exact-match set of hosts that are never blocked.
#[derive(Debug, Default, Clone)]
pub struct Whitelist {
    hosts: FxHashSet<String>,
}

impl Whitelist {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| normalize_host(h.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();

        Self { hosts }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl Passer for Whitelist {
    fn pass(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_matches_exact_hosts() {
        let whitelist = Whitelist::new(["example.com", "www.example.com"]);

        assert_eq!(whitelist.len(), 2);
        assert!(whitelist.pass("example.com"));
        assert!(whitelist.pass("www.example.com"));
        assert!(!whitelist.pass("com"));
        assert!(!whitelist.pass("srv.www.example.com"));
    }

    #[test]
    fn new_normalizes_entries() {
        let whitelist = Whitelist::new(["LocalHost.", "", "broadcasthost"]);

        assert_eq!(whitelist.len(), 2);
        assert!(whitelist.pass("localhost"));
        assert!(whitelist.pass("broadcasthost"));
    }
}
