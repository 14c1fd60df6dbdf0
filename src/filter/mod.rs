//! DNS query filtering.
//!
//! Block stores track which hosts are blocked and which feeds asserted them.
//! Four interchangeable backends implement the same [`HostAdder`] contract;
//! picking one is a memory/speed trade-off with no behavioural difference.

mod blocklist;
mod hash;
mod radix;
mod reverse;
mod slice;
mod sources;
mod trie;
mod whitelist;

use std::sync::Arc;

pub use blocklist::{Blocklist, ListFormat, parse_line, validate_host};
pub use hash::HashStore;
pub use radix::RadixStore;
pub use reverse::reverse_host;
pub use slice::SliceStore;
pub use sources::Sources;
pub use trie::TrieStore;
pub use whitelist::Whitelist;

/// Membership store fed asynchronously by blocklist feeders.
///
/// Every method is safe to call concurrently; mutations of a single entry are
/// serialized by the store.
pub trait HostAdder: Send + Sync {
    /// Record that `source` asserts `host` is blocked.
    fn add_host(&self, source: &str, host: &str);

    /// Withdraw every assertion made by `source`.
    fn reset(&self, source: &str);

    /// Whether at least one source currently asserts `host`. Exact match only.
    fn block(&self, host: &str) -> bool;

    /// Number of distinct blocked hosts.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exemption check consulted before any block store.
pub trait Passer: Send + Sync {
    fn pass(&self, host: &str) -> bool;
}

/// Block store implementation selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StoreBackend {
    Hash,
    Slice,
    #[default]
    Radix,
    Trie,
}

/// Create an empty block store of the given kind.
pub fn new_store(backend: StoreBackend) -> Arc<dyn HostAdder> {
    match backend {
        StoreBackend::Hash => Arc::new(HashStore::default()),
        StoreBackend::Slice => Arc::new(SliceStore::default()),
        StoreBackend::Radix => Arc::new(RadixStore::default()),
        StoreBackend::Trie => Arc::new(TrieStore::default()),
    }
}

/// Canonicalize a host name for lookups: lower-case, without the trailing
/// root dot and without a `:port` suffix.
pub fn normalize_host(host: &str) -> String {
    let mut host = host.trim().to_lowercase();

    if host.ends_with('.') {
        host.pop();
    }

    if let Some((name, port)) = host.rsplit_once(':') {
        if !name.is_empty() && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            host.truncate(name.len());
        }
    }

    host
}
