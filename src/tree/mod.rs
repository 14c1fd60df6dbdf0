//! String-keyed tree structures backing the block stores and override table.

mod radix;
mod trie;

pub use radix::RadixTree;
pub use trie::Trie;
