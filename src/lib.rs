//! Sinkhole - a caching, ad-blocking DNS resolver.
//!
//! The library holds every component; the binary only parses flags and
//! starts [`server::run`].

pub mod cache;
pub mod config;
pub mod dns;
pub mod error;
pub mod filter;
pub mod lru;
pub mod overrides;
pub mod resolver;
pub mod server;
pub mod stats;
pub mod transport;
pub mod tree;
pub mod upstream;

pub use error::{Error, Result};
