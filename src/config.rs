//! Server configuration.
//!
//! The binary builds a [`ServerConfig`] from its command line; the library
//! never reads flags or the environment itself.

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{DEFAULT_PRUNE_INTERVAL, DEFAULT_SIZE};
use crate::error::Error;
use crate::filter::{Blocklist, StoreBackend, normalize_host};
use crate::resolver::{BlockReply, DEFAULT_WHITELIST};
use crate::upstream::{HttpsOptions, Timeouts};

/// Forwarders used when none are configured.
pub const DEFAULT_FORWARDERS: [&str; 2] = ["8.8.8.8:53", "8.8.4.4:53"];

/// `<zone>=<upstream>[,<upstream>...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSpec {
    pub zone: String,
    pub upstreams: Vec<String>,
}

impl FromStr for ZoneSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (zone, upstreams) =
            split_assignment(s).ok_or_else(|| Error::InvalidZone(s.to_string()))?;
        Ok(Self { zone, upstreams })
    }
}

/// `<host>=<ip>[,<ip>...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideSpec {
    pub host: String,
    pub addrs: Vec<String>,
}

impl FromStr for OverrideSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, addrs) =
            split_assignment(s).ok_or_else(|| Error::InvalidOverride(s.to_string()))?;
        if host.is_empty() {
            return Err(Error::InvalidOverride(s.to_string()));
        }
        Ok(Self { host, addrs })
    }
}

/// Split `name=a,b,c` into a normalized name and its non-empty values.
fn split_assignment(s: &str) -> Option<(String, Vec<String>)> {
    let (name, values) = s.split_once('=')?;
    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();
    if values.is_empty() {
        return None;
    }

    let name = name.trim();
    let name = if name == "." { name.to_string() } else { normalize_host(name) };
    Some((name, values))
}

/// Everything [`crate::server::run`] needs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address both the UDP and TCP listeners bind.
    pub listen: SocketAddr,
    /// Default forwarders: nameserver addresses or one `https://` endpoint.
    pub forward: Vec<String>,
    pub zones: Vec<ZoneSpec>,
    pub overrides: Vec<OverrideSpec>,
    pub override_ttl: u32,
    pub block: BlockReply,
    pub whitelist: Vec<String>,
    pub block_store: StoreBackend,
    pub blocklists: Vec<Blocklist>,
    pub blocklist_interval: Duration,
    pub timeouts: Timeouts,
    pub cache_size: usize,
    pub cache_prune_interval: Duration,
    pub no_cache: bool,
    pub https: HttpsOptions,
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 5353)),
            forward: DEFAULT_FORWARDERS.iter().map(|s| s.to_string()).collect(),
            zones: Vec::new(),
            overrides: Vec::new(),
            override_ttl: 3600,
            block: BlockReply::default(),
            whitelist: DEFAULT_WHITELIST.iter().map(|s| s.to_string()).collect(),
            block_store: StoreBackend::default(),
            blocklists: Vec::new(),
            blocklist_interval: Duration::from_secs(60),
            timeouts: Timeouts::default(),
            cache_size: DEFAULT_SIZE,
            cache_prune_interval: DEFAULT_PRUNE_INTERVAL,
            no_cache: false,
            https: HttpsOptions::default(),
            stats_interval: Duration::from_secs(60),
        }
    }
}
