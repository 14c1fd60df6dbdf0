//! DNS query resolution logic.
//!
//! Handles the per-query pipeline:
//! 1. Validate and refuse what is never served (ANY, RRSIG)
//! 2. Block A/AAAA queries for listed hosts unless whitelisted
//! 3. Answer A/AAAA queries from static overrides
//! 4. Cache lookup
//! 5. Race the zone's upstreams and cache the answer
//!
//! Transports handle the actual I/O, the resolver handles decisions. Every
//! path ends in a reply; failures become SERVFAIL, FORMERR or REFUSED.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::RecordType;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::dns::{address_reply, error_reply, query_host};
use crate::filter::{HostAdder, Passer, StoreBackend, Whitelist, new_store, normalize_host};
use crate::overrides::Override;
use crate::stats::Stats;
use crate::transport::Protocol;
use crate::upstream::{Timeouts, Upstreams};

/// Zone every query falls back to.
pub const ROOT_ZONE: &str = ".";

/// Hosts never blocked unless configured otherwise.
pub const DEFAULT_WHITELIST: [&str; 4] =
    ["localhost", "localhost.localdomain", "broadcasthost", "local"];

/// How a query was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Blocked,
    Overridden,
    Cached,
    Forwarded,
    Refused,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Blocked => "blocked",
            Outcome::Overridden => "overridden",
            Outcome::Cached => "cached",
            Outcome::Forwarded => "forwarded",
            Outcome::Refused => "refused",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The reply to one query and how it was produced.
#[derive(Debug)]
pub struct Resolution {
    pub message: Message,
    pub outcome: Outcome,
    /// Upstream that answered a forwarded query.
    pub upstream: Option<String>,
}

impl Resolution {
    fn new(message: Message, outcome: Outcome) -> Self {
        Self {
            message,
            outcome,
            upstream: None,
        }
    }
}

/// Addresses and TTL returned for blocked hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReply {
    pub ipv4: Ipv4Addr,
    pub ipv6: Ipv6Addr,
    pub ttl: u32,
}

impl Default for BlockReply {
    fn default() -> Self {
        Self {
            ipv4: Ipv4Addr::LOCALHOST,
            ipv6: Ipv6Addr::LOCALHOST,
            ttl: 3600,
        }
    }
}

/// Upstream sets keyed by zone.
///
/// A query goes to the longest zone that equals its name or is a
/// label-boundary suffix of it. The root zone `.` matches everything.
#[derive(Debug, Clone, Default)]
pub struct Zones {
    zones: Vec<(String, Upstreams)>,
}

impl Zones {
    /// Zones with `default` serving the root.
    pub fn new(default: Upstreams) -> Self {
        let mut zones = Self::default();
        zones.insert(ROOT_ZONE, default);
        zones
    }

    /// Add or replace the upstreams for `zone`.
    pub fn insert(&mut self, zone: &str, upstreams: Upstreams) {
        let zone = match normalize_host(zone) {
            z if z.is_empty() => ROOT_ZONE.to_string(),
            z => z,
        };

        match self.zones.iter_mut().find(|(name, _)| *name == zone) {
            Some(entry) => entry.1 = upstreams,
            None => self.zones.push((zone, upstreams)),
        }
    }

    /// Upstreams responsible for `host` along with their zone.
    pub fn select(&self, host: &str) -> Option<(&str, &Upstreams)> {
        self.zones
            .iter()
            .filter(|(zone, _)| zone_contains(zone, host))
            .max_by_key(|(zone, _)| if zone == ROOT_ZONE { 0 } else { zone.len() + 1 })
            .map(|(zone, upstreams)| (zone.as_str(), upstreams))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Upstreams)> {
        self.zones.iter().map(|(zone, upstreams)| (zone.as_str(), upstreams))
    }
}

fn zone_contains(zone: &str, host: &str) -> bool {
    zone == ROOT_ZONE
        || host == zone
        || host
            .strip_suffix(zone)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Resolver handles DNS query processing decisions.
///
/// Shared by every transport; all state it owns is either read-only or
/// internally synchronized.
pub struct Resolver {
    blocker: Arc<dyn HostAdder>,
    passer: Arc<dyn Passer>,
    overrides: Override,
    override_ttl: u32,
    block_reply: BlockReply,
    cache: Option<Arc<ResponseCache>>,
    zones: Zones,
    timeouts: Timeouts,
    stats: Stats,
}

impl Resolver {
    /// A resolver forwarding through `zones` with an empty block store, the
    /// default whitelist, no overrides and no cache.
    pub fn new(zones: Zones, timeouts: Timeouts) -> Self {
        Self {
            blocker: new_store(StoreBackend::default()),
            passer: Arc::new(Whitelist::new(DEFAULT_WHITELIST)),
            overrides: Override::default(),
            override_ttl: 3600,
            block_reply: BlockReply::default(),
            cache: None,
            zones,
            timeouts,
            stats: Stats::new(),
        }
    }

    pub fn with_blocker(mut self, blocker: Arc<dyn HostAdder>) -> Self {
        self.blocker = blocker;
        self
    }

    pub fn with_passer(mut self, passer: Arc<dyn Passer>) -> Self {
        self.passer = passer;
        self
    }

    pub fn with_overrides(mut self, overrides: Override, ttl: u32) -> Self {
        self.overrides = overrides;
        self.override_ttl = ttl;
        self
    }

    pub fn with_block_reply(mut self, block_reply: BlockReply) -> Self {
        self.block_reply = block_reply;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    /// Number of hosts currently blocked.
    pub fn blocked_count(&self) -> usize {
        self.blocker.len()
    }

    /// Produce the reply to `req`, received over `protocol`.
    pub async fn resolve(&self, req: &Message, protocol: Protocol) -> Resolution {
        let Some(query) = req.queries().first() else {
            return Resolution::new(error_reply(req, ResponseCode::FormErr), Outcome::Failed);
        };

        let qtype = query.query_type();
        if matches!(qtype, RecordType::ANY | RecordType::RRSIG) {
            return Resolution::new(error_reply(req, ResponseCode::Refused), Outcome::Refused);
        }

        let host = query_host(query.name());
        let is_address = matches!(qtype, RecordType::A | RecordType::AAAA);

        if is_address && !self.passer.pass(&host) && self.blocker.block(&host) {
            let ips = [IpAddr::V4(self.block_reply.ipv4), IpAddr::V6(self.block_reply.ipv6)];
            let ttl = self.block_reply.ttl;
            if let Some(resp) = address_reply(req, query.name(), qtype, &ips, ttl) {
                return Resolution::new(resp, Outcome::Blocked);
            }
        }

        if is_address {
            let reply = self
                .overrides
                .get(&host)
                .and_then(|ips| address_reply(req, query.name(), qtype, &ips, self.override_ttl));
            if let Some(resp) = reply {
                return Resolution::new(resp, Outcome::Overridden);
            }
        }

        if let Some(resp) = self.cache.as_ref().and_then(|cache| cache.lookup(req)) {
            return Resolution::new(resp, Outcome::Cached);
        }

        if !req.recursion_desired() {
            return Resolution::new(error_reply(req, ResponseCode::Refused), Outcome::Refused);
        }

        let Some((zone, upstreams)) = self.zones.select(&host) else {
            warn!(name = %host, "no upstream configured for query");
            return Resolution::new(error_reply(req, ResponseCode::ServFail), Outcome::Failed);
        };
        debug!(name = %host, zone, upstreams = %upstreams, "forwarding query");

        let lookup = upstreams.lookup(req, protocol, self.timeouts);
        match timeout(self.timeouts.deadline(), lookup).await {
            Ok(Some((mut resp, upstream))) => {
                if let Some(cache) = &self.cache {
                    cache.store(&resp);
                }
                resp.set_recursion_available(true);
                Resolution {
                    message: resp,
                    outcome: Outcome::Forwarded,
                    upstream: Some(upstream),
                }
            }
            Ok(None) => {
                warn!(name = %host, qtype = %qtype, "every upstream failed");
                Resolution::new(error_reply(req, ResponseCode::ServFail), Outcome::Failed)
            }
            Err(_) => {
                warn!(name = %host, qtype = %qtype, "upstream lookup timed out");
                Resolution::new(error_reply(req, ResponseCode::ServFail), Outcome::Failed)
            }
        }
    }
}
