//! TTL-aware DNS response cache.
//!
//! Positive answers are kept per (owner, type) as record sets with absolute
//! expiries. NXDOMAIN outcomes are cached per name and NODATA outcomes per
//! (name, type), both bounded by `min(SOA TTL, SOA MINIMUM)` as described in
//! RFC 2308 section 5. Each of the three tables is a bounded LRU.

mod negative;
mod rr;

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::{DNSClass, LowerName, RData, Record, RecordType};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::dns::reply_to;
use crate::error::Result;
use crate::lru::Lru;
use negative::NegativeEntry;
use rr::{CachedRecord, RRSet};

/// Default number of entries per table.
pub const DEFAULT_SIZE: usize = 128 * 1024;

/// Default interval between background prunes.
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

type Key = (LowerName, RecordType);

#[derive(Clone, Copy)]
enum Section {
    Answer,
    Authority,
    Additional,
}

/// Response cache shared by every in-flight query.
pub struct ResponseCache {
    positive: Mutex<Lru<Key, RRSet>>,
    nxdomain: Mutex<Lru<LowerName, NegativeEntry>>,
    nodata: Mutex<Lru<Key, NegativeEntry>>,
    pruner: Mutex<Option<JoinHandle<()>>>,
}

impl ResponseCache {
    /// Create a cache whose tables each hold at most `size` entries.
    pub fn new(size: usize) -> Result<Self> {
        let on_evict = Box::new(|key: &Key, set: &RRSet| {
            debug!(name = %key.0, qtype = %key.1, records = set.len(), "evicted from cache");
        });

        Ok(Self {
            positive: Mutex::new(Lru::with_evict(size, on_evict)?),
            nxdomain: Mutex::new(Lru::new(size)?),
            nodata: Mutex::new(Lru::new(size)?),
            pruner: Mutex::new(None),
        })
    }

    /// Cache every IN-class record of `resp`, plus its negative outcome if
    /// any. Returns the number of records stored.
    pub fn store(&self, resp: &Message) -> usize {
        self.store_at(resp, Instant::now())
    }

    pub(crate) fn store_at(&self, resp: &Message, now: Instant) -> usize {
        let [query] = resp.queries() else {
            return 0;
        };
        if query.query_class() != DNSClass::IN {
            return 0;
        }

        match resp.response_code() {
            ResponseCode::NXDomain => self.set_nxdomain(LowerName::from(query.name()), resp, now),
            ResponseCode::NoError if resp.answers().is_empty() => {
                self.set_nodata((LowerName::from(query.name()), query.query_type()), resp, now)
            }
            ResponseCode::NoError => {}
            _ => return 0,
        }

        let Ok(mut positive) = self.positive.lock() else {
            return 0;
        };

        let mut stored = 0;
        let records = resp
            .answers()
            .iter()
            .chain(resp.name_servers())
            .chain(resp.additionals());

        for record in records {
            if record.dns_class() != DNSClass::IN || record.data().is_none() {
                continue;
            }

            let key = (LowerName::from(record.name()), record.record_type());
            let cached = CachedRecord::new(record, now);
            match positive.get_mut(&key) {
                Some(set) => set.add(cached, now),
                None => {
                    let mut set = RRSet::default();
                    set.add(cached, now);
                    positive.add(key, set);
                }
            }
            stored += 1;

            debug!(
                name = %record.name(),
                qtype = %record.record_type(),
                ttl = record.ttl(),
                "stored in cache"
            );
        }

        stored
    }

    fn set_nxdomain(&self, name: LowerName, resp: &Message, now: Instant) {
        let Some(entry) = NegativeEntry::from_response(resp, now) else {
            return;
        };
        let Ok(mut nxdomain) = self.nxdomain.lock() else {
            return;
        };

        if let Some(existing) = nxdomain.get(&name) {
            if !entry.replaces(existing, now) {
                return;
            }
        }

        debug!(name = %name, soa = %entry.soa, "stored nxdomain in cache");
        nxdomain.add(name, entry);
    }

    fn set_nodata(&self, key: Key, resp: &Message, now: Instant) {
        let Some(entry) = NegativeEntry::from_response(resp, now) else {
            return;
        };
        let Ok(mut nodata) = self.nodata.lock() else {
            return;
        };

        if let Some(existing) = nodata.get(&key) {
            if !entry.replaces(existing, now) {
                return;
            }
        }

        debug!(name = %key.0, qtype = %key.1, soa = %entry.soa, "stored nodata in cache");
        nodata.add(key, entry);
    }

    /// Answer `req` from the cache, or `None` on a miss.
    pub fn lookup(&self, req: &Message) -> Option<Message> {
        self.lookup_at(req, Instant::now())
    }

    pub(crate) fn lookup_at(&self, req: &Message, now: Instant) -> Option<Message> {
        let [query] = req.queries() else {
            return None;
        };
        if query.query_class() != DNSClass::IN {
            return None;
        }

        let name = LowerName::from(query.name());
        let qtype = query.query_type();

        if let Some(answers) = self.get(&name, qtype, now) {
            debug!(name = %name, qtype = %qtype, cache = "hit", "cache lookup");
            let mut resp = reply_to(req);
            resp.add_answers(answers);
            self.add_signatures(&mut resp, now);
            self.add_additional(&mut resp, now);
            return Some(resp);
        }

        let nodata = self.get_negative(&self.nodata, &(name.clone(), qtype), now);
        let reply = nodata.and_then(|e| self.negative_reply(req, &e, ResponseCode::NoError, now));
        if let Some(resp) = reply {
            debug!(name = %name, qtype = %qtype, cache = "hit", "cache lookup (nodata)");
            return Some(resp);
        }

        let nxdomain = self.get_negative(&self.nxdomain, &name, now);
        let reply =
            nxdomain.and_then(|e| self.negative_reply(req, &e, ResponseCode::NXDomain, now));
        if let Some(resp) = reply {
            debug!(name = %name, qtype = %qtype, cache = "hit", "cache lookup (nxdomain)");
            return Some(resp);
        }

        debug!(name = %name, qtype = %qtype, cache = "miss", "cache lookup");
        None
    }

    /// Live records for (`name`, `qtype`), promoting the set.
    fn get(&self, name: &LowerName, qtype: RecordType, now: Instant) -> Option<Vec<Record>> {
        let Ok(mut positive) = self.positive.lock() else {
            return None;
        };

        let records = positive.get(&(name.clone(), qtype))?.records_at(now);
        (!records.is_empty()).then_some(records)
    }

    fn get_negative<K>(
        &self,
        table: &Mutex<Lru<K, NegativeEntry>>,
        key: &K,
        now: Instant,
    ) -> Option<NegativeEntry>
    where
        K: std::hash::Hash + Eq + Clone,
    {
        let Ok(mut table) = table.lock() else {
            return None;
        };

        let entry = table.get(key)?.clone();
        if entry.expired_at(now) {
            table.remove(key);
            return None;
        }
        Some(entry)
    }

    /// Negative replies are only served while their SOA is still cached.
    fn negative_reply(
        &self,
        req: &Message,
        entry: &NegativeEntry,
        rcode: ResponseCode,
        now: Instant,
    ) -> Option<Message> {
        let soa = self.get(&entry.soa, RecordType::SOA, now)?;

        let mut resp = reply_to(req);
        resp.set_response_code(rcode);
        resp.add_name_servers(soa);
        self.add_signatures(&mut resp, now);
        Some(resp)
    }

    /// Attach cached RRSIGs covering each owner in every section.
    fn add_signatures(&self, resp: &mut Message, now: Instant) {
        for section in [Section::Answer, Section::Authority, Section::Additional] {
            let records = match section {
                Section::Answer => resp.answers(),
                Section::Authority => resp.name_servers(),
                Section::Additional => resp.additionals(),
            };

            let mut owners: Vec<LowerName> = Vec::new();
            for record in records {
                if record.record_type() == RecordType::RRSIG {
                    continue;
                }
                let owner = LowerName::from(record.name());
                if !owners.contains(&owner) {
                    owners.push(owner);
                }
            }

            let sigs: Vec<Record> = owners
                .iter()
                .filter_map(|owner| self.get(owner, RecordType::RRSIG, now))
                .flatten()
                .collect();
            if sigs.is_empty() {
                continue;
            }

            match section {
                Section::Answer => resp.add_answers(sigs),
                Section::Authority => resp.add_name_servers(sigs),
                Section::Additional => resp.add_additionals(sigs),
            };
        }
    }

    /// Add cached addresses for NS, MX and SRV targets. CNAME targets are
    /// not followed (RFC 2181 section 10.3).
    fn add_additional(&self, resp: &mut Message, now: Instant) {
        let targets: Vec<LowerName> = resp
            .answers()
            .iter()
            .filter_map(|record| match record.data()? {
                RData::NS(ns) => Some(LowerName::from(&ns.0)),
                RData::MX(mx) => Some(LowerName::from(mx.exchange())),
                RData::SRV(srv) => Some(LowerName::from(srv.target())),
                _ => None,
            })
            .collect();

        for target in targets {
            for qtype in [RecordType::A, RecordType::AAAA] {
                match self.get(&target, qtype, now) {
                    Some(extra) => {
                        debug!(
                            name = %target,
                            qtype = %qtype,
                            cache = "hit",
                            "cache lookup (additional)"
                        );
                        resp.add_additionals(extra);
                    }
                    None => debug!(
                        name = %target,
                        qtype = %qtype,
                        cache = "miss",
                        "cache lookup (additional)"
                    ),
                }
            }
        }
    }

    /// Drop expired records and negative entries. Returns how many went.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub(crate) fn prune_at(&self, now: Instant) -> usize {
        let mut pruned = 0;

        if let Ok(mut positive) = self.positive.lock() {
            positive.retain(|_, set| {
                pruned += set.prune_at(now);
                !set.is_empty()
            });
        }
        if let Ok(mut nxdomain) = self.nxdomain.lock() {
            pruned += nxdomain.retain(|_, entry| !entry.expired_at(now));
        }
        if let Ok(mut nodata) = self.nodata.lock() {
            pruned += nodata.retain(|_, entry| !entry.expired_at(now));
        }

        pruned
    }

    /// Empty every table.
    pub fn purge(&self) {
        if let Ok(mut positive) = self.positive.lock() {
            positive.purge();
        }
        if let Ok(mut nxdomain) = self.nxdomain.lock() {
            nxdomain.purge();
        }
        if let Ok(mut nodata) = self.nodata.lock() {
            nodata.purge();
        }
    }

    /// Cached records plus negative entries.
    pub fn len(&self) -> usize {
        let mut len = 0;
        if let Ok(positive) = self.positive.lock() {
            positive.each(|_, set| len += set.len());
        }
        if let Ok(nxdomain) = self.nxdomain.lock() {
            len += nxdomain.len();
        }
        if let Ok(nodata) = self.nodata.lock() {
            len += nodata.len();
        }
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prune on `interval` in the background until [`stop`](Self::stop) is
    /// called or the cache is dropped. Starting twice is a no-op.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let Ok(mut pruner) = self.pruner.lock() else {
            return;
        };
        if pruner.is_some() {
            return;
        }

        let cache: Weak<Self> = Arc::downgrade(self);
        *pruner = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let pruned = cache.prune();
                debug!(pruned, remaining = cache.len(), "pruned cache");
            }
        }));
    }

    /// Stop the background pruner.
    pub fn stop(&self) {
        if let Ok(mut pruner) = self.pruner.lock() {
            if let Some(handle) = pruner.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for ResponseCache {
    fn drop(&mut self) {
        self.stop();
    }
}
