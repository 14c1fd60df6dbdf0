use std::time::{Duration, Instant};

use hickory_proto::op::Message;
use hickory_proto::rr::{LowerName, RData};

/// A cached NXDOMAIN or NODATA outcome.
///
/// The entry only names the SOA that justified it; the SOA record itself
/// lives in the positive cache and must still be there for the entry to be
/// served.
#[derive(Debug, Clone)]
pub(crate) struct NegativeEntry {
    pub(crate) soa: LowerName,
    pub(crate) expires: Instant,
}

impl NegativeEntry {
    /// Build an entry from the first SOA in the authority section, valid for
    /// `min(SOA TTL, SOA MINIMUM)`.
    pub(crate) fn from_response(resp: &Message, now: Instant) -> Option<Self> {
        resp.name_servers().iter().find_map(|record| match record.data() {
            Some(RData::SOA(soa)) => {
                let ttl = record.ttl().min(soa.minimum());
                Some(Self {
                    soa: LowerName::from(record.name()),
                    expires: now + Duration::from_secs(u64::from(ttl)),
                })
            }
            _ => None,
        })
    }

    pub(crate) fn expired_at(&self, now: Instant) -> bool {
        now >= self.expires
    }

    /// Whether `self` should take the place of `existing`.
    pub(crate) fn replaces(&self, existing: &Self, now: Instant) -> bool {
        existing.expired_at(now) || self.expires < existing.expires
    }
}
