use std::time::{Duration, Instant};

use hickory_proto::rr::Record;

/// A record with an absolute expiry instead of a decrementing TTL.
#[derive(Debug, Clone)]
pub(crate) struct CachedRecord {
    record: Record,
    expires: Instant,
}

impl CachedRecord {
    pub(crate) fn new(record: &Record, now: Instant) -> Self {
        let expires = now + Duration::from_secs(u64::from(record.ttl()));
        let mut record = record.clone();
        record.set_ttl(0);
        Self { record, expires }
    }

    /// Same owner, type and rdata. TTL is not compared.
    pub(crate) fn same(&self, other: &Self) -> bool {
        self.record.record_type() == other.record.record_type()
            && self.record.name() == other.record.name()
            && self.record.data() == other.record.data()
    }

    pub(crate) fn expired_at(&self, now: Instant) -> bool {
        now >= self.expires
    }

    pub(crate) fn ttl_at(&self, now: Instant) -> u32 {
        u32::try_from(self.expires.saturating_duration_since(now).as_secs()).unwrap_or(u32::MAX)
    }

    /// The record with its TTL recomputed for `now`.
    pub(crate) fn record_at(&self, now: Instant) -> Record {
        let mut record = self.record.clone();
        record.set_ttl(self.ttl_at(now));
        record
    }
}

/// Records cached for one (owner, type).
#[derive(Debug, Clone, Default)]
pub(crate) struct RRSet {
    records: Vec<CachedRecord>,
}

impl RRSet {
    /// Merge `rr` into the set. When an equal record is already cached, the
    /// one expiring sooner is kept.
    pub(crate) fn add(&mut self, rr: CachedRecord, now: Instant) {
        self.records.retain(|r| !r.expired_at(now));

        match self.records.iter_mut().find(|r| r.same(&rr)) {
            Some(existing) => {
                if rr.expires < existing.expires {
                    *existing = rr;
                }
            }
            None => self.records.push(rr),
        }
    }

    /// Live records with TTLs relative to `now`.
    pub(crate) fn records_at(&self, now: Instant) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| !r.expired_at(now))
            .map(|r| r.record_at(now))
            .collect()
    }

    /// Drop expired records, returning how many were dropped.
    pub(crate) fn prune_at(&mut self, now: Instant) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !r.expired_at(now));
        before - self.records.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn a_record(name: &str, ip: [u8; 4], ttl: u32) -> Record {
        Record::from_rdata(
            Name::from_str(name).unwrap(),
            ttl,
            RData::A(A::from(Ipv4Addr::from(ip))),
        )
    }

    #[test]
    fn add_keeps_sooner_expiry() {
        let now = Instant::now();
        let mut set = RRSet::default();

        set.add(CachedRecord::new(&a_record("example.com.", [1, 2, 3, 4], 60), now), now);
        assert_eq!(set.records_at(now)[0].ttl(), 60);

        set.add(CachedRecord::new(&a_record("example.com.", [1, 2, 3, 4], 1), now), now);
        assert_eq!(set.len(), 1);
        assert_eq!(set.records_at(now)[0].ttl(), 1);

        set.add(CachedRecord::new(&a_record("example.com.", [1, 2, 3, 4], 60), now), now);
        assert_eq!(set.len(), 1);
        assert_eq!(set.records_at(now)[0].ttl(), 1);

        let later = now + Duration::from_secs(2);
        assert!(set.records_at(later).is_empty());
        assert_eq!(set.prune_at(later), 1);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn add_distinguishes_rdata() {
        let now = Instant::now();
        let mut set = RRSet::default();

        set.add(CachedRecord::new(&a_record("example.com.", [1, 2, 3, 4], 60), now), now);
        set.add(CachedRecord::new(&a_record("example.com.", [5, 6, 7, 8], 30), now), now);

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn records_at_counts_down() {
        let now = Instant::now();
        let mut set = RRSet::default();
        set.add(CachedRecord::new(&a_record("example.com.", [1, 2, 3, 4], 300), now), now);

        let records = set.records_at(now + Duration::from_secs(100));
        assert_eq!(records[0].ttl(), 200);
        assert_eq!(records[0].name(), &Name::from_str("example.com.").unwrap());
    }

    #[test]
    fn add_drops_expired_members() {
        let now = Instant::now();
        let mut set = RRSet::default();
        set.add(CachedRecord::new(&a_record("example.com.", [1, 2, 3, 4], 1), now), now);

        let later = now + Duration::from_secs(5);
        set.add(CachedRecord::new(&a_record("example.com.", [5, 6, 7, 8], 60), later), later);

        assert_eq!(set.len(), 1);
        assert_eq!(set.records_at(later)[0].ttl(), 60);
    }
}
