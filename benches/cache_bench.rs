//! Benchmarks for the response cache.

use std::str::FromStr;

use criterion::{BenchmarkId, Criterion, Throughput, black_box};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};

use sinkhole::cache::ResponseCache;
use sinkhole::dns::reply_to;

fn query(name: &str) -> Message {
    let mut req = Message::new();
    req.set_id(1)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    req.add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));
    req
}

fn answer(req: &Message, records: u8) -> Message {
    let mut resp = reply_to(req);
    let name = req.queries()[0].name().clone();
    for i in 0..records {
        resp.add_answer(Record::from_rdata(name.clone(), 300, RData::A(A::new(10, 0, 0, i))));
    }
    resp
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    group.throughput(Throughput::Elements(1));

    let cache = ResponseCache::new(16 * 1024).unwrap();
    for i in 0..10_000 {
        let req = query(&format!("host{i}.example.com."));
        cache.store(&answer(&req, 2));
    }

    let hit = query("host42.example.com.");
    let miss = query("nothere.example.com.");
    group.bench_function(BenchmarkId::new("lookup", "hit"), |b| {
        b.iter(|| cache.lookup(black_box(&hit)))
    });
    group.bench_function(BenchmarkId::new("lookup", "miss"), |b| {
        b.iter(|| cache.lookup(black_box(&miss)))
    });

    for records in [1u8, 8] {
        let resp = answer(&query("store.example.com."), records);
        group.bench_function(BenchmarkId::new("store", records), |b| {
            b.iter(|| cache.store(black_box(&resp)))
        });
    }

    group.finish();
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_cache(&mut criterion);
    criterion.final_summary();
}
