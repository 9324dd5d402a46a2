use criterion::{criterion_group, criterion_main, Criterion};
use nsblast::storage::codec::{Entry, EntryBuilder};
use std::hint::black_box;
use std::net::Ipv4Addr;

fn sample_entry() -> Entry {
    let mut builder = EntryBuilder::new("www.example.com");
    builder.create_a(300, Ipv4Addr::new(93, 184, 216, 34)).unwrap();
    builder.create_a(300, Ipv4Addr::new(93, 184, 216, 35)).unwrap();
    builder.finish().unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let entry = sample_entry();
    let bytes = entry.to_bytes().unwrap();

    c.bench_function("entry_to_bytes", |b| {
        b.iter(|| sample_entry().to_bytes().unwrap())
    });
    c.bench_function("entry_parse", |b| {
        b.iter(|| Entry::parse(black_box(&bytes)).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
