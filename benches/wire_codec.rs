use criterion::{criterion_group, criterion_main, Criterion};
use nsblast::wire::Message;
use std::hint::black_box;

fn sample_query() -> Vec<u8> {
    let mut buf = vec![
        0x12, 0x34, // id
        0x01, 0x00, // flags: RD
        0x00, 0x01, // qdcount
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    buf.extend_from_slice(&[7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0]);
    buf.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // QTYPE=A QCLASS=IN
    buf
}

fn criterion_benchmark(c: &mut Criterion) {
    let query = sample_query();
    c.bench_function("parse_a_query", |b| {
        b.iter(|| Message::parse(black_box(&query)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
