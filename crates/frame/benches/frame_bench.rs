use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use futures::channel::mpsc;
use futures::executor::block_on;
use micro_frame::codec::{DEFAULT_CHUNK_SIZE, chunk_bytes, encode_header};
use micro_frame::protocol::{ConnectionKind, Incoming, Outgoing, Scope};
use micro_frame::transport::Transport;
use std::hint::black_box;

fn bench_chunk_bytes(c: &mut Criterion) {
    let body = Bytes::from(vec![b'x'; 1024 * 1024]);

    c.bench_function("chunk_1mb_body", |b| {
        b.iter(|| {
            for (chunk, last) in chunk_bytes(body.clone(), DEFAULT_CHUNK_SIZE) {
                black_box((chunk, last));
            }
        });
    });
}

fn bench_encode_headers(c: &mut Criterion) {
    let headers = [
        ("Content-Type", "text/html; charset=utf-8"),
        ("Cache-Control", "no-cache"),
        ("X-Frame-Options", "DENY"),
        ("Content-Disposition", "attachment; filename=\"résumé.pdf\""),
    ];

    c.bench_function("encode_response_headers", |b| {
        b.iter(|| {
            for (name, value) in &headers {
                black_box(encode_header(name, value).unwrap());
            }
        });
    });
}

fn bench_read_body(c: &mut Criterion) {
    let parts: Vec<Incoming> =
        (0..16).map(|i| Incoming::http_request(Bytes::from(vec![b'a'; 4096]), i < 15)).collect();

    c.bench_function("read_body_16_messages", |b| {
        b.iter(|| {
            let (send, _rx) = mpsc::channel::<Outgoing>(1);
            let scope = Scope::new(ConnectionKind::Http).with_method("POST");
            let mut transport = Transport::new(scope, futures::stream::iter(parts.clone()), send);
            black_box(block_on(transport.read_body()).unwrap());
        });
    });
}

criterion_group!(benches, bench_chunk_bytes, bench_encode_headers, bench_read_body);
criterion_main!(benches);
