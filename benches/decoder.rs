//! Benchmarks for reply decoding and request framing

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use respite::{Decoder, Discard, Integer, Pairs, Reader, ValueVisitor, cmd, write_command};
use std::hint::black_box;

fn bench_decode_scalars(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_scalars");

    let status = b"+OK\r\n";
    group.throughput(Throughput::Bytes(status.len() as u64));
    group.bench_function("status", |b| {
        b.iter(|| Decoder::new(black_box(&status[..])).decode(ValueVisitor).unwrap())
    });

    let integer = b":1000\r\n";
    group.throughput(Throughput::Bytes(integer.len() as u64));
    group.bench_function("integer", |b| {
        b.iter(|| Decoder::new(black_box(&integer[..])).decode(Integer).unwrap())
    });

    let bulk = b"$11\r\nhello world\r\n";
    group.throughput(Throughput::Bytes(bulk.len() as u64));
    group.bench_function("bulk_as_string", |b| {
        b.iter(|| {
            Decoder::new(black_box(&bulk[..]))
                .decode(Reader::<String>::new())
                .unwrap()
        })
    });
    group.finish();
}

fn large_array(len: usize) -> Vec<u8> {
    let mut data = format!("*{len}\r\n").into_bytes();
    for i in 0..len {
        let item = format!("item-{i}");
        data.extend_from_slice(format!("${}\r\n{item}\r\n", item.len()).as_bytes());
    }
    data
}

fn bench_decode_arrays(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_arrays");
    let data = large_array(1000);
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("value_tree", |b| {
        b.iter(|| Decoder::new(black_box(&data[..])).decode(ValueVisitor).unwrap())
    });
    group.bench_function("discard", |b| {
        b.iter(|| Decoder::new(black_box(&data[..])).decode(Discard).unwrap())
    });
    group.bench_function("pairs", |b| {
        b.iter(|| {
            Decoder::new(black_box(&data[..]))
                .decode(Pairs(Reader::<Vec<u8>>::new()))
                .unwrap()
        })
    });
    group.finish();
}

fn bench_write_command(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_command");
    let value = vec![b'x'; 1024];
    let mut out = Vec::with_capacity(2048);

    group.bench_function("set_1k", |b| {
        b.iter(|| {
            out.clear();
            write_command(&mut out, &cmd!["SET", "key", black_box(&value)]).unwrap();
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_decode_scalars,
    bench_decode_arrays,
    bench_write_command
);
criterion_main!(benches);
