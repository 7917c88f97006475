//! Throughput Benchmark for snapkv
//!
//! Measures the keyspace, the request decoder, command execution and
//! snapshot decoding.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use snapkv::commands::CommandHandler;
use snapkv::config::ServerConfig;
use snapkv::protocol::{parse_command, RespValue};
use snapkv::snapshot::decode;
use snapkv::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, Bytes::from("small_value"));
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            engine.set_with_ttl(key, Bytes::from("value"), Duration::from_secs(3600));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        engine.set(key, value);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark KEYS pattern matching
fn bench_keys(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..1_000 {
        engine.set(Bytes::from(format!("user:{}", i)), Bytes::from("user_data"));
        engine.set(Bytes::from(format!("session:{}", i)), Bytes::from("session_data"));
        engine.set(Bytes::from(format!("cache:{}", i)), Bytes::from("cache_data"));
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| black_box(engine.keys(b"user:*")));
    });

    group.bench_function("keys_all", |b| {
        b.iter(|| black_box(engine.keys(b"*")));
    });

    group.finish();
}

/// Benchmark request decoding of a pipelined batch
fn bench_decode(c: &mut Criterion) {
    let mut batch = Vec::new();
    for i in 0..100 {
        let key = format!("key:{}", i);
        batch.extend(RespValue::command(["SET".to_string(), key, "value".to_string()]).serialize());
    }

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(batch.len() as u64));

    group.bench_function("pipelined_set_x100", |b| {
        b.iter(|| {
            let mut offset = 0;
            while let Ok(Some((frame, consumed))) = parse_command(&batch[offset..]) {
                black_box(frame);
                offset += consumed;
            }
        });
    });

    group.finish();
}

/// Benchmark command execution through the handler
fn bench_execute(c: &mut Criterion) {
    let handler = CommandHandler::new(
        Arc::new(StorageEngine::new()),
        Arc::new(ServerConfig::default()),
    );

    let mut group = c.benchmark_group("execute");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_then_get", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 10_000));
            handler.execute(vec![Bytes::from("SET"), key.clone(), Bytes::from("v")]);
            black_box(handler.execute(vec![Bytes::from("GET"), key]));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark snapshot decoding
fn bench_snapshot(c: &mut Criterion) {
    let mut file = b"REDIS0011".to_vec();
    file.extend_from_slice(&[0xFE, 0x00]);
    for i in 0..10_000u32 {
        let key = format!("key:{:05}", i);
        if i % 2 == 0 {
            file.push(0xFC);
            file.extend_from_slice(&4_102_444_800_000u64.to_le_bytes());
        }
        file.push(0x00);
        file.push(key.len() as u8);
        file.extend_from_slice(key.as_bytes());
        file.extend_from_slice(&[0xC1, 0x39, 0x30]);
    }
    file.push(0xFF);
    file.extend_from_slice(&[0u8; 8]);

    let mut group = c.benchmark_group("snapshot");
    group.throughput(Throughput::Bytes(file.len() as u64));

    group.bench_function("decode_10k_entries", |b| {
        b.iter(|| black_box(decode(&file).map(|s| s.entries.len())));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_keys,
    bench_decode,
    bench_execute,
    bench_snapshot,
);

criterion_main!(benches);
