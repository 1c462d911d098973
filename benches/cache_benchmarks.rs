//! # 缓存性能基准测试

use ai_relay::cache::{CacheEntry, CacheGateway, CacheKeyDeriver, MemoryCacheGateway, derive_key};
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;

const URL: &str = "https://api.openai.com/v1/chat/completions";

fn chat_body(size: usize) -> Vec<u8> {
    let content = "x".repeat(size);
    format!(r#"{{"model":"gpt-4o","messages":[{{"role":"user","content":"{content}"}}]}}"#)
        .into_bytes()
}

/// 缓存键生成
pub fn key_benchmark(c: &mut Criterion) {
    let small = chat_body(64);
    let large = chat_body(64 * 1024);

    c.bench_function("derive_key_small_body", |b| {
        b.iter(|| derive_key(black_box(URL), &Method::POST, black_box(&small)));
    });

    c.bench_function("derive_key_64k_body", |b| {
        b.iter(|| derive_key(black_box(URL), &Method::POST, black_box(&large)));
    });

    let deriver = CacheKeyDeriver::default();
    c.bench_function("is_cacheable", |b| {
        b.iter(|| {
            deriver.is_cacheable(
                &Method::POST,
                black_box("/v1/chat/completions"),
                black_box("gpt-4o-mini"),
            )
        });
    });
}

/// 内存缓存读写
pub fn memory_cache_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = MemoryCacheGateway::new(100_000);
    let ttl = Duration::from_secs(600);
    let entry = CacheEntry::from_response(
        StatusCode::OK,
        &HeaderMap::new(),
        Bytes::from(chat_body(512)),
        ttl,
    );

    rt.block_on(async {
        for i in 0..1000 {
            let key = derive_key(URL, &Method::POST, format!("warm-{i}").as_bytes());
            cache.store(&key, entry.clone(), ttl).await.unwrap();
        }
    });

    let hit_key = derive_key(URL, &Method::POST, b"warm-42");
    c.bench_function("memory_cache_lookup_hit", |b| {
        b.iter(|| rt.block_on(cache.lookup(black_box(&hit_key))).unwrap());
    });

    let miss_key = derive_key(URL, &Method::POST, b"cold");
    c.bench_function("memory_cache_lookup_miss", |b| {
        b.iter(|| rt.block_on(cache.lookup(black_box(&miss_key))).unwrap());
    });

    let mut counter = 0u64;
    c.bench_function("memory_cache_store", |b| {
        b.iter(|| {
            counter += 1;
            let key = derive_key(URL, &Method::POST, &counter.to_le_bytes());
            rt.block_on(cache.store(&key, entry.clone(), ttl)).unwrap();
        });
    });
}

criterion_group!(benches, key_benchmark, memory_cache_benchmark);
criterion_main!(benches);
