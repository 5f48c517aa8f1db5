//! Benchmarks for the bulk write path.
//!
//! Run with: cargo bench -p es-reindex

#![allow(clippy::pedantic)]

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::Arc;

use es_reindex::bulk::{encode_bulk_body, BulkItemResult};
use es_reindex::{BulkBatcher, BulkResponse, BulkTransport, Document};

fn documents(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            Document::new(
                "products",
                Some(format!("doc-{i}")),
                json!({
                    "name": format!("product {i}"),
                    "price": i as f64 * 1.5,
                    "tags": ["a", "b", "c"],
                    "description": "x".repeat(200),
                }),
            )
        })
        .collect()
}

fn bulk_response_body(count: usize) -> String {
    let items: Vec<_> = (0..count)
        .map(|i| json!({"index": {"_index": "products", "_id": format!("doc-{i}"), "status": 201}}))
        .collect();
    json!({"took": 5, "errors": false, "items": items}).to_string()
}

/// Acknowledges every document without touching the network.
struct AckTransport;

#[async_trait]
impl BulkTransport for AckTransport {
    async fn send_bulk(&self, body: String) -> es_reindex::Result<BulkResponse> {
        let count = body.lines().count() / 2;
        Ok(BulkResponse {
            took: 0,
            errors: false,
            items: vec![
                BulkItemResult {
                    status: Some(201),
                    ..Default::default()
                };
                count
            ],
        })
    }
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_bulk_body");
    for size in [100, 500, 1000, 5000] {
        let docs = documents(size);
        group.bench_with_input(BenchmarkId::new("documents", size), &docs, |b, docs| {
            b.iter(|| black_box(encode_bulk_body(docs).unwrap()))
        });
    }
    group.finish();
}

fn bench_parse_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_bulk_response");
    for size in [100, 1000, 5000] {
        let body = bulk_response_body(size);
        let docs = documents(size);
        group.bench_with_input(BenchmarkId::new("items", size), &body, |b, body| {
            b.iter(|| {
                let response = BulkResponse::parse(body).unwrap();
                black_box(response.correlate(docs.clone()).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_batcher(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let docs = documents(10_000);

    let mut group = c.benchmark_group("batcher_10k");
    for batch_size in [100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("batch_size", batch_size),
            &batch_size,
            |b, &batch_size| {
                let docs = &docs;
                b.to_async(&rt).iter(move || async move {
                    let transport: Arc<dyn BulkTransport> = Arc::new(AckTransport);
                    let mut batcher = BulkBatcher::new(transport, batch_size);
                    let mut acknowledged = 0;
                    for doc in docs {
                        acknowledged += batcher.write(doc.clone()).await.unwrap().len();
                    }
                    acknowledged += batcher.end().await.unwrap().len();
                    black_box(acknowledged)
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_parse_response, bench_batcher);
criterion_main!(benches);
