//! Store benchmarks
//!
//! Run with: `cargo bench -p yearbook-core`
//!
//! Measures the primitives the application hits on every request:
//! - document point reads on the embedded backend
//! - shallow-merge updates (read + write round trip)
//! - the group-members join against a 200-member group

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use yearbook_core::db::{DbAdapter, LocalAdapter, MemoryAdapter};

const MEMBERS: usize = 200;

async fn seed(store: &dyn DbAdapter) {
    store
        .add_document("groups", "writers", json!({"name": "Writers"}))
        .await
        .unwrap();
    for i in 0..MEMBERS {
        let username = format!("user-{i}");
        if i % 2 == 0 {
            store
                .add_document("profiles", &username, json!({"username": username}))
                .await
                .unwrap();
        }
        store
            .add_link(
                "members",
                "writers",
                &username,
                json!({"username": username, "status": "approved"}),
            )
            .await
            .unwrap();
    }
}

async fn setup_local() -> (Arc<LocalAdapter>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(
        LocalAdapter::new(temp_dir.path().join("bench.db"))
            .await
            .unwrap(),
    );
    seed(&*store).await;
    (store, temp_dir)
}

fn bench_get_document(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (store, _temp_dir) = rt.block_on(setup_local());

    c.bench_function("local_get_document", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(store.get_document("profiles", "user-42").await.unwrap())
            })
        })
    });
}

fn bench_update_document(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (store, _temp_dir) = rt.block_on(setup_local());

    c.bench_function("local_update_document", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    store
                        .update_document("profiles", "user-42", json!({"lastSeen": "now"}))
                        .await
                        .unwrap(),
                )
            })
        })
    });
}

fn bench_group_members_join(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (local, _temp_dir) = rt.block_on(setup_local());
    let memory = MemoryAdapter::new();
    rt.block_on(seed(&memory));

    let mut group = c.benchmark_group("group_members_with_profiles");
    group.bench_function("local", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(local.get_group_members_with_profiles("writers").await.unwrap())
            })
        })
    });
    group.bench_function("memory", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(memory.get_group_members_with_profiles("writers").await.unwrap())
            })
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_get_document,
    bench_update_document,
    bench_group_members_join
);
criterion_main!(benches);
