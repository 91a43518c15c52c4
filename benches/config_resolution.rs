//! Benchmark for config canonicalization and node resolution
//!
//! Resolution runs once per provision request; canonicalization once per reload.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use local_lvm_provisioner::config::{canonicalize, ConfigData, RawConfigEntry, DEFAULT_NODE};
use local_lvm_provisioner::controlplane::resolve;

fn config_data(nodes: usize) -> ConfigData {
    let mut node_vg_map: Vec<RawConfigEntry> = (0..nodes)
        .map(|i| RawConfigEntry {
            node: format!("node-{:04}", i),
            path: format!("/mnt/lvm/./node-{:04}/", i),
            volume_groups: vec![format!("vg-b-{}", i), format!("vg-a-{}", i)],
        })
        .collect();
    node_vg_map.push(RawConfigEntry {
        node: DEFAULT_NODE.to_string(),
        path: "/mnt/lvm".to_string(),
        volume_groups: vec!["vg-default".to_string()],
    });
    ConfigData { node_vg_map }
}

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    group.throughput(Throughput::Elements(1));

    let data = config_data(1000);
    group.bench_function("canonicalize_1000_nodes", |b| {
        b.iter(|| {
            let _ = canonicalize(black_box(&data));
        });
    });

    group.bench_function("detect_unchanged_1000_nodes", |b| {
        let other = data.clone();
        b.iter(|| black_box(&data) == black_box(&other));
    });

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolver");
    group.throughput(Throughput::Elements(1));

    let Ok(config) = canonicalize(&config_data(1000)) else {
        return;
    };

    group.bench_function("resolve_listed_node", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            let node = format!("node-{:04}", counter % 1000);
            let _ = resolve(black_box(&config), black_box(&node));
        });
    });

    group.bench_function("resolve_fallback_node", |b| {
        b.iter(|| {
            let _ = resolve(black_box(&config), black_box("unlisted-node"));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_canonicalize, bench_resolve);
criterion_main!(benches);
