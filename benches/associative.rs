use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use std::hint::black_box;
use wavl_tree::associative::wavl_tree_map::TreeMap;

pub fn bench_associative(c: &mut Criterion) {
    let mut group = c.benchmark_group("associative_collections");

    // WAVL-backed TreeMap
    group.bench_function("wavl_map_insert_1000", |b| {
        b.iter(|| {
            let mut map = TreeMap::new();
            for i in 0..1000 {
                map.put(black_box(i), black_box("value"));
            }
            black_box(map);
        })
    });

    group.bench_function("wavl_map_remove_1000", |b| {
        b.iter(|| {
            let mut map = {
                let mut m = TreeMap::new();
                for i in 0..1000 {
                    m.put(i, "value");
                }
                m
            };
            for i in 0..1000 {
                black_box(map.remove(&i));
            }
        });
    });

    group.bench_function("wavl_map_search_1000", |b| {
        let mut map = TreeMap::new();
        for i in 0..1000 {
            map.put(i, "value");
        }
        b.iter(|| {
            for i in 0..1000 {
                black_box(map.contains(&i));
            }
        })
    });

    // std BTreeMap
    group.bench_function("std_btreemap_insert_1000", |b| {
        b.iter(|| {
            let mut map = BTreeMap::new();
            for i in 0..1000 {
                map.insert(black_box(i), "value");
            }
            black_box(map);
        })
    });

    group.bench_function("std_btreemap_remove_1000", |b| {
        b.iter(|| {
            let mut map = {
                let mut m = BTreeMap::new();
                for i in 0..1000 {
                    m.insert(i, "value");
                }
                m
            };
            for i in 0..1000 {
                black_box(map.remove(&i));
            }
        });
    });

    group.bench_function("std_btreemap_search_1000", |b| {
        let mut map = BTreeMap::new();
        for i in 0..1000 {
            map.insert(i, "value");
        }
        b.iter(|| {
            for i in 0..1000 {
                black_box(map.contains_key(&i));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_associative);
criterion_main!(benches);
