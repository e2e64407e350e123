use criterion::{criterion_group, criterion_main, Criterion};
use std::cmp::Ordering;
use std::hint::black_box;
use wavl_tree::hierarchies::wavl_tree::WavlTree;

struct Item {
    id: u64,
}

fn item_node_cmp(lhs: &Item, rhs: &Item) -> Result<Ordering, u32> {
    Ok(lhs.id.cmp(&rhs.id))
}
fn item_key_cmp(key: &u64, item: &Item) -> Result<Ordering, u32> {
    Ok(key.cmp(&item.id))
}

fn build_tree(n: u64) -> WavlTree<u64, Item> {
    let mut tree = WavlTree::new_with_capacity(item_node_cmp, item_key_cmp, n as usize);
    for i in 0..n {
        tree.insert(&i, Item { id: i }).unwrap();
    }
    tree
}

pub fn bench_hierarchies(c: &mut Criterion) {
    let mut group = c.benchmark_group("hierarchies");

    // Test several tree sizes; ascending insertion is the worst case for the
    // promotion walk
    for &n in &[10, 100, 1_000, 10_000] {
        group.bench_with_input(format!("wavl_build_{n}"), &n, |b, &n| {
            b.iter(|| {
                black_box(build_tree(n));
            })
        });

        group.bench_with_input(format!("wavl_find_{n}"), &n, |b, &n| {
            let tree = build_tree(n);
            b.iter(|| {
                for i in 0..n {
                    black_box(tree.find(&i).is_ok());
                }
            })
        });

        group.bench_with_input(format!("wavl_drain_{n}"), &n, |b, &n| {
            b.iter(|| {
                let mut tree = build_tree(n);
                for i in 0..n {
                    let position = tree.find(&i).unwrap();
                    black_box(tree.remove(&position).unwrap());
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hierarchies);
criterion_main!(benches);
