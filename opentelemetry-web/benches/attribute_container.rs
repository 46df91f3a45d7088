use criterion::{black_box, criterion_group, criterion_main, Criterion};
use opentelemetry_web::attributes::{create_attribute_container, AttributeContainer, Config};

// Run this benchmark with:
// cargo bench --bench attribute_container

fn criterion_benchmark(c: &mut Criterion) {
    container_writes(c);
    inherited_reads(c);
    snapshots(c);
}

fn populated(name: &str, count: usize) -> AttributeContainer {
    let container = create_attribute_container(&Config::default(), name, None);
    for i in 0..count {
        container.set(&format!("group{}.attribute{}", i % 4, i), i as i64);
    }
    container
}

fn container_writes(c: &mut Criterion) {
    c.bench_function("Container_Set_New", |b| {
        b.iter(|| {
            let container = create_attribute_container(&Config::default(), "bench", None);
            container.set("http.request.method", "GET");
            container.set("http.response.status_code", 200);
            container.set("url.full", "https://example.com/cart");
            black_box(container);
        });
    });

    let container = populated("overwrite", 32);
    c.bench_function("Container_Set_Overwrite", |b| {
        b.iter(|| {
            black_box(container.set("group1.attribute5", 7));
        });
    });
}

fn inherited_reads(c: &mut Criterion) {
    let root = populated("root", 32);
    let leaf = root.child("a", false).child("b", false).child("c", false);

    c.bench_function("Container_Get_Inherited_Depth3", |b| {
        b.iter(|| {
            black_box(leaf.get("group2.attribute10"));
        });
    });

    c.bench_function("Container_Entries_Inherited_Depth3", |b| {
        b.iter(|| {
            black_box(leaf.entries().count());
        });
    });

    c.bench_function("Container_Attributes_Cached", |b| {
        b.iter(|| {
            black_box(leaf.attributes());
        });
    });
}

fn snapshots(c: &mut Criterion) {
    let root = populated("root", 32);

    c.bench_function("Container_Snapshot_Create", |b| {
        b.iter(|| {
            black_box(root.child("snap", true));
        });
    });

    c.bench_function("Container_Snapshot_ParentWrite", |b| {
        let snapshot = root.child("snap", true);
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            root.set("group0.attribute0", i);
        });
        black_box(snapshot);
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
