//! Performance benchmarks for rowset-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rowset_engine::{
    Column, DataSet, DataType, MergeConfiguration, MergeMode, Merger, Relation,
    RelationValidationOptions, Table, Value,
};

fn create_test_table(name: &str, size: usize, label: &str) -> Table {
    let mut table = Table::with_columns(
        name,
        vec![
            Column::key("Id", DataType::Int),
            Column::new("Name", DataType::Text),
            Column::optional("Age", DataType::Int),
        ],
    )
    .unwrap();
    for i in 0..size {
        table
            .load([
                ("Id", Value::from(i as i64)),
                ("Name", Value::from(format!("{label} {i}"))),
                ("Age", Value::from((i % 90) as i64)),
            ])
            .unwrap();
    }
    table
}

fn bench_merge_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_modes");

    for size in [100, 1000, 5000].iter() {
        let current = create_test_table("Users", *size, "User");
        // every name differs and a tenth of the rows are new
        let refreshed = create_test_table("Users", size + size / 10, "Server");

        for mode in [
            MergeMode::Replace,
            MergeMode::Refresh,
            MergeMode::RefreshIfNoChangesExist,
            MergeMode::PostSave,
        ] {
            group.bench_with_input(
                BenchmarkId::new(mode.to_string(), size),
                size,
                |b, _| {
                    let merger = Merger::new(mode);
                    b.iter(|| {
                        let mut table = current.clone();
                        let mut config = MergeConfiguration::new();
                        merger
                            .merge_table(black_box(&mut table), black_box(&refreshed), &mut config)
                            .unwrap();
                        config.result.len()
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_identical_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("identical_refresh");

    for size in [100, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::new("noop", size), size, |b, &size| {
            let mut table = create_test_table("Users", size, "User");
            let refreshed = table.clone();
            let merger = Merger::new(MergeMode::Refresh);

            b.iter(|| {
                let mut config = MergeConfiguration::new();
                merger
                    .merge_table(black_box(&mut table), black_box(&refreshed), &mut config)
                    .unwrap();
            })
        });
    }

    group.finish();
}

fn bench_relations(c: &mut Criterion) {
    let mut group = c.benchmark_group("relations");

    for size in [100, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::new("validate", size), size, |b, &size| {
            let mut set = DataSet::new();
            set.add_table(create_test_table("Customers", size, "Customer"))
                .unwrap();
            let mut orders = Table::with_columns(
                "Orders",
                vec![
                    Column::key("Id", DataType::Int),
                    Column::optional("CustomerId", DataType::Int),
                ],
            )
            .unwrap();
            for i in 0..size * 3 {
                orders
                    .load([
                        ("Id", Value::from(i as i64)),
                        ("CustomerId", Value::from((i % (size + 7)) as i64)),
                    ])
                    .unwrap();
            }
            set.add_table(orders).unwrap();
            set.add_relation(Relation::new(
                "CustomerOrders",
                "Customers",
                ["Id"],
                "Orders",
                ["CustomerId"],
            ))
            .unwrap();
            let options = RelationValidationOptions::default();

            b.iter(|| set.validate_relations(black_box(&options)))
        });
    }

    // Ordering a long chain given in reverse
    group.bench_function("ordered_table_names_chain_50", |b| {
        let names: Vec<String> = (0..50).rev().map(|i| format!("T{i}")).collect();
        let relations: Vec<Relation> = (0..49)
            .map(|i| {
                Relation::new(
                    format!("R{i}"),
                    format!("T{i}"),
                    ["Id"],
                    format!("T{}", i + 1),
                    ["ParentId"],
                )
            })
            .collect();

        b.iter(|| rowset_engine::ordered_table_names(black_box(&relations), black_box(&names)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_merge_modes,
    bench_identical_refresh,
    bench_relations,
);
criterion_main!(benches);
