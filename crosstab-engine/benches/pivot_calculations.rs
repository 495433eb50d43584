use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use crosstab_engine::{
    generate, AggregationKind, DimensionGrouping, DimensionSpec, MeasureSpec, PivotConfig, Record,
    ShowAs,
};

const REGIONS: [&str; 4] = ["North", "South", "East", "West"];
const PRODUCTS: [&str; 8] = [
    "Widget", "Gadget", "Gizmo", "Doohickey", "Sprocket", "Flange", "Bracket", "Coupler",
];

fn synthetic_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let month = (i % 12) as u32 + 1;
            let day = (i % 28) as u32 + 1;
            Record::new()
                .with("region", REGIONS[i % REGIONS.len()])
                .with("product", PRODUCTS[i % PRODUCTS.len()])
                .with("date", format!("2024-{:02}-{:02}", month, day))
                .with("sales", ((i * 37) % 1000) as f64)
                .with("units", ((i * 13) % 50) as f64)
        })
        .collect()
}

fn sum_config() -> PivotConfig {
    let mut config = PivotConfig::new();
    config.rows = vec![DimensionSpec::new("region")];
    config.columns = vec![DimensionSpec::new("product")];
    config.measures = vec![MeasureSpec::new("sales", AggregationKind::Sum)];
    config
}

fn bench_simple_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("simple_sum");
    for size in [1_000, 10_000, 100_000] {
        let records = synthetic_records(size);
        let config = sum_config();
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| generate(black_box(records), black_box(&config)))
        });
    }
    group.finish();
}

fn bench_date_grouping(c: &mut Criterion) {
    let records = synthetic_records(10_000);
    let mut config = sum_config();
    config.columns = vec![
        DimensionSpec::new("date").with_grouping(DimensionGrouping::DateQuarter),
    ];

    c.bench_function("date_quarter_grouping_10k", |b| {
        b.iter(|| generate(black_box(&records), black_box(&config)))
    });
}

fn bench_median(c: &mut Criterion) {
    let records = synthetic_records(10_000);
    let mut config = sum_config();
    config.measures = vec![MeasureSpec::new("sales", AggregationKind::Median)];

    c.bench_function("median_10k", |b| {
        b.iter(|| generate(black_box(&records), black_box(&config)))
    });
}

fn bench_show_as(c: &mut Criterion) {
    let records = synthetic_records(10_000);
    let mut config = sum_config();
    config.measures = vec![
        MeasureSpec::new("sales", AggregationKind::Sum).with_show_as(ShowAs::PercentOfTotal),
    ];

    c.bench_function("percent_of_total_10k", |b| {
        b.iter(|| generate(black_box(&records), black_box(&config)))
    });
}

criterion_group!(
    benches,
    bench_simple_sum,
    bench_date_grouping,
    bench_median,
    bench_show_as
);
criterion_main!(benches);
