//! Query engine throughput over a synthetic feed table.
//!
//! Uses 5,000 rows by default. Set `BENCH_FULL_SCALE=1` for 100,000.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use lookout_data::query::{execute, FilterOp, QuerySpec, SortDirection};
use lookout_data::schema::FieldType;
use lookout_data::table::{Cell, Column, FeedTable};

const CI_ROW_COUNT: usize = 5_000;
const FULL_SCALE_ROW_COUNT: usize = 100_000;

const THEATERS: [&str; 5] = ["CONUS", "EUR", "ME", "PAC", "AFR"];
const CODECS: [&str; 3] = ["H264", "H265", "AV1"];

fn row_count() -> usize {
    if std::env::var("BENCH_FULL_SCALE").is_ok() {
        FULL_SCALE_ROW_COUNT
    } else {
        CI_ROW_COUNT
    }
}

fn build_table(count: usize) -> FeedTable {
    let columns = vec![
        Column::new("FEED_ID", FieldType::String),
        Column::new("THEATER", FieldType::String),
        Column::new("FRRATE", FieldType::Number),
        Column::new("RES_W", FieldType::Integer),
        Column::new("CODEC", FieldType::String),
        Column::new("LAT_MS", FieldType::Integer),
        Column::new("CIV_OK", FieldType::Boolean),
    ];
    let rows = (0..count)
        .map(|i| {
            vec![
                Cell::Text(format!("F{:06}", i)),
                Cell::Text(THEATERS[i % THEATERS.len()].to_string()),
                Cell::Number([15.0, 25.0, 29.97, 30.0, 60.0][i % 5]),
                Cell::Integer([640, 1280, 1920, 3840][i % 4]),
                Cell::Text(CODECS[i % CODECS.len()].to_string()),
                if i % 17 == 0 {
                    Cell::Null
                } else {
                    Cell::Integer((i % 400) as i64)
                },
                Cell::Boolean(i % 2 == 0),
            ]
        })
        .collect();
    FeedTable::new(columns, rows, "FEED_ID", None).expect("valid synthetic table")
}

fn bench_filters(c: &mut Criterion) {
    let count = row_count();
    let table = build_table(count);

    let mut group = c.benchmark_group("filter");

    let by_theater = QuerySpec::new().filter("THEATER", FilterOp::Eq, json!("pac"));
    group.bench_function(format!("text_eq_{}rows", count), |b| {
        b.iter(|| execute(black_box(&table), black_box(&by_theater)).expect("query failed"))
    });

    let compound = QuerySpec::new()
        .filter("RES_W", FilterOp::Ge, json!(1920))
        .filter("LAT_MS", FilterOp::Lt, json!(200))
        .filter("CODEC", FilterOp::In, json!(["H265", "AV1"]));
    group.bench_function(format!("compound_{}rows", count), |b| {
        b.iter(|| execute(black_box(&table), black_box(&compound)).expect("query failed"))
    });

    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let count = row_count();
    let table = build_table(count);

    let mut group = c.benchmark_group("sort");

    let sorted = QuerySpec::new()
        .sort_by("LAT_MS", SortDirection::Desc)
        .limit(10);
    group.bench_function(format!("top10_by_latency_{}rows", count), |b| {
        b.iter(|| execute(black_box(&table), black_box(&sorted)).expect("query failed"))
    });

    let projected = QuerySpec::new()
        .filter("CIV_OK", FilterOp::Eq, json!(true))
        .sort_by("FRRATE", SortDirection::Asc)
        .select(["FEED_ID", "FRRATE"]);
    group.bench_function(format!("filter_sort_project_{}rows", count), |b| {
        b.iter(|| execute(black_box(&table), black_box(&projected)).expect("query failed"))
    });

    group.finish();
}

criterion_group!(benches, bench_filters, bench_sort);
criterion_main!(benches);
