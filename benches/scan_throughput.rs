use std::fmt::Write as _;
use std::hint::black_box;
use std::io::Cursor;

use bulkload_csv::locale::LocaleTable;
use bulkload_csv::results::{ScanOptions, scan};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};

fn generate_orders(rows: usize) -> String {
    let mut csv = String::from("id,customer,amount,ordered_at,shipped,note\n");
    for i in 0..rows {
        let status = if i % 3 == 0 { "true" } else { "false" };
        let day = (i % 28) + 1;
        let _ = writeln!(
            csv,
            "{i},customer-{},{}.{:02},2024-01-{day:02} 10:{:02}:00,{status},\"line {i}, quoted\"",
            i % 97,
            i % 5000,
            i % 100,
            i % 60
        );
    }
    csv
}

/// Same rows with German decimals so every value goes through grammar fallback.
fn generate_german(rows: usize) -> String {
    let mut csv = String::from("betrag;datum\n");
    for i in 0..rows {
        let _ = writeln!(
            csv,
            "{}.{:03},{:02};{:02}.03.2024",
            i % 900 + 1,
            i % 1000,
            i % 100,
            i % 28 + 1
        );
    }
    csv
}

fn bench_scan(c: &mut Criterion) {
    let locales = LocaleTable::standard();
    let orders = generate_orders(50_000);
    let german = generate_german(50_000);

    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Bytes(orders.len() as u64));
    group.bench_function("mixed_types_50k", |b| {
        b.iter(|| {
            let results = scan(Cursor::new(orders.as_bytes()), &ScanOptions::default(), &locales)
                .expect("scan")
                .expect("header");
            black_box(results.num_lines())
        })
    });

    let options = ScanOptions {
        separator: ';',
        ..ScanOptions::default()
    };
    group.throughput(Throughput::Bytes(german.len() as u64));
    group.bench_function("german_locale_50k", |b| {
        b.iter(|| {
            let results = scan(Cursor::new(german.as_bytes()), &options, &locales)
                .expect("scan")
                .expect("header");
            black_box(results.num_lines())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_scan);
criterion_main!(benches);
