//! Payload normalization throughput across the shapes upstream actually sends
//!
//! Column-oriented payloads go through a transpose before mapping, so they
//! are measured against the equivalent row-oriented page, plus the content
//! hash that every record pays on the way to the upsert.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};

use stocksync_lib::domain::inventory::UpstreamItem;
use stocksync_lib::sync::{content_hash, normalize};

fn row_oriented_page(rows: usize) -> Value {
    let records: Vec<Value> = (0..rows)
        .map(|i| {
            json!({
                "productId": format!("SKU-{i:05}"),
                "internalName": format!("Product {i}"),
                "quantityAvailable": (i % 400) as i64,
                "unitCost": (i as f64) * 0.37,
                "primaryVendor": "Acme Supply",
                "location": "A-01",
                "reorderPoint": 10,
                "reorderQuantity": 25
            })
        })
        .collect();

    json!({ "productList": records, "totalCount": rows })
}

fn column_oriented_page(rows: usize) -> Value {
    json!({
        "sku": (0..rows).map(|i| format!("SKU-{i:05}")).collect::<Vec<_>>(),
        "productName": (0..rows).map(|i| format!("Product {i}")).collect::<Vec<_>>(),
        "quantityAvailable": (0..rows).map(|i| (i % 400) as i64).collect::<Vec<_>>(),
        "unitCost": (0..rows).map(|i| (i as f64) * 0.37).collect::<Vec<_>>(),
        "location": (0..rows).map(|_| "A-01").collect::<Vec<_>>()
    })
}

fn normalization_throughput(c: &mut Criterion) {
    let rows = row_oriented_page(500);
    let columns = column_oriented_page(500);

    c.bench_function("normalize 500 row-oriented records", |b| {
        b.iter(|| normalize(black_box(&rows)).unwrap())
    });

    c.bench_function("normalize 500 column-oriented records", |b| {
        b.iter(|| normalize(black_box(&columns)).unwrap())
    });
}

fn hashing_throughput(c: &mut Criterion) {
    let item = UpstreamItem {
        sku: "SKU-00042".to_string(),
        product_name: "Hex Bolt M6".to_string(),
        stock: 40,
        cost: 4.25,
        vendor: Some("Acme Supply".to_string()),
        location: "A-01".to_string(),
        reorder_point: 10,
        reorder_quantity: 25,
    };

    c.bench_function("content hash per item", |b| {
        b.iter(|| content_hash(black_box(&item)))
    });
}

criterion_group!(benches, normalization_throughput, hashing_throughput);
criterion_main!(benches);
