// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Benchmarks for signal decoding and field-name normalization

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use venus_bridge::{
    normalize_name, BridgeContext, Decoder, Direction, Entry, Member, MonitoringItem, OwnerTable,
    RawSignal, Variant,
};

fn test_decoder() -> Decoder {
    let items = vec![
        MonitoringItem {
            bus_name: "com.victronenergy.system".to_string(),
            member: Member::PropertiesChanged,
            object_path: "/Dc/0/Power".to_string(),
            entries: vec![
                Entry {
                    name: "Grid In".to_string(),
                    path: "/Dc/0/Power".to_string(),
                    unit: "W".to_string(),
                    direction: Direction::In,
                    data_type: "d".to_string(),
                },
                Entry {
                    name: "Grid Out".to_string(),
                    path: "/Dc/0/Power".to_string(),
                    unit: "W".to_string(),
                    direction: Direction::Out,
                    data_type: "d".to_string(),
                },
            ],
        },
        MonitoringItem {
            bus_name: "com.victronenergy.battery.ttyUSB0".to_string(),
            member: Member::ItemsChanged,
            object_path: "/".to_string(),
            entries: (0..16)
                .map(|c| Entry {
                    name: format!("Cell [{}]", c),
                    path: format!("/Voltages/Cell{}", c),
                    unit: "V".to_string(),
                    direction: Direction::None,
                    data_type: "n".to_string(),
                })
                .collect(),
        },
    ];

    let mut owners = OwnerTable::new();
    owners.insert("com.victronenergy.system", ":1.12");
    owners.insert("com.victronenergy.battery.ttyUSB0", ":1.30");
    Decoder::new(Arc::new(BridgeContext::new(items, owners)))
}

fn bench_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoding");
    let decoder = test_decoder();

    let signals: Vec<RawSignal> = (0..1000)
        .map(|i| {
            RawSignal::properties_changed(
                ":1.12",
                "/Dc/0/Power",
                Variant::Double(f64::from(i % 400) - 200.0),
            )
        })
        .collect();

    group.throughput(Throughput::Elements(1000));
    group.bench_function("properties_1000_signals", |b| {
        b.iter(|| {
            for s in &signals {
                black_box(decoder.decode(s));
            }
        })
    });

    let batch = RawSignal::items_changed(
        ":1.30",
        (0..16).map(|c| (format!("/Voltages/Cell{}", c), Variant::Int16(3300 + c))),
    );
    group.bench_function("items_16_cells", |b| {
        b.iter(|| black_box(decoder.decode(&batch)))
    });

    let stranger = RawSignal::properties_changed(":1.99", "/Dc/0/Power", Variant::Double(1.0));
    group.bench_function("unmatched", |b| {
        b.iter(|| black_box(decoder.decode(&stranger)))
    });

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let names = [
        "Battery [1]",
        "State of Charge",
        "Cell Voltage Max",
        "PV\tTracker [0] Power",
    ];

    c.bench_function("normalize_names", |b| {
        b.iter(|| {
            for n in &names {
                black_box(normalize_name(n));
            }
        })
    });
}

criterion_group!(benches, bench_decoding, bench_normalize);
criterion_main!(benches);
