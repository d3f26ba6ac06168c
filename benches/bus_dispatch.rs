//! Receive-path benchmark suite.
//!
//! Measures the per-frame cost of the inbound path:
//! - Frame decoding (event push, response, malformed)
//! - Event bus emission at different handler counts
//! - Full routing through a disconnected bridge
//!
//! Run with: cargo bench --bench bus_dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use overlay_bridge::protocol::decode;
use overlay_bridge::{Bridge, BridgeConfig, EventBus};
use serde_json::json;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const HANDLER_COUNTS: &[usize] = &[1, 8, 64];

const EVENT_FRAME: &str = r#"{"type":"controllerConnected","index":0,"name":"Pad"}"#;
const RESPONSE_FRAME: &str = r#"{"success":true,"data":{"pong":true,"timestamp":1700000000}}"#;
const MALFORMED_FRAME: &str = r#"{"type":"controllerConnected","index":"#;

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for (name, frame) in [
        ("event", EVENT_FRAME),
        ("response", RESPONSE_FRAME),
        ("malformed", MALFORMED_FRAME),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), frame, |b, frame| {
            b.iter(|| {
                let _ = black_box(decode(black_box(frame)));
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Emit
// ============================================================================

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");
    let payload = json!({"type": "controllerConnected", "index": 0});

    for &count in HANDLER_COUNTS {
        let bus = EventBus::new();
        for _ in 0..count {
            bus.on("controllerConnected", |payload| {
                black_box(payload);
                Ok(())
            });
        }

        group.bench_with_input(BenchmarkId::new("handlers", count), &count, |b, _| {
            b.iter(|| bus.emit("controllerConnected", black_box(&payload)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Route
// ============================================================================

fn bench_route(c: &mut Criterion) {
    let bridge = Bridge::new(BridgeConfig::new("127.0.0.1:1").expect("valid host"));
    bridge.on("controllerConnected", |_| Ok(()));

    c.bench_function("route_event_frame", |b| {
        b.iter(|| bridge.route_frame(black_box(EVENT_FRAME)));
    });
}

criterion_group!(benches, bench_decode, bench_emit, bench_route);
criterion_main!(benches);
