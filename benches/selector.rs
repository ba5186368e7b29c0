//! Selection strategy micro-benchmarks.
//!
//! Run with: `cargo bench --bench selector`

use backend_router::provider::{EchoProvider, ProviderCall};
use backend_router::registry::Provider;
use backend_router::selector::{RouteSelector, SequenceSource};
use backend_router::types::{Priority, Request, RequestKind};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;

fn roster(n: usize) -> Vec<Arc<Provider>> {
    (0..n)
        .map(|i| {
            let endpoint: Arc<dyn ProviderCall> =
                Arc::new(EchoProvider::with_delay(Duration::ZERO));
            Arc::new(Provider::new(
                format!("p{i}"),
                endpoint,
                1.0 + i as f64,
                8,
                0.001 * i as f64,
            ))
        })
        .collect()
}

fn bench_selection(c: &mut Criterion) {
    let providers = roster(16);
    let selector = RouteSelector::new(Arc::new(SequenceSource::new(vec![
        0.13, 0.47, 0.71, 0.93,
    ])));

    let cost_request = Request::new(RequestKind::Summary, "bench");
    c.bench_function("select/cost_optimized/16", |b| {
        b.iter(|| selector.select(black_box(&providers), black_box(&cost_request)))
    });

    let quality_request = Request::new(RequestKind::Analysis, "bench");
    c.bench_function("select/quality_optimized/16", |b| {
        b.iter(|| selector.select(black_box(&providers), black_box(&quality_request)))
    });

    let speed_request =
        Request::new(RequestKind::Summary, "bench").with_priority(Priority::Critical);
    c.bench_function("select/speed_optimized/16", |b| {
        b.iter(|| selector.select(black_box(&providers), black_box(&speed_request)))
    });

    let balanced_request = Request::new(RequestKind::Recommendation, "bench");
    c.bench_function("select/load_balanced/16", |b| {
        b.iter(|| selector.select(black_box(&providers), black_box(&balanced_request)))
    });
}

criterion_group!(benches, bench_selection);
criterion_main!(benches);
