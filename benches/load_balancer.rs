//! Benchmarks for libra components.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use libra::backend::{AlgorithmFactory, Server};
use libra::config::LoadBalancingConfig;
use libra::metrics::MetricsCollector;
use libra::util::{generate_request_id, generate_short_request_id};
use std::time::Duration;

fn snapshot(policy: &str, num_servers: usize) -> LoadBalancingConfig {
    LoadBalancingConfig::new(
        policy,
        (0..num_servers).map(|i| format!("http://127.0.0.1:{}", 9000 + i)),
    )
}

fn benchmark_round_robin(c: &mut Criterion) {
    let factory = AlgorithmFactory::new(&snapshot("RoundRobin", 10));
    let rr = factory.resolve("RoundRobin").unwrap();

    c.bench_function("round_robin_select", |b| {
        b.iter(|| {
            black_box(rr.select(None));
        })
    });
}

fn benchmark_weighted(c: &mut Criterion) {
    let config = snapshot("WeightedRoundRobin", 10);
    let factory = AlgorithmFactory::new(&config);
    let wrr = factory.resolve("WeightedRoundRobin").unwrap();

    c.bench_function("weighted_select", |b| {
        b.iter(|| {
            // Budgets only refill on reload.
            if wrr.select(None).is_none() {
                factory.on_configuration_changed(&config);
            }
        })
    });
}

fn benchmark_least_connections(c: &mut Criterion) {
    let factory = AlgorithmFactory::new(&snapshot("LeastConnections", 10));
    let lc = factory.resolve("LeastConnections").unwrap();

    c.bench_function("least_connections_select_release", |b| {
        b.iter(|| {
            if let Some(server) = lc.select(None) {
                lc.release(black_box(&server));
            }
        })
    });
}

fn benchmark_sticky(c: &mut Criterion) {
    let mut group = c.benchmark_group("sticky_select");

    for servers in [3, 10, 100] {
        let factory = AlgorithmFactory::new(&snapshot("StickySession", servers));
        let sticky = factory.resolve("StickySession").unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(servers), &servers, |b, _| {
            b.iter(|| {
                black_box(sticky.select(Some(black_box("session-4f2a9c"))));
            })
        });
    }

    group.finish();
}

fn benchmark_reload(c: &mut Criterion) {
    let factory = AlgorithmFactory::new(&snapshot("RoundRobin", 10));
    let next = snapshot("RoundRobin", 50);

    c.bench_function("configuration_changed_50_servers", |b| {
        b.iter(|| {
            factory.on_configuration_changed(black_box(&next));
        })
    });
}

fn benchmark_metrics(c: &mut Criterion) {
    let collector = MetricsCollector::new();
    let server = Server::new("http://127.0.0.1:9000");

    let mut group = c.benchmark_group("metrics");
    group.throughput(Throughput::Elements(1));

    group.bench_function("record_request", |b| {
        b.iter(|| {
            collector.record_request(
                black_box("RoundRobin"),
                black_box(200),
                black_box(Duration::from_millis(10)),
            );
        })
    });

    group.bench_function("record_selection", |b| {
        b.iter(|| {
            collector.record_selection(black_box("RoundRobin"), black_box(server.endpoint()));
        })
    });

    group.finish();
}

fn benchmark_request_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_id");

    group.bench_function("uuid", |b| {
        b.iter(|| {
            black_box(generate_request_id());
        })
    });

    group.bench_function("short", |b| {
        b.iter(|| {
            black_box(generate_short_request_id());
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_round_robin,
    benchmark_weighted,
    benchmark_least_connections,
    benchmark_sticky,
    benchmark_reload,
    benchmark_metrics,
    benchmark_request_id,
);
criterion_main!(benches);
