use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quorum_wait::config::NetworkLayout;
use quorum_wait::metrics::keys;
use quorum_wait::{fan_out_join, BftNetwork, ClusterConfig, JoinPolicy, SimulatedCluster};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn converged_network(f: usize) -> BftNetwork {
    let n = 3 * f + 1;
    let sim = Arc::new(SimulatedCluster::new());
    for id in 0..n {
        sim.set(id, keys::LAST_AGREED_VIEW, 1);
        sim.set(id, keys::CURRENT_ACTIVE_VIEW, 1);
    }
    let config = ClusterConfig::new(n, f, 0).expect("valid sizing");
    BftNetwork::new(config, &NetworkLayout::default(), sim.clone(), sim)
        .expect("default layout")
        .with_running(0..n)
}

pub fn activation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("activation");
    let rt = Runtime::new().unwrap();

    for f in [1usize, 4, 10] {
        let network = converged_network(f);
        group.bench_with_input(BenchmarkId::from_parameter(3 * f + 1), &network, |b, network| {
            b.iter(|| rt.block_on(async { black_box(network.wait_for_active_view(1).await.unwrap()) }))
        });
    }

    group.finish();
}

fn fan_out_operations(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let members: Vec<usize> = (0..64).collect();

    c.bench_function("fan_out_quorum_of_64", |b| {
        b.iter(|| {
            rt.block_on(async {
                let report = fan_out_join("bench", &members, JoinPolicy::AtLeast(43), Duration::from_secs(1), |member| async move {
                    Ok(member)
                })
                .await
                .unwrap();
                black_box(report.count())
            })
        })
    });
}

criterion_group!(benches, activation_benchmark, fan_out_operations);
criterion_main!(benches);
