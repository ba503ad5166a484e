use futures::future::join_all;
use quorum_wait::config::NetworkLayout;
use quorum_wait::metrics::keys;
use quorum_wait::{BftNetwork, ClusterConfig, SimulatedCluster, WaitError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_large_cluster_activation_under_silent_faults() -> Result<(), WaitError> {
    // f = 10: 31 replicas, quorum 21
    let config = ClusterConfig::new(31, 10, 0)?;
    let sim = Arc::new(SimulatedCluster::new());
    let network = BftNetwork::new(config, &NetworkLayout::default(), sim.clone(), sim.clone())?;
    network.start_all_replicas().await?;

    for id in 0..31 {
        sim.set(id, keys::CURRENT_ACTIVE_VIEW, 7);
        sim.set_latency(id, Duration::from_millis(10 * (id as u64 % 5)));
    }
    for id in 21..31 {
        sim.silence(id);
    }

    let started = Instant::now();
    let counts = join_all((0..5).map(|_| network.wait_for_active_view(7))).await;
    for count in counts {
        assert_eq!(count?, 21);
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_repeated_checkpoint_waits() -> Result<(), WaitError> {
    let config = ClusterConfig::new(7, 2, 0)?;
    let sim = Arc::new(SimulatedCluster::new());
    let network = BftNetwork::new(config, &NetworkLayout::default(), sim.clone(), sim.clone())?;
    network.start_all_replicas().await?;
    let replicas: Vec<_> = (0..7).collect();

    for checkpoint in 1..=20 {
        for &id in &replicas {
            sim.set(id, keys::LAST_STORED_CHECKPOINT, checkpoint);
        }
        let reached = network.wait_for_replicas_to_checkpoint(&replicas, Some(checkpoint)).await?;
        assert_eq!(reached.len(), 7);
    }
    Ok(())
}
