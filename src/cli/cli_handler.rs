use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::info;

use super::SimulateArgs;
use crate::cluster::MemberId;
use crate::config::{interesting_configs, ClusterConfig, Config};
use crate::error::{Result, WaitError};
use crate::metrics::keys;
use crate::network::BftNetwork;
use crate::protocols::ExpectedView;
use crate::quorum;
use crate::sim::SimulatedCluster;

/// Outcome of `simulate`.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub cluster: ClusterConfig,
    pub quorum: usize,
    pub view: u64,
    pub primary: MemberId,
    pub silent: Vec<MemberId>,
    pub checkpoint: u64,
    pub checkpointed: Vec<MemberId>,
    pub elapsed_ms: u64,
}

impl SimulationReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "cluster n={} f={} c={} (quorum {})",
            self.cluster.n(),
            self.cluster.f(),
            self.cluster.c(),
            self.quorum
        );
        let _ = writeln!(out, "view {} active, primary {}", self.view, self.primary);
        let _ = writeln!(out, "checkpoint {} stored on {:?}", self.checkpoint, self.checkpointed);
        if !self.silent.is_empty() {
            let _ = writeln!(out, "silent replicas: {:?}", self.silent);
        }
        let _ = write!(out, "converged in {} ms", self.elapsed_ms);
        out
    }
}

pub struct CliHandler {
    config_path: PathBuf,
}

impl CliHandler {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            config_path: config_path.unwrap_or_else(Config::get_config_path),
        }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn load_config(&self) -> Result<Config> {
        Config::load(&self.config_path)
    }

    pub fn configs(&self, with_crash_faults: bool, max_n: Option<usize>, json: bool) -> Result<String> {
        let configs = interesting_configs(|n, _, c| {
            (!with_crash_faults || c > 0) && max_n.map_or(true, |max| n <= max)
        })?;

        if json {
            return serde_json::to_string_pretty(&configs)
                .map_err(|e| WaitError::config(format!("Failed to encode configurations: {}", e)));
        }

        let mut out = String::from("  n  f  c  quorum  clients\n");
        for config in &configs {
            let _ = writeln!(
                out,
                "{:>3}{:>3}{:>3}{:>8}{:>9}",
                config.n(),
                config.f(),
                config.c(),
                config.quorum_size(),
                config.num_clients()
            );
        }
        Ok(out)
    }

    pub fn quorum(&self, n: usize, f: usize, c: usize) -> Result<String> {
        let config = ClusterConfig::new(n, f, c)?;
        Ok(format!(
            "n={} f={} c={}: quorum {}, crash quorum {}",
            n,
            f,
            c,
            config.quorum_size(),
            quorum::crash_quorum_size(f, c)
        ))
    }

    pub fn init_config(&self, force: bool) -> Result<PathBuf> {
        if self.config_path.exists() && !force {
            return Err(WaitError::config(format!(
                "{} already exists, use --force to overwrite",
                self.config_path.display()
            )));
        }
        Config::default().save(&self.config_path)?;
        info!(path = %self.config_path.display(), "wrote default configuration");
        Ok(self.config_path.clone())
    }

    /// Move a simulated cluster to a new view and checkpoint, waiting for
    /// both the way a test would.
    pub async fn simulate(&self, args: &SimulateArgs) -> Result<SimulationReport> {
        let config = self.load_config()?;
        let n = config.cluster.n();
        if args.silent >= n {
            return Err(WaitError::config(format!("cannot silence {} of {} replicas", args.silent, n)));
        }

        let sim = Arc::new(SimulatedCluster::new());
        let network = BftNetwork::from_config(&config, sim.clone(), sim.clone())?;
        network.start_all_replicas().await?;

        for id in 0..n {
            sim.set(id, keys::LAST_AGREED_VIEW, 0);
            sim.set(id, keys::CURRENT_ACTIVE_VIEW, 0);
        }
        let silent: Vec<MemberId> = (n - args.silent..n).collect();
        for &id in &silent {
            sim.silence(id);
        }
        let responsive: Vec<MemberId> = (0..n - args.silent).collect();

        let driver = tokio::spawn(drive(
            sim.clone(),
            n,
            args.view,
            args.checkpoint,
            Duration::from_millis(args.delay_ms),
        ));

        let started = Instant::now();
        let outcome = async {
            let view = network.wait_for_view(0, ExpectedView::Exactly(args.view)).await?;
            let checkpointed = network
                .wait_for_replicas_to_checkpoint(&responsive, Some(args.checkpoint))
                .await?;
            Ok::<_, WaitError>((view, checkpointed))
        }
        .await;
        driver.abort();
        let (view, checkpointed) = outcome?;

        Ok(SimulationReport {
            cluster: config.cluster,
            quorum: config.cluster.quorum_size(),
            view,
            primary: quorum::primary_for_view(view, n),
            silent,
            checkpoint: args.checkpoint,
            checkpointed: checkpointed.into_keys().collect(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Agree, then activate, then checkpoint, `delay` apart.
async fn drive(sim: Arc<SimulatedCluster>, n: usize, view: u64, checkpoint: u64, delay: Duration) {
    time::sleep(delay).await;
    for id in 0..n {
        sim.set(id, keys::LAST_AGREED_VIEW, view);
    }
    time::sleep(delay / 2).await;
    for id in 0..n {
        sim.set(id, keys::CURRENT_ACTIVE_VIEW, view);
    }
    time::sleep(delay / 2).await;
    for id in 0..n {
        sim.set(id, keys::LAST_STORED_CHECKPOINT, checkpoint);
    }
}
