//! Replica Set Implementation
//!
//! Handles:
//! - Member liveness bookkeeping
//! - Start/stop through the process-control capability
//! - Forcing a minimal quorum that contains a given replica

use parking_lot::RwLock;
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use super::{Member, MemberId, MemberStatus, ProcessControl};
use crate::config::{ClusterConfig, NetworkLayout};
use crate::error::{Result, WaitError};
use crate::quorum;

/// Owns the members of one cluster and which of them are running.
pub struct ReplicaSet {
    config: ClusterConfig,
    members: Vec<Member>,
    live: RwLock<BTreeSet<MemberId>>,
    control: Arc<dyn ProcessControl>,
    /// Attached to an already running cluster
    existing: bool,
}

impl ReplicaSet {
    /// Fails when the layout cannot address every member.
    pub fn new(config: ClusterConfig, layout: &NetworkLayout, control: Arc<dyn ProcessControl>) -> Result<Self> {
        Ok(Self {
            config,
            members: layout.members(config.total_members())?,
            live: RwLock::new(BTreeSet::new()),
            control,
            existing: false,
        })
    }

    /// Attach to members that are already running.
    pub fn with_running(mut self, running: impl IntoIterator<Item = MemberId>) -> Self {
        self.live = RwLock::new(running.into_iter().collect());
        self.existing = true;
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, id: MemberId) -> Result<&Member> {
        self.members.get(id).ok_or(WaitError::UnknownMember(id))
    }

    /// Every member id, read-only replicas included.
    pub fn member_ids(&self) -> Vec<MemberId> {
        self.members.iter().map(|member| member.id).collect()
    }

    /// Voting replicas `0..n` minus `without`.
    pub fn all_replicas(&self, without: &BTreeSet<MemberId>) -> Vec<MemberId> {
        quorum::all_members(self.config.n(), without)
    }

    pub fn live_replicas(&self) -> Vec<MemberId> {
        self.live.read().iter().copied().collect()
    }

    pub fn live_count(&self) -> usize {
        self.live.read().len()
    }

    pub fn status(&self, id: MemberId) -> MemberStatus {
        if self.live.read().contains(&id) {
            MemberStatus::Running
        } else {
            MemberStatus::Stopped
        }
    }

    pub fn random_live_replica(&self) -> Result<MemberId> {
        let live = self.live_replicas();
        live.choose(&mut rand::rng()).copied().ok_or(WaitError::NoLiveReplicas)
    }

    /// Start a member that is not running.
    pub async fn start_replica(&self, id: MemberId) -> Result<()> {
        self.member(id)?;
        if !self.live.write().insert(id) {
            return Err(WaitError::AlreadyRunning(id));
        }
        if let Err(err) = self.control.start(id).await {
            self.live.write().remove(&id);
            return Err(err);
        }
        info!(member = id, "replica started");
        Ok(())
    }

    /// Stop a running member.
    pub async fn stop_replica(&self, id: MemberId) -> Result<()> {
        self.member(id)?;
        if !self.live.write().remove(&id) {
            return Err(WaitError::AlreadyStopped(id));
        }
        if let Err(err) = self.control.stop(id).await {
            self.live.write().insert(id);
            return Err(err);
        }
        info!(member = id, "replica stopped");
        Ok(())
    }

    pub async fn start_replicas(&self, ids: &[MemberId]) -> Result<()> {
        for &id in ids {
            self.start_replica(id).await?;
        }
        Ok(())
    }

    pub async fn stop_replicas(&self, ids: &[MemberId]) -> Result<()> {
        for &id in ids {
            self.stop_replica(id).await?;
        }
        Ok(())
    }

    /// Start every voting replica. On an attached cluster, members that are
    /// already running are left alone.
    pub async fn start_all_replicas(&self) -> Result<()> {
        for id in 0..self.config.n() {
            match self.start_replica(id).await {
                Err(WaitError::AlreadyRunning(_)) if self.existing => continue,
                other => other?,
            }
        }
        Ok(())
    }

    pub async fn stop_all_replicas(&self) -> Result<()> {
        for id in self.live_replicas() {
            self.stop_replica(id).await?;
        }
        Ok(())
    }

    /// Stop randomly chosen backups (never `primary`, never `replica`) until
    /// exactly `2f + c + 1` members remain live. Returns the stopped ids.
    pub async fn force_quorum_including_replica(&self, replica: MemberId, primary: MemberId) -> Result<Vec<MemberId>> {
        let target = quorum::crash_quorum_size(self.config.f(), self.config.c());
        let without: BTreeSet<MemberId> = [primary, replica].into_iter().collect();
        let mut backups = self.all_replicas(&without);
        backups.shuffle(&mut rand::rng());

        let mut stopped = Vec::new();
        for backup in backups {
            if self.live_count() <= target {
                break;
            }
            if self.status(backup) == MemberStatus::Stopped {
                continue;
            }
            info!(backup, replica, "stopping backup to force a quorum including replica");
            self.stop_replica(backup).await?;
            stopped.push(backup);
        }

        let live = self.live_count();
        if live != target {
            return Err(WaitError::condition(format!(
                "expected {} live replicas after forcing a quorum around {}, found {}",
                target, replica, live
            )));
        }
        Ok(stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedCluster;

    fn replica_set(n: usize, f: usize, c: usize) -> (Arc<SimulatedCluster>, ReplicaSet) {
        let config = ClusterConfig::new(n, f, c).unwrap();
        let sim = Arc::new(SimulatedCluster::new());
        let set = ReplicaSet::new(config, &NetworkLayout::default(), sim.clone()).unwrap();
        (sim, set)
    }

    #[tokio::test]
    async fn test_start_stop_misuse() {
        let (_, set) = replica_set(4, 1, 0);
        set.start_replica(1).await.unwrap();
        assert!(matches!(set.start_replica(1).await, Err(WaitError::AlreadyRunning(1))));
        set.stop_replica(1).await.unwrap();
        assert!(matches!(set.stop_replica(1).await, Err(WaitError::AlreadyStopped(1))));
        assert!(matches!(set.start_replica(9).await, Err(WaitError::UnknownMember(9))));
    }

    #[tokio::test]
    async fn test_start_all_and_stop_all() {
        let (sim, set) = replica_set(4, 1, 0);
        set.start_all_replicas().await.unwrap();
        assert_eq!(set.live_replicas(), vec![0, 1, 2, 3]);
        assert!(sim.is_running(2));
        set.stop_all_replicas().await.unwrap();
        assert!(set.live_replicas().is_empty());
        assert!(!sim.is_running(2));
    }

    #[tokio::test]
    async fn test_attached_cluster_tolerates_running_members() {
        let config = ClusterConfig::new(4, 1, 0).unwrap();
        let sim = Arc::new(SimulatedCluster::new());
        let set = ReplicaSet::new(config, &NetworkLayout::default(), sim).unwrap().with_running([0, 2]);
        set.start_all_replicas().await.unwrap();
        assert_eq!(set.live_count(), 4);
    }

    #[tokio::test]
    async fn test_force_quorum_keeps_primary_and_replica() {
        let (_, set) = replica_set(7, 2, 0);
        set.start_all_replicas().await.unwrap();
        let stopped = set.force_quorum_including_replica(5, 0).await.unwrap();
        assert_eq!(set.live_count(), 5);
        assert_eq!(stopped.len(), 2);
        assert_eq!(set.status(0), MemberStatus::Running);
        assert_eq!(set.status(5), MemberStatus::Running);
    }

    #[test]
    fn test_random_live_replica_requires_live_members() {
        let (_, set) = replica_set(4, 1, 0);
        assert!(matches!(set.random_live_replica(), Err(WaitError::NoLiveReplicas)));
    }

    #[test]
    fn test_members_include_read_only_replicas() {
        let config = ClusterConfig::new(4, 1, 0).unwrap().with_ro_replicas(1);
        let set = ReplicaSet::new(config, &NetworkLayout::default(), Arc::new(SimulatedCluster::new())).unwrap();
        assert_eq!(set.member_ids(), vec![0, 1, 2, 3, 4]);
        assert_eq!(set.all_replicas(&BTreeSet::new()), vec![0, 1, 2, 3]);
    }
}
