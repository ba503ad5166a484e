//! Cluster Membership
//!
//! Provides:
//! - Member identity and endpoints
//! - The process-control capability used to start/stop members
//! - The replica set that owns member liveness

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::Result;

pub mod manager;

pub use manager::ReplicaSet;

/// Member index: replicas are `0..n`, read-only replicas follow.
pub type MemberId = usize;

/// One cluster participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    /// Consensus traffic endpoint
    pub endpoint: SocketAddr,
    /// Endpoint the metrics capability talks to
    pub metrics_endpoint: SocketAddr,
}

/// Process liveness as tracked by the replica set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    Running,
    Stopped,
}

/// Starts and stops member processes.
///
/// The replica set guarantees it never asks to start a running member or
/// stop a stopped one; failures here are hard errors.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn start(&self, member: MemberId) -> Result<()>;

    async fn stop(&self, member: MemberId) -> Result<()>;
}
