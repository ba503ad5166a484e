pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod metrics;
pub mod network;
pub mod poll;
pub mod protocols;
pub mod quorum;
pub mod sim;

// Re-export common types
pub use cluster::{Member, MemberId, ProcessControl, ReplicaSet};
pub use config::{ClusterConfig, Config};
pub use error::{Result, TimeoutDiagnostics, WaitError};
pub use fanout::{fan_out_join, JoinPolicy};
pub use metrics::{Expected, MetricKey, MetricSample, MetricStore, MetricValue};
pub use network::BftNetwork;
pub use poll::{bounded_poll, Attempt, PollSettings, Probe};
pub use protocols::ExpectedView;
pub use sim::SimulatedCluster;
