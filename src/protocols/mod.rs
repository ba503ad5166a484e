//! Convergence Protocols
//!
//! Provides:
//! - View agreement and quorum activation
//! - Checkpoint convergence
//! - State-transfer start/stop detection
//! - Fast/slow commit path prevalence
//!
//! Every wait here is a composition of [`crate::poll::bounded_poll`] and
//! [`crate::fanout::fan_out_join`] over [`crate::metrics::MetricStore`]
//! reads, implemented as methods on [`crate::network::BftNetwork`].

pub mod checkpoint;
pub mod commit_path;
pub mod state_transfer;
pub mod view;

pub use commit_path::{fast_path_prevalent, slow_path_prevalent};
pub use view::ExpectedView;
