//! Concurrent per-member waits
//!
//! One task per member, all sharing one deadline. Tasks are launched in
//! member order and interleave cooperatively on the caller's task, so the
//! convergence count is plain local state. As soon as the [`JoinPolicy`] is
//! satisfied the remaining tasks are dropped: they stop at their current
//! suspension point and never re-arm.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::cluster::MemberId;
use crate::error::{Result, TimeoutDiagnostics, WaitError};

/// When a fan-out is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Every member must converge
    All,
    /// Stop once this many members converged (quorum)
    AtLeast(usize),
    /// Stop on the first member to converge
    First,
}

impl JoinPolicy {
    pub fn required(&self, members: usize) -> usize {
        match self {
            JoinPolicy::All => members,
            JoinPolicy::AtLeast(count) => *count,
            JoinPolicy::First => 1,
        }
    }

    pub fn is_satisfied(&self, converged: usize, members: usize) -> bool {
        converged >= self.required(members)
    }
}

/// Members that converged, in completion order.
#[derive(Debug, Clone)]
pub struct FanOutReport<T> {
    pub converged: Vec<(MemberId, T)>,
    pub launched: usize,
    pub elapsed: Duration,
}

impl<T> FanOutReport<T> {
    pub fn count(&self) -> usize {
        self.converged.len()
    }

    pub fn first(&self) -> Option<&(MemberId, T)> {
        self.converged.first()
    }

    pub fn members(&self) -> Vec<MemberId> {
        self.converged.iter().map(|(member, _)| *member).collect()
    }
}

/// Run `task(member)` for every member concurrently until `policy` holds.
///
/// A member task returning `Ok` counts as converged. A task failing with
/// [`WaitError::Timeout`] only means that member gave up on its own budget;
/// any other error aborts the whole fan-out. If the deadline passes first,
/// or every task finishes without satisfying the policy, the result is a
/// timeout whose diagnostics carry the partial convergence count.
pub async fn fan_out_join<T, F, Fut>(
    operation: &str,
    members: &[MemberId],
    policy: JoinPolicy,
    timeout: Duration,
    task: F,
) -> Result<FanOutReport<T>>
where
    F: Fn(MemberId) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    let required = policy.required(members.len());
    let mut converged = Vec::with_capacity(required.min(members.len()));
    let mut gave_up = 0usize;

    let mut running: FuturesUnordered<_> = members
        .iter()
        .map(|&member| {
            let pending = task(member);
            async move { (member, pending.await) }
        })
        .collect();

    while !policy.is_satisfied(converged.len(), members.len()) {
        match time::timeout_at(deadline, running.next()).await {
            Ok(Some((member, Ok(value)))) => {
                converged.push((member, value));
                debug!(operation, member, converged = converged.len(), required, "member converged");
            }
            Ok(Some((member, Err(err)))) if err.is_timeout() => {
                gave_up += 1;
                debug!(operation, member, "member gave up");
            }
            Ok(Some((member, Err(err)))) => {
                warn!(operation, member, error = %err, "member task failed, aborting");
                return Err(err);
            }
            Ok(None) => {
                return Err(shortfall(operation, started, members.len(), converged.len(), required, gave_up, true));
            }
            Err(_) => {
                return Err(shortfall(operation, started, members.len(), converged.len(), required, gave_up, false));
            }
        }
    }
    drop(running);

    info!(
        operation,
        converged = converged.len(),
        required,
        launched = members.len(),
        "fan-out satisfied"
    );
    Ok(FanOutReport {
        converged,
        launched: members.len(),
        elapsed: started.elapsed(),
    })
}

fn shortfall(
    operation: &str,
    started: Instant,
    launched: usize,
    converged: usize,
    required: usize,
    gave_up: usize,
    exhausted: bool,
) -> WaitError {
    let mut diagnostics = TimeoutDiagnostics::new(operation, started.elapsed());
    diagnostics.attempts = launched as u32;
    diagnostics.converged = Some(converged);
    diagnostics.required = Some(required);
    if exhausted {
        diagnostics.last_observed = Some(format!("all member tasks finished, {} gave up", gave_up));
    } else if gave_up > 0 {
        diagnostics.last_observed = Some(format!("{} member(s) gave up", gave_up));
    }
    warn!(%diagnostics, "fan-out fell short");
    WaitError::timeout(diagnostics)
}
