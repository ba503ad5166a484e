//! View agreement and activation
//!
//! Agreement polls `lastAgreedView` on one representative replica until it
//! matches the expected view. Activation then counts live replicas whose
//! `currentActiveView` equals that view, in rounds, until a quorum of
//! `2f + 2c + 1` is reached. Both phases share one overall budget.

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cluster::MemberId;
use crate::error::{Result, TimeoutDiagnostics, WaitError};
use crate::fanout::{fan_out_join, JoinPolicy};
use crate::metrics::{keys, Expected};
use crate::network::BftNetwork;
use crate::poll::{bounded_poll, Attempt, PollSettings, Probe, Progress};
use crate::quorum;

/// Which agreed view satisfies a view wait.
pub type ExpectedView = Expected;

impl BftNetwork {
    /// Wait until `replica` agrees on a view matching `expected` and a quorum
    /// of live replicas has activated it. Returns the agreed view.
    pub async fn wait_for_view(&self, replica: MemberId, expected: ExpectedView) -> Result<u64> {
        let started = Instant::now();
        let deadline = started + self.waits().view_timeout();

        let view = self
            .agreed_view_until(replica, expected, deadline)
            .await
            .map_err(|err| view_failure(err, started, None))?;
        self.activation_until(view, deadline)
            .await
            .map_err(|err| view_failure(err, started, Some(view)))?;

        info!(replica, view, %expected, "view agreed and activated");
        Ok(view)
    }

    pub async fn wait_for_agreed_view(&self, replica: MemberId, expected: ExpectedView) -> Result<u64> {
        let deadline = Instant::now() + self.waits().view_timeout();
        self.agreed_view_until(replica, expected, deadline).await
    }

    /// Wait until a quorum of live replicas report `view` as active.
    /// Returns how many were counted in the round that reached quorum.
    pub async fn wait_for_active_view(&self, view: u64) -> Result<usize> {
        let deadline = Instant::now() + self.waits().view_timeout();
        self.activation_until(view, deadline).await
    }

    /// Agreed and active view, as seen from a random live replica.
    pub async fn get_current_view(&self) -> Result<u64> {
        let replica = self.replicas().random_live_replica()?;
        self.wait_for_view(replica, ExpectedView::Any).await
    }

    pub async fn get_current_primary(&self) -> Result<MemberId> {
        let view = self.get_current_view().await?;
        Ok(quorum::primary_for_view(view, self.config().n()))
    }

    async fn agreed_view_until(&self, replica: MemberId, expected: ExpectedView, deadline: Instant) -> Result<u64> {
        let settings = PollSettings::new(self.waits().view_timeout(), self.waits().view_poll_interval()).within(deadline);
        self.poll_integer("wait_for_agreed_view", replica, keys::LAST_AGREED_VIEW, settings, expected)
            .await
    }

    async fn activation_until(&self, view: u64, deadline: Instant) -> Result<usize> {
        let probe = ActivationProbe {
            network: self,
            view,
            required: self.config().quorum_size(),
        };
        // A round must finish inside one attempt.
        let interval = self.waits().activation_round() + self.waits().view_poll_interval();
        let settings = PollSettings::new(self.waits().view_timeout(), interval).within(deadline);

        let count = bounded_poll(&probe, settings).await?;
        info!(view, count, required = probe.required, "view activated by quorum");
        Ok(count)
    }
}

/// One attempt is one counting round over the current live replicas.
struct ActivationProbe<'a> {
    network: &'a BftNetwork,
    view: u64,
    required: usize,
}

impl<'a> ActivationProbe<'a> {
    /// Every live replica polls its own `currentActiveView`; the round ends
    /// as soon as a quorum matched.
    async fn round(&self, live: &[MemberId]) -> Result<usize> {
        let network = self.network;
        let round = network.waits().activation_round();
        let settings = PollSettings::new(round, network.waits().view_poll_interval());
        let expected = Expected::Exactly(self.view);

        let report = fan_out_join("activation_round", live, JoinPolicy::AtLeast(self.required), round, move |member| {
            network
                .integer_probe("wait_for_active_view_on_member", member, keys::CURRENT_ACTIVE_VIEW, expected)
                .poll(settings)
        })
        .await?;
        Ok(report.count())
    }
}

#[async_trait]
impl<'a> Probe for ActivationProbe<'a> {
    type Output = usize;

    fn operation(&self) -> &str {
        "wait_for_active_view"
    }

    async fn attempt(&self) -> Result<Attempt<usize>> {
        let live = self.network.live_replicas();
        match self.round(&live).await {
            Ok(count) => Ok(Attempt::Ready(count)),
            Err(WaitError::Timeout(diagnostics)) => {
                debug!(view = self.view, converged = ?diagnostics.converged, required = self.required, "activation round fell short");
                Ok(Attempt::NotReady(Progress {
                    observed: Some(format!(
                        "view {} not yet active on a quorum of {} live replicas",
                        self.view,
                        live.len()
                    )),
                    converged: diagnostics.converged,
                    required: Some(self.required),
                }))
            }
            Err(err) => Err(err),
        }
    }
}

/// Re-label a failed phase as a `wait_for_view` timeout.
fn view_failure(err: WaitError, started: Instant, matching_view: Option<u64>) -> WaitError {
    let inner = match err.diagnostics() {
        Some(inner) => inner,
        None => return err,
    };
    let mut diagnostics = TimeoutDiagnostics::new("wait_for_view", started.elapsed());
    diagnostics.attempts = inner.attempts;
    diagnostics.converged = inner.converged;
    diagnostics.required = inner.required;
    diagnostics.last_observed = Some(match &inner.last_observed {
        Some(observed) => format!("matching_view={:?}, {}", matching_view, observed),
        None => format!("matching_view={:?}", matching_view),
    });
    WaitError::timeout(diagnostics)
}
