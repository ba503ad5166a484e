use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::cluster::MemberId;
use crate::metrics::MetricKey;

/// Diagnostic context carried by every deadline expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutDiagnostics {
    /// The wait that gave up
    pub operation: String,
    /// Wall-clock time spent before giving up
    pub elapsed: Duration,
    /// Number of probe attempts (or fan-out rounds) that were started
    pub attempts: u32,
    /// Last intermediate state the probe reported, if any
    pub last_observed: Option<String>,
    /// How many members had converged when the deadline hit
    pub converged: Option<usize>,
    /// How many members were needed
    pub required: Option<usize>,
}

impl TimeoutDiagnostics {
    pub fn new(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            operation: operation.into(),
            elapsed,
            attempts: 0,
            last_observed: None,
            converged: None,
            required: None,
        }
    }
}

impl fmt::Display for TimeoutDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} gave up after {:.3}s ({} attempts",
            self.operation,
            self.elapsed.as_secs_f64(),
            self.attempts
        )?;
        if let Some(converged) = self.converged {
            match self.required {
                Some(required) => write!(f, ", converged {}/{}", converged, required)?,
                None => write!(f, ", converged {}", converged)?,
            }
        }
        if let Some(observed) = &self.last_observed {
            write!(f, ", last observed {}", observed)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    /// `(n, f, c)` breaks `n = 3f + 2c + 1`
    #[error("Invalid BFT configuration n={n}, f={f}, c={c}: expected n = 3f + 2c + 1")]
    InvalidConfig { n: usize, f: usize, c: usize },

    #[error("Timeout: {0}")]
    Timeout(Box<TimeoutDiagnostics>),

    /// The metric or process-control capability itself failed for this member
    #[error("Member {member} is unreachable: {reason}")]
    UnreachableMember { member: MemberId, reason: String },

    #[error("Member {0} is already running")]
    AlreadyRunning(MemberId),

    #[error("Member {0} is already stopped")]
    AlreadyStopped(MemberId),

    #[error("Member {0} is not part of the cluster")]
    UnknownMember(MemberId),

    #[error("No live replicas")]
    NoLiveReplicas,

    /// A metric expected to exist was not registered on the member
    #[error("Metric {key} is not available on member {member}")]
    MissingMetric { member: MemberId, key: MetricKey },

    #[error("Metric {key} has unexpected value {value}")]
    UnexpectedMetric { key: MetricKey, value: String },

    #[error("Condition not met: {0}")]
    ConditionNotMet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, WaitError>;

impl WaitError {
    pub fn timeout(diagnostics: TimeoutDiagnostics) -> Self {
        WaitError::Timeout(Box::new(diagnostics))
    }

    pub fn unreachable(member: MemberId, reason: impl Into<String>) -> Self {
        WaitError::UnreachableMember {
            member,
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        WaitError::Config(msg.into())
    }

    pub fn condition(msg: impl Into<String>) -> Self {
        WaitError::ConditionNotMet(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout(_))
    }

    /// Caller bugs rather than cluster conditions.
    pub fn is_operator_misuse(&self) -> bool {
        matches!(
            self,
            WaitError::AlreadyRunning(_) | WaitError::AlreadyStopped(_) | WaitError::UnknownMember(_)
        )
    }

    pub fn diagnostics(&self) -> Option<&TimeoutDiagnostics> {
        match self {
            WaitError::Timeout(diagnostics) => Some(diagnostics),
            _ => None,
        }
    }
}
