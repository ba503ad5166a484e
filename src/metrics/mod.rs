//! Member Telemetry
//!
//! Addressing and typing of the metrics a replica exposes, and the
//! capability used to read them. A metric that is not registered yet is an
//! explicit [`MetricSample::Absent`], never a zero.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::cluster::MemberId;
use crate::error::{Result, WaitError};

pub mod keys;

/// `component / kind / name` path of one metric inside a member's namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub component: Cow<'static, str>,
    pub kind: Cow<'static, str>,
    pub name: Cow<'static, str>,
}

impl MetricKey {
    pub fn new(
        component: impl Into<Cow<'static, str>>,
        kind: impl Into<Cow<'static, str>>,
        name: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            component: component.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub const fn from_static(component: &'static str, kind: &'static str, name: &'static str) -> Self {
        Self {
            component: Cow::Borrowed(component),
            kind: Cow::Borrowed(kind),
            name: Cow::Borrowed(name),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.component, self.kind, self.name)
    }
}

/// Typed metric value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Integer(u64),
    Text(String),
    /// Enumerated status such as `NotFetching`
    State(String),
}

impl MetricValue {
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            MetricValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Text(value) | MetricValue::State(value) => Some(value),
            MetricValue::Integer(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(value) => write!(f, "{}", value),
            MetricValue::Text(value) | MetricValue::State(value) => write!(f, "{}", value),
        }
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::Integer(value)
    }
}

/// Outcome of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricSample {
    Value(MetricValue),
    /// Metric not registered yet on the member
    Absent,
}

impl MetricSample {
    pub fn value(self) -> Option<MetricValue> {
        match self {
            MetricSample::Value(value) => Some(value),
            MetricSample::Absent => None,
        }
    }

    /// `Ok(None)` when absent, an error when present but not an integer.
    pub fn into_integer(self, key: &MetricKey) -> Result<Option<u64>> {
        match self {
            MetricSample::Absent => Ok(None),
            MetricSample::Value(MetricValue::Integer(value)) => Ok(Some(value)),
            MetricSample::Value(other) => Err(WaitError::UnexpectedMetric {
                key: key.clone(),
                value: other.to_string(),
            }),
        }
    }
}

/// Which integer reading satisfies a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expected {
    #[default]
    Any,
    Exactly(u64),
    AtLeast(u64),
    GreaterThan(u64),
}

impl Expected {
    pub fn matches(&self, value: u64) -> bool {
        match *self {
            Expected::Any => true,
            Expected::Exactly(expected) => value == expected,
            Expected::AtLeast(expected) => value >= expected,
            Expected::GreaterThan(expected) => value > expected,
        }
    }
}

impl From<Option<u64>> for Expected {
    /// `None` accepts any reading.
    fn from(target: Option<u64>) -> Self {
        target.map_or(Expected::Any, Expected::Exactly)
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Any => write!(f, "any value"),
            Expected::Exactly(value) => write!(f, "== {}", value),
            Expected::AtLeast(value) => write!(f, ">= {}", value),
            Expected::GreaterThan(value) => write!(f, "> {}", value),
        }
    }
}

/// Every metric of one member at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    values: BTreeMap<MetricKey, MetricValue>,
}

impl MetricSnapshot {
    pub fn new(values: BTreeMap<MetricKey, MetricValue>) -> Self {
        Self { values }
    }

    /// Same absence semantics as a remote fetch.
    pub fn get_local(&self, key: &MetricKey) -> MetricSample {
        match self.values.get(key) {
            Some(value) => MetricSample::Value(value.clone()),
            None => MetricSample::Absent,
        }
    }

    pub fn insert(&mut self, key: MetricKey, value: MetricValue) {
        self.values.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(MetricKey, MetricValue)> for MetricSnapshot {
    fn from_iter<T: IntoIterator<Item = (MetricKey, MetricValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Read access to member telemetry.
///
/// Implementations return [`MetricSample::Absent`] for unknown paths and
/// [`WaitError::UnreachableMember`] when the member cannot be queried at all.
/// A fetch may also simply never complete (e.g. a stopped member whose
/// requests go unanswered); callers bound every fetch with a deadline.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn fetch(&self, member: MemberId, key: &MetricKey) -> Result<MetricSample>;

    async fn fetch_all(&self, member: MemberId) -> Result<MetricSnapshot>;

    async fn fetch_integer(&self, member: MemberId, key: &MetricKey) -> Result<Option<u64>> {
        self.fetch(member, key).await?.into_integer(key)
    }
}
