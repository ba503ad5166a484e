//! Quorum arithmetic
//!
//! Pure sizing rules for a replica group tolerating `f` Byzantine and `c`
//! crash-only faults:
//! - `n = 3f + 2c + 1`
//! - quorum = `2f + 2c + 1` (equivalently `n - f`)

use std::collections::BTreeSet;

use crate::cluster::MemberId;
use crate::error::{Result, WaitError};

/// Fails unless `n == 3f + 2c + 1`. A sizing whose `3f + 2c + 1` does not
/// fit in `usize` is invalid too.
pub fn validate(n: usize, f: usize, c: usize) -> Result<()> {
    match required_members(f, c) {
        Some(required) if required == n => Ok(()),
        _ => Err(WaitError::InvalidConfig { n, f, c }),
    }
}

fn required_members(f: usize, c: usize) -> Option<usize> {
    f.checked_mul(3)?.checked_add(c.checked_mul(2)?)?.checked_add(1)
}

/// `2f + 2c + 1`. Saturates on sizings that [`validate`] rejects.
pub fn quorum_size(f: usize, c: usize) -> usize {
    f.saturating_mul(2).saturating_add(c.saturating_mul(2)).saturating_add(1)
}

/// Smallest live set that still makes progress once `f` members are gone
/// and only crash faults remain: `2f + c + 1`.
pub fn crash_quorum_size(f: usize, c: usize) -> usize {
    f.saturating_mul(2).saturating_add(c).saturating_add(1)
}

/// `{0, …, n-1} \ excluding`, ascending.
pub fn all_members(n: usize, excluding: &BTreeSet<MemberId>) -> Vec<MemberId> {
    (0..n).filter(|id| !excluding.contains(id)).collect()
}

/// Primary of `view` under round-robin leader rotation.
pub fn primary_for_view(view: u64, n: usize) -> MemberId {
    (view % n as u64) as MemberId
}
