use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::hop::{HopFinal, HopState};

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    DestReached,
    BudgetExhausted,
    MaxTtl,
    #[default]
    Unknown,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DestReached => "dest_reached",
            Self::BudgetExhausted => "budget_exhausted",
            Self::MaxTtl => "max_ttl",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable progress of a single traversal
///
/// Built fresh for each run and consumed into a [`TraceSummary`] at the end.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Hop under examination (1-indexed); past `max_ttl` means done
    pub ttl: u8,
    pub max_ttl: u8,
    pub probes_used: u32,
    /// Rollover credit balance
    pub pool: u32,
    pub dest_reached: bool,
    pub stop_reason: Option<StopReason>,
    /// One entry per TTL, index = ttl - 1
    pub hops: Vec<HopState>,
}

impl RunState {
    pub fn new(max_ttl: u8) -> Self {
        let hops = (1..=max_ttl).map(HopState::new).collect();
        Self {
            ttl: 1,
            max_ttl,
            probes_used: 0,
            pool: 0,
            dest_reached: false,
            stop_reason: None,
            hops,
        }
    }

    /// Get mutable hop by TTL (1-indexed)
    pub fn hop_mut(&mut self, ttl: u8) -> Option<&mut HopState> {
        if ttl == 0 {
            None
        } else {
            self.hops.get_mut(ttl as usize - 1)
        }
    }

    pub fn is_past_max_ttl(&self) -> bool {
        self.ttl > self.max_ttl
    }

    /// Record the termination cause; later calls are ignored
    pub fn finish(&mut self, reason: StopReason) {
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
        }
    }

    /// Consume the run into its persisted summary
    pub fn into_summary(self, target: &str) -> TraceSummary {
        let path = self
            .hops
            .iter()
            .filter_map(|h| h.final_hop.clone().map(|f| (h.ttl, f)))
            .collect();

        TraceSummary {
            target: target.to_string(),
            path,
            probes_used: self.probes_used,
            stop_reason: self.stop_reason.unwrap_or_default(),
            pool_remaining: self.pool,
            per_ttl: self.hops.into_iter().map(|h| (h.ttl, h)).collect(),
        }
    }
}

/// Result of one run: the only thing that outlives it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub target: String,
    /// Decided hops only; dark hops carry the sentinel
    pub path: BTreeMap<u8, HopFinal>,
    pub probes_used: u32,
    pub stop_reason: StopReason,
    pub pool_remaining: u32,
    pub per_ttl: BTreeMap<u8, HopState>,
}

impl TraceSummary {
    /// Hops that received at least one probe
    pub fn probed_hops(&self) -> impl Iterator<Item = &HopState> {
        self.per_ttl.values().filter(|h| h.attempts > 0)
    }

    /// Deepest TTL that resolved to an address
    pub fn last_resolved_ttl(&self) -> Option<u8> {
        self.path
            .iter()
            .rev()
            .find(|(_, f)| !f.is_dark())
            .map(|(ttl, _)| *ttl)
    }
}
