use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::hop::{HopFinal, ResponderCounts};

/// Outcome of a conventional full traceroute
///
/// Every TTL in `first_hop..=last_ttl_probed` gets the same number of probes,
/// so `probes_used_est` is the figure a budgeted run's `probes_used` is
/// compared against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSummary {
    pub target: String,
    pub method: String,
    pub probes_per_ttl: u32,
    #[serde(rename = "firsthop")]
    pub first_hop: u8,
    pub last_ttl_probed: u8,
    /// Stop reason as reported by the probing tool
    pub stop_reason: String,
    pub probes_used_est: u32,
    /// Majority responder per TTL; silent TTLs carry the dark sentinel
    pub path: BTreeMap<u8, HopFinal>,
    pub per_ttl_counts: BTreeMap<u8, ResponderCounts>,
}

impl BaselineSummary {
    /// TTLs the full trace covered
    pub fn ttls_probed(&self) -> u32 {
        if self.last_ttl_probed < self.first_hop {
            0
        } else {
            u32::from(self.last_ttl_probed - self.first_hop) + 1
        }
    }

    /// Tally replies into a majority-vote path
    ///
    /// `replies` yields `(ttl, address)` per answered probe. Ties between
    /// responders go to the one seen first. Without a hop limit the deepest
    /// answered TTL bounds the range.
    pub fn tally<'a>(
        target: String,
        method: String,
        probes_per_ttl: u32,
        first_hop: u8,
        hop_limit: Option<u8>,
        replies: impl IntoIterator<Item = (u8, &'a str)>,
    ) -> Self {
        let mut by_ttl: BTreeMap<u8, ResponderCounts> = BTreeMap::new();
        for (ttl, addr) in replies {
            if !addr.is_empty() {
                by_ttl.entry(ttl).or_default().increment(addr);
            }
        }

        let last_ttl_probed = hop_limit
            .filter(|&limit| limit > 0)
            .or_else(|| by_ttl.keys().next_back().copied())
            .unwrap_or(first_hop);

        let mut path = BTreeMap::new();
        let mut per_ttl_counts = BTreeMap::new();
        for ttl in first_hop..=last_ttl_probed {
            let counts = by_ttl.remove(&ttl).unwrap_or_default();
            let hop = counts
                .top()
                .map_or(HopFinal::Dark, |ip| HopFinal::Resolved(ip.to_string()));
            path.insert(ttl, hop);
            per_ttl_counts.insert(ttl, counts);
        }

        let mut summary = Self {
            target,
            method,
            probes_per_ttl,
            first_hop,
            last_ttl_probed,
            stop_reason: String::new(),
            probes_used_est: 0,
            path,
            per_ttl_counts,
        };
        summary.probes_used_est = probes_per_ttl.saturating_mul(summary.ttls_probed());
        summary
    }

    pub fn with_stop_reason(mut self, reason: impl Into<String>) -> Self {
        self.stop_reason = reason.into();
        self
    }
}
