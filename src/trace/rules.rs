//! Hop decision rules.
//!
//! Pure predicates over a hop's counters. The controller applies them in
//! priority order: confidence, then darkness.

use crate::state::{HopState, ResponderCounts};

/// Smallest sample size at which mostly-silent hops are called dark
const DARK_MIN_SAMPLE: u32 = 3;
/// Timeouts that mark a hop as unstable
const UNCERTAIN_TIMEOUTS: u32 = 2;
/// Distinct responders that mark a hop as heavily multipathed
const UNCERTAIN_RESPONDERS: usize = 3;

/// One responder has been seen at least `repeats_needed` times
pub fn confident(counts: &ResponderCounts, repeats_needed: u32) -> bool {
    !counts.is_empty() && counts.max_count() >= repeats_needed
}

/// The hop should be declared unresponsive
///
/// Dark once a meaningful sample (`min(3, cap)` probes) has at most one
/// non-silent reply, or unconditionally once the cap is spent.
pub fn dark(timeouts: u32, attempts: u32, cap: u32) -> bool {
    let mostly_silent =
        attempts >= DARK_MIN_SAMPLE.min(cap) && timeouts + 1 >= attempts;
    mostly_silent || attempts >= cap
}

/// The hop looks unstable enough to merit extra budget
pub fn uncertain(hop: &HopState) -> bool {
    hop.timeouts >= UNCERTAIN_TIMEOUTS || hop.counts.len() >= UNCERTAIN_RESPONDERS
}
