//! Rollover credits.
//!
//! Hops that settle under their base cap deposit the unused probes into a
//! bounded pool; deep, unstable hops that follow a noisy hop may draw on it
//! to extend their cap.

use crate::config::Settings;
use crate::state::HopState;

use super::rules;

/// Hops at or below this TTL never draw credit
pub const ROLLOVER_MIN_TTL: u8 = 6;

/// Whether `hop` may extend its cap from the pool
///
/// Requires an undecided, uncertain hop past the near edge whose predecessor
/// was dark or saw repeated timeouts.
pub fn rollover_eligible(hop: &HopState, prev: Option<&HopState>) -> bool {
    !hop.is_decided()
        && rules::uncertain(hop)
        && hop.ttl > ROLLOVER_MIN_TTL
        && prev.is_some_and(HopState::is_noisy)
}

/// Cap for the next probe of a hop
pub fn dynamic_cap(settings: &Settings, pool: u32, eligible: bool) -> u32 {
    let base_cap = settings.per_hop_budget;
    if !eligible {
        return base_cap;
    }
    let extra = pool.min(settings.rollover_cap_per_hop);
    base_cap.saturating_add(extra).min(settings.hard_per_hop_max)
}

/// Settle a concluded hop against the pool
///
/// Unused base budget is deposited (pool capped at `pool_max`); probes spent
/// beyond the base cap are withdrawn (pool floored at zero). The hop records
/// the nominal transfer in `pool_in` / `pool_out`.
pub fn settle(hop: &mut HopState, pool: &mut u32, pool_max: u32) {
    let base_cap = hop.base_cap;
    if hop.attempts < base_cap {
        let deposit = base_cap - hop.attempts;
        *pool = pool.saturating_add(deposit).min(pool_max);
        hop.pool_in = deposit;
    } else if hop.attempts > base_cap {
        let withdraw = hop.attempts - base_cap;
        *pool = pool.saturating_sub(withdraw);
        hop.pool_out = withdraw;
    }
}
