use tracing::{debug, info};

use crate::config::{Settings, SettingsError};
use crate::probe::{ProbeStatus, Prober};
use crate::state::{RunState, StopReason, TraceSummary};

use super::{credit, rules};

/// Drives one budget-aware traversal per [`run`](Self::run) call
///
/// Walks TTLs upward, probing each hop until it is confidently resolved or
/// judged dark, and stops on the destination, the global budget, or
/// `max_ttl`. No state is kept between runs.
pub struct BudgetController<P> {
    prober: P,
    settings: Settings,
}

impl<P: Prober> BudgetController<P> {
    pub fn new(prober: P, settings: Settings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self { prober, settings })
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    pub fn into_prober(self) -> P {
        self.prober
    }

    /// Trace the path to `dest`
    pub async fn run(&mut self, dest: &str) -> TraceSummary {
        let mut run = RunState::new(self.settings.max_ttl);
        let reason = self.drive(dest, &mut run).await;
        run.finish(reason);

        info!(
            target_host = dest,
            stop_reason = %reason,
            probes_used = run.probes_used,
            pool_remaining = run.pool,
            "run finished"
        );
        run.into_summary(dest)
    }

    async fn drive(&mut self, dest: &str, run: &mut RunState) -> StopReason {
        let s = &self.settings;

        loop {
            if run.is_past_max_ttl() {
                return StopReason::MaxTtl;
            }

            let ttl = run.ttl;
            let idx = ttl as usize - 1;
            let (before, rest) = run.hops.split_at_mut(idx);
            let hop = &mut rest[0];

            // Already decided: advance without probing
            if hop.is_decided() {
                run.ttl += 1;
                continue;
            }

            let eligible = credit::rollover_eligible(hop, before.last());
            let dyn_cap = credit::dynamic_cap(s, run.pool, eligible);
            hop.base_cap = s.per_hop_budget;
            hop.dyn_cap = dyn_cap;

            if run.probes_used >= s.total_budget {
                return StopReason::BudgetExhausted;
            }

            let flow_id = s.flow_ids[hop.attempts as usize % s.flow_ids.len()];
            let event = self.prober.probe_once(dest, ttl, flow_id).await;
            run.probes_used += 1;
            hop.attempts += 1;

            debug!(
                ttl,
                flow_id,
                status = ?event.status,
                hop_ip = event.hop_ip.as_deref().unwrap_or("-"),
                attempts = hop.attempts,
                dyn_cap,
                "probe"
            );

            match event.usable_hop() {
                Some(ip) => {
                    hop.record_reply(ip);
                    if event.status == ProbeStatus::DestReached || ip == dest {
                        hop.resolve(ip);
                        run.dest_reached = true;
                        info!(ttl, hop = ip, attempts = hop.attempts, "destination reached");
                        return StopReason::DestReached;
                    }
                }
                None => hop.record_timeout(),
            }

            if rules::confident(&hop.counts, s.repeats_needed) {
                if let Some(top) = hop.counts.top().map(str::to_owned) {
                    hop.resolve(&top);
                }
            } else if rules::dark(hop.timeouts, hop.attempts, dyn_cap) {
                hop.mark_dark();
            }

            if hop.is_decided() || hop.attempts >= dyn_cap {
                credit::settle(hop, &mut run.pool, s.rollover_pool_max);
                info!(
                    ttl,
                    final_hop = hop.final_hop.as_ref().map(|f| f.as_str()).unwrap_or("-"),
                    attempts = hop.attempts,
                    timeouts = hop.timeouts,
                    base_cap = hop.base_cap,
                    dyn_cap = hop.dyn_cap,
                    pool_in = hop.pool_in,
                    pool_out = hop.pool_out,
                    pool = run.pool,
                    "hop concluded"
                );
                run.ttl += 1;
            } else if !s.per_probe_delay.is_zero() {
                tokio::time::sleep(s.per_probe_delay).await;
            }
        }
    }
}
