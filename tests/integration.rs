//! Integration tests for the probe→decide→settle pipeline
//!
//! These tests drive the budget controller with scripted probers, so every
//! path shape (clean, dark, multipath, budget-starved) runs without network
//! access.

use std::collections::BTreeMap;
use std::time::Duration;

use ttl_budget::config::Settings;
use ttl_budget::export::export_json;
use ttl_budget::probe::{ProbeEvent, ProbeStatus, ScriptedProber};
use ttl_budget::state::{HopFinal, StopReason, TraceSummary};
use ttl_budget::trace::BudgetController;

/// Settings with pacing disabled so tests don't sleep
fn settings() -> Settings {
    Settings {
        per_probe_delay: Duration::ZERO,
        ..Default::default()
    }
}

async fn run(prober: ScriptedProber, settings: Settings, dest: &str) -> (TraceSummary, ScriptedProber) {
    let mut controller = BudgetController::new(prober, settings).unwrap();
    let summary = controller.run(dest).await;
    (summary, controller.into_prober())
}

fn resolved(ip: &str) -> HopFinal {
    HopFinal::Resolved(ip.to_string())
}

/// Every hop-level invariant that must hold after any run
fn assert_invariants(summary: &TraceSummary, s: &Settings) {
    assert!(summary.probes_used <= s.total_budget);
    assert!(summary.pool_remaining <= s.rollover_pool_max);
    let attempts: u32 = summary.per_ttl.values().map(|h| h.attempts).sum();
    assert_eq!(attempts, summary.probes_used);
    for hop in summary.per_ttl.values() {
        assert!(hop.attempts <= hop.dyn_cap || hop.attempts == 0, "ttl {}", hop.ttl);
        if hop.attempts > 0 {
            assert!(hop.base_cap <= hop.dyn_cap, "ttl {}", hop.ttl);
            assert!(hop.dyn_cap <= s.hard_per_hop_max, "ttl {}", hop.ttl);
        }
    }
}

#[tokio::test]
async fn test_linear_path_to_destination() {
    let mut prober = ScriptedProber::new();
    prober
        .push_reply(1, 0, "A")
        .push_reply(2, 0, "B")
        .push_reply(3, 0, "C")
        .push_reply(4, 0, "E")
        .push_dest(5, 0, "D");
    let s = Settings {
        max_ttl: 5,
        per_hop_budget: 5,
        repeats_needed: 1,
        ..settings()
    };

    let (summary, _) = run(prober, s.clone(), "D").await;

    let expected: BTreeMap<u8, HopFinal> = [
        (1, resolved("A")),
        (2, resolved("B")),
        (3, resolved("C")),
        (4, resolved("E")),
        (5, resolved("D")),
    ]
    .into_iter()
    .collect();
    assert_eq!(summary.path, expected);
    assert_eq!(summary.probes_used, 5);
    assert_eq!(summary.stop_reason, StopReason::DestReached);
    assert_invariants(&summary, &s);
}

#[tokio::test]
async fn test_destination_on_first_probe_stops_run() {
    let mut prober = ScriptedProber::new();
    prober.push_dest(1, 0, "192.0.2.1");

    let s = settings();
    let (summary, prober) = run(prober, s.clone(), "192.0.2.1").await;

    assert_eq!(summary.probes_used, 1);
    assert_eq!(summary.stop_reason, StopReason::DestReached);
    let hop = &summary.per_ttl[&1];
    assert_eq!(hop.attempts, 1);
    assert!(hop.confident);
    assert_eq!(hop.final_hop, Some(resolved("192.0.2.1")));
    // No later TTL was touched
    assert!(prober.calls().iter().all(|c| c.ttl == 1));
    assert!(summary.per_ttl.values().skip(1).all(|h| h.attempts == 0));
    // Destination short-circuit skips settlement
    assert_eq!(hop.pool_in, 0);
    assert_eq!(summary.pool_remaining, 0);
}

#[tokio::test]
async fn test_destination_matched_by_address_mid_hop() {
    let mut prober = ScriptedProber::new();
    prober.push_reply(1, 0, "10.0.0.1").push_reply(1, 1, "10.0.0.1");
    // Time Exceeded status, but the responder is the destination itself
    prober.push_timeout(2, 0).push_reply(2, 1, "198.51.100.7");

    let s = settings();
    let (summary, _) = run(prober, s.clone(), "198.51.100.7").await;

    assert_eq!(summary.stop_reason, StopReason::DestReached);
    assert_eq!(summary.probes_used, 4);
    let hop = &summary.per_ttl[&2];
    assert_eq!(hop.timeouts, 1);
    assert_eq!(hop.final_hop, Some(resolved("198.51.100.7")));
    assert_invariants(&summary, &s);
}

#[tokio::test]
async fn test_silent_hop_goes_dark_at_base_budget() {
    let s = Settings {
        max_ttl: 1,
        per_hop_budget: 2,
        hard_per_hop_max: 2,
        ..settings()
    };
    let (summary, _) = run(ScriptedProber::new(), s.clone(), "d").await;

    let hop = &summary.per_ttl[&1];
    assert_eq!(hop.attempts, 2);
    assert_eq!(hop.timeouts, 2);
    assert_eq!(hop.final_hop, Some(HopFinal::Dark));
    assert!(!hop.confident);
    assert_eq!(summary.path[&1].as_str(), "*");
    assert_eq!(summary.stop_reason, StopReason::MaxTtl);
}

#[tokio::test]
async fn test_dark_after_three_silent_probes_deposits_rest() {
    let s = Settings { max_ttl: 2, ..settings() };
    let mut prober = ScriptedProber::new();
    prober.push_reply(2, 0, "10.0.0.2").push_reply(2, 1, "10.0.0.2");

    let (summary, _) = run(prober, s.clone(), "d").await;

    let dark = &summary.per_ttl[&1];
    assert_eq!(dark.attempts, 3);
    assert_eq!(dark.final_hop, Some(HopFinal::Dark));
    assert_eq!(dark.pool_in, 3);

    let next = &summary.per_ttl[&2];
    assert_eq!(next.final_hop, Some(resolved("10.0.0.2")));
    assert_eq!(next.pool_in, 4);
    assert_eq!(summary.pool_remaining, 7);
    assert_eq!(summary.probes_used, 5);
    assert_invariants(&summary, &s);
}

#[tokio::test]
async fn test_repeats_needed_probes_when_contiguous() {
    let mut prober = ScriptedProber::new();
    for _ in 0..2 {
        prober.push_reply(1, 0, "10.1.1.1").push_reply(1, 1, "10.1.1.1");
    }
    let s = Settings { max_ttl: 1, repeats_needed: 3, ..settings() };

    let (summary, _) = run(prober, s.clone(), "d").await;

    let hop = &summary.per_ttl[&1];
    assert_eq!(hop.attempts, 3);
    assert_eq!(hop.counts.get("10.1.1.1"), 3);
    assert_eq!(hop.final_hop, Some(resolved("10.1.1.1")));
}

#[tokio::test]
async fn test_flow_ids_round_robin_within_hop() {
    let mut prober = ScriptedProber::new();
    prober
        .push_reply(1, 7, "10.0.0.1")
        .push_reply(1, 9, "10.0.0.2")
        .push_reply(1, 7, "10.0.0.1");
    let s = Settings {
        max_ttl: 1,
        flow_ids: vec![7, 9],
        ..settings()
    };

    let (summary, prober) = run(prober, s, "d").await;

    let flows: Vec<u16> = prober.calls().iter().map(|c| c.flow_id).collect();
    assert_eq!(flows, vec![7, 9, 7]);
    let hop = &summary.per_ttl[&1];
    assert_eq!(hop.counts.len(), 2);
    assert_eq!(hop.final_hop, Some(resolved("10.0.0.1")));
}

#[tokio::test]
async fn test_unreach_counts_as_silence() {
    let mut prober = ScriptedProber::new();
    let unreach = ProbeEvent::reply("d", 1, 0, ProbeStatus::Unreach, "10.0.0.1");
    prober.push(1, 0, unreach);
    let s = Settings { max_ttl: 1, per_hop_budget: 1, hard_per_hop_max: 1, ..settings() };

    let (summary, _) = run(prober, s, "d").await;

    let hop = &summary.per_ttl[&1];
    assert_eq!(hop.timeouts, 1);
    assert!(hop.counts.is_empty());
    assert_eq!(hop.final_hop, Some(HopFinal::Dark));
}

#[tokio::test]
async fn test_budget_exhausted_before_next_probe() {
    let s = Settings { total_budget: 3, ..settings() };
    let (summary, prober) = run(ScriptedProber::new(), s.clone(), "d").await;

    assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(summary.probes_used, 3);
    assert_eq!(prober.calls().len(), 3);

    // TTL 1 went dark after three silent probes
    assert_eq!(summary.path[&1], HopFinal::Dark);
    // TTL 2 had its caps computed but was never probed
    let starved = &summary.per_ttl[&2];
    assert_eq!(starved.attempts, 0);
    assert_eq!(starved.base_cap, s.per_hop_budget);
    assert!(starved.final_hop.is_none());
    assert!(!summary.path.contains_key(&2));
    assert_invariants(&summary, &s);
}

#[tokio::test]
async fn test_zero_total_budget_probes_nothing() {
    let s = Settings { total_budget: 0, ..settings() };
    let (summary, prober) = run(ScriptedProber::new(), s, "d").await;

    assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(summary.probes_used, 0);
    assert!(prober.calls().is_empty());
    assert!(summary.path.is_empty());
}

/// Script TTLs 1..=5 as clean two-reply hops and TTL 6 as dark
fn deep_noisy_path(last_ttl: u8) -> ScriptedProber {
    let mut prober = ScriptedProber::new();
    for ttl in 1..=5 {
        let ip = format!("10.0.0.{}", ttl);
        prober.push_reply(ttl, 0, &ip).push_reply(ttl, 0, &ip);
    }
    // TTL 6 scripted with nothing: all timeouts -> dark
    // The unstable hop: four distinct responders, then a repeat
    for ip in ["10.7.0.1", "10.7.0.2", "10.7.0.3", "10.7.0.4", "10.7.0.1"] {
        prober.push_reply(last_ttl, 0, ip);
    }
    prober
}

fn rollover_settings(max_ttl: u8) -> Settings {
    Settings {
        max_ttl,
        per_hop_budget: 4,
        repeats_needed: 2,
        flow_ids: vec![0],
        rollover_cap_per_hop: 2,
        hard_per_hop_max: 6,
        rollover_pool_max: 10,
        ..settings()
    }
}

#[tokio::test]
async fn test_rollover_extends_deep_unstable_hop() {
    let s = rollover_settings(7);
    let (summary, _) = run(deep_noisy_path(7), s.clone(), "d").await;

    // TTLs 1-5 each deposit 2; TTL 6 deposits 1 but the pool is capped
    for ttl in 1..=5 {
        assert_eq!(summary.per_ttl[&ttl].pool_in, 2);
    }
    assert_eq!(summary.path[&6], HopFinal::Dark);

    let hop = &summary.per_ttl[&7];
    assert_eq!(hop.base_cap, 4);
    assert_eq!(hop.dyn_cap, 6);
    assert_eq!(hop.attempts, 5);
    assert_eq!(hop.final_hop, Some(resolved("10.7.0.1")));
    assert_eq!(hop.pool_out, 1);
    assert_eq!(summary.pool_remaining, 9);
    assert_eq!(summary.stop_reason, StopReason::MaxTtl);
    assert_eq!(summary.probes_used, 5 * 2 + 3 + 5);
    assert_invariants(&summary, &s);
}

#[tokio::test]
async fn test_no_rollover_near_the_edge() {
    // Same shape shifted so the unstable hop sits at TTL 6 behind a dark TTL 5
    let mut prober = ScriptedProber::new();
    for ttl in 1..=4 {
        let ip = format!("10.0.0.{}", ttl);
        prober.push_reply(ttl, 0, &ip).push_reply(ttl, 0, &ip);
    }
    for ip in ["10.6.0.1", "10.6.0.2", "10.6.0.3", "10.6.0.4", "10.6.0.1"] {
        prober.push_reply(6, 0, ip);
    }
    let s = rollover_settings(6);

    let (summary, _) = run(prober, s.clone(), "d").await;

    assert_eq!(summary.path[&5], HopFinal::Dark);
    let hop = &summary.per_ttl[&6];
    assert_eq!(hop.dyn_cap, 4);
    assert_eq!(hop.attempts, 4);
    // Cap spent without a repeat: forced dark
    assert_eq!(hop.final_hop, Some(HopFinal::Dark));
    assert_eq!(hop.pool_out, 0);
    assert_invariants(&summary, &s);
}

#[tokio::test]
async fn test_no_rollover_after_quiet_hop() {
    let mut prober = ScriptedProber::new();
    for ttl in 1..=7 {
        let ip = format!("10.0.0.{}", ttl);
        prober.push_reply(ttl, 0, &ip).push_reply(ttl, 0, &ip);
    }
    for ip in ["10.8.0.1", "10.8.0.2", "10.8.0.3", "10.8.0.4"] {
        prober.push_reply(8, 0, ip);
    }
    let s = rollover_settings(8);

    let (summary, _) = run(prober, s.clone(), "d").await;

    let hop = &summary.per_ttl[&8];
    assert_eq!(hop.dyn_cap, hop.base_cap);
    assert_eq!(hop.attempts, 4);
    assert_eq!(hop.final_hop, Some(HopFinal::Dark));
    assert_invariants(&summary, &s);
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let s = rollover_settings(9);
    let (first, _) = run(deep_noisy_path(7), s.clone(), "d").await;
    let (second, _) = run(deep_noisy_path(7), s, "d").await;

    let mut a = Vec::new();
    let mut b = Vec::new();
    export_json(&first, &mut a).unwrap();
    export_json(&second, &mut b).unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_max_ttl_reached_without_destination() {
    let mut prober = ScriptedProber::new();
    for ttl in 1..=3 {
        let ip = format!("10.0.0.{}", ttl);
        prober.push_reply(ttl, 0, &ip).push_reply(ttl, 1, &ip);
    }
    let s = Settings { max_ttl: 3, ..settings() };

    let (summary, _) = run(prober, s.clone(), "d").await;

    assert_eq!(summary.stop_reason, StopReason::MaxTtl);
    assert_eq!(summary.path.len(), 3);
    assert_eq!(summary.probes_used, 6);
    assert_eq!(summary.pool_remaining, 10);
    assert_eq!(summary.last_resolved_ttl(), Some(3));
    assert_invariants(&summary, &s);
}

#[tokio::test]
async fn test_controller_holds_no_state_between_runs() {
    let mut prober = ScriptedProber::new();
    prober.push_dest(1, 0, "d").push_dest(1, 0, "d");
    let mut controller = BudgetController::new(prober, settings()).unwrap();

    let first = controller.run("d").await;
    let second = controller.run("d").await;

    assert_eq!(first, second);
    assert_eq!(second.probes_used, 1);
}

#[tokio::test]
async fn test_unbounded_caps_keep_pool_in_range() {
    let mut prober = ScriptedProber::new();
    prober.push_reply(1, 0, "A").push_reply(2, 0, "B");
    let s = Settings {
        max_ttl: 2,
        repeats_needed: 1,
        per_hop_budget: u32::MAX,
        hard_per_hop_max: u32::MAX,
        rollover_pool_max: u32::MAX,
        ..settings()
    };
    let (summary, _) = run(prober, s.clone(), "192.0.2.99").await;

    assert_eq!(summary.stop_reason, StopReason::MaxTtl);
    assert_eq!(summary.probes_used, 2);
    // second deposit saturates at the pool ceiling
    assert_eq!(summary.pool_remaining, u32::MAX);
    assert_eq!(summary.per_ttl[&2].pool_in, u32::MAX - 1);
    assert_invariants(&summary, &s);
}
