use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use ttl_budget::config::{FileConfig, ProbeMethod};

/// Budget-aware traceroute: resolves each hop with as few probes as possible
#[derive(Parser, Debug, Clone)]
#[command(name = "ttl-budget")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host to trace (IP address or hostname)
    #[arg(required_unless_present = "replay")]
    pub target: Option<String>,

    /// Use a scripted demo path instead of scamper
    #[arg(long = "fake")]
    pub fake: bool,

    /// Config file (default: ~/.config/ttl-budget/config.toml)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Maximum TTL (hops)
    #[arg(short = 'm', long = "max-ttl")]
    pub max_ttl: Option<u8>,

    /// Base probe budget per hop
    #[arg(long = "per-hop-budget")]
    pub per_hop_budget: Option<u32>,

    /// Same-responder replies needed to lock a hop
    #[arg(long = "repeats-needed")]
    pub repeats_needed: Option<u32>,

    /// Global probe budget for the run
    #[arg(long = "total-budget")]
    pub total_budget: Option<u32>,

    /// Flow IDs cycled within a hop (comma separated)
    #[arg(long = "flow-ids", value_delimiter = ',')]
    pub flow_ids: Option<Vec<u16>>,

    /// Delay between repeated probes of one hop, in seconds
    #[arg(long = "delay")]
    pub delay: Option<f64>,

    /// Max extra credits a single hop may draw
    #[arg(long = "rollover-cap")]
    pub rollover_cap: Option<u32>,

    /// Hard ceiling on probes per hop, rollover included
    #[arg(long = "hard-max")]
    pub hard_max: Option<u32>,

    /// Rollover pool ceiling
    #[arg(long = "pool-max")]
    pub pool_max: Option<u32>,

    /// Probe method (udp-paris, icmp-paris, tcp)
    #[arg(long = "method")]
    pub method: Option<String>,

    /// Base pacing before each scamper probe, in milliseconds
    #[arg(long = "pace-ms")]
    pub pace_ms: Option<u64>,

    /// Never retry scamper through sudo
    #[arg(long = "no-sudo")]
    pub no_sudo: bool,

    /// Path to the scamper binary
    #[arg(long = "scamper")]
    pub scamper: Option<PathBuf>,

    /// Output JSON summary
    #[arg(long = "json")]
    pub json: bool,

    /// Output per-hop CSV
    #[arg(long = "csv")]
    pub csv: bool,

    /// Output text report (default)
    #[arg(long = "report")]
    pub report: bool,

    /// Render a saved JSON summary instead of tracing
    #[arg(long = "replay")]
    pub replay: Option<PathBuf>,

    /// Run a conventional full trace with Q probes per TTL (default 3) for comparison
    #[arg(long = "baseline", value_name = "Q", num_args = 0..=1, default_missing_value = "3")]
    pub baseline: Option<u32>,

    /// Send a single probe at TTL and print the resulting event as JSON
    #[arg(long = "probe-once", value_name = "TTL")]
    pub probe_once: Option<u8>,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long = "log", default_value = "warn")]
    pub log: String,
}

impl Args {
    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        let outputs = [self.json, self.csv, self.report].iter().filter(|&&b| b).count();
        if outputs > 1 {
            return Err("Choose at most one of --json, --csv, --report".into());
        }

        if let Some(delay) = self.delay
            && !(delay >= 0.0 && delay.is_finite())
        {
            return Err("Delay must be a non-negative number of seconds".into());
        }

        if let Some(ref method) = self.method
            && ProbeMethod::parse(method).is_none()
        {
            return Err(format!(
                "Unknown method: {}. Use udp-paris, icmp-paris, or tcp",
                method
            ));
        }

        if let Some(ref target) = self.target
            && target.trim().is_empty()
        {
            return Err("Target cannot be empty".into());
        }

        if self.baseline.is_some() && self.probe_once.is_some() {
            return Err("Choose at most one of --baseline, --probe-once".into());
        }

        if (self.baseline.is_some() || self.probe_once.is_some()) && self.replay.is_some() {
            return Err("--replay cannot be combined with --baseline or --probe-once".into());
        }

        if let Some(q) = self.baseline {
            if q == 0 {
                return Err("Baseline needs at least one probe per TTL".into());
            }
            if self.fake {
                return Err("--baseline runs scamper and cannot be combined with --fake".into());
            }
            if self.csv {
                return Err("--baseline supports --json or --report output".into());
            }
        }

        if let Some(ttl) = self.probe_once
            && ttl == 0
        {
            return Err("--probe-once TTL must be at least 1".into());
        }

        Ok(())
    }

    /// Overlay command-line values on top of file configuration
    pub fn apply(&self, cfg: &mut FileConfig) {
        let budget = &mut cfg.budget;
        if let Some(v) = self.max_ttl {
            budget.max_ttl = v;
        }
        if let Some(v) = self.per_hop_budget {
            budget.per_hop_budget = v;
        }
        if let Some(v) = self.repeats_needed {
            budget.repeats_needed = v;
        }
        if let Some(v) = self.total_budget {
            budget.total_budget = v;
        }
        if let Some(ref v) = self.flow_ids {
            budget.flow_ids = v.clone();
        }
        if let Some(v) = self.delay.and_then(|v| Duration::try_from_secs_f64(v).ok()) {
            budget.per_probe_delay = v;
        }
        if let Some(v) = self.rollover_cap {
            budget.rollover_cap_per_hop = v;
        }
        if let Some(v) = self.hard_max {
            budget.hard_per_hop_max = v;
        }
        if let Some(v) = self.pool_max {
            budget.rollover_pool_max = v;
        }

        let scamper = &mut cfg.scamper;
        if let Some(method) = self.method.as_deref().and_then(ProbeMethod::parse) {
            scamper.method = method;
        }
        if let Some(v) = self.pace_ms {
            scamper.pace = Duration::from_millis(v);
        }
        if self.no_sudo {
            scamper.use_sudo = false;
        }
        if let Some(ref path) = self.scamper {
            scamper.binary = Some(path.clone());
        }
    }
}
