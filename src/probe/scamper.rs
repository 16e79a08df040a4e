//! Prober backed by the `scamper` measurement tool.
//!
//! Each probe is one scamper invocation tracing exactly one TTL
//! (`trace -q 1 -f <ttl> -m <ttl>`) with JSON output. The plain invocation
//! is tried first; when it yields no trace record and sudo is enabled, the
//! same command is retried through `sudo -n`.
//!
//! [`ScamperProber::full_trace`] runs a conventional multi-probe traceroute
//! instead, summarized into a [`BaselineSummary`] for comparison.

use anyhow::{Result, bail};
use rand::Rng;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{ProbeEvent, ProbeStatus, Prober};
use crate::config::ScamperOptions;
use crate::state::BaselineSummary;

const DEFAULT_SCAMPER_PATH: &str = "/usr/bin/scamper";
/// Pacing jitter applied on either side of the base pace
const PACE_JITTER_MS: i64 = 10;
/// Gap limit and gap action for full traces (`-g 10 -G 2`)
const FULL_TRACE_GAP_LIMIT: u8 = 10;
const FULL_TRACE_GAP_ACTION: u8 = 2;
/// Output kept in the error when a full trace cannot be parsed
const ERROR_SNIPPET_CHARS: usize = 500;

/// One hop record inside a scamper trace object
#[derive(Debug, Clone, Deserialize)]
struct ScamperHop {
    probe_ttl: Option<u8>,
    ttl: Option<u8>,
    addr: Option<String>,
    rtt: Option<f64>,
    icmp_type: Option<u8>,
    icmp_code: Option<u8>,
}

impl ScamperHop {
    fn probe_ttl(&self) -> Option<u8> {
        self.probe_ttl.or(self.ttl)
    }
}

/// The parts of a scamper `trace` record we read
#[derive(Debug, Clone, Deserialize)]
struct ScamperTrace {
    dst: Option<String>,
    target: Option<String>,
    method: Option<String>,
    firsthop: Option<u8>,
    hoplimit: Option<u8>,
    stop_reason: Option<String>,
    #[serde(default)]
    hops: Vec<ScamperHop>,
}

pub struct ScamperProber {
    binary: PathBuf,
    options: ScamperOptions,
}

impl ScamperProber {
    /// Create a prober, failing if the scamper binary cannot be found
    pub fn new(options: ScamperOptions) -> Result<Self> {
        let binary = match options.binary.clone() {
            Some(path) => path,
            None => find_on_path("scamper").unwrap_or_else(|| PathBuf::from(DEFAULT_SCAMPER_PATH)),
        };
        if !binary.exists() {
            bail!("scamper binary not found at {}", binary.display());
        }
        Ok(Self { binary, options })
    }

    fn method(&self) -> &'static str {
        self.options.method.as_str()
    }

    /// Pace with a little jitter so tight loops don't flood the path
    fn pace_delay(&self) -> Duration {
        let base = self.options.pace.as_millis() as i64;
        let jitter = rand::thread_rng().gen_range(-PACE_JITTER_MS..=PACE_JITTER_MS);
        Duration::from_millis((base + jitter).max(0) as u64)
    }

    /// Plain invocation first, then `sudo -n` when enabled
    fn invocations(&self) -> Vec<bool> {
        if self.options.use_sudo {
            vec![false, true]
        } else {
            vec![false]
        }
    }

    fn command(&self, dest: &str, trace_cmd: &str, use_sudo: bool) -> Command {
        let args = scamper_args(&self.binary, dest, trace_cmd);
        let mut cmd = if use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg("-n").args(&args);
            cmd
        } else {
            let mut cmd = Command::new(&args[0]);
            cmd.args(&args[1..]);
            cmd
        };
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Run scamper and return stdout+stderr merged
    async fn run(&self, dest: &str, trace_cmd: &str, use_sudo: bool) -> std::io::Result<String> {
        let output = self.command(dest, trace_cmd, use_sudo).output().await?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    /// Full traceroute with `probes_per_ttl` probes at every TTL
    pub async fn full_trace(&self, dest: &str, probes_per_ttl: u32) -> Result<BaselineSummary> {
        let trace_cmd = full_trace_command(self.method(), probes_per_ttl);

        let mut last_output = String::new();
        for use_sudo in self.invocations() {
            let out = match self.run(dest, &trace_cmd, use_sudo).await {
                Ok(out) => out,
                Err(e) => {
                    tracing::warn!("failed to run scamper (sudo={}): {}", use_sudo, e);
                    continue;
                }
            };
            if let Some(error) = detect_tool_error(&out) {
                bail!("scamper {}", error);
            }
            if let Some(summary) = summarize_full_trace(&out, probes_per_ttl) {
                return Ok(summary);
            }
            last_output = out;
        }

        let snippet: String = last_output.chars().take(ERROR_SNIPPET_CHARS).collect();
        bail!("could not parse scamper trace output:\n{}", snippet)
    }

    fn failure(&self, dest: &str, ttl: u8, flow_id: u16, raw: Value) -> ProbeEvent {
        ProbeEvent::timeout(dest, ttl, flow_id, self.method()).with_raw(raw)
    }
}

impl Prober for ScamperProber {
    async fn probe_once(&mut self, dest: &str, ttl: u8, flow_id: u16) -> ProbeEvent {
        tokio::time::sleep(self.pace_delay()).await;

        let trace_cmd = single_ttl_command(self.method(), ttl);

        let mut last_output = String::new();
        for use_sudo in self.invocations() {
            let out = match self.run(dest, &trace_cmd, use_sudo).await {
                Ok(out) => out,
                Err(e) => {
                    tracing::warn!("failed to run scamper (sudo={}): {}", use_sudo, e);
                    format!("exception: {}", e)
                }
            };

            if let Some(error) = detect_tool_error(&out) {
                tracing::warn!("scamper {} for {} ttl {}", error, dest, ttl);
                return self.failure(dest, ttl, flow_id, json!({ "error": error, "output": out }));
            }

            if let Some(mut event) = parse_trace_output(&out, ttl, self.method()) {
                event.flow_id = flow_id;
                if event.target.is_empty() {
                    event.target = dest.to_string();
                }
                return event;
            }
            last_output = out;
        }

        self.failure(dest, ttl, flow_id, json!({ "output": last_output }))
    }
}

/// Argument vector for one scamper trace (binary first)
fn scamper_args(binary: &Path, dest: &str, trace_cmd: &str) -> Vec<String> {
    vec![
        binary.display().to_string(),
        "-O".into(),
        "json".into(),
        "-i".into(),
        dest.into(),
        "-c".into(),
        trace_cmd.into(),
    ]
}

fn single_ttl_command(method: &str, ttl: u8) -> String {
    format!("trace -P {} -q 1 -f {} -m {}", method, ttl, ttl)
}

fn full_trace_command(method: &str, probes_per_ttl: u32) -> String {
    format!(
        "trace -P {} -q {} -g {} -G {}",
        method, probes_per_ttl, FULL_TRACE_GAP_LIMIT, FULL_TRACE_GAP_ACTION
    )
}

/// Recognize scamper failures that no retry will fix
fn detect_tool_error(out: &str) -> Option<&'static str> {
    if out.to_lowercase().contains("could not chown /var/empty") {
        Some("privsep: check /var/empty permissions")
    } else if out.trim_start().starts_with("usage: scamper") {
        Some("scamper usage")
    } else {
        None
    }
}

/// Classify a hop reply for the probed destination
fn classify_hop(hop: &ScamperHop, dst: Option<&str>) -> ProbeStatus {
    // UDP-Paris destinations answer Port Unreachable; ICMP-Paris answer Echo Reply
    let dest_icmp = matches!((hop.icmp_type, hop.icmp_code), (Some(3), Some(3)) | (Some(0), _));
    let dest_addr = matches!((hop.addr.as_deref(), dst), (Some(a), Some(d)) if a == d);
    if dest_icmp || dest_addr {
        ProbeStatus::DestReached
    } else {
        ProbeStatus::TtlExceeded
    }
}

/// First `type == "trace"` record in scamper's JSON-lines output
fn find_trace_record(out: &str) -> Option<(Value, ScamperTrace)> {
    for line in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Ok(raw) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if raw.get("type").and_then(Value::as_str) != Some("trace") {
            continue;
        }
        if let Ok(trace) = serde_json::from_value::<ScamperTrace>(raw.clone()) {
            return Some((raw, trace));
        }
    }
    None
}

/// Turn scamper JSON-lines output into an event for `ttl`
///
/// Returns None when no trace record is present at all. A trace record
/// without a reply for `ttl` yields a timeout carrying the record as `raw`.
pub fn parse_trace_output(out: &str, ttl: u8, method: &str) -> Option<ProbeEvent> {
    let (raw, trace) = find_trace_record(out)?;

    let dst = trace.dst.clone().or(trace.target.clone());
    let mut event = ProbeEvent::timeout(dst.as_deref().unwrap_or_default(), ttl, 0, method);

    if let Some(hop) = trace.hops.iter().find(|h| h.probe_ttl() == Some(ttl)) {
        event.status = classify_hop(hop, dst.as_deref());
        event.hop_ip = hop.addr.clone();
        event.rtt_ms = hop.rtt;
    }
    Some(event.with_raw(raw))
}

/// Summarize a full multi-probe trace into a majority-vote path
///
/// Returns None when the output holds no trace record.
pub fn summarize_full_trace(out: &str, probes_per_ttl: u32) -> Option<BaselineSummary> {
    let (_, trace) = find_trace_record(out)?;

    let replies = trace
        .hops
        .iter()
        .filter_map(|h| Some((h.probe_ttl()?, h.addr.as_deref()?)));
    let summary = BaselineSummary::tally(
        trace.dst.clone().or(trace.target.clone()).unwrap_or_default(),
        trace.method.clone().unwrap_or_default(),
        probes_per_ttl,
        trace.firsthop.unwrap_or(1),
        trace.hoplimit,
        replies,
    );
    Some(summary.with_stop_reason(trace.stop_reason.as_deref().unwrap_or("UNKNOWN")))
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
