use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::io::Write;
use std::net::{IpAddr, ToSocketAddrs};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Args;
use ttl_budget::config::FileConfig;
use ttl_budget::export::{
    export_csv, export_json, generate_baseline_report, generate_report, load_summary,
};
use ttl_budget::probe::{Prober, ScamperProber, ScriptedProber};
use ttl_budget::state::TraceSummary;
use ttl_budget::trace::BudgetController;

/// Routers in the `--fake` demo path before the destination
const DEMO_HOPS: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = init_tracing(&args.log) {
        eprintln!("warning: failed to init tracing: {err:#}");
    }

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

async fn run(args: Args) -> Result<ExitCode> {
    // Replay mode needs neither a prober nor a target
    if let Some(ref path) = args.replay {
        let summary = load_summary(path)?;
        write_output(&args, &summary)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut cfg = match args.config {
        Some(ref path) => FileConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => FileConfig::default_path()
            .map(|p| FileConfig::load_optional(&p))
            .unwrap_or_default(),
    };
    args.apply(&mut cfg);

    let target = args.target.clone().context("No target specified")?;

    if let Some(ttl) = args.probe_once {
        return probe_once_mode(&args, &cfg, &target, ttl).await;
    }
    if let Some(probes_per_ttl) = args.baseline {
        return baseline_mode(&args, &cfg, &target, probes_per_ttl).await;
    }

    let summary = if args.fake {
        let prober = ScriptedProber::linear_path(&target, DEMO_HOPS);
        trace_with(prober, cfg, &target).await?
    } else {
        let resolved = resolve(&target)?;
        let prober = ScamperProber::new(cfg.scamper.clone())?;
        trace_with(prober, cfg, &resolved).await?
    };

    let Some(summary) = summary else {
        return Ok(interrupted());
    };

    write_output(&args, &summary)?;
    Ok(ExitCode::SUCCESS)
}

/// Run one trace, returning None if interrupted by Ctrl+C
async fn trace_with<P: Prober>(
    prober: P,
    cfg: FileConfig,
    dest: &str,
) -> Result<Option<TraceSummary>> {
    let mut controller = BudgetController::new(prober, cfg.budget).context("Invalid settings")?;
    Ok(until_interrupted(controller.run(dest)).await)
}

/// Send one probe at `ttl` and print the event
async fn probe_once_mode(args: &Args, cfg: &FileConfig, target: &str, ttl: u8) -> Result<ExitCode> {
    let flow_id = cfg.budget.flow_ids.first().copied().unwrap_or_default();

    let event = if args.fake {
        let mut prober = ScriptedProber::linear_path(target, DEMO_HOPS);
        until_interrupted(prober.probe_once(target, ttl, flow_id)).await
    } else {
        let resolved = resolve(target)?;
        let mut prober = ScamperProber::new(cfg.scamper.clone())?;
        until_interrupted(prober.probe_once(&resolved, ttl, flow_id)).await
    };
    let Some(event) = event else {
        return Ok(interrupted());
    };

    let mut out = std::io::stdout().lock();
    export_json(&event, &mut out)?;
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

/// Full traceroute via scamper, reported for comparison with budgeted runs
async fn baseline_mode(
    args: &Args,
    cfg: &FileConfig,
    target: &str,
    probes_per_ttl: u32,
) -> Result<ExitCode> {
    let resolved = resolve(target)?;
    let prober = ScamperProber::new(cfg.scamper.clone())?;
    let Some(summary) = until_interrupted(prober.full_trace(&resolved, probes_per_ttl)).await
    else {
        return Ok(interrupted());
    };
    let summary = summary.context("Baseline trace failed")?;

    let mut out = std::io::stdout().lock();
    if args.json {
        export_json(&summary, &mut out)?;
    } else {
        generate_baseline_report(&summary, &mut out)?;
    }
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

/// Drive `fut` to completion unless Ctrl+C arrives first
async fn until_interrupted<F: Future>(fut: F) -> Option<F::Output> {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel_clone.cancel();
    });

    tokio::select! {
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

fn interrupted() -> ExitCode {
    eprintln!("Interrupted");
    ExitCode::from(130)
}

fn resolve(target: &str) -> Result<String> {
    let ip = resolve_target(target)
        .with_context(|| format!("Failed to resolve target: {}", target))?;
    Ok(ip.to_string())
}

fn write_output(args: &Args, summary: &TraceSummary) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.json {
        export_json(summary, &mut out)?;
    } else if args.csv {
        export_csv(summary, &mut out)?;
    } else {
        generate_report(summary, &mut out)?;
    }
    out.flush()?;
    Ok(())
}

/// Resolve a hostname or IP string to an IP address
fn resolve_target(target: &str) -> Result<IpAddr> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<IpAddr> = format!("{}:0", target)
        .to_socket_addrs()?
        .map(|sa| sa.ip())
        .collect();

    // Prefer IPv4, scamper's default family
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("No addresses found for {}", target))
}
