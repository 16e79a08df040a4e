use std::io::Write;

use crate::state::{BaselineSummary, HopFinal, TraceSummary};

/// Generate a text report of a run
pub fn generate_report<W: Write>(summary: &TraceSummary, mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "ttl-budget report for {}", summary.target)?;
    writeln!(writer)?;

    // Header
    writeln!(
        writer,
        "{:>3}  {:<40} {:>5} {:>5} {:>4} {:>4} {:>6}",
        "#", "Host", "Sent", "Lost", "Cap", "Dyn", "Credit"
    )?;
    writeln!(writer, "{}", "-".repeat(76))?;

    for hop in summary.probed_hops() {
        let host = match &hop.final_hop {
            Some(HopFinal::Resolved(ip)) if hop.counts.len() > 1 => {
                format!("{} (+{} more)", ip, hop.counts.len() - 1)
            }
            Some(HopFinal::Resolved(ip)) => ip.clone(),
            Some(HopFinal::Dark) => "* * *".to_string(),
            None => "???".to_string(),
        };

        let credit = if hop.pool_in > 0 {
            format!("+{}", hop.pool_in)
        } else if hop.pool_out > 0 {
            format!("-{}", hop.pool_out)
        } else {
            "-".to_string()
        };

        writeln!(
            writer,
            "{:>3}  {:<40} {:>5} {:>5} {:>4} {:>4} {:>6}",
            hop.ttl, host, hop.attempts, hop.timeouts, hop.base_cap, hop.dyn_cap, credit
        )?;
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "Stop: {}  Probes: {}  Pool remaining: {}",
        summary.stop_reason, summary.probes_used, summary.pool_remaining
    )?;
    match summary.last_resolved_ttl() {
        Some(ttl) => writeln!(writer, "Last responding hop: {}", ttl)?,
        None => writeln!(writer, "Last responding hop: none")?,
    }

    Ok(())
}

/// Generate a text report of a full-trace baseline
pub fn generate_baseline_report<W: Write>(
    summary: &BaselineSummary,
    mut writer: W,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "ttl-budget baseline for {} ({}, {} probes per TTL)",
        summary.target, summary.method, summary.probes_per_ttl
    )?;
    writeln!(writer)?;

    writeln!(writer, "{:>3}  {:<40} {:>7}", "#", "Host", "Replies")?;
    writeln!(writer, "{}", "-".repeat(52))?;

    for (ttl, hop) in &summary.path {
        let counts = summary.per_ttl_counts.get(ttl);
        let replies: u32 = counts.map_or(0, |c| c.iter().map(|(_, n)| n).sum());
        let distinct = counts.map_or(0, |c| c.len());
        let host = match hop {
            HopFinal::Resolved(ip) if distinct > 1 => format!("{} (+{} more)", ip, distinct - 1),
            HopFinal::Resolved(ip) => ip.clone(),
            HopFinal::Dark => "* * *".to_string(),
        };
        writeln!(writer, "{:>3}  {:<40} {:>7}", ttl, host, replies)?;
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "Stop: {}  Probes (est): {}",
        summary.stop_reason, summary.probes_used_est
    )?;

    Ok(())
}
