use anyhow::Result;
use std::io::Write;

use crate::state::TraceSummary;

/// Export the per-TTL diagnostic table as CSV
pub fn export_csv<W: Write>(summary: &TraceSummary, mut writer: W) -> Result<()> {
    writeln!(
        writer,
        "ttl,final,attempts,timeouts,responders,base_cap,dyn_cap,pool_in,pool_out"
    )?;

    for hop in summary.probed_hops() {
        let final_hop = hop
            .final_hop
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_default();

        // responders as "ip=count" pairs in first-seen order
        let responders = hop
            .counts
            .iter()
            .map(|(ip, n)| format!("{}={}", ip, n))
            .collect::<Vec<_>>()
            .join(";");

        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{}",
            hop.ttl,
            escape_csv(&final_hop),
            hop.attempts,
            hop.timeouts,
            escape_csv(&responders),
            hop.base_cap,
            hop.dyn_cap,
            hop.pool_in,
            hop.pool_out
        )?;
    }

    Ok(())
}

/// Escape a string for CSV (quote if contains comma, quote, or newline)
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
