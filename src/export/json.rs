use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use crate::state::TraceSummary;

/// Largest summary file accepted for replay
const MAX_REPLAY_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Export a summary (or a single probe event) as pretty JSON
pub fn export_json<T: Serialize, W: Write>(value: &T, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    Ok(())
}

/// Load a previously exported summary
pub fn load_summary(path: &Path) -> Result<TraceSummary> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open replay file: {}", path.display()))?;

    let metadata = file
        .metadata()
        .with_context(|| format!("Failed to read replay file metadata: {}", path.display()))?;
    if metadata.len() > MAX_REPLAY_SIZE {
        anyhow::bail!("Replay file too large (max 10MB): {}", path.display());
    }

    let summary = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse replay file: {}", path.display()))?;
    Ok(summary)
}
