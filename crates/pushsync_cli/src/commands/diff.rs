//! Diff command implementation.

use super::read_object;
use pushsync_core::json;
use std::path::Path;

/// Runs the diff command.
pub fn run(from: &Path, to: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let from = read_object(from)?;
    let to = read_object(to)?;

    let diff = json::diff(&from, &to);
    tracing::debug!(keys = diff.len(), "computed diff");
    println!("{}", serde_json::to_string_pretty(&diff)?);

    Ok(())
}
