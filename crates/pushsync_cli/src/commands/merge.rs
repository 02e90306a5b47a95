//! Merge command implementation.

use super::read_object;
use pushsync_core::json;
use std::path::Path;

/// Runs the merge command.
pub fn run(target: &Path, diff: &Path, keep_nulls: bool) -> Result<(), Box<dyn std::error::Error>> {
    let target = read_object(target)?;
    let diff = read_object(diff)?;

    let merged = json::merged(&target, &diff, !keep_nulls);
    println!("{}", serde_json::to_string_pretty(&merged)?);

    Ok(())
}
