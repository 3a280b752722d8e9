// JSONL encoding for persisted collections

use eyre::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Write;

/// Encode records one per line, in the given order
pub fn encode<T: Serialize>(records: &[T]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        writeln!(out, "{}", json)?;
    }
    Ok(out)
}

/// Decode a whole blob.
///
/// Blank lines are skipped. Any line that fails to parse fails the whole
/// blob: a partially readable collection cannot be trusted to be complete.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let mut records = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse JSON on line {}", line_num + 1))?;
        records.push(record);
    }

    Ok(records)
}
