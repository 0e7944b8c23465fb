//! Job-id selection expressions.
//!
//! `1`, `1,3`, `1;3`, `1 3` and `1-3` (inclusive) may be combined freely:
//! `"1-3;5, 7"`. Reversed ranges are swapped. The result is sorted and
//! de-duplicated.

use anyhow::{anyhow, bail, Result};
use backup_engine::BackupJob;
use std::collections::BTreeSet;

/// Widest range accepted in one token
const MAX_RANGE_SPAN: u32 = 10_000;

/// Parse a selection expression into sorted, unique job ids
pub fn parse_selection(expr: &str) -> Result<Vec<u32>> {
    let mut ids = BTreeSet::new();

    let tokens = expr
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|t| !t.is_empty());

    for token in tokens {
        match token.split_once('-') {
            Some((start, end)) => {
                let start = parse_id(start, token)?;
                let end = parse_id(end, token)?;
                let (low, high) = if start <= end { (start, end) } else { (end, start) };
                if high - low >= MAX_RANGE_SPAN {
                    bail!("job range '{token}' is too wide");
                }
                ids.extend(low..=high);
            }
            None => {
                ids.insert(parse_id(token, token)?);
            }
        }
    }

    if ids.is_empty() {
        bail!("empty job selection");
    }
    Ok(ids.into_iter().collect())
}

fn parse_id(value: &str, token: &str) -> Result<u32> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| anyhow!("invalid job selection '{token}'"))
}

/// Pick the selected jobs in id order. Returns the jobs found and the ids
/// that matched nothing.
pub fn resolve(ids: &[u32], jobs: &[BackupJob]) -> (Vec<BackupJob>, Vec<u32>) {
    let mut found = Vec::new();
    let mut missing = Vec::new();

    for id in ids {
        match jobs.iter().find(|job| job.id == *id) {
            Some(job) => found.push(job.clone()),
            None => missing.push(*id),
        }
    }

    (found, missing)
}
