//! Pre-versioning storage format.
//!
//! Rows written before the envelope existed hold a bare JSON object from the
//! old virt layer:
//!
//! ```json
//! {"cells": [{"id": 0, "cpus": "0,1", "mem": {"total": 1024}, "pagesize": null}]}
//! ```
//!
//! `cpus` is a cpu-spec string: comma-separated entries, each a single CPU
//! (`5`), an inclusive range (`0-3`), or a caret exclusion (`^2`) removing a
//! previously included CPU. This grammar is a fixed external contract: the
//! decoder stays until an operator can guarantee no legacy rows remain, which
//! may be never.

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

use crate::core::cell::NumaCell;
use crate::core::error::InvalidCpuSpec;
use crate::core::identity::InstanceId;
use crate::core::topology::NumaTopology;

/// Legacy payload does not match the documented grammar.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LegacyError {
    #[error("legacy payload is malformed: {reason}")]
    Shape { reason: String },

    #[error("legacy cell {index} is malformed: {reason}")]
    Cell { index: usize, reason: String },

    #[error(transparent)]
    CpuSpec(#[from] InvalidCpuSpec),
}

/// Upper bound on the width of one range entry, far above any real host's
/// CPU count. A stored spec like `0-4294967295` is grammatical but must not
/// materialize billions of entries.
const MAX_RANGE_WIDTH: u32 = 65_536;

/// Parse a cpu-spec string into a CPU set.
///
/// Exclusions apply against everything included so far, regardless of entry
/// order within the string.
pub fn parse_cpu_spec(spec: &str) -> Result<BTreeSet<u32>, InvalidCpuSpec> {
    let invalid = |reason: String| InvalidCpuSpec {
        raw: spec.to_string(),
        reason,
    };
    let parse_cpu = |entry: &str| {
        entry
            .trim()
            .parse::<u32>()
            .map_err(|_| invalid(format!("`{}` is not a cpu number", entry.trim())))
    };

    let mut include = BTreeSet::new();
    let mut exclude = BTreeSet::new();
    for entry in spec.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(invalid("empty entry".to_string()));
        }
        if let Some(excluded) = entry.strip_prefix('^') {
            exclude.insert(parse_cpu(excluded)?);
        } else if let Some((lo, hi)) = entry.split_once('-') {
            let lo = parse_cpu(lo)?;
            let hi = parse_cpu(hi)?;
            if lo > hi {
                return Err(invalid(format!("range `{entry}` is inverted")));
            }
            if hi - lo >= MAX_RANGE_WIDTH {
                return Err(invalid(format!("range `{entry}` is implausibly wide")));
            }
            include.extend(lo..=hi);
        } else {
            include.insert(parse_cpu(entry)?);
        }
    }
    Ok(&include - &exclude)
}

/// Format a CPU set as a cpu-spec string, collapsing runs into ranges.
pub fn format_cpu_spec(cpuset: &BTreeSet<u32>) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut run: Option<(u32, u32)> = None;
    for &cpu in cpuset {
        run = match run {
            Some((start, end)) if cpu == end + 1 => Some((start, cpu)),
            Some((start, end)) => {
                parts.push(format_run(start, end));
                Some((cpu, cpu))
            }
            None => Some((cpu, cpu)),
        };
    }
    if let Some((start, end)) = run {
        parts.push(format_run(start, end));
    }
    parts.join(",")
}

fn format_run(start: u32, end: u32) -> String {
    if start == end {
        format!("{start}")
    } else {
        format!("{start}-{end}")
    }
}

fn cell_u64(cell: &Value, index: usize, key: &str) -> Result<u64, LegacyError> {
    cell.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| LegacyError::Cell {
            index,
            reason: format!("missing or non-integer `{key}`"),
        })
}

/// Lift a legacy payload into the current object shape.
///
/// The legacy form never stored an instance id, so the caller supplies it.
/// The result carries no pending changes: its values equal what is stored,
/// and re-encoding on the next save is enough to upgrade the row.
pub fn topology_from_legacy(
    instance_id: InstanceId,
    payload: &Value,
) -> Result<NumaTopology, LegacyError> {
    let cells_value = payload
        .get("cells")
        .and_then(Value::as_array)
        .ok_or_else(|| LegacyError::Shape {
            reason: "missing `cells` array".to_string(),
        })?;

    let mut cells = Vec::with_capacity(cells_value.len());
    for (index, cell) in cells_value.iter().enumerate() {
        let id = u32::try_from(cell_u64(cell, index, "id")?).map_err(|_| LegacyError::Cell {
            index,
            reason: "`id` exceeds 32 bits".to_string(),
        })?;
        let cpus = cell
            .get("cpus")
            .and_then(Value::as_str)
            .ok_or_else(|| LegacyError::Cell {
                index,
                reason: "missing or non-string `cpus`".to_string(),
            })?;
        let cpuset = parse_cpu_spec(cpus)?;
        let memory = cell
            .get("mem")
            .and_then(|mem| mem.get("total"))
            .and_then(Value::as_u64)
            .ok_or_else(|| LegacyError::Cell {
                index,
                reason: "missing or non-integer `mem.total`".to_string(),
            })?;
        let pagesize = match cell.get("pagesize") {
            Some(Value::Null) | None => None,
            Some(value) => Some(u32::try_from(value.as_u64().ok_or_else(|| {
                LegacyError::Cell {
                    index,
                    reason: "non-integer `pagesize`".to_string(),
                }
            })?)
            .map_err(|_| LegacyError::Cell {
                index,
                reason: "`pagesize` exceeds 32 bits".to_string(),
            })?),
        };
        cells.push(NumaCell::decoded(id, cpuset, memory, pagesize));
    }

    Ok(NumaTopology::decoded(instance_id, cells, None))
}
