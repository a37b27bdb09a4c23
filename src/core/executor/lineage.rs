// src/core/executor/lineage.rs

//! Snapshot naming and lineage classification.
//!
//! The active lineage of a job is the chain of `@zelta_<UTC>_<jobId>`
//! snapshots; embedding both the instant and the job id makes names
//! collision-proof and keeps unrelated snapshots out of incremental
//! discovery and pruning. Datasets renamed to `<name>.pre_sylve_<id>` during
//! a restore are preserved lineages and are never pruned.

use chrono::{DateTime, Utc};

pub const SNAPSHOT_PREFIX: &str = "zelta_";
pub const PRESERVE_INFIX: &str = ".pre_sylve_";

/// How a snapshot chain or dataset came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lineage {
    /// Produced by the job's normal schedule; subject to pruning.
    Active,
    /// A dataset set aside before a restore; retained until deleted manually.
    Preserved,
    /// Anything else on the dataset: operator snapshots, other jobs'
    /// lineages. Ignored by this job entirely.
    OutOfBand,
}

/// The short (post-`@`) name: `zelta_<utcYYYYmmddHHMMSS>_<jobId>`.
pub fn snapshot_short_name(at: DateTime<Utc>, job_id: i64) -> String {
    format!("{}{}_{}", SNAPSHOT_PREFIX, at.format("%Y%m%d%H%M%S"), job_id)
}

/// Strips the dataset part of a full `dataset@snap` name.
pub fn short_name(full: &str) -> &str {
    full.rsplit_once('@').map(|(_, s)| s).unwrap_or(full)
}

/// True when a short snapshot name belongs to the given job's active lineage.
pub fn belongs_to_job(short: &str, job_id: i64) -> bool {
    let Some(rest) = short.strip_prefix(SNAPSHOT_PREFIX) else {
        return false;
    };
    let Some(stamp) = rest.strip_suffix(&format!("_{job_id}")) else {
        return false;
    };
    !stamp.is_empty() && stamp.bytes().all(|b| b.is_ascii_digit())
}

pub fn classify_snapshot(short: &str, job_id: i64) -> Lineage {
    if belongs_to_job(short, job_id) {
        Lineage::Active
    } else {
        Lineage::OutOfBand
    }
}

pub fn classify_dataset(name: &str) -> Lineage {
    if name.contains(PRESERVE_INFIX) {
        Lineage::Preserved
    } else {
        Lineage::Active
    }
}

/// The creation instant embedded in an active-lineage short name.
pub fn parse_timestamp(short: &str) -> Option<DateTime<Utc>> {
    let rest = short.strip_prefix(SNAPSHOT_PREFIX)?;
    let stamp = rest.split('_').next()?;
    chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S")
        .ok()
        .map(|n| n.and_utc())
}

/// Filters a creation-ordered snapshot list (full names) down to the job's
/// active lineage, preserving order.
pub fn job_snapshots<'a>(full_names: &'a [String], job_id: i64) -> Vec<&'a str> {
    full_names
        .iter()
        .map(String::as_str)
        .filter(|full| belongs_to_job(short_name(full), job_id))
        .collect()
}

/// The incremental base: the newest local active-lineage snapshot
/// (excluding `exclude_short`) that is also present remotely.
pub fn latest_common_base(
    local_in_creation_order: &[String],
    remote: &[String],
    job_id: i64,
    exclude_short: &str,
) -> Option<String> {
    let remote_shorts: std::collections::HashSet<&str> = remote
        .iter()
        .map(|f| short_name(f))
        .filter(|s| belongs_to_job(s, job_id))
        .collect();

    local_in_creation_order
        .iter()
        .rev()
        .map(|f| short_name(f))
        .filter(|s| *s != exclude_short && belongs_to_job(s, job_id))
        .find(|s| remote_shorts.contains(s))
        .map(str::to_string)
}

/// Active-lineage snapshots to destroy so that exactly `keep_last` remain.
/// Input must be in creation order; out-of-band snapshots are untouched.
pub fn prune_victims(
    full_names_in_creation_order: &[String],
    job_id: i64,
    keep_last: usize,
) -> Vec<String> {
    let active = job_snapshots(full_names_in_creation_order, job_id);
    if active.len() <= keep_last {
        return Vec::new();
    }
    active[..active.len() - keep_last]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// `<destination>.pre_sylve_<randId>` for pre-restore preservation.
pub fn preserved_dataset_name(destination: &str, rand_id: &str) -> String {
    format!("{destination}{PRESERVE_INFIX}{rand_id}")
}
