//! Resource usage of a container's main process.
//!
//! Readings come straight from `/proc/<pid>/stat`. There are no cgroups, so
//! the figures cover the main process only. Fields are `None` whenever a
//! value cannot be read; nothing is estimated.

use std::path::Path;

use burrow_common::types::ContainerId;
use nix::unistd::{SysconfVar, sysconf};
use serde::{Deserialize, Serialize};

/// Snapshot of a container's resource usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Container this snapshot belongs to.
    pub container_id: ContainerId,
    /// PID of the main process, if it is alive.
    pub pid: Option<u32>,
    /// User plus system CPU time in milliseconds.
    pub cpu_time_ms: Option<u64>,
    /// Resident set size in bytes.
    pub rss_bytes: Option<u64>,
    /// Virtual memory size in bytes.
    pub virtual_bytes: Option<u64>,
    /// Number of threads.
    pub threads: Option<u64>,
    /// Milliseconds since the main process was spawned.
    pub uptime_ms: Option<u64>,
}

impl MetricsSnapshot {
    /// Snapshot with every reading unavailable.
    #[must_use]
    pub const fn unavailable(container_id: ContainerId) -> Self {
        Self {
            container_id,
            pid: None,
            cpu_time_ms: None,
            rss_bytes: None,
            virtual_bytes: None,
            threads: None,
            uptime_ms: None,
        }
    }
}

/// Collects a snapshot for the process `pid`, or an empty one without it.
#[must_use]
pub fn collect_metrics(container_id: &ContainerId, pid: Option<u32>) -> MetricsSnapshot {
    let mut snapshot = MetricsSnapshot::unavailable(container_id.clone());
    let Some(pid) = pid else {
        return snapshot;
    };
    tracing::debug!(id = %container_id, pid, "collecting metrics");
    snapshot.pid = Some(pid);
    let stat_path = Path::new("/proc").join(pid.to_string()).join("stat");
    let Ok(stat) = std::fs::read_to_string(&stat_path) else {
        return snapshot;
    };
    if let Some(fields) = parse_stat(&stat) {
        snapshot.cpu_time_ms = clock_ticks()
            .map(|hz| (fields.utime + fields.stime).saturating_mul(1000) / hz);
        snapshot.rss_bytes = page_size().map(|page| fields.rss_pages.saturating_mul(page));
        snapshot.virtual_bytes = Some(fields.vsize);
        snapshot.threads = Some(fields.threads);
    }
    snapshot
}

#[derive(Debug, PartialEq, Eq)]
struct StatFields {
    utime: u64,
    stime: u64,
    threads: u64,
    vsize: u64,
    rss_pages: u64,
}

/// Parses the fields after the parenthesised command name, which may
/// itself contain spaces and parentheses.
fn parse_stat(stat: &str) -> Option<StatFields> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // Indices are offset by 3: `rest` starts at field 3 (state).
    let field = |n: usize| fields.get(n - 3).and_then(|v| v.parse::<u64>().ok());
    Some(StatFields {
        utime: field(14)?,
        stime: field(15)?,
        threads: field(20)?,
        vsize: field(23)?,
        rss_pages: field(24)?,
    })
}

fn clock_ticks() -> Option<u64> {
    sysconf(SysconfVar::CLK_TCK)
        .ok()
        .flatten()
        .and_then(|v| u64::try_from(v).ok())
        .filter(|v| *v > 0)
}

fn page_size() -> Option<u64> {
    sysconf(SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .and_then(|v| u64::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "4242 (sh (busy)) S 1 4242 4242 0 -1 4194560 120 0 0 0 \
                          7 3 0 0 20 0 2 0 1000 8192000 300 18446744073709551615 \
                          1 1 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0";

    #[test]
    fn parse_stat_handles_parentheses_in_name() {
        let fields = parse_stat(SAMPLE).expect("parse");
        assert_eq!(
            fields,
            StatFields {
                utime: 7,
                stime: 3,
                threads: 2,
                vsize: 8_192_000,
                rss_pages: 300,
            }
        );
    }

    #[test]
    fn parse_stat_rejects_truncated_input() {
        assert!(parse_stat("12 (sh) S 1 2").is_none());
        assert!(parse_stat("garbage").is_none());
    }

    #[test]
    fn no_pid_means_no_readings() {
        let snapshot = collect_metrics(&ContainerId::new("c1"), None);
        assert_eq!(snapshot, MetricsSnapshot::unavailable(ContainerId::new("c1")));
    }

    #[test]
    fn own_process_has_real_readings() {
        let snapshot = collect_metrics(&ContainerId::new("c1"), Some(std::process::id()));
        assert!(snapshot.rss_bytes.is_some_and(|b| b > 0));
        assert!(snapshot.threads.is_some_and(|t| t >= 1));
        assert!(snapshot.cpu_time_ms.is_some());
    }
}
