//! Domain types shared by the backends, the filter pipeline, and the hunt
//! orchestrator.
//!
//! Backends normalize their manager-specific payloads into [`WantedItem`], so
//! nothing downstream of `backends` ever sees a Sonarr or Radarr field name.

use std::fmt;

use chrono::{DateTime, Utc};

/// Supported library-manager API shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerKind {
    Sonarr,
    Radarr,
}

impl ManagerKind {
    pub const ALL: [ManagerKind; 2] = [ManagerKind::Sonarr, ManagerKind::Radarr];

    pub fn as_str(self) -> &'static str {
        match self {
            ManagerKind::Sonarr => "sonarr",
            ManagerKind::Radarr => "radarr",
        }
    }

    /// Instance name used when the config entry omits one.
    pub fn default_instance_name(self) -> &'static str {
        match self {
            ManagerKind::Sonarr => "Sonarr",
            ManagerKind::Radarr => "Radarr",
        }
    }
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a wanted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WantedKind {
    /// No file on disk yet.
    Missing,
    /// File exists but the quality cutoff is unmet.
    Upgrade,
}

impl WantedKind {
    pub const ALL: [WantedKind; 2] = [WantedKind::Missing, WantedKind::Upgrade];

    /// Stable identifier persisted in the state ledger.
    pub fn as_str(self) -> &'static str {
        match self {
            WantedKind::Missing => "missing",
            WantedKind::Upgrade => "upgrade",
        }
    }

    /// Wanted-list endpoint below `/api/v3/` for this kind.
    pub fn wanted_endpoint(self) -> &'static str {
        match self {
            WantedKind::Missing => "wanted/missing",
            WantedKind::Upgrade => "wanted/cutoff",
        }
    }
}

impl fmt::Display for WantedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate record returned by an instance, normalized across manager kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct WantedItem {
    /// Manager-side id, unique within one instance and kind.
    pub item_id: i64,
    pub monitored: bool,
    /// Air or release date; `None` when the manager reports none.
    pub release_date: Option<DateTime<Utc>>,
    pub kind: WantedKind,
    /// Human-readable label for logs, e.g. `Show S01E02` or `Movie (2021)`.
    pub label: String,
}

/// One page of a wanted list plus the list's total size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WantedPage {
    pub items: Vec<WantedItem>,
    pub total_count: u64,
}

/// Per-reason tally of items removed by the filter pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounts {
    pub unmonitored: usize,
    pub future: usize,
    pub recently_searched: usize,
    /// Same item seen on more than one sampled page.
    pub duplicate: usize,
}

impl FilterCounts {
    pub fn total(&self) -> usize {
        self.unmonitored + self.future + self.recently_searched + self.duplicate
    }
}

/// Outcome of one instance/kind cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellStatus {
    Completed,
    Failed(String),
}

/// Per-instance, per-kind tally used for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub instance_name: String,
    pub manager: ManagerKind,
    pub kind: WantedKind,
    pub status: CellStatus,
    pub fetched: usize,
    pub filtered: FilterCounts,
    /// Confirmed search triggers (always zero in dry-run).
    pub searched: usize,
    /// Items that would have been searched in dry-run.
    pub previewed: usize,
    pub skipped_quota: usize,
    /// `(item_id, reason)` for each trigger that failed.
    pub trigger_failures: Vec<(i64, String)>,
}

impl RunResult {
    pub fn new(instance_name: &str, manager: ManagerKind, kind: WantedKind) -> Self {
        Self {
            instance_name: instance_name.to_string(),
            manager,
            kind,
            status: CellStatus::Completed,
            fetched: 0,
            filtered: FilterCounts::default(),
            searched: 0,
            previewed: 0,
            skipped_quota: 0,
            trigger_failures: Vec::new(),
        }
    }

    pub fn failed(
        instance_name: &str,
        manager: ManagerKind,
        kind: WantedKind,
        reason: String,
    ) -> Self {
        Self {
            status: CellStatus::Failed(reason),
            ..Self::new(instance_name, manager, kind)
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, CellStatus::Failed(_))
    }
}

/// Aggregated results of one full pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub dry_run: bool,
    pub results: Vec<RunResult>,
}

impl RunSummary {
    /// True when any instance/kind cell could not be fetched.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(RunResult::is_failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|result| result.is_failed())
    }

    pub fn searched_total(&self, manager: ManagerKind, kind: WantedKind) -> usize {
        self.results
            .iter()
            .filter(|result| result.manager == manager && result.kind == kind)
            .map(|result| result.searched)
            .sum()
    }

    pub fn trigger_failure_count(&self) -> usize {
        self.results
            .iter()
            .map(|result| result.trigger_failures.len())
            .sum()
    }
}
