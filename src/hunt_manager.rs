//! Hunt orchestrator.
//!
//! Drives one bounded pass: for every instance, for every enabled kind,
//! fetch -> sample -> filter -> trigger -> record. Instances and kinds run
//! strictly in sequence. Fetch and trigger failures are folded into the run
//! summary; only config and state-store errors end the pass early.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::Rng;

use crate::backends::ManagerBackend;
use crate::config::ResolvedInstance;
use crate::error::HuntError;
use crate::hunt_filter::apply_filters;
use crate::protocol::{CellStatus, ManagerKind, RunResult, RunSummary, WantedItem, WantedKind};
use crate::sampling::PageSampler;
use crate::state_ledger::StateLedger;

/// A resolved instance paired with the backend that talks to it.
pub struct HuntTarget {
    pub instance: ResolvedInstance,
    pub backend: Box<dyn ManagerBackend>,
}

/// Runs one hunt pass against a set of targets.
pub struct HuntManager<'a, R: Rng> {
    ledger: &'a StateLedger,
    sampler: PageSampler<R>,
    page_size: u32,
    dry_run: bool,
    run_id: String,
    clock: fn() -> DateTime<Utc>,
}

impl<'a, R: Rng> HuntManager<'a, R> {
    pub fn new(
        ledger: &'a StateLedger,
        sampler: PageSampler<R>,
        page_size: u32,
        dry_run: bool,
    ) -> Self {
        Self {
            ledger,
            sampler,
            page_size: page_size.max(1),
            dry_run,
            run_id: uuid::Uuid::new_v4().to_string(),
            clock: Utc::now,
        }
    }

    /// Replaces the wall clock used for filtering and ledger timestamps.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Executes the full pass. Returns `Err` only for fatal errors.
    pub fn run(&mut self, targets: &[HuntTarget]) -> Result<RunSummary, HuntError> {
        let now = (self.clock)();
        info!(
            "Hunt run {} started: {} instance(s){}",
            self.run_id,
            targets.len(),
            if self.dry_run { " [DRY RUN]" } else { "" }
        );

        if !self.dry_run {
            self.purge_expired(targets, now)?;
        }

        let mut results = Vec::new();
        for target in targets {
            self.process_instance(target, now, &mut results)?;
        }

        Ok(RunSummary {
            run_id: self.run_id.clone(),
            dry_run: self.dry_run,
            results,
        })
    }

    /// Purges with the longest TTL in use so no instance loses a live record.
    fn purge_expired(&self, targets: &[HuntTarget], now: DateTime<Utc>) -> Result<(), HuntError> {
        let Some(max_ttl_hours) = targets.iter().map(|target| target.instance.ttl_hours).max()
        else {
            return Ok(());
        };
        let purged = self.ledger.purge_expired(max_ttl_hours, now)?;
        if purged > 0 {
            info!("Purged {purged} expired state entries (older than {max_ttl_hours}h)");
        }
        Ok(())
    }

    fn process_instance(
        &mut self,
        target: &HuntTarget,
        now: DateTime<Utc>,
        results: &mut Vec<RunResult>,
    ) -> Result<(), HuntError> {
        let instance = &target.instance;
        let kinds = instance.enabled_kinds();
        info!(
            "[{}] Processing {} instance",
            instance.name,
            instance.manager.as_str().to_uppercase()
        );
        if kinds.is_empty() {
            info!("[{}] hunt_missing and hunt_upgrades are both 0, nothing to do", instance.name);
            return Ok(());
        }

        match target.backend.system_version() {
            Ok(version) => info!("[{}] Connected - version {version}", instance.name),
            Err(err) => {
                error!("{err}");
                for kind in kinds {
                    results.push(RunResult::failed(
                        &instance.name,
                        instance.manager,
                        kind,
                        err.to_string(),
                    ));
                }
                return Ok(());
            }
        }

        for kind in kinds {
            match self.hunt_kind(target, kind, now) {
                Ok(result) => results.push(result),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    let err = err.with_kind(kind);
                    error!("{err}");
                    results.push(RunResult::failed(
                        &instance.name,
                        instance.manager,
                        kind,
                        err.to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Fetches page 1 to learn the list size, then any other sampled pages.
    fn collect_candidates(
        &mut self,
        target: &HuntTarget,
        kind: WantedKind,
    ) -> Result<Vec<WantedItem>, HuntError> {
        let instance = &target.instance;
        let first_page =
            target
                .backend
                .fetch_wanted(kind, 1, self.page_size, instance.monitored_only)?;
        let total_count = first_page.total_count.max(first_page.items.len() as u64);
        if total_count == 0 {
            info!("[{}] No {kind} items found", instance.name);
            return Ok(Vec::new());
        }

        let selection = self.sampler.select_pages(total_count, self.page_size, 1);
        let total_pages = PageSampler::<R>::total_pages(total_count, self.page_size);
        if selection.exhaustive {
            info!(
                "[{}] {total_count} {kind} items total, fetching all {total_pages} page(s)",
                instance.name
            );
        } else {
            info!(
                "[{}] {total_count} {kind} items total, sampling page(s) {:?} of {total_pages}",
                instance.name, selection.pages
            );
        }

        let mut items = Vec::new();
        if selection.pages.contains(&1) {
            items.extend(first_page.items);
        }
        for page in selection.to_fetch {
            let next_page =
                target
                    .backend
                    .fetch_wanted(kind, page, self.page_size, instance.monitored_only)?;
            debug!(
                "[{}] page {page} returned {} {kind} items",
                instance.name,
                next_page.items.len()
            );
            items.extend(next_page.items);
        }
        Ok(items)
    }

    fn hunt_kind(
        &mut self,
        target: &HuntTarget,
        kind: WantedKind,
        now: DateTime<Utc>,
    ) -> Result<RunResult, HuntError> {
        let instance = &target.instance;
        let quota = instance.quota(kind);
        info!("[{}] Hunting {kind} items (limit={quota})", instance.name);

        let mut result = RunResult::new(&instance.name, instance.manager, kind);
        let items = self.collect_candidates(target, kind)?;
        result.fetched = items.len();

        let outcome = apply_filters(items, instance, kind, self.ledger, now)?;
        result.filtered = outcome.counts;
        result.skipped_quota = outcome.skipped_quota;
        if outcome.selected.is_empty() && result.fetched > 0 {
            info!(
                "[{}] No eligible {kind} items in this sample ({} filtered)",
                instance.name,
                outcome.counts.total()
            );
        }

        for item in outcome.selected {
            if self.dry_run {
                info!(
                    "[{}] [DRY RUN] Would search {kind}: {} (id={})",
                    instance.name, item.label, item.item_id
                );
                result.previewed += 1;
                continue;
            }
            match target.backend.trigger_search(item.item_id) {
                Ok(()) => {
                    self.ledger.record_searched(
                        &instance.instance_id,
                        item.item_id,
                        kind,
                        (self.clock)(),
                    )?;
                    info!(
                        "[{}] Triggered {kind} search: {} (id={})",
                        instance.name, item.label, item.item_id
                    );
                    result.searched += 1;
                }
                Err(err) => {
                    error!("{err} ({})", item.label);
                    result.trigger_failures.push((item.item_id, err.to_string()));
                }
            }
        }
        Ok(result)
    }
}

/// Logs the end-of-run summary, failures last.
pub fn log_summary(summary: &RunSummary) {
    info!(
        "=== Run {} complete{} ===",
        summary.run_id,
        if summary.dry_run { " (dry run)" } else { "" }
    );
    for result in &summary.results {
        if result.is_failed() {
            continue;
        }
        info!(
            "  [{}] {} {}: fetched={} unmonitored={} future={} recent={} duplicate={} \
             searched={} previewed={} over_quota={} trigger_failures={}",
            result.instance_name,
            result.manager,
            result.kind,
            result.fetched,
            result.filtered.unmonitored,
            result.filtered.future,
            result.filtered.recently_searched,
            result.filtered.duplicate,
            result.searched,
            result.previewed,
            result.skipped_quota,
            result.trigger_failures.len()
        );
    }
    for manager in ManagerKind::ALL {
        for kind in WantedKind::ALL {
            info!(
                "  {} {} searched: {}",
                manager,
                kind,
                summary.searched_total(manager, kind)
            );
        }
    }
    for failed in summary.failures() {
        if let CellStatus::Failed(reason) = &failed.status {
            error!(
                "  FAILED [{}] {} {}: {reason}",
                failed.instance_name, failed.manager, failed.kind
            );
        }
    }
    let trigger_failures = summary.trigger_failure_count();
    if trigger_failures > 0 {
        warn!("  {trigger_failures} search trigger(s) failed and will be retried next run");
    }
}
