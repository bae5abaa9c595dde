//! Filter and quota pipeline for one instance/kind.
//!
//! Filters run in a fixed order: monitored-only, skip-future, recently
//! searched. Survivors are sorted by ascending item id and truncated to the
//! quota, so the truncation never depends on API response order.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::debug;

use crate::config::ResolvedInstance;
use crate::error::HuntError;
use crate::protocol::{FilterCounts, WantedItem, WantedKind};
use crate::state_ledger::StateLedger;

/// Items to search plus per-reason counts of everything dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub selected: Vec<WantedItem>,
    pub counts: FilterCounts,
    pub skipped_quota: usize,
}

fn is_future(item: &WantedItem, now: DateTime<Utc>) -> bool {
    item.release_date.is_some_and(|date| date > now)
}

/// Applies every filter and the quota cap. Ledger errors are fatal and
/// propagate unchanged.
pub fn apply_filters(
    items: Vec<WantedItem>,
    instance: &ResolvedInstance,
    kind: WantedKind,
    ledger: &StateLedger,
    now: DateTime<Utc>,
) -> Result<FilterOutcome, HuntError> {
    let mut counts = FilterCounts::default();
    let mut seen_ids = HashSet::new();
    let mut candidates = Vec::with_capacity(items.len());

    for item in items {
        if !seen_ids.insert(item.item_id) {
            counts.duplicate += 1;
            continue;
        }
        if instance.monitored_only && !item.monitored {
            counts.unmonitored += 1;
            continue;
        }
        if instance.skip_future && is_future(&item, now) {
            counts.future += 1;
            continue;
        }
        if ledger.is_recently_searched(
            &instance.instance_id,
            item.item_id,
            kind,
            instance.ttl_hours,
            now,
        )? {
            debug!(
                "[{}] {} (id={}) searched within the last {}h, skipping",
                instance.name, item.label, item.item_id, instance.ttl_hours
            );
            counts.recently_searched += 1;
            continue;
        }
        candidates.push(item);
    }

    candidates.sort_by_key(|item| item.item_id);
    let quota = instance.quota(kind);
    let skipped_quota = candidates.len().saturating_sub(quota);
    candidates.truncate(quota);

    Ok(FilterOutcome {
        selected: candidates,
        counts,
        skipped_quota,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::apply_filters;
    use crate::config::ResolvedInstance;
    use crate::protocol::{ManagerKind, WantedItem, WantedKind};
    use crate::state_ledger::StateLedger;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn instance(hunt_missing: usize, monitored_only: bool, skip_future: bool) -> ResolvedInstance {
        ResolvedInstance {
            manager: ManagerKind::Sonarr,
            name: "Main".to_string(),
            instance_id: "sonarr/Main".to_string(),
            url: "http://localhost:8989".to_string(),
            api_key: "key".to_string(),
            hunt_missing,
            hunt_upgrades: 0,
            monitored_only,
            skip_future,
            ttl_hours: 168,
        }
    }

    fn item(item_id: i64, monitored: bool, release_offset_days: Option<i64>) -> WantedItem {
        WantedItem {
            item_id,
            monitored,
            release_date: release_offset_days.map(|days| now() + Duration::days(days)),
            kind: WantedKind::Missing,
            label: format!("Item {item_id}"),
        }
    }

    #[test]
    fn test_filters_apply_in_order_and_count_reasons() {
        let ledger = StateLedger::open_in_memory().expect("ledger");
        let items = vec![
            item(1, true, Some(-10)),
            item(2, false, Some(-10)),
            item(3, false, Some(5)),
            item(4, true, Some(5)),
            item(5, true, None),
        ];

        let policy = instance(10, true, true);
        let outcome = apply_filters(items, &policy, WantedKind::Missing, &ledger, now())
            .expect("filters should run");
        let ids: Vec<i64> = outcome.selected.iter().map(|item| item.item_id).collect();
        assert_eq!(ids, vec![1, 5]);
        assert_eq!(outcome.counts.unmonitored, 2);
        assert_eq!(outcome.counts.future, 1);
        assert_eq!(outcome.counts.recently_searched, 0);
        assert_eq!(outcome.skipped_quota, 0);
    }

    #[test]
    fn test_disabled_filters_keep_everything() {
        let ledger = StateLedger::open_in_memory().expect("ledger");
        let items = vec![item(1, false, Some(30)), item(2, false, None)];
        let policy = instance(10, false, false);
        let outcome = apply_filters(items, &policy, WantedKind::Missing, &ledger, now())
            .expect("filters should run");
        assert_eq!(outcome.selected.len(), 2);
        assert_eq!(outcome.counts.total(), 0);
    }

    #[test]
    fn test_recently_searched_items_are_dropped() {
        let ledger = StateLedger::open_in_memory().expect("ledger");
        ledger
            .record_searched("sonarr/Main", 2, WantedKind::Missing, now() - Duration::hours(10))
            .expect("record");
        ledger
            .record_searched("sonarr/Main", 3, WantedKind::Missing, now() - Duration::hours(200))
            .expect("record");

        let items = vec![item(1, true, None), item(2, true, None), item(3, true, None)];
        let policy = instance(10, true, true);
        let outcome = apply_filters(items, &policy, WantedKind::Missing, &ledger, now())
            .expect("filters should run");
        let ids: Vec<i64> = outcome.selected.iter().map(|item| item.item_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(outcome.counts.recently_searched, 1);
    }

    #[test]
    fn test_quota_truncates_in_ascending_id_order() {
        let ledger = StateLedger::open_in_memory().expect("ledger");
        let items = vec![
            item(40, true, None),
            item(10, true, None),
            item(30, true, None),
            item(20, true, None),
        ];
        let policy = instance(2, true, true);
        let outcome = apply_filters(items, &policy, WantedKind::Missing, &ledger, now())
            .expect("filters should run");
        let ids: Vec<i64> = outcome.selected.iter().map(|item| item.item_id).collect();
        assert_eq!(ids, vec![10, 20]);
        assert_eq!(outcome.skipped_quota, 2);
    }

    #[test]
    fn test_duplicate_ids_across_pages_are_counted_once() {
        let ledger = StateLedger::open_in_memory().expect("ledger");
        let items = vec![item(1, true, None), item(2, true, None), item(1, true, None)];
        let policy = instance(10, true, true);
        let outcome = apply_filters(items, &policy, WantedKind::Missing, &ledger, now())
            .expect("filters should run");
        assert_eq!(outcome.selected.len(), 2);
        assert_eq!(outcome.counts.duplicate, 1);
    }
}
