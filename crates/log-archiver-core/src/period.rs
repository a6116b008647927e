use crate::model::{ArchiveScope, CandidateFile, Group};
use chrono::{DateTime, Days, Local, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// The period a timestamp falls in: `YYYY-MM` or `YYYY-MM-DD`.
pub fn period_key(time: &DateTime<Local>, scope: ArchiveScope) -> String {
    match scope {
        ArchiveScope::Monthly => time.format("%Y-%m").to_string(),
        ArchiveScope::Daily => time.format("%Y-%m-%d").to_string(),
    }
}

/// `now` minus `days` calendar days, saturating at the earliest representable time.
pub fn days_before(now: &DateTime<Local>, days: u64) -> DateTime<Local> {
    now.checked_sub_days(Days::new(days))
        .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC.with_timezone(&Local))
}

/// Partition candidates by period and drop the period containing `now`.
///
/// Daily scope always drops today. Monthly scope drops the current month unless
/// `include_current_period` is set. Groups come back ordered by key; members keep
/// the order they had in `candidates`.
pub fn group_by_period(
    candidates: Vec<CandidateFile>,
    scope: ArchiveScope,
    include_current_period: bool,
    now: &DateTime<Local>,
) -> Vec<Group> {
    let mut groups: BTreeMap<String, Vec<CandidateFile>> = BTreeMap::new();
    for candidate in candidates {
        let key = period_key(&candidate.modified, scope);
        groups.entry(key).or_default().push(candidate);
    }

    let current = period_key(now, scope);
    let keep_current = scope == ArchiveScope::Monthly && include_current_period;
    if !keep_current {
        if let Some(skipped) = groups.remove(&current) {
            debug!(
                "Skipping current period {} ({} files)",
                current,
                skipped.len()
            );
        }
    }

    groups
        .into_iter()
        .map(|(key, files)| Group { key, files })
        .collect()
}
