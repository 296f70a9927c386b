//! Reminder queries
//!
//! Pure filters over an already loaded set of reminders. Every function takes
//! `now` explicitly and returns the matching records in input order.

use crate::models::ReminderRecord;
use serde::Serialize;

/// Open reminders due after `now`
pub fn pending(reminders: &[ReminderRecord], now: i64) -> Vec<ReminderRecord> {
    select(reminders, |r| !r.is_completed && r.reminder_time > now)
}

/// Open reminders due before `now`
pub fn overdue(reminders: &[ReminderRecord], now: i64) -> Vec<ReminderRecord> {
    select(reminders, |r| r.is_overdue_at(now))
}

/// Open reminders due within the next `window_minutes`
pub fn upcoming(reminders: &[ReminderRecord], now: i64, window_minutes: i64) -> Vec<ReminderRecord> {
    select(reminders, |r| r.is_upcoming_at(now, window_minutes))
}

pub fn completed(reminders: &[ReminderRecord]) -> Vec<ReminderRecord> {
    select(reminders, |r| r.is_completed)
}

/// Display order: latest due time first
pub fn sort_for_display(reminders: &mut [ReminderRecord]) {
    reminders.sort_by(|a, b| b.reminder_time.cmp(&a.reminder_time));
}

fn select<F>(reminders: &[ReminderRecord], predicate: F) -> Vec<ReminderRecord>
where
    F: Fn(&ReminderRecord) -> bool,
{
    reminders.iter().filter(|r| predicate(r)).cloned().collect()
}

/// Counts shown on the reminder list screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderStats {
    pub total: usize,
    pub pending: usize,
    pub overdue: usize,
    pub upcoming: usize,
    pub completed: usize,
}

impl ReminderStats {
    pub fn compute(reminders: &[ReminderRecord], now: i64, window_minutes: i64) -> Self {
        reminders.iter().fold(
            Self {
                total: reminders.len(),
                ..Self::default()
            },
            |mut stats, r| {
                if r.is_completed {
                    stats.completed += 1;
                } else if r.reminder_time > now {
                    stats.pending += 1;
                } else if r.is_overdue_at(now) {
                    stats.overdue += 1;
                }
                if r.is_upcoming_at(now, window_minutes) {
                    stats.upcoming += 1;
                }
                stats
            },
        )
    }
}
