//! In-app safety net for notifications that arrive late or not at all.
//!
//! Every pass re-derives due-ness from [`AlarmRecord::next_occurrence`]: an
//! alarm is due when its occurrence lies between `now - tolerance` and `now`.
//! Occurrences that slipped out of the window are treated as missed and are
//! never caught up on.

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use log::{debug, info};

use crate::alarm::{AlarmId, AlarmRecord};

pub const DEFAULT_TOLERANCE_SECS: i64 = 120;

/// An alarm found inside the due window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueAlarm {
    pub id: AlarmId,
    pub occurrence: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DueAlarmScanner {
    tolerance: Duration,
    /// last occurrence handed out per alarm
    announced: HashMap<AlarmId, DateTime<Utc>>,
}

impl Default for DueAlarmScanner {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TOLERANCE_SECS))
    }
}

impl DueAlarmScanner {
    #[must_use]
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            announced: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn tolerance(&self) -> Duration {
        self.tolerance
    }

    #[must_use]
    pub fn is_due<Tz: TimeZone>(&self, now: &DateTime<Tz>, occurrence: &DateTime<Tz>) -> bool {
        let delta = now.clone().signed_duration_since(occurrence.clone());
        delta >= Duration::zero() && delta <= self.tolerance
    }

    /// The occurrence of `alarm` that falls inside the window ending at `now`.
    ///
    /// The lookup starts just before the window opens, since
    /// [`AlarmRecord::next_occurrence`] only returns instants strictly after
    /// its argument.
    #[must_use]
    pub fn window_occurrence<Tz: TimeZone>(
        &self,
        alarm: &AlarmRecord,
        now: &DateTime<Tz>,
    ) -> Option<DateTime<Tz>> {
        let opens = now
            .clone()
            .checked_sub_signed(self.tolerance + Duration::seconds(1))?;
        alarm
            .next_occurrence(&opens)
            .filter(|occurrence| self.is_due(now, occurrence))
    }

    /// Returns the first alarm, in collection order, whose occurrence is due
    /// and was not handed out before. Further due alarms wait for a later
    /// pass and are dropped once they leave the window.
    pub fn scan<Tz: TimeZone>(
        &mut self,
        alarms: &[AlarmRecord],
        now: &DateTime<Tz>,
    ) -> Option<DueAlarm> {
        self.prune(&now.with_timezone(&Utc));
        for alarm in alarms.iter().filter(|alarm| alarm.is_enabled()) {
            let Some(occurrence) = self.window_occurrence(alarm, now) else {
                continue;
            };
            let occurrence = occurrence.with_timezone(&Utc);
            if self.was_announced(&alarm.id(), &occurrence) {
                debug!("alarm {} already announced", alarm.time_string());
                continue;
            }
            let late = now.with_timezone(&Utc).signed_duration_since(occurrence);
            info!(
                "alarm {} is due ({}s late)",
                alarm.time_string(),
                late.num_seconds()
            );
            self.mark_announced(alarm.id(), occurrence);
            return Some(DueAlarm {
                id: alarm.id(),
                occurrence,
            });
        }
        None
    }

    /// Records that `occurrence` of alarm `id` already rang through another
    /// path, so no pass announces it again.
    pub fn mark_announced(&mut self, id: AlarmId, occurrence: DateTime<Utc>) {
        self.announced.insert(id, occurrence);
    }

    #[must_use]
    pub fn was_announced(&self, id: &AlarmId, occurrence: &DateTime<Utc>) -> bool {
        self.announced.get(id) == Some(occurrence)
    }

    fn prune(&mut self, now: &DateTime<Utc>) {
        let tolerance = self.tolerance;
        self.announced
            .retain(|_, occurrence| now.signed_duration_since(*occurrence) <= tolerance);
    }
}
