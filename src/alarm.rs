use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    calendar, collection::GetId, config::always_true, error::AlarmError, repeat::RepeatPolicy,
};

pub type AlarmId = Uuid;

/// represents an alarm
/// the time of day has no zone, it is read on the local calendar of whatever
/// "now" it is evaluated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRecord {
    id: AlarmId,
    hour: u32,
    minute: u32,
    #[serde(default)]
    repeat: RepeatPolicy,
    #[serde(default = "always_true")]
    enabled: bool,
    volume: f64,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl AlarmRecord {
    #[must_use]
    pub const fn id(&self) -> AlarmId {
        self.id
    }

    #[must_use]
    pub const fn hour(&self) -> u32 {
        self.hour
    }

    #[must_use]
    pub const fn minute(&self) -> u32 {
        self.minute
    }

    #[must_use]
    pub const fn repeat(&self) -> &RepeatPolicy {
        &self.repeat
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn volume(&self) -> f64 {
        self.volume
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// `HH:MM`
    #[must_use]
    pub fn time_string(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    pub fn set_time(&mut self, hour: u32, minute: u32) -> Result<(), AlarmError> {
        check_time(hour, minute)?;
        self.hour = hour;
        self.minute = minute;
        Ok(())
    }

    pub fn set_repeat(&mut self, repeat: RepeatPolicy) {
        self.repeat = repeat;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_volume(&mut self, volume: f64) -> Result<(), AlarmError> {
        check_volume(volume)?;
        self.volume = volume;
        Ok(())
    }

    /// used so that when we edit an alarm we don't lose its id or creation time
    pub fn apply(&mut self, rhs: Self) {
        self.hour = rhs.hour;
        self.minute = rhs.minute;
        self.repeat = rhs.repeat;
        self.enabled = rhs.enabled;
        self.volume = rhs.volume;
    }

    pub(crate) fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.modified_at = now;
    }

    /// The earliest instant strictly after `now` at which this alarm fires.
    ///
    /// Returns `None` for disabled alarms and for policies that match no day
    /// (a custom policy with no days). An alarm set for the current minute
    /// counts as already passed and rolls forward.
    #[must_use]
    pub fn next_occurrence<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        if !self.enabled {
            return None;
        }
        let tz = now.timezone();
        let today = calendar::today(now);
        let on = |date: NaiveDate| calendar::at(&tz, date, self.hour, self.minute);
        let upcoming_today = on(today).filter(|candidate| candidate > now);

        match &self.repeat {
            RepeatPolicy::Once | RepeatPolicy::Daily => {
                upcoming_today.or_else(|| on(calendar::add_days(today, 1)?))
            }
            policy => {
                if policy.contains(calendar::weekday(today)) && upcoming_today.is_some() {
                    return upcoming_today;
                }
                (1..=7)
                    .filter_map(|days| calendar::add_days(today, days))
                    .find(|date| policy.contains(calendar::weekday(*date)))
                    .and_then(&on)
            }
        }
    }
}

impl GetId<AlarmId> for AlarmRecord {
    fn get_id(&self) -> &AlarmId {
        &self.id
    }
}

impl fmt::Display for AlarmRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, volume {:.0}%)",
            self.time_string(),
            if self.enabled { "on" } else { "off" },
            self.repeat,
            self.volume * 100.0
        )
    }
}

fn check_time(hour: u32, minute: u32) -> Result<(), AlarmError> {
    if hour > 23 {
        return Err(AlarmError::Hour(hour));
    }
    if minute > 59 {
        return Err(AlarmError::Minute(minute));
    }
    Ok(())
}

fn check_volume(volume: f64) -> Result<(), AlarmError> {
    if (0.0..=1.0).contains(&volume) {
        Ok(())
    } else {
        Err(AlarmError::Volume(volume))
    }
}

/// Parses `HH:MM` (24 hour clock).
pub fn parse_time(time: &str) -> Result<(u32, u32), AlarmError> {
    let parsed = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| AlarmError::Time(time.to_string()))?;
    Ok((parsed.hour(), parsed.minute()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmBuilder {
    hour: u32,
    minute: u32,
    repeat: RepeatPolicy,
    enabled: bool,
    volume: f64,
}

impl Default for AlarmBuilder {
    fn default() -> Self {
        Self {
            hour: 7,
            minute: 0,
            repeat: RepeatPolicy::Weekdays,
            enabled: true,
            volume: 0.8,
        }
    }
}

impl AlarmBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn time(mut self, hour: u32, minute: u32) -> Self {
        self.hour = hour;
        self.minute = minute;
        self
    }

    #[must_use]
    pub fn repeat(mut self, repeat: RepeatPolicy) -> Self {
        self.repeat = repeat;
        self
    }

    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub const fn volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    /// Validates the fields and mints a fresh id.
    pub fn build(self, now: DateTime<Utc>) -> Result<AlarmRecord, AlarmError> {
        check_time(self.hour, self.minute)?;
        check_volume(self.volume)?;
        Ok(AlarmRecord {
            id: Uuid::new_v4(),
            hour: self.hour,
            minute: self.minute,
            repeat: self.repeat,
            enabled: self.enabled,
            volume: self.volume,
            created_at: now,
            modified_at: now,
        })
    }
}

impl From<&AlarmRecord> for AlarmBuilder {
    fn from(alarm: &AlarmRecord) -> Self {
        Self {
            hour: alarm.hour,
            minute: alarm.minute,
            repeat: alarm.repeat.clone(),
            enabled: alarm.enabled,
            volume: alarm.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone, Utc};
    use test_case::test_case;

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn alarm(hour: u32, minute: u32, repeat: RepeatPolicy) -> AlarmRecord {
        AlarmBuilder::new()
            .time(hour, minute)
            .repeat(repeat)
            .build(utc(2026, 10, 1, 0, 0, 0))
            .unwrap()
    }

    // 2026-10-16 is a Friday
    #[test_case(RepeatPolicy::Daily, (16, 6, 59, 59), Some((16, 7, 0)); "daily before fire time")]
    #[test_case(RepeatPolicy::Daily, (16, 7, 0, 0), Some((17, 7, 0)); "daily exactly at fire time")]
    #[test_case(RepeatPolicy::Daily, (16, 7, 0, 1), Some((17, 7, 0)); "daily after fire time")]
    #[test_case(RepeatPolicy::Once, (16, 6, 0, 0), Some((16, 7, 0)); "once before fire time")]
    #[test_case(RepeatPolicy::Once, (16, 8, 0, 0), Some((17, 7, 0)); "once after fire time")]
    #[test_case(RepeatPolicy::Weekdays, (16, 6, 0, 0), Some((16, 7, 0)); "weekdays friday morning")]
    #[test_case(RepeatPolicy::Weekdays, (16, 20, 0, 0), Some((19, 7, 0)); "weekdays friday evening")]
    #[test_case(RepeatPolicy::Weekdays, (17, 8, 0, 0), Some((19, 7, 0)); "weekdays saturday")]
    #[test_case(RepeatPolicy::Weekends, (16, 6, 0, 0), Some((17, 7, 0)); "weekends friday")]
    #[test_case(RepeatPolicy::Weekends, (18, 7, 30, 0), Some((24, 7, 0)); "weekends sunday after fire time")]
    #[test_case(RepeatPolicy::Custom([4].into()), (14, 7, 0, 0), Some((21, 7, 0)); "custom same weekday rolls a week")]
    #[test_case(RepeatPolicy::Custom([].into()), (16, 6, 0, 0), None; "custom empty never fires")]
    fn next_occurrence(
        repeat: RepeatPolicy,
        (day, hour, minute, second): (u32, u32, u32, u32),
        expected: Option<(u32, u32, u32)>,
    ) {
        let now = utc(2026, 10, day, hour, minute, second);
        let expected = expected.map(|(d, h, m)| utc(2026, 10, d, h, m, 0));
        assert_eq!(alarm(7, 0, repeat).next_occurrence(&now), expected);
    }

    #[test]
    fn disabled_alarm_never_fires() {
        let mut daily = alarm(7, 0, RepeatPolicy::Daily);
        daily.set_enabled(false);
        assert_eq!(daily.next_occurrence(&utc(2026, 10, 16, 6, 0, 0)), None);
    }

    #[test]
    fn empty_custom_never_fires_on_any_day() {
        let never = alarm(7, 0, RepeatPolicy::Custom([].into()));
        for day in 1..=31 {
            assert_eq!(never.next_occurrence(&utc(2026, 10, day, 12, 0, 0)), None);
        }
    }

    #[test]
    fn rolls_over_month_and_year() {
        let daily = alarm(7, 0, RepeatPolicy::Daily);
        assert_eq!(
            daily.next_occurrence(&utc(2026, 12, 31, 8, 0, 0)),
            Some(utc(2027, 1, 1, 7, 0, 0))
        );
        // Thursday 2026-12-31 after fire time -> Friday 2027-01-01
        let weekdays = alarm(7, 0, RepeatPolicy::Weekdays);
        assert_eq!(
            weekdays.next_occurrence(&utc(2026, 12, 31, 8, 0, 0)),
            Some(utc(2027, 1, 1, 7, 0, 0))
        );
        let mondays = alarm(6, 15, RepeatPolicy::custom([2]).unwrap());
        assert_eq!(
            mondays.next_occurrence(&utc(2026, 10, 30, 9, 0, 0)),
            Some(utc(2026, 11, 2, 6, 15, 0))
        );
    }

    #[test]
    fn wall_time_is_read_in_the_zone_of_now() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        // Friday 23:30 UTC is Saturday 08:30 in Tokyo
        let now = utc(2026, 10, 16, 23, 30, 0).with_timezone(&tokyo);
        let next = alarm(7, 0, RepeatPolicy::Weekdays).next_occurrence(&now).unwrap();
        assert_eq!(next, tokyo.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap());
    }

    #[test]
    fn daily_alarm_across_spring_forward() {
        use chrono_tz::America::New_York;

        let alarm = alarm(2, 30, RepeatPolicy::Daily);
        let evening = New_York.with_ymd_and_hms(2026, 3, 7, 23, 0, 0).unwrap();
        let skipped = alarm.next_occurrence(&evening).unwrap();
        assert_eq!(skipped.to_rfc3339(), "2026-03-08T03:00:00-04:00");

        let morning = New_York.with_ymd_and_hms(2026, 3, 8, 4, 0, 0).unwrap();
        let next = alarm.next_occurrence(&morning).unwrap();
        assert_eq!(next.to_rfc3339(), "2026-03-09T02:30:00-04:00");
    }

    #[test]
    fn weekday_alarm_across_fall_back() {
        use chrono_tz::America::New_York;

        // Sunday 2026-11-01 repeats 01:00-02:00
        let alarm = alarm(1, 30, RepeatPolicy::Weekends);
        let saturday = New_York.with_ymd_and_hms(2026, 10, 31, 12, 0, 0).unwrap();
        let next = alarm.next_occurrence(&saturday).unwrap();
        assert_eq!(next.to_rfc3339(), "2026-11-01T01:30:00-04:00");
    }

    #[test]
    fn next_occurrence_is_pure() {
        let alarm = alarm(22, 0, RepeatPolicy::Weekends);
        let now = utc(2026, 10, 16, 12, 0, 0);
        assert_eq!(alarm.next_occurrence(&now), alarm.next_occurrence(&now));
    }

    #[test]
    fn builder_validates_fields() {
        let now = utc(2026, 10, 16, 0, 0, 0);
        assert_eq!(
            AlarmBuilder::new().time(24, 0).build(now),
            Err(AlarmError::Hour(24))
        );
        assert_eq!(
            AlarmBuilder::new().time(6, 60).build(now),
            Err(AlarmError::Minute(60))
        );
        assert_eq!(
            AlarmBuilder::new().volume(1.5).build(now),
            Err(AlarmError::Volume(1.5))
        );
    }

    #[test]
    fn builder_mints_unique_ids() {
        let now = utc(2026, 10, 16, 0, 0, 0);
        let a = AlarmBuilder::new().build(now).unwrap();
        let b = AlarmBuilder::from(&a).build(now).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.created_at(), a.modified_at());
    }

    #[test]
    fn apply_keeps_identity() {
        let mut original = alarm(7, 0, RepeatPolicy::Weekdays);
        let mut edited = alarm(9, 45, RepeatPolicy::Once);
        edited.set_volume(0.3).unwrap();
        original.apply(edited.clone());
        assert_ne!(original.id(), edited.id());
        assert_eq!(original.time_string(), "09:45");
        assert_eq!(original.repeat(), &RepeatPolicy::Once);
        assert!((original.volume() - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_times() {
        assert_eq!(parse_time("07:05"), Ok((7, 5)));
        assert_eq!(parse_time(" 23:59 "), Ok((23, 59)));
        assert!(parse_time("7am").is_err());
        assert!(parse_time("24:00").is_err());
    }
}
