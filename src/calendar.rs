//! Calendar arithmetic used by the recurrence computation, and the [`Clock`]
//! that supplies "now".
//!
//! All arithmetic happens on local calendar dates; wall-clock times are only
//! turned into instants at the very end through [`at`]. Local wall-clock time
//! wins around DST transitions:
//!
//! - a wall time that happens twice (clocks going back) resolves to the
//!   earlier instant;
//! - a wall time that is skipped (clocks going forward) resolves to the first
//!   wall time that exists after the gap, probing forward in 15 minute steps.

use std::{cell::RefCell, rc::Rc};

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, NaiveDate, NaiveTime, Offset, TimeZone, Weekday,
};

use crate::repeat::WeekdayId;

/// longest skipped span we try to step over
const MAX_GAP_MINUTES: u32 = 4 * 60;
const GAP_STEP_MINUTES: u32 = 15;

/// The local calendar date of `now`, in `now`'s own zone.
#[must_use]
pub fn today<Tz: TimeZone>(now: &DateTime<Tz>) -> NaiveDate {
    now.date_naive()
}

#[must_use]
pub fn add_days(date: NaiveDate, days: u64) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(days))
}

/// 1 = Sunday .. 7 = Saturday.
#[must_use]
pub fn weekday(date: NaiveDate) -> WeekdayId {
    weekday_id(date.weekday())
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn weekday_id(day: Weekday) -> WeekdayId {
    // number_from_sunday is always 1..=7
    day.number_from_sunday() as WeekdayId
}

/// Resolves `date hour:minute:00` on the wall clock of `tz`.
#[must_use]
pub fn at<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
    let wall = date.and_time(NaiveTime::from_hms_opt(hour, minute, 0)?);
    if let Some(instant) = tz.from_local_datetime(&wall).earliest() {
        return Some(instant);
    }
    (1..=MAX_GAP_MINUTES / GAP_STEP_MINUTES)
        .map(|step| chrono::Duration::minutes(i64::from(step * GAP_STEP_MINUTES)))
        .filter_map(|offset| wall.checked_add_signed(offset))
        .find_map(|shifted| tz.from_local_datetime(&shifted).earliest())
}

/// The same instant, keeping only its UTC offset.
#[must_use]
pub fn fixed<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<FixedOffset> {
    instant.with_timezone(&instant.offset().fix())
}

/// Source of the current time.
pub trait Clock {
    type Tz: TimeZone;

    fn now(&self) -> DateTime<Self::Tz>;
}

/// The device clock, in the device's current local zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock<Tz: TimeZone> {
    now: RefCell<DateTime<Tz>>,
}

impl<Tz: TimeZone> ManualClock<Tz> {
    #[must_use]
    pub fn new(now: DateTime<Tz>) -> Self {
        Self {
            now: RefCell::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Tz>) {
        *self.now.borrow_mut() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.borrow_mut();
        *now = now.clone() + by;
    }
}

impl<Tz: TimeZone> Clock for ManualClock<Tz> {
    type Tz = Tz;

    fn now(&self) -> DateTime<Tz> {
        self.now.borrow().clone()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    type Tz = C::Tz;

    fn now(&self) -> DateTime<Self::Tz> {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    type Tz = C::Tz;

    fn now(&self) -> DateTime<Self::Tz> {
        (**self).now()
    }
}
