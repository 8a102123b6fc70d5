//! Interface to the platform notification scheduler.
//!
//! The core only asks for a notification at an instant and cancels it again;
//! delivery timing is best effort, which is why the
//! [`scanner`](crate::scanner) exists.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::{alarm::AlarmId, error::ScheduleError};

pub const ALARM_CATEGORY: &str = "ALARM_CATEGORY";
const SNOOZE_SUFFIX: &str = "_snooze";

/// Identity of a scheduled notification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestId {
    /// the alarm's own next occurrence
    Alarm(AlarmId),
    /// a one-shot re-ring after snoozing
    Snooze(AlarmId),
}

impl RequestId {
    #[must_use]
    pub const fn alarm_id(&self) -> AlarmId {
        match self {
            Self::Alarm(id) | Self::Snooze(id) => *id,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alarm(id) => write!(f, "{id}"),
            Self::Snooze(id) => write!(f, "{id}{SNOOZE_SUFFIX}"),
        }
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_suffix(SNOOZE_SUFFIX) {
            Some(id) => Ok(Self::Snooze(Uuid::parse_str(id)?)),
            None => Ok(Self::Alarm(Uuid::parse_str(s)?)),
        }
    }
}

/// What the user sees when the notification is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub category: String,
}

impl Notification {
    #[must_use]
    pub fn alarm() -> Self {
        Self {
            title: "LifeTimer".to_string(),
            body: "Time to get up! Get ready for a great day!".to_string(),
            category: ALARM_CATEGORY.to_string(),
        }
    }

    #[must_use]
    pub fn snooze() -> Self {
        Self {
            title: "LifeTimer - Snoozed".to_string(),
            ..Self::alarm()
        }
    }
}

pub trait NotificationScheduler {
    /// Asks for `payload` to be delivered at `fire_at`. A request with the
    /// same id replaces the earlier one.
    fn schedule(
        &mut self,
        request: RequestId,
        fire_at: DateTime<FixedOffset>,
        payload: &Notification,
    ) -> Result<(), ScheduleError>;

    fn cancel(&mut self, request: &RequestId);

    fn cancel_all(&mut self);

    /// Requests that became due by `now`, for schedulers that are polled
    /// instead of calling back. Callback driven schedulers report deliveries
    /// through [`Event::Delivered`](crate::service::Event::Delivered) and keep
    /// this default.
    fn take_delivered(&mut self, _now: DateTime<Utc>) -> Vec<RequestId> {
        Vec::new()
    }
}

impl<S: NotificationScheduler + ?Sized> NotificationScheduler for &mut S {
    fn schedule(
        &mut self,
        request: RequestId,
        fire_at: DateTime<FixedOffset>,
        payload: &Notification,
    ) -> Result<(), ScheduleError> {
        (**self).schedule(request, fire_at, payload)
    }

    fn cancel(&mut self, request: &RequestId) {
        (**self).cancel(request);
    }

    fn cancel_all(&mut self) {
        (**self).cancel_all();
    }

    fn take_delivered(&mut self, now: DateTime<Utc>) -> Vec<RequestId> {
        (**self).take_delivered(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub fire_at: DateTime<FixedOffset>,
    pub payload: Notification,
}

/// Keeps pending requests in memory and hands them back once due.
/// Used where no platform notification service exists.
///
/// Requests that would fire before the last poll are refused, since they
/// could never be delivered on time.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    pending: BTreeMap<RequestId, Pending>,
    polled_at: Option<DateTime<Utc>>,
}

impl InMemoryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pending(&self) -> &BTreeMap<RequestId, Pending> {
        &self.pending
    }

    #[must_use]
    pub fn get(&self, request: &RequestId) -> Option<&Pending> {
        self.pending.get(request)
    }
}

impl NotificationScheduler for InMemoryScheduler {
    fn schedule(
        &mut self,
        request: RequestId,
        fire_at: DateTime<FixedOffset>,
        payload: &Notification,
    ) -> Result<(), ScheduleError> {
        if self.polled_at.is_some_and(|polled_at| fire_at < polled_at) {
            return Err(ScheduleError::InThePast(fire_at.to_rfc3339()));
        }
        info!("scheduled {request} for {}", fire_at.naive_local());
        self.pending.insert(
            request,
            Pending {
                fire_at,
                payload: payload.clone(),
            },
        );
        Ok(())
    }

    fn cancel(&mut self, request: &RequestId) {
        if self.pending.remove(request).is_some() {
            debug!("cancelled {request}");
        }
    }

    fn cancel_all(&mut self) {
        debug!("cancelled all {} pending requests", self.pending.len());
        self.pending.clear();
    }

    fn take_delivered(&mut self, now: DateTime<Utc>) -> Vec<RequestId> {
        self.polled_at = Some(self.polled_at.map_or(now, |polled_at| polled_at.max(now)));
        let due: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.fire_at <= now)
            .map(|(request, _)| *request)
            .collect();
        for request in &due {
            self.pending.remove(request);
        }
        due
    }
}
