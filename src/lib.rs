#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(
    clippy::use_self,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::missing_panics_doc
)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! Alarm scheduling core.
//!
//! [`AlarmRecord::next_occurrence`] turns an alarm's time of day and
//! [`RepeatPolicy`] into the next instant it rings. [`AlarmStore`] keeps the
//! alarms persisted and mirrored to a [`NotificationScheduler`], and
//! [`AlarmService`] runs the [`DueAlarmScanner`] as a fallback for late or
//! lost notifications.

pub mod alarm;
pub mod calendar;
pub mod collection;
pub mod config;
pub mod error;
pub mod notify;
pub mod persistence;
pub mod repeat;
pub mod scanner;
pub mod service;
pub mod store;

pub use alarm::{AlarmBuilder, AlarmId, AlarmRecord};
pub use calendar::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use notify::{InMemoryScheduler, Notification, NotificationScheduler, RequestId};
pub use persistence::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use repeat::RepeatPolicy;
pub use scanner::{DueAlarm, DueAlarmScanner};
pub use service::{AlarmDue, AlarmService, DueSource, Event, Lifecycle};
pub use store::AlarmStore;
