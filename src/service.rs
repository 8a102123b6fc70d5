//! The reconciliation loop.
//!
//! [`AlarmService`] owns the store and the scanner and is the only thing that
//! touches them. Everything else talks to it through [`Event`]s and hears
//! back through [`AlarmDue`]s, so passes never overlap.

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::{
    alarm::AlarmId,
    calendar::Clock,
    config::Config,
    notify::{NotificationScheduler, RequestId},
    persistence::BlobStore,
    scanner::DueAlarmScanner,
    store::AlarmStore,
};

pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    BecameActive,
    WillEnterForeground,
    EnteredBackground,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Lifecycle(Lifecycle),
    /// the notification scheduler delivered a request
    Delivered(RequestId),
    Stop(AlarmId),
    Snooze { id: AlarmId, delay_minutes: u32 },
    Shutdown,
}

/// Which path noticed the alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueSource {
    Scanner,
    Notification,
    Snooze,
}

/// An alarm that should ring now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmDue {
    pub id: AlarmId,
    pub source: DueSource,
}

#[derive(Debug)]
pub struct AlarmService<B, S, C> {
    store: AlarmStore<B, S, C>,
    scanner: DueAlarmScanner,
    poll_interval: Duration,
    foreground: bool,
}

impl<B, S, C> AlarmService<B, S, C>
where
    B: BlobStore,
    S: NotificationScheduler,
    C: Clock,
{
    /// `poll_interval` is raised to [`MIN_POLL_INTERVAL`] if shorter.
    #[must_use]
    pub fn new(
        store: AlarmStore<B, S, C>,
        scanner: DueAlarmScanner,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            scanner,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            foreground: true,
        }
    }

    #[must_use]
    pub fn with_config(store: AlarmStore<B, S, C>, config: &Config) -> Self {
        Self::new(
            store,
            DueAlarmScanner::new(config.due_tolerance()),
            config.poll_interval(),
        )
    }

    #[must_use]
    pub const fn store(&self) -> &AlarmStore<B, S, C> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AlarmStore<B, S, C> {
        &mut self.store
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub const fn is_foreground(&self) -> bool {
        self.foreground
    }

    /// Applies one inbox event and returns the alarms that became due.
    /// [`Event::Shutdown`] is only meaningful to [`Self::run`].
    pub fn handle(&mut self, event: Event) -> Vec<AlarmDue> {
        match event {
            Event::Lifecycle(Lifecycle::BecameActive | Lifecycle::WillEnterForeground) => {
                self.foreground = true;
                self.tick()
            }
            Event::Lifecycle(Lifecycle::EnteredBackground) => {
                debug!("entered background, pausing scans");
                self.foreground = false;
                Vec::new()
            }
            Event::Delivered(request) => self.delivered(request).into_iter().collect(),
            Event::Stop(id) => {
                self.stop(&id);
                Vec::new()
            }
            Event::Snooze { id, delay_minutes } => {
                self.store.snooze(&id, delay_minutes);
                Vec::new()
            }
            Event::Shutdown => Vec::new(),
        }
    }

    /// One reconciliation pass: collects deliveries from a polled scheduler,
    /// then, in the foreground, asks the scanner for a due alarm.
    pub fn tick(&mut self) -> Vec<AlarmDue> {
        let now = self.store.clock().now();
        let mut due: Vec<_> = self
            .store
            .scheduler_mut()
            .take_delivered(now.with_timezone(&Utc))
            .into_iter()
            .filter_map(|request| self.delivered(request))
            .collect();
        if self.foreground {
            if let Some(found) = self.scanner.scan(self.store.alarms(), &now) {
                self.rang(&found.id, &found.occurrence.with_timezone(&now.timezone()));
                due.push(AlarmDue {
                    id: found.id,
                    source: DueSource::Scanner,
                });
            }
        }
        due
    }

    /// Serves the inbox until [`Event::Shutdown`] arrives or every sender is
    /// gone, running a pass every poll interval. Returns the service so its
    /// final state can be inspected.
    pub fn run(mut self, inbox: &Receiver<Event>, outbox: &Sender<AlarmDue>) -> Self {
        info!("alarm service started");
        let mut next_tick = Instant::now() + self.poll_interval;
        loop {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            let due = match inbox.recv_timeout(timeout) {
                Ok(Event::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => {
                    next_tick = Instant::now() + self.poll_interval;
                    self.tick()
                }
            };
            for alarm in due {
                if outbox.send(alarm).is_err() {
                    warn!("nobody is listening for due alarms, stopping");
                    return self;
                }
            }
        }
        info!("alarm service stopped");
        self
    }

    fn delivered(&mut self, request: RequestId) -> Option<AlarmDue> {
        let id = request.alarm_id();
        let Some(alarm) = self.store.get(&id) else {
            debug!("ignoring delivery of {request} for unknown alarm");
            return None;
        };
        match request {
            RequestId::Snooze(_) => Some(AlarmDue {
                id,
                source: DueSource::Snooze,
            }),
            RequestId::Alarm(_) if !alarm.is_enabled() => {
                debug!("ignoring delivery of {request} for disabled alarm");
                None
            }
            RequestId::Alarm(_) => {
                let now = self.store.clock().now();
                // a delivery ahead of its fire time belongs to the upcoming
                // occurrence
                let occurrence = self
                    .scanner
                    .window_occurrence(alarm, &now)
                    .or_else(|| alarm.next_occurrence(&now));
                if let Some(occurrence) = occurrence {
                    self.scanner
                        .mark_announced(id, occurrence.with_timezone(&Utc));
                    self.rang(&id, &occurrence);
                }
                Some(AlarmDue {
                    id,
                    source: DueSource::Notification,
                })
            }
        }
    }

    /// One-shot alarms are turned off once they rang, repeating ones move on
    /// to the occurrence after `occurrence`.
    fn rang(&mut self, id: &AlarmId, occurrence: &DateTime<C::Tz>) {
        let once = self.store.get(id).is_some_and(|alarm| alarm.repeat().is_once());
        if once {
            self.store.disable(id);
        } else {
            self.store.reschedule_after(id, occurrence);
        }
    }

    fn stop(&mut self, id: &AlarmId) {
        let Some(alarm) = self.store.get(id) else {
            debug!("ignoring stop of unknown alarm {id}");
            return;
        };
        let once = alarm.repeat().is_once();
        self.store.cancel_snooze(id);
        if once {
            self.store.disable(id);
        }
        info!("alarm {id} stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::{rc::Rc, sync::mpsc};

    use chrono::TimeZone;

    use super::*;
    use crate::{
        alarm::{AlarmBuilder, AlarmRecord},
        calendar::ManualClock,
        notify::InMemoryScheduler,
        persistence::MemoryBlobStore,
        repeat::RepeatPolicy,
    };

    type TestService = AlarmService<MemoryBlobStore, InMemoryScheduler, Rc<ManualClock<Utc>>>;

    fn friday(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, h, m, s).unwrap()
    }

    /// A service at Friday 06:00 holding one 07:00 alarm.
    fn service(repeat: RepeatPolicy) -> (TestService, AlarmId, Rc<ManualClock<Utc>>) {
        let clock = Rc::new(ManualClock::new(friday(6, 0, 0)));
        let mut store = AlarmStore::open(
            MemoryBlobStore::new(),
            InMemoryScheduler::new(),
            Rc::clone(&clock),
            false,
        );
        let record = AlarmBuilder::new()
            .time(7, 0)
            .repeat(repeat)
            .build(friday(5, 0, 0))
            .unwrap();
        let id = record.id();
        store.add(record);
        (
            AlarmService::new(store, DueAlarmScanner::default(), Duration::from_secs(3600)),
            id,
            clock,
        )
    }

    fn due(id: AlarmId, source: DueSource) -> AlarmDue {
        AlarmDue { id, source }
    }

    fn alarm(service: &TestService, id: AlarmId) -> &AlarmRecord {
        service.store().get(&id).unwrap()
    }

    /// Drops pending notifications, as if the platform never delivered them.
    fn lose_notifications(service: &mut TestService) {
        service.store_mut().scheduler_mut().cancel_all();
    }

    #[test]
    fn stopped_one_shot_alarm_stays_off() {
        let (mut service, id, clock) = service(RepeatPolicy::Once);
        lose_notifications(&mut service);
        clock.set(friday(7, 0, 30));
        assert_eq!(service.tick(), vec![due(id, DueSource::Scanner)]);

        assert!(service.handle(Event::Stop(id)).is_empty());
        assert!(!alarm(&service, id).is_enabled());
        assert_eq!(alarm(&service, id).next_occurrence(&clock.now()), None);
        clock.set(friday(7, 1, 0));
        assert!(service.tick().is_empty());
    }

    #[test]
    fn stop_turns_off_a_one_shot_alarm_even_before_it_rang() {
        let (mut service, id, _clock) = service(RepeatPolicy::Once);
        service.handle(Event::Stop(id));
        assert!(!alarm(&service, id).is_enabled());
    }

    #[test]
    fn stop_keeps_repeating_alarms_on() {
        let (mut service, id, _clock) = service(RepeatPolicy::Weekdays);
        service.handle(Event::Stop(id));
        assert!(alarm(&service, id).is_enabled());
    }

    #[test]
    fn delivered_notification_rings_once_and_moves_on() {
        let (mut service, id, clock) = service(RepeatPolicy::Daily);
        clock.set(friday(7, 0, 0));
        assert_eq!(service.tick(), vec![due(id, DueSource::Notification)]);

        // the scanner does not ring the same occurrence again
        clock.set(friday(7, 0, 30));
        assert!(service.tick().is_empty());
        let next = service.store().scheduler().get(&RequestId::Alarm(id)).unwrap();
        assert_eq!(next.fire_at, Utc.with_ymd_and_hms(2026, 10, 17, 7, 0, 0).unwrap());
    }

    #[test]
    fn early_delivery_rings_the_occurrence_once() {
        let (mut service, id, clock) = service(RepeatPolicy::Daily);
        clock.set(friday(6, 59, 58));
        assert_eq!(
            service.handle(Event::Delivered(RequestId::Alarm(id))),
            vec![due(id, DueSource::Notification)]
        );
        let next = service.store().scheduler().get(&RequestId::Alarm(id)).unwrap();
        assert_eq!(next.fire_at, Utc.with_ymd_and_hms(2026, 10, 17, 7, 0, 0).unwrap());

        clock.set(friday(7, 0, 20));
        assert!(service.tick().is_empty());
        clock.set(friday(7, 1, 50));
        assert!(service.tick().is_empty());
    }

    #[test]
    fn snooze_rings_again_later() {
        let (mut service, id, clock) = service(RepeatPolicy::Daily);
        clock.set(friday(7, 0, 0));
        service.tick();
        let before = alarm(&service, id).clone();

        assert!(service
            .handle(Event::Snooze {
                id,
                delay_minutes: 5
            })
            .is_empty());
        let snooze = service.store().scheduler().get(&RequestId::Snooze(id)).unwrap();
        assert_eq!(snooze.fire_at, friday(7, 5, 0));
        assert_eq!(alarm(&service, id), &before);

        clock.set(friday(7, 5, 0));
        assert_eq!(service.tick(), vec![due(id, DueSource::Snooze)]);
    }

    #[test]
    fn snoozed_one_shot_alarm_rings_although_disabled() {
        let (mut service, id, clock) = service(RepeatPolicy::Once);
        clock.set(friday(7, 0, 0));
        assert_eq!(service.tick(), vec![due(id, DueSource::Notification)]);
        assert!(!alarm(&service, id).is_enabled());

        service.handle(Event::Snooze {
            id,
            delay_minutes: 5,
        });
        clock.set(friday(7, 5, 0));
        assert_eq!(service.tick(), vec![due(id, DueSource::Snooze)]);
    }

    #[test]
    fn stop_cancels_pending_snooze() {
        let (mut service, id, clock) = service(RepeatPolicy::Daily);
        clock.set(friday(7, 0, 0));
        service.handle(Event::Snooze {
            id,
            delay_minutes: 5,
        });
        service.handle(Event::Stop(id));
        assert!(service.store().scheduler().get(&RequestId::Snooze(id)).is_none());
    }

    #[test]
    fn background_pauses_scanning() {
        let (mut service, id, clock) = service(RepeatPolicy::Daily);
        lose_notifications(&mut service);
        assert!(service
            .handle(Event::Lifecycle(Lifecycle::EnteredBackground))
            .is_empty());
        assert!(!service.is_foreground());

        clock.set(friday(7, 1, 0));
        assert!(service.tick().is_empty());
        assert_eq!(
            service.handle(Event::Lifecycle(Lifecycle::WillEnterForeground)),
            vec![due(id, DueSource::Scanner)]
        );
        // repeating alarms are scheduled for their next day
        let next = service.store().scheduler().get(&RequestId::Alarm(id)).unwrap();
        assert_eq!(next.fire_at, Utc.with_ymd_and_hms(2026, 10, 17, 7, 0, 0).unwrap());
    }

    #[test]
    fn missed_alarms_are_not_caught_up() {
        let (mut service, id, clock) = service(RepeatPolicy::Daily);
        lose_notifications(&mut service);
        clock.set(friday(9, 0, 0));
        assert!(service.handle(Event::Lifecycle(Lifecycle::BecameActive)).is_empty());
        assert!(alarm(&service, id).is_enabled());
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let (mut service, id, _clock) = service(RepeatPolicy::Daily);
        let ghost = uuid::Uuid::new_v4();
        assert!(service.handle(Event::Delivered(RequestId::Alarm(ghost))).is_empty());
        assert!(service.handle(Event::Delivered(RequestId::Snooze(ghost))).is_empty());
        assert!(service.handle(Event::Stop(ghost)).is_empty());
        service.handle(Event::Snooze {
            id: ghost,
            delay_minutes: 5,
        });
        assert_eq!(service.store().scheduler().pending().len(), 1);
        assert!(alarm(&service, id).is_enabled());
    }

    #[test]
    fn delivery_for_disabled_alarm_is_ignored() {
        let (mut service, id, _clock) = service(RepeatPolicy::Daily);
        service.store_mut().toggle(&id);
        assert!(service.handle(Event::Delivered(RequestId::Alarm(id))).is_empty());
    }

    #[test]
    fn run_serves_inbox_until_shutdown() {
        let (service, id, clock) = service(RepeatPolicy::Daily);
        clock.set(friday(7, 0, 30));
        let (events, inbox) = mpsc::channel();
        let (outbox, rings) = mpsc::channel();
        events.send(Event::Lifecycle(Lifecycle::BecameActive)).unwrap();
        events.send(Event::Stop(id)).unwrap();
        events.send(Event::Shutdown).unwrap();
        events.send(Event::Lifecycle(Lifecycle::BecameActive)).unwrap();

        let service = service.run(&inbox, &outbox);
        assert_eq!(
            rings.try_iter().collect::<Vec<_>>(),
            vec![due(id, DueSource::Notification)]
        );
        assert!(alarm(&service, id).is_enabled());
    }

    #[test]
    fn poll_interval_has_a_floor() {
        let (service, _id, _clock) = service(RepeatPolicy::Daily);
        let store = service.store;
        let service = AlarmService::new(store, DueAlarmScanner::default(), Duration::ZERO);
        assert_eq!(service.poll_interval(), MIN_POLL_INTERVAL);
    }

    #[test]
    fn run_stops_when_senders_are_gone() {
        let (service, _id, _clock) = service(RepeatPolicy::Daily);
        let (events, inbox) = mpsc::channel::<Event>();
        let (outbox, _rings) = mpsc::channel();
        drop(events);
        let service = service.run(&inbox, &outbox);
        assert_eq!(service.store().len(), 1);
    }
}
