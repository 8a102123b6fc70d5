use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::{
    alarm::{AlarmBuilder, AlarmId, AlarmRecord},
    calendar::{self, Clock},
    notify::{Notification, NotificationScheduler, RequestId},
    persistence::{self, Alarms, BlobStore, ALARMS_KEY},
    repeat::RepeatPolicy,
};

/// The alarms shown to a first time user.
#[must_use]
pub fn sample_alarms(now: DateTime<Utc>) -> Vec<AlarmRecord> {
    [
        AlarmBuilder::new()
            .time(7, 0)
            .repeat(RepeatPolicy::Weekdays)
            .volume(0.8),
        AlarmBuilder::new()
            .time(9, 0)
            .repeat(RepeatPolicy::Weekends)
            .enabled(false)
            .volume(0.7),
    ]
    .into_iter()
    .filter_map(|builder| builder.build(now).ok())
    .collect()
}

/// Owns the alarm collection.
///
/// Every mutation is written through to the blob store and mirrored to the
/// notification scheduler. Storage and scheduler failures are logged and
/// never undo the in-memory change; lookups of unknown ids are no-ops.
#[derive(Debug)]
pub struct AlarmStore<B, S, C> {
    alarms: Alarms,
    blobs: B,
    scheduler: S,
    clock: C,
}

impl<B, S, C> AlarmStore<B, S, C>
where
    B: BlobStore,
    S: NotificationScheduler,
    C: Clock,
{
    /// Loads the saved alarms and schedules the enabled ones. Missing or
    /// unreadable data gives an empty collection, which is seeded with
    /// [`sample_alarms`] when `seed` is set. A saved but empty collection is
    /// left empty.
    pub fn open(blobs: B, scheduler: S, clock: C, seed: bool) -> Self {
        let loaded = load(&blobs);
        let first_run = loaded.is_none();
        let mut store = Self {
            alarms: loaded.unwrap_or_default(),
            blobs,
            scheduler,
            clock,
        };
        info!("loaded {} alarms", store.alarms.len());
        if first_run && seed {
            info!("no saved alarms, adding samples");
            for alarm in sample_alarms(store.now_utc()) {
                store.add(alarm);
            }
        } else {
            store.resync();
        }
        store
    }

    #[must_use]
    pub fn alarms(&self) -> &[AlarmRecord] {
        self.alarms.as_slice()
    }

    #[must_use]
    pub fn get(&self, id: &AlarmId) -> Option<&AlarmRecord> {
        self.alarms.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    #[must_use]
    pub const fn blobs(&self) -> &B {
        &self.blobs
    }

    #[must_use]
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    pub fn add(&mut self, record: AlarmRecord) {
        let id = record.id();
        if self.alarms.insert(record).is_some() {
            warn!("alarm {id} already exists, replacing it");
            self.scheduler.cancel(&RequestId::Alarm(id));
        }
        self.persist();
        self.schedule(&id);
    }

    /// Replaces every field of the alarm with the same id.
    pub fn update(&mut self, record: AlarmRecord) {
        let id = record.id();
        let now = self.now_utc();
        let Some(alarm) = self.alarms.get_mut(&id) else {
            debug!("ignoring update of unknown alarm {id}");
            return;
        };
        alarm.apply(record);
        alarm.touch(now);
        self.persist();
        self.scheduler.cancel(&RequestId::Alarm(id));
        self.schedule(&id);
    }

    pub fn delete(&mut self, id: &AlarmId) {
        let Some(alarm) = self.alarms.remove(id) else {
            debug!("ignoring delete of unknown alarm {id}");
            return;
        };
        self.persist();
        self.scheduler.cancel(&RequestId::Alarm(*id));
        info!("deleted alarm {} ({})", id, alarm.time_string());
    }

    pub fn toggle(&mut self, id: &AlarmId) {
        let now = self.now_utc();
        let Some(alarm) = self.alarms.get_mut(id) else {
            debug!("ignoring toggle of unknown alarm {id}");
            return;
        };
        alarm.toggle();
        alarm.touch(now);
        let enabled = alarm.is_enabled();
        self.persist();
        if enabled {
            self.schedule(id);
        } else {
            self.scheduler.cancel(&RequestId::Alarm(*id));
            debug!("alarm {id} disabled, notification cancelled");
        }
    }

    /// Turns the alarm off if it is on.
    pub fn disable(&mut self, id: &AlarmId) {
        if self.get(id).is_some_and(AlarmRecord::is_enabled) {
            self.toggle(id);
        }
    }

    /// Replaces the pending notification with one for the next occurrence,
    /// used once the current occurrence has rung.
    pub fn reschedule(&mut self, id: &AlarmId) {
        let now = self.clock.now();
        self.reschedule_after(id, &now);
    }

    /// Like [`Self::reschedule`], but skips every occurrence up to and
    /// including `after`, for an occurrence that rang before its time.
    pub fn reschedule_after(&mut self, id: &AlarmId, after: &DateTime<C::Tz>) {
        let now = self.clock.now();
        let from = if *after > now { after.clone() } else { now };
        self.scheduler.cancel(&RequestId::Alarm(*id));
        self.schedule_after(id, &from);
    }

    /// Drops every pending request and schedules all enabled alarms again.
    pub fn resync(&mut self) {
        self.scheduler.cancel_all();
        let ids: Vec<_> = self.alarms.iter().map(AlarmRecord::id).collect();
        for id in &ids {
            self.schedule(id);
        }
    }

    /// Schedules a one-shot re-ring `delay_minutes` from now. The alarm
    /// itself is left untouched.
    pub fn snooze(&mut self, id: &AlarmId, delay_minutes: u32) -> Option<DateTime<C::Tz>> {
        if self.get(id).is_none() {
            debug!("ignoring snooze of unknown alarm {id}");
            return None;
        }
        let fire_at = self.clock.now() + chrono::Duration::minutes(i64::from(delay_minutes));
        match self.scheduler.schedule(
            RequestId::Snooze(*id),
            calendar::fixed(&fire_at),
            &Notification::snooze(),
        ) {
            Ok(()) => info!("alarm {id} snoozed for {delay_minutes} minutes"),
            Err(e) => error!("couldn't schedule snooze for alarm {id}: {e}"),
        }
        Some(fire_at)
    }

    pub fn cancel_snooze(&mut self, id: &AlarmId) {
        self.scheduler.cancel(&RequestId::Snooze(*id));
    }

    fn schedule(&mut self, id: &AlarmId) {
        let now = self.clock.now();
        self.schedule_after(id, &now);
    }

    fn schedule_after(&mut self, id: &AlarmId, after: &DateTime<C::Tz>) {
        let Some(alarm) = self.alarms.get(id) else {
            return;
        };
        if !alarm.is_enabled() {
            debug!("alarm {} is disabled, not scheduling", alarm.time_string());
            return;
        }
        let Some(fire_at) = alarm.next_occurrence(after) else {
            warn!("alarm {} ({}) never fires", alarm.time_string(), alarm.repeat());
            return;
        };
        let request = RequestId::Alarm(*id);
        match self
            .scheduler
            .schedule(request, calendar::fixed(&fire_at), &Notification::alarm())
        {
            Ok(()) => debug!(
                "alarm {} next rings at {}",
                alarm.time_string(),
                fire_at.naive_local()
            ),
            Err(e) => error!("couldn't schedule alarm {}: {e}", alarm.time_string()),
        }
    }

    fn persist(&mut self) {
        let result = persistence::encode(&self.alarms)
            .and_then(|bytes| self.blobs.write(ALARMS_KEY, &bytes));
        if let Err(e) = result {
            error!("couldn't save alarms: {e}");
        }
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }
}

fn load<B: BlobStore>(blobs: &B) -> Option<Alarms> {
    let bytes = match blobs.read(ALARMS_KEY) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            warn!("couldn't read saved alarms: {e}");
            return None;
        }
    };
    match persistence::decode(&bytes) {
        Ok(alarms) => Some(alarms),
        Err(e) => {
            warn!("discarding unreadable saved alarms: {e}");
            None
        }
    }
}
