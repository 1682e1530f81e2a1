//! In-memory collaborators and a driver harness for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde_json::json;
use tokio::sync::mpsc;

use dayflow_core::{
    CalendarEvent, CalendarGateway, Clock, DayWindow, DeliveryError, Driver, EventQuery,
    GatewayError, InboundEvent, JobHandle, JobKey, JobKind, ManualClock, Messenger, NewEvent,
    Reply, Scheduler, Services, SessionId, Step, TaskRecord, Termination, TimerFired,
    UserDirectory, UserRecord,
};

pub const SESSION: &str = "42";

/// Local New York time on 2026-10-15.
pub fn ny(h: u32, m: u32) -> DateTime<Utc> {
    chrono_tz::America::New_York
        .with_ymd_and_hms(2026, 10, 15, h, m, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn window() -> DayWindow {
    DayWindow::new(
        chrono_tz::America::New_York,
        NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
    )
}

pub fn event(title: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> CalendarEvent {
    CalendarEvent {
        id: None,
        title: title.to_string(),
        start,
        end,
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    events: Mutex<Vec<CalendarEvent>>,
    inserted: Mutex<Vec<NewEvent>>,
    failing: AtomicBool,
    listing_failing: AtomicBool,
    delay_ms: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeCalendar {
    pub fn set_events(&self, events: Vec<CalendarEvent>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn inserted(&self) -> Vec<NewEvent> {
        self.inserted.lock().unwrap().clone()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail reads only; inserts keep working.
    pub fn fail_listing(&self, failing: bool) {
        self.listing_failing.store(failing, Ordering::SeqCst);
    }

    pub fn slow_down(&self, ms: usize) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl CalendarGateway for FakeCalendar {
    async fn events(
        &self,
        _refresh_token: &str,
        query: &EventQuery,
    ) -> Result<Vec<CalendarEvent>, GatewayError> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(StdDuration::from_millis(delay as u64)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) || self.listing_failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection reset".into()));
        }

        let mut found: Vec<CalendarEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                query
                    .search
                    .as_ref()
                    .map_or(true, |q| e.title.to_lowercase().contains(&q.to_lowercase()))
            })
            .filter(|e| query.time_min.map_or(true, |min| e.end.unwrap_or(e.start) > min))
            .filter(|e| query.time_max.map_or(true, |max| e.start < max))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start);
        found.truncate(query.limit);
        Ok(found)
    }

    async fn insert_event(
        &self,
        _refresh_token: &str,
        new: &NewEvent,
    ) -> Result<CalendarEvent, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection reset".into()));
        }
        self.inserted.lock().unwrap().push(new.clone());
        let created = event(&new.title, new.start, Some(new.end));
        self.events.lock().unwrap().push(created.clone());
        Ok(created)
    }

    fn editor_link(&self, user: &SessionId) -> String {
        format!("https://calendar.example/edit?user={user}")
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    tasks: Mutex<Vec<TaskRecord>>,
}

impl FakeDirectory {
    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn user(&self, _id: &SessionId) -> Result<Option<UserRecord>, GatewayError> {
        Ok(Some(UserRecord {
            google_refresh_token: Some("rt".into()),
            username: Some("sam".into()),
        }))
    }

    async fn add_task(&self, task: &TaskRecord) -> Result<(), GatewayError> {
        self.tasks.lock().unwrap().push(task.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(SessionId, Reply)>>,
}

impl RecordingMessenger {
    pub fn replies(&self) -> Vec<Reply> {
        self.sent.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.replies().into_iter().map(|r| r.text).collect()
    }

    pub fn last(&self) -> Option<Reply> {
        self.replies().pop()
    }

    pub fn last_text(&self) -> String {
        self.last().map(|r| r.text).unwrap_or_default()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, session: &SessionId, reply: &Reply) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((session.clone(), reply.clone()));
        Ok(())
    }
}

/// A driver over fakes with a settable clock.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub calendar: Arc<FakeCalendar>,
    pub directory: Arc<FakeDirectory>,
    pub messenger: Arc<RecordingMessenger>,
    pub driver: Arc<Driver>,
    _fired: mpsc::UnboundedReceiver<TimerFired>,
}

impl Harness {
    /// Must be called inside a tokio runtime.
    pub fn at(now: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let calendar = Arc::new(FakeCalendar::default());
        let directory = Arc::new(FakeDirectory::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let (scheduler, fired) = Scheduler::new(Arc::clone(&dyn_clock), window());
        let services = Services {
            clock: dyn_clock,
            window: window(),
            block_alert_lead: Duration::minutes(10),
            event_limit: 150,
            calendar: calendar.clone(),
            directory: directory.clone(),
            scheduler,
        };
        let driver = Arc::new(Driver::new(services, messenger.clone()).unwrap());
        Self {
            clock,
            calendar,
            directory,
            messenger,
            driver,
            _fired: fired,
        }
    }

    pub fn session() -> SessionId {
        SessionId::from(SESSION)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.driver.services().scheduler
    }

    pub fn pending(&self) -> Vec<JobHandle> {
        self.scheduler().pending(&Self::session())
    }

    pub fn pending_of(&self, kind: JobKind) -> Vec<JobHandle> {
        self.pending()
            .into_iter()
            .filter(|h| h.key.kind == kind)
            .collect()
    }

    pub async fn text(&self, text: &str) -> Option<Termination> {
        self.driver
            .handle(InboundEvent::from_message(Self::session(), text))
            .await
    }

    pub async fn press(&self, step: Step) -> Option<Termination> {
        self.press_raw(step.as_str()).await
    }

    pub async fn press_raw(&self, data: &str) -> Option<Termination> {
        self.driver
            .handle(InboundEvent::ButtonPress {
                session: Self::session(),
                data: data.to_string(),
            })
            .await
    }

    /// Deliver a live job as if its timer went off now.
    pub async fn fire(&self, handle: &JobHandle) -> Option<Termination> {
        self.driver
            .handle(InboundEvent::TimerFired(handle.fired(self.clock.now())))
            .await
    }

    /// Fire the soonest live job of `kind`.
    pub async fn fire_kind(&self, kind: JobKind) -> Option<Termination> {
        let handle = self
            .pending_of(kind)
            .into_iter()
            .next()
            .unwrap_or_else(|| panic!("no pending {kind} job"));
        self.fire(&handle).await
    }

    /// Register and fire a block start alert for `title` starting at `start`.
    pub async fn block_start_alert(&self, title: &str, start: DateTime<Utc>) {
        let handle = self
            .scheduler()
            .schedule_once(
                JobKey::new(Self::session(), JobKind::BlockStart, title),
                self.clock.now(),
                Step::BlockStartAlert,
                json!({ "title": title, "start": start }),
            )
            .unwrap();
        self.fire(&handle).await;
    }

    pub async fn step(&self) -> Step {
        self.driver
            .sessions()
            .snapshot(&Self::session())
            .await
            .map(|s| s.current_step)
            .unwrap_or(Step::Idle)
    }
}
