//! Keyed timer source.
//!
//! Each live job is a tokio task sleeping until its fire instant. Jobs are
//! keyed by [`JobKey`]; registering a key that already has a live job
//! replaces it under the same lock, so two registrations of one key are
//! never live together.
//!
//! ## Firing
//!
//! ```text
//! task wakes -> generation still current? -> TimerFired on channel
//!            -> driver locks session -> acknowledge(ticket) -> dispatch
//! ```
//!
//! Delivery is at-most-once: a ticket is only honoured if its registration is
//! still the current one when the driver acknowledges it, which happens under
//! the session lock. A cancel or replace issued before that point wins.

mod job;

pub use job::{FireAt, JobHandle, JobKey, JobKind, JobName, JobTicket, ScheduledJob, TimerFired};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, DayWindow};
use crate::error::SchedulerError;
use crate::flow::Step;
use crate::session::SessionId;

/// How far in the past a one-shot fire time may be and still fire immediately.
pub const PAST_TOLERANCE_SECS: i64 = 30;

struct JobEntry {
    handle: JobHandle,
    task: AbortHandle,
}

struct Inner {
    jobs: Mutex<HashMap<JobKey, JobEntry>>,
    generation: AtomicU64,
    clock: Arc<dyn Clock>,
    window: DayWindow,
    fired: mpsc::UnboundedSender<TimerFired>,
}

impl Inner {
    fn jobs(&self) -> std::sync::MutexGuard<'_, HashMap<JobKey, JobEntry>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cloneable handle to the shared job table.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a scheduler and the receiving end of its fire channel.
    pub fn new(
        clock: Arc<dyn Clock>,
        window: DayWindow,
    ) -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            jobs: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            clock,
            window,
            fired: tx,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn window(&self) -> &DayWindow {
        &self.inner.window
    }

    /// Register a one-shot job at an absolute instant.
    ///
    /// # Errors
    ///
    /// `InvalidTime` when `fire_at` lies more than [`PAST_TOLERANCE_SECS`]
    /// in the past.
    pub fn schedule_once(
        &self,
        key: JobKey,
        fire_at: DateTime<Utc>,
        callback_step: Step,
        payload: serde_json::Value,
    ) -> Result<JobHandle, SchedulerError> {
        self.replace(ScheduledJob {
            key,
            fire: FireAt::Once(fire_at),
            callback_step,
            payload,
        })
    }

    /// Register a job firing every day at `time` in the configured timezone.
    pub fn schedule_daily(&self, key: JobKey, time: NaiveTime, callback_step: Step) -> JobHandle {
        let next_fire = self.inner.window.next_occurrence(self.inner.clock.now(), time);
        self.insert(
            ScheduledJob {
                key,
                fire: FireAt::Daily(time),
                callback_step,
                payload: serde_json::Value::Null,
            },
            next_fire,
        )
    }

    /// Cancel any live job with the same key and register `job` in its place.
    pub fn replace(&self, job: ScheduledJob) -> Result<JobHandle, SchedulerError> {
        let now = self.inner.clock.now();
        let next_fire = match job.fire {
            FireAt::Once(at) => {
                if at < now - Duration::seconds(PAST_TOLERANCE_SECS) {
                    return Err(SchedulerError::InvalidTime {
                        job: format!("{}:{}", job.key.kind, job.key.subject),
                        fire_at: at,
                        now,
                    });
                }
                at
            }
            FireAt::Daily(time) => self.inner.window.next_occurrence(now, time),
        };
        Ok(self.insert(job, next_fire))
    }

    fn insert(&self, job: ScheduledJob, next_fire: DateTime<Utc>) -> JobHandle {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = JobHandle {
            id: Uuid::new_v4(),
            key: job.key.clone(),
            generation,
            fire: job.fire,
            next_fire,
            callback_step: job.callback_step,
            payload: job.payload,
        };

        let mut jobs = self.inner.jobs();
        // The task reads the table before sleeping, so it blocks on this lock
        // until the entry below is in place.
        let task = tokio::spawn(run_job(
            Arc::downgrade(&self.inner),
            job.key.clone(),
            generation,
        ))
        .abort_handle();

        let entry = JobEntry {
            handle: handle.clone(),
            task,
        };
        if let Some(old) = jobs.insert(job.key, entry) {
            old.task.abort();
            debug!(
                session = %handle.key.session,
                kind = %handle.key.kind,
                subject = %handle.key.subject,
                "replaced live job"
            );
        }
        debug!(
            session = %handle.key.session,
            job = %handle.name(&self.inner.window),
            next_fire = %next_fire,
            "job scheduled"
        );
        handle
    }

    /// Cancel the live job for `key`. Returns whether one existed.
    pub fn cancel(&self, key: &JobKey) -> bool {
        match self.inner.jobs().remove(key) {
            Some(entry) => {
                entry.task.abort();
                debug!(session = %key.session, kind = %key.kind, "job cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every job of the given kinds for one session.
    pub fn cancel_session(&self, session: &SessionId, kinds: &[JobKind]) -> usize {
        let mut jobs = self.inner.jobs();
        let before = jobs.len();
        jobs.retain(|key, entry| {
            let stale = &key.session == session && kinds.contains(&key.kind);
            if stale {
                entry.task.abort();
            }
            !stale
        });
        before - jobs.len()
    }

    /// Live jobs for one session, soonest first.
    pub fn pending(&self, session: &SessionId) -> Vec<JobHandle> {
        let mut handles: Vec<JobHandle> = self
            .inner
            .jobs()
            .values()
            .filter(|e| &e.handle.key.session == session)
            .map(|e| e.handle.clone())
            .collect();
        handles.sort_by_key(|h| h.next_fire);
        handles
    }

    /// Claim a fired ticket. True only for the current registration.
    ///
    /// One-shot jobs are removed by a successful claim.
    pub fn acknowledge(&self, ticket: &JobTicket) -> bool {
        let mut jobs = self.inner.jobs();
        let current = jobs
            .get(&ticket.key)
            .map(|e| (e.handle.generation == ticket.generation, e.handle.fire));
        match current {
            Some((true, FireAt::Once(_))) => {
                jobs.remove(&ticket.key);
                true
            }
            Some((true, FireAt::Daily(_))) => true,
            _ => false,
        }
    }
}

fn time_until_fire(inner: &Weak<Inner>, key: &JobKey, generation: u64) -> Option<std::time::Duration> {
    let inner = inner.upgrade()?;
    let jobs = inner.jobs();
    let entry = jobs.get(key)?;
    if entry.handle.generation != generation {
        return None;
    }
    Some(
        (entry.handle.next_fire - inner.clock.now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO),
    )
}

async fn run_job(inner: Weak<Inner>, key: JobKey, generation: u64) {
    loop {
        let Some(delay) = time_until_fire(&inner, &key, generation) else {
            return;
        };
        tokio::time::sleep(delay).await;

        let Some(shared) = inner.upgrade() else {
            return;
        };
        let (fired, repeats) = {
            let mut jobs = shared.jobs();
            let Some(entry) = jobs.get_mut(&key) else {
                return;
            };
            if entry.handle.generation != generation {
                return;
            }
            let now = shared.clock.now();
            let fired = entry.handle.fired(now);
            let repeats = match entry.handle.fire {
                FireAt::Daily(time) => {
                    let base = now.max(entry.handle.next_fire);
                    entry.handle.next_fire = shared.window.next_occurrence(base, time);
                    true
                }
                FireAt::Once(_) => false,
            };
            (fired, repeats)
        };

        info!(
            session = %key.session,
            kind = %key.kind,
            step = %fired.callback_step,
            "job fired"
        );
        if shared.fired.send(fired).is_err() {
            warn!(session = %key.session, kind = %key.kind, "no driver listening for fired jobs");
            return;
        }
        if !repeats {
            return;
        }
    }
}
