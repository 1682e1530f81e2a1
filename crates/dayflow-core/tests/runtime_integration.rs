//! Timers fired by the scheduler reach the driver through the runtime.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use common::{event, ny, window, FakeCalendar, FakeDirectory, RecordingMessenger, SESSION};
use dayflow_core::{
    Clock, Collaborators, JobKey, JobKind, ManualClock, Runtime, SessionId, Step,
};
use serde_json::json;

fn runtime_at(
    now: chrono::DateTime<chrono::Utc>,
) -> (Runtime, Arc<FakeCalendar>, Arc<RecordingMessenger>) {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now));
    let calendar = Arc::new(FakeCalendar::default());
    let messenger = Arc::new(RecordingMessenger::default());
    let runtime = Runtime::start(
        window(),
        Duration::minutes(10),
        150,
        Collaborators {
            clock,
            calendar: calendar.clone(),
            directory: Arc::new(FakeDirectory::default()),
            messenger: messenger.clone(),
        },
    )
    .unwrap();
    (runtime, calendar, messenger)
}

async fn wait_for_reply(messenger: &RecordingMessenger) -> String {
    tokio::time::timeout(StdDuration::from_secs(5), async {
        loop {
            if let Some(reply) = messenger.last() {
                return reply.text;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
    })
    .await
    .expect("no reply delivered")
}

/// Test: a due block alert is delivered without any user action.
#[tokio::test]
async fn test_due_timer_is_delivered() {
    let (runtime, calendar, messenger) = runtime_at(ny(12, 50));
    calendar.set_events(vec![event("Write report", ny(13, 0), Some(ny(15, 0)))]);

    runtime
        .scheduler()
        .schedule_once(
            JobKey::new(SessionId::from(SESSION), JobKind::BlockStart, "Write report"),
            ny(12, 50),
            Step::BlockStartAlert,
            json!({ "title": "Write report", "start": ny(13, 0) }),
        )
        .unwrap();

    assert_eq!(
        wait_for_reply(&messenger).await,
        "It's almost 13:00. Time to work on Write report"
    );
    let session = runtime
        .driver()
        .sessions()
        .snapshot(&SessionId::from(SESSION))
        .await
        .unwrap();
    assert_eq!(session.current_step, Step::BlockStartAlert);
    assert!(runtime.scheduler().pending(&SessionId::from(SESSION)).is_empty());
}

/// Test: a job cancelled before its time never reaches the user.
#[tokio::test(start_paused = true)]
async fn test_cancelled_timer_never_fires() {
    let (runtime, _calendar, messenger) = runtime_at(ny(17, 0));
    let key = JobKey::singleton(SessionId::from(SESSION), JobKind::ReviewLater);
    runtime
        .scheduler()
        .schedule_once(key.clone(), ny(17, 1), Step::NightNewReviewTime, json!(null))
        .unwrap();

    assert!(runtime.scheduler().cancel(&key));
    tokio::time::sleep(StdDuration::from_secs(120)).await;
    assert!(messenger.texts().is_empty());
}
