//! Integration tests for dispatch, commands and timer re-entry.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Duration;
use common::{ny, Harness};
use dayflow_core::{
    FlowId, InboundEvent, JobKey, JobKind, SessionId, Step, FALLBACK_MESSAGE,
};
use serde_json::Value;

#[tokio::test]
async fn test_failed_handler_leaves_step_unchanged() {
    let h = Harness::at(ny(22, 0));
    h.text("/start").await;
    h.fire_kind(JobKind::NightReview).await;
    assert_eq!(h.step().await, Step::NightReview);

    h.calendar.fail(true);
    assert!(h.press(Step::NightReviewYes).await.is_none());
    assert_eq!(h.messenger.last_text(), FALLBACK_MESSAGE);
    assert_eq!(h.step().await, Step::NightReview);

    h.calendar.fail(false);
    h.press(Step::NightReviewYes).await;
    assert_eq!(h.step().await, Step::NightFeeling);
}

#[tokio::test]
async fn test_failed_handler_discards_partial_replies_and_scratch() {
    let h = Harness::at(ny(9, 0));
    h.text("/event").await;
    h.text("Dentist").await;
    h.text("1015").await;
    h.text("1400").await;
    h.text("1500").await;
    h.messenger.clear();

    h.calendar.fail(true);
    assert!(h.press(Step::EventConfirm).await.is_none());
    assert_eq!(h.messenger.texts(), vec![FALLBACK_MESSAGE.to_string()]);
    assert_eq!(h.step().await, Step::EventCreation);

    let session = h
        .driver
        .sessions()
        .snapshot(&Harness::session())
        .await
        .unwrap();
    assert!(session.scratch.contains("new_event"));
}

#[tokio::test]
async fn test_unknown_callback_data_is_dropped() {
    let h = Harness::at(ny(9, 0));
    assert!(h.press_raw("nope").await.is_none());
    assert!(h.messenger.texts().is_empty());
    assert_eq!(h.step().await, Step::Idle);
}

#[tokio::test]
async fn test_text_without_active_flow_is_dropped() {
    let h = Harness::at(ny(9, 0));
    assert!(h.text("hello?").await.is_none());
    assert!(h.messenger.texts().is_empty());
}

#[tokio::test]
async fn test_text_on_button_only_step_is_dropped() {
    let h = Harness::at(ny(22, 0));
    h.text("/start").await;
    h.fire_kind(JobKind::NightReview).await;
    h.messenger.clear();

    assert!(h.text("yes please").await.is_none());
    assert!(h.messenger.texts().is_empty());
    assert_eq!(h.step().await, Step::NightReview);
}

#[tokio::test]
async fn test_replaced_timer_ticket_is_stale() {
    let h = Harness::at(ny(9, 0));
    let key = JobKey::singleton(Harness::session(), JobKind::ReviewLater);
    let first = h
        .scheduler()
        .schedule_once(key.clone(), ny(18, 0), Step::NightNewReviewTime, Value::Null)
        .unwrap();
    let second = h
        .scheduler()
        .schedule_once(key, ny(19, 0), Step::NightNewReviewTime, Value::Null)
        .unwrap();

    assert!(h.fire(&first).await.is_none());
    assert!(h.messenger.texts().is_empty());
    assert_eq!(h.step().await, Step::Idle);

    h.fire(&second).await;
    assert_eq!(h.messenger.last_text(), "It is time to review your day!");
}

#[tokio::test]
async fn test_one_shot_timer_is_handled_once() {
    let h = Harness::at(ny(9, 0));
    let handle = h
        .scheduler()
        .schedule_once(
            JobKey::singleton(Harness::session(), JobKind::ReviewLater),
            ny(18, 0),
            Step::NightNewReviewTime,
            Value::Null,
        )
        .unwrap();

    h.fire(&handle).await;
    h.fire(&handle).await;
    assert_eq!(h.messenger.texts().len(), 1);
}

#[tokio::test]
async fn test_cancelled_timer_is_not_delivered() {
    let h = Harness::at(ny(9, 0));
    let key = JobKey::singleton(Harness::session(), JobKind::ReviewLater);
    let handle = h
        .scheduler()
        .schedule_once(key.clone(), ny(18, 0), Step::NightNewReviewTime, Value::Null)
        .unwrap();

    assert!(h.scheduler().cancel(&key));
    assert!(!h.scheduler().cancel(&key));
    h.fire(&handle).await;
    assert!(h.messenger.texts().is_empty());
}

#[tokio::test]
async fn test_start_arms_daily_jobs_once() {
    let h = Harness::at(ny(6, 0));
    h.text("/start").await;
    h.text("/start").await;

    let kinds: Vec<_> = h
        .pending()
        .into_iter()
        .map(|j| (j.key.kind, j.next_fire))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (JobKind::MorningPlan, ny(7, 0)),
            (JobKind::NightReview, ny(22, 0)),
        ]
    );
}

#[tokio::test]
async fn test_daily_job_stays_armed_after_firing() {
    let h = Harness::at(ny(6, 0));
    h.text("/start").await;
    h.clock.set(ny(7, 0));
    h.fire_kind(JobKind::MorningPlan).await;
    h.press(Step::MorningAcknowledge).await;

    assert_eq!(h.pending_of(JobKind::MorningPlan).len(), 1);
    h.clock.set(ny(7, 0) + Duration::days(1));
    h.fire_kind(JobKind::MorningPlan).await;
    assert_eq!(h.step().await, Step::MorningPlan);
}

#[tokio::test]
async fn test_cancel_ends_active_flow() {
    let h = Harness::at(ny(9, 0));
    h.text("/task").await;
    h.text("Write report").await;
    assert_eq!(h.step().await, Step::TaskDeadline);

    let done = h.text("/cancel").await.unwrap();
    assert_eq!(done.flow, FlowId::Session);
    assert!(done.scratch.contains("new_task"));
    assert_eq!(h.step().await, Step::Idle);

    let session = h
        .driver
        .sessions()
        .snapshot(&Harness::session())
        .await
        .unwrap();
    assert!(session.scratch.is_empty());
}

#[tokio::test]
async fn test_help_keeps_current_step() {
    let h = Harness::at(ny(9, 0));
    h.text("/task").await;
    assert!(h.text("/help").await.is_none());
    assert!(h.messenger.last_text().contains("/task"));
    assert_eq!(h.step().await, Step::TaskTitle);
}

#[tokio::test]
async fn test_unknown_command_is_answered() {
    let h = Harness::at(ny(9, 0));
    h.text("/nap").await;
    assert_eq!(
        h.messenger.last_text(),
        "Sorry, I don't know the command /nap. Try /help."
    );
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let h = Harness::at(ny(9, 0));
    h.text("/task").await;
    h.driver
        .handle(InboundEvent::from_message(SessionId::from("7"), "/event"))
        .await;

    assert_eq!(h.step().await, Step::TaskTitle);
    let other = h
        .driver
        .sessions()
        .snapshot(&SessionId::from("7"))
        .await
        .unwrap();
    assert_eq!(other.current_step, Step::EventTitle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_events_for_one_session_run_sequentially() {
    let h = Harness::at(ny(22, 0));
    h.text("/start").await;
    h.fire_kind(JobKind::NightReview).await;
    h.calendar.slow_down(20);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let driver = Arc::clone(&h.driver);
        tasks.push(tokio::spawn(async move {
            driver
                .handle(InboundEvent::ButtonPress {
                    session: Harness::session(),
                    data: Step::NightReviewSkip.as_str().to_string(),
                })
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(h.calendar.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(h.step().await, Step::NightTomorrow);
}
