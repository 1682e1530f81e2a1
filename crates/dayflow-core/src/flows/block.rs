//! Block reminders around calendar events.
//!
//! ```text
//! [timer] block_start_alert --Ok!--------------> block_start_alert_confirm (end)
//!                           --Change of Plans--> block_flow_schedule_edit
//!                                                  --Yes--> block_flow_schedule_edit_yes
//! [timer] block_end_alert --Yes--> block_end_alert_yes (end | night review)
//!                         --No---> block_end_alert_no --Yes--> block_flow_schedule_edit_yes
//! ```

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::edit::{self, EditTarget};
use super::night;
use crate::calendar::{CalendarEvent, EventQuery};
use crate::error::FlowError;
use crate::flow::{Flow, FlowContext, FlowId, Step, StepSpec, Transition, Trigger};
use crate::scheduler::{JobKey, JobKind};
use crate::transport::Button;

const BLOCK: &str = "block";

/// Job payload and scratch record for the block being tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub title: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
}

static STEPS: &[StepSpec] = &[
    StepSpec::new(
        Step::BlockStartAlert,
        &[Trigger::Timer],
        &[Step::BlockStartConfirm, Step::BlockScheduleEdit],
    )
    .entry(),
    StepSpec::new(Step::BlockStartConfirm, &[Trigger::Button], &[Step::BlockEndAlert]).terminal(),
    StepSpec::new(
        Step::BlockScheduleEdit,
        &[Trigger::Button],
        &[Step::BlockScheduleUpdated],
    ),
    StepSpec::new(
        Step::BlockScheduleUpdated,
        &[Trigger::Button],
        &[Step::NightReview],
    )
    .terminal(),
    StepSpec::new(
        Step::BlockEndAlert,
        &[Trigger::Timer],
        &[Step::BlockEndDone, Step::BlockEndNotDone],
    ),
    StepSpec::new(Step::BlockEndDone, &[Trigger::Button], &[Step::NightReview]).terminal(),
    StepSpec::new(
        Step::BlockEndNotDone,
        &[Trigger::Button],
        &[Step::BlockScheduleUpdated],
    ),
];

pub struct BlockFlow;

#[async_trait]
impl Flow for BlockFlow {
    fn id(&self) -> FlowId {
        FlowId::Block
    }

    fn steps(&self) -> &'static [StepSpec] {
        STEPS
    }

    async fn handle(&self, step: Step, ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
        match step {
            Step::BlockStartAlert => start_alert(ctx),
            Step::BlockStartConfirm => start_confirm(ctx).await,
            Step::BlockScheduleEdit => {
                edit::prompt(ctx, Step::BlockScheduleUpdated);
                Ok(Transition::Next(Step::BlockScheduleEdit))
            }
            Step::BlockScheduleUpdated => {
                let events = edit::confirm(ctx, EditTarget::Today).await?;
                Ok(next_block(ctx, &events))
            }
            Step::BlockEndAlert => end_alert(ctx),
            Step::BlockEndDone => {
                let events = ctx.today_events().await?;
                Ok(next_block(ctx, &events))
            }
            Step::BlockEndNotDone => {
                ctx.say("No worries! Move it to another slot in your calendar.");
                edit::prompt(ctx, Step::BlockScheduleUpdated);
                Ok(Transition::Next(Step::BlockEndNotDone))
            }
            other => Err(FlowError::missing(format!("block handler for {other}"))),
        }
    }
}

fn start_alert(ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
    let block: BlockPayload = ctx.payload()?;
    let start = block
        .start
        .ok_or_else(|| FlowError::missing("block start time"))?;
    let text = format!(
        "It's almost {}. Time to work on {}",
        ctx.window().local_hhmm(start),
        block.title
    );
    ctx.put(BLOCK, &block)?;
    ctx.ask(
        text,
        vec![
            Button::step("Ok!", Step::BlockStartConfirm),
            Button::step("Change of Plans", Step::BlockScheduleEdit),
        ],
    );
    Ok(Transition::Next(Step::BlockStartAlert))
}

async fn start_confirm(ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
    let block: BlockPayload = ctx.scratch(BLOCK)?;
    let event = find_block(ctx, &block).await?;
    let end = event.end.ok_or_else(|| FlowError::MissingEnd {
        title: event.title.clone(),
    })?;

    let payload = serde_json::to_value(BlockPayload {
        title: event.title.clone(),
        start: Some(event.start),
    })?;
    ctx.services.scheduler.schedule_once(
        block_key(ctx, JobKind::BlockEnd, &event),
        end,
        Step::BlockEndAlert,
        payload,
    )?;

    ctx.say("Great!");
    Ok(Transition::End)
}

fn end_alert(ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
    let block: BlockPayload = ctx.payload()?;
    let text = format!("Time's up! Did you get {} done?", block.title);
    ctx.put(BLOCK, &block)?;
    ctx.ask(
        text,
        vec![
            Button::step("Yes", Step::BlockEndDone),
            Button::step("No", Step::BlockEndNotDone),
        ],
    );
    Ok(Transition::Next(Step::BlockEndAlert))
}

/// The single event today matching the tracked block's title and, when
/// known, its start.
async fn find_block(
    ctx: &FlowContext<'_>,
    block: &BlockPayload,
) -> Result<CalendarEvent, FlowError> {
    let today = ctx.window().today(ctx.now());
    let query = EventQuery::search(&block.title, ctx.services.event_limit).within(today);
    let mut matches: Vec<CalendarEvent> = ctx
        .events(&query)
        .await?
        .into_iter()
        .filter(|e| e.title == block.title)
        .filter(|e| block.start.map_or(true, |start| e.start == start))
        .collect();

    match matches.len() {
        0 => Err(FlowError::LookupEmpty {
            query: block.title.clone(),
        }),
        1 => Ok(matches.remove(0)),
        count => Err(FlowError::LookupAmbiguous {
            query: block.title.clone(),
            count,
        }),
    }
}

/// Block jobs are keyed by title and local start, so two occurrences of the
/// same title on one day keep separate alerts.
fn block_key(ctx: &FlowContext<'_>, kind: JobKind, event: &CalendarEvent) -> JobKey {
    let subject = format!(
        "{}@{}",
        event.title,
        ctx.window().local_time(event.start).format("%H%M")
    );
    JobKey::new(ctx.session_id().clone(), kind, subject)
}

/// Announce the next block, or move on to the night review when none is left.
fn next_block(ctx: &mut FlowContext<'_>, events: &[CalendarEvent]) -> Transition {
    let now = ctx.now();
    match events.iter().filter(|e| e.start > now).min_by_key(|e| e.start) {
        Some(next) => {
            let text = format!(
                "Nice job! Next up you have {} at {}",
                next.title,
                ctx.window().local_hhmm(next.start)
            );
            ctx.say(text);
            Transition::End
        }
        None => {
            night::review_prompt(ctx);
            Transition::Next(Step::NightReview)
        }
    }
}

/// Regenerate the session's block alerts from today's `events`.
///
/// Every block job is dropped first. Events that have not started get a start
/// alert `block_alert_lead` before they begin, or at their start once that
/// moment has passed. Blocks already running keep an end alert, moved to the
/// event's current end, if they had one. Returns the number of jobs scheduled.
pub fn sync_block_jobs(
    ctx: &FlowContext<'_>,
    events: &[CalendarEvent],
) -> Result<usize, FlowError> {
    let scheduler = &ctx.services.scheduler;
    let session = ctx.session_id().clone();
    let now = ctx.now();

    let running: HashSet<String> = scheduler
        .pending(&session)
        .into_iter()
        .filter(|h| h.key.kind == JobKind::BlockEnd)
        .map(|h| h.key.subject)
        .collect();
    scheduler.cancel_session(&session, &[JobKind::BlockStart, JobKind::BlockEnd]);

    let mut scheduled = 0;
    for event in events {
        let payload = serde_json::to_value(BlockPayload {
            title: event.title.clone(),
            start: Some(event.start),
        })?;

        if event.start > now {
            let lead = event.start - ctx.services.block_alert_lead;
            let fire = if lead > now { lead } else { event.start };
            scheduler.schedule_once(
                block_key(ctx, JobKind::BlockStart, event),
                fire,
                Step::BlockStartAlert,
                payload,
            )?;
            scheduled += 1;
        } else if let Some(end) = event.end.filter(|end| *end > now) {
            let key = block_key(ctx, JobKind::BlockEnd, event);
            if running.contains(&key.subject) {
                scheduler.schedule_once(
                    key,
                    end,
                    Step::BlockEndAlert,
                    payload,
                )?;
                scheduled += 1;
            }
        }
    }

    debug!(session = %session, scheduled, "block jobs regenerated");
    Ok(scheduled)
}
