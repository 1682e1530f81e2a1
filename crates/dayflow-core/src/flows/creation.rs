//! Linear question sequences for new tasks and events.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::block::sync_block_jobs;
use super::edit::{self, EditTarget};
use crate::calendar::NewEvent;
use crate::clock::{parse_hhmm, parse_mmdd};
use crate::directory::TaskRecord;
use crate::error::FlowError;
use crate::flow::{Flow, FlowContext, FlowId, Step, StepSpec, Transition, Trigger};
use crate::transport::Button;

const NEW_TASK: &str = "new_task";
const NEW_EVENT: &str = "new_event";

const DATE_HINT: &str = "(answer in MMDD format e.g. 1020 for 20 Oct)";

fn invalid_date() -> FlowError {
    FlowError::invalid_input(format!("Invalid date! Please try again. {DATE_HINT}"))
}

fn invalid_time() -> FlowError {
    FlowError::invalid_input(
        "Invalid Time! Please try again. (answer in 24h format e.g. 1800 for 6pm)",
    )
}

fn title(ctx: &FlowContext<'_>, reprompt: &str) -> Result<String, FlowError> {
    let text = ctx.text()?;
    if text.is_empty() {
        return Err(FlowError::invalid_input(reprompt));
    }
    Ok(text.to_string())
}

/// Task being built by the task flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub deadline: Option<NaiveDate>,
    pub minutes: Option<u32>,
}

impl TaskDraft {
    fn record(&self, user_id: &str) -> Result<TaskRecord, FlowError> {
        let deadline = self.deadline.ok_or_else(|| FlowError::missing("task deadline"))?;
        let duration = self.minutes.ok_or_else(|| FlowError::missing("task duration"))?;
        Ok(TaskRecord {
            user_id: user_id.to_string(),
            name: self.title.clone(),
            duration,
            deadline: deadline.format("%m%d").to_string(),
        })
    }
}

static TASK_STEPS: &[StepSpec] = &[
    StepSpec::new(Step::TaskCommand, &[Trigger::Command], &[Step::TaskTitle]).entry(),
    StepSpec::new(Step::TaskTitle, &[Trigger::Text], &[Step::TaskDeadline]),
    StepSpec::new(Step::TaskDeadline, &[Trigger::Text], &[Step::TaskDuration]),
    StepSpec::new(Step::TaskDuration, &[Trigger::Text], &[Step::TaskCreation]),
    StepSpec::new(
        Step::TaskCreation,
        &[],
        &[Step::TaskConfirm, Step::TaskEdit],
    ),
    StepSpec::new(Step::TaskConfirm, &[Trigger::Button], &[]).terminal(),
    StepSpec::new(Step::TaskEdit, &[Trigger::Button], &[Step::TaskScheduleUpdated]),
    StepSpec::new(Step::TaskScheduleUpdated, &[Trigger::Button], &[]).terminal(),
];

pub struct TaskFlow;

#[async_trait]
impl Flow for TaskFlow {
    fn id(&self) -> FlowId {
        FlowId::Task
    }

    fn steps(&self) -> &'static [StepSpec] {
        TASK_STEPS
    }

    async fn handle(&self, step: Step, ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
        match step {
            Step::TaskCommand => {
                ctx.put(NEW_TASK, &TaskDraft::default())?;
                ctx.say("What's the task?");
                Ok(Transition::Next(Step::TaskTitle))
            }
            Step::TaskTitle => {
                let mut draft: TaskDraft = ctx.scratch(NEW_TASK)?;
                draft.title = title(ctx, "Please send me a name for the task.")?;
                ctx.put(NEW_TASK, &draft)?;
                ctx.say(format!("When is it due? {DATE_HINT}"));
                Ok(Transition::Next(Step::TaskDeadline))
            }
            Step::TaskDeadline => {
                let mut draft: TaskDraft = ctx.scratch(NEW_TASK)?;
                let today = ctx.window().local_date(ctx.now());
                draft.deadline = Some(parse_mmdd(ctx.text()?, today).ok_or_else(invalid_date)?);
                ctx.put(NEW_TASK, &draft)?;
                ctx.say("How long will it take? (in minutes)");
                Ok(Transition::Next(Step::TaskDuration))
            }
            Step::TaskDuration => {
                let mut draft: TaskDraft = ctx.scratch(NEW_TASK)?;
                let minutes = ctx
                    .text()?
                    .parse::<u32>()
                    .ok()
                    .filter(|m| *m > 0)
                    .ok_or_else(|| {
                        FlowError::invalid_input(
                            "Invalid duration! Please answer with a whole number of minutes.",
                        )
                    })?;
                draft.minutes = Some(minutes);
                ctx.put(NEW_TASK, &draft)?;
                task_summary(ctx, &draft);
                Ok(Transition::Next(Step::TaskCreation))
            }
            Step::TaskConfirm => {
                save_task(ctx).await?;
                ctx.say("Task added!");
                Ok(Transition::End)
            }
            Step::TaskEdit => {
                edit::prompt(ctx, Step::TaskScheduleUpdated);
                Ok(Transition::Next(Step::TaskEdit))
            }
            Step::TaskScheduleUpdated => {
                save_task(ctx).await?;
                // The task is stored; a failed refresh must not offer to save it again.
                if let Err(e) = edit::confirm(ctx, EditTarget::Today).await {
                    warn!(
                        session = %ctx.session_id(),
                        error = %e,
                        "schedule refresh after task save failed"
                    );
                    ctx.say("Task added!");
                }
                Ok(Transition::End)
            }
            other => Err(FlowError::missing(format!("task handler for {other}"))),
        }
    }
}

fn task_summary(ctx: &mut FlowContext<'_>, draft: &TaskDraft) {
    let due = draft
        .deadline
        .map(|d| d.format("%b %d").to_string())
        .unwrap_or_default();
    let minutes = draft.minutes.unwrap_or_default();
    ctx.ask(
        format!(
            "New task: {}\nDue: {due}\nDuration: {minutes} min",
            draft.title
        ),
        vec![
            Button::step("Confirm", Step::TaskConfirm),
            Button::step("Edit schedule", Step::TaskEdit),
        ],
    );
}

async fn save_task(ctx: &FlowContext<'_>) -> Result<(), FlowError> {
    let draft: TaskDraft = ctx.scratch(NEW_TASK)?;
    let record = draft.record(ctx.session_id().as_str())?;
    ctx.services.directory.add_task(&record).await?;
    Ok(())
}

async fn resync_today(ctx: &FlowContext<'_>) -> Result<usize, FlowError> {
    let events = ctx.today_events().await?;
    sync_block_jobs(ctx, &events)
}

/// Event being built by the event flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub date: Option<NaiveDate>,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

static EVENT_STEPS: &[StepSpec] = &[
    StepSpec::new(Step::EventCommand, &[Trigger::Command], &[Step::EventTitle]).entry(),
    StepSpec::new(Step::EventTitle, &[Trigger::Text], &[Step::EventDate]),
    StepSpec::new(Step::EventDate, &[Trigger::Text], &[Step::EventStart]),
    StepSpec::new(Step::EventStart, &[Trigger::Text], &[Step::EventEnd]),
    StepSpec::new(Step::EventEnd, &[Trigger::Text], &[Step::EventCreation]),
    StepSpec::new(
        Step::EventCreation,
        &[],
        &[Step::EventConfirm, Step::EventCancel],
    ),
    StepSpec::new(Step::EventConfirm, &[Trigger::Button], &[]).terminal(),
    StepSpec::new(Step::EventCancel, &[Trigger::Button], &[]).terminal(),
];

pub struct EventFlow;

#[async_trait]
impl Flow for EventFlow {
    fn id(&self) -> FlowId {
        FlowId::Event
    }

    fn steps(&self) -> &'static [StepSpec] {
        EVENT_STEPS
    }

    async fn handle(&self, step: Step, ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
        match step {
            Step::EventCommand => {
                ctx.put(NEW_EVENT, &EventDraft::default())?;
                ctx.say("What's the event called?");
                Ok(Transition::Next(Step::EventTitle))
            }
            Step::EventTitle => {
                let mut draft: EventDraft = ctx.scratch(NEW_EVENT)?;
                draft.title = title(ctx, "Please send me a name for the event.")?;
                ctx.put(NEW_EVENT, &draft)?;
                ctx.say(format!("Which day is it on? {DATE_HINT}"));
                Ok(Transition::Next(Step::EventDate))
            }
            Step::EventDate => {
                let mut draft: EventDraft = ctx.scratch(NEW_EVENT)?;
                let today = ctx.window().local_date(ctx.now());
                draft.date = Some(parse_mmdd(ctx.text()?, today).ok_or_else(invalid_date)?);
                ctx.put(NEW_EVENT, &draft)?;
                ctx.say("What time does it start? (answer in 24h format e.g. 1800 for 6pm)");
                Ok(Transition::Next(Step::EventStart))
            }
            Step::EventStart => {
                let mut draft: EventDraft = ctx.scratch(NEW_EVENT)?;
                draft.start = Some(parse_hhmm(ctx.text()?).ok_or_else(invalid_time)?);
                ctx.put(NEW_EVENT, &draft)?;
                ctx.say("What time does it end? (answer in 24h format e.g. 1900 for 7pm)");
                Ok(Transition::Next(Step::EventEnd))
            }
            Step::EventEnd => {
                let mut draft: EventDraft = ctx.scratch(NEW_EVENT)?;
                let start = draft.start.ok_or_else(|| FlowError::missing("event start"))?;
                let end = parse_hhmm(ctx.text()?).ok_or_else(invalid_time)?;
                if end <= start {
                    return Err(FlowError::invalid_input(
                        "The event has to end after it starts! (answer in 24h format e.g. 1900 for 7pm)",
                    ));
                }
                draft.end = Some(end);
                ctx.put(NEW_EVENT, &draft)?;
                event_summary(ctx, &draft)?;
                Ok(Transition::Next(Step::EventCreation))
            }
            Step::EventConfirm => {
                create_event(ctx).await?;
                Ok(Transition::End)
            }
            Step::EventCancel => {
                ctx.say("Okay, I won't add it.");
                Ok(Transition::End)
            }
            other => Err(FlowError::missing(format!("event handler for {other}"))),
        }
    }
}

fn event_summary(ctx: &mut FlowContext<'_>, draft: &EventDraft) -> Result<(), FlowError> {
    let date = draft.date.ok_or_else(|| FlowError::missing("event date"))?;
    let start = draft.start.ok_or_else(|| FlowError::missing("event start"))?;
    let end = draft.end.ok_or_else(|| FlowError::missing("event end"))?;
    ctx.ask(
        format!(
            "New event: {}\n{}, {} - {}",
            draft.title,
            date.format("%b %d"),
            start.format("%H:%M"),
            end.format("%H:%M")
        ),
        vec![
            Button::step("Confirm", Step::EventConfirm),
            Button::step("Cancel", Step::EventCancel),
        ],
    );
    Ok(())
}

async fn create_event(ctx: &mut FlowContext<'_>) -> Result<(), FlowError> {
    let draft: EventDraft = ctx.scratch(NEW_EVENT)?;
    let date = draft.date.ok_or_else(|| FlowError::missing("event date"))?;
    let start = draft.start.ok_or_else(|| FlowError::missing("event start"))?;
    let end = draft.end.ok_or_else(|| FlowError::missing("event end"))?;

    let window = *ctx.window();
    let event = NewEvent {
        title: draft.title.clone(),
        start: window.at(date, start),
        end: window.at(date, end),
    };
    let token = ctx.refresh_token().await?;
    ctx.services.calendar.insert_event(&token, &event).await?;

    if date == window.local_date(ctx.now()) {
        if let Err(e) = resync_today(ctx).await {
            warn!(
                session = %ctx.session_id(),
                error = %e,
                "block alert refresh after insert failed"
            );
        }
    }
    ctx.say(format!("Added {} to your calendar!", draft.title));
    Ok(())
}
