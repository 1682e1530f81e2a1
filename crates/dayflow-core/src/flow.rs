//! Step identifiers and the contract every flow implements.
//!
//! A [`Step`] names one node of a conversation graph. Its string form doubles
//! as button callback data, so a button press selects its handler directly
//! while free text is matched against the session's current step.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::calendar::{CalendarEvent, CalendarGateway, EventQuery};
use crate::clock::{Clock, DayWindow};
use crate::directory::UserDirectory;
use crate::error::FlowError;
use crate::scheduler::Scheduler;
use crate::session::{Session, SessionId};
use crate::transport::{Button, Command, Reply};

macro_rules! steps {
    ($($variant:ident => $id:literal),+ $(,)?) => {
        /// One node of a conversation flow.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Step {
            $($variant),+
        }

        impl Step {
            pub const ALL: &'static [Step] = &[$(Step::$variant),+];

            /// Wire identifier, also used as button callback data.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Step::$variant => $id),+
                }
            }
        }

        impl FromStr for Step {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($id => Ok(Step::$variant),)+
                    other => Err(format!("unknown step '{other}'")),
                }
            }
        }
    };
}

steps! {
    Idle => "idle",
    SessionCommand => "command",

    MorningPlan => "morning_flow_events",
    MorningAcknowledge => "morning_flow_events_acknowledge",
    MorningEdit => "morning_flow_events_edit",
    MorningEditDone => "morning_flow_events_edit_yes",

    BlockStartAlert => "block_start_alert",
    BlockStartConfirm => "block_start_alert_confirm",
    BlockScheduleEdit => "block_flow_schedule_edit",
    BlockScheduleUpdated => "block_flow_schedule_edit_yes",
    BlockEndAlert => "block_end_alert",
    BlockEndDone => "block_end_alert_yes",
    BlockEndNotDone => "block_end_alert_no",

    NightReview => "night_flow_review",
    NightReviewYes => "night_flow_review_yes",
    NightReviewLater => "night_flow_review_later",
    NightReviewSkip => "night_flow_review_skip",
    NightFeeling => "night_flow_feeling",
    NightFavourite => "night_flow_favourite",
    NightProud => "night_flow_proud",
    NightImprove => "night_flow_improve",
    NightComment => "night_flow_comment",
    NightCommentSkip => "night_flow_comment_skip",
    NightTomorrow => "night_flow_tomorrow_schedule",
    NightTomorrowConfirm => "night_flow_tomorrow_schedule_confirm",
    NightTomorrowEdit => "night_flow_tomorrow_schedule_edit",
    NightTomorrowUpdated => "night_flow_tomorrow_schedule_edit_yes",
    NightPickTime => "night_flow_pick_time",
    NightNewReviewTime => "night_flow_new_review_time",
    NightNewReviewYes => "night_flow_new_review_time_yes",
    NightNewReviewSkip => "night_flow_new_review_time_skip",

    TaskCommand => "task",
    TaskTitle => "task_title",
    TaskDeadline => "task_date",
    TaskDuration => "task_duration",
    TaskCreation => "task_creation",
    TaskConfirm => "task_creation_confirm",
    TaskEdit => "task_creation_edit",
    TaskScheduleUpdated => "task_schedule_edit_yes",

    EventCommand => "event",
    EventTitle => "event_title",
    EventDate => "event_date",
    EventStart => "event_start_time",
    EventEnd => "event_end_time",
    EventCreation => "event_creation",
    EventConfirm => "event_creation_confirm",
    EventCancel => "event_creation_cancel",
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The conversation graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowId {
    Session,
    Morning,
    Block,
    Night,
    Task,
    Event,
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowId::Session => "session",
            FlowId::Morning => "morning",
            FlowId::Block => "block",
            FlowId::Night => "night",
            FlowId::Task => "task",
            FlowId::Event => "event",
        };
        f.write_str(s)
    }
}

/// Event kinds that can select a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Free text while the session sits on the step.
    Text,
    /// Button whose callback data names the step.
    Button,
    /// Scheduled job whose callback step is the step.
    Timer,
    /// Slash command mapped to the step.
    Command,
}

/// Static description of one step.
///
/// `next` lists every step the session can move to from here, whether the
/// handler returns it or offers it as a button or a timer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSpec {
    pub step: Step,
    pub triggers: &'static [Trigger],
    pub next: &'static [Step],
    pub entry: bool,
    pub terminal: bool,
}

impl StepSpec {
    pub const fn new(step: Step, triggers: &'static [Trigger], next: &'static [Step]) -> Self {
        Self {
            step,
            triggers,
            next,
            entry: false,
            terminal: false,
        }
    }

    pub const fn entry(mut self) -> Self {
        self.entry = true;
        self
    }

    /// The handler may end the flow from this step.
    pub const fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn accepts(&self, trigger: Trigger) -> bool {
        self.triggers.contains(&trigger)
    }
}

/// What a handler asks the driver to do with the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to `Step` and wait for the next event there.
    Next(Step),
    /// Keep the current step.
    Stay,
    /// Flow finished: clear scratch, go idle.
    End,
}

/// The event payload a handler sees.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Text(String),
    Button,
    Timer(serde_json::Value),
    Command(Command),
}

impl Input {
    pub fn trigger(&self) -> Trigger {
        match self {
            Input::Text(_) => Trigger::Text,
            Input::Button => Trigger::Button,
            Input::Timer(_) => Trigger::Timer,
            Input::Command(_) => Trigger::Command,
        }
    }
}

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub window: DayWindow,
    pub block_alert_lead: Duration,
    pub event_limit: usize,
    pub calendar: Arc<dyn CalendarGateway>,
    pub directory: Arc<dyn UserDirectory>,
    pub scheduler: Scheduler,
}

/// Everything a handler may touch while it runs.
pub struct FlowContext<'a> {
    pub session: &'a mut Session,
    pub services: &'a Services,
    pub input: Input,
    replies: Vec<Reply>,
}

impl<'a> FlowContext<'a> {
    pub fn new(session: &'a mut Session, services: &'a Services, input: Input) -> Self {
        Self {
            session,
            services,
            input,
            replies: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.services.clock.now()
    }

    pub fn window(&self) -> &DayWindow {
        &self.services.window
    }

    pub fn say(&mut self, text: impl Into<String>) {
        self.replies.push(Reply::text(text));
    }

    pub fn ask(&mut self, text: impl Into<String>, buttons: Vec<Button>) {
        self.replies.push(Reply::with_buttons(text, buttons));
    }

    pub fn replies(&self) -> &[Reply] {
        &self.replies
    }

    pub fn into_replies(self) -> Vec<Reply> {
        self.replies
    }

    /// The user's free text, trimmed.
    pub fn text(&self) -> Result<&str, FlowError> {
        match &self.input {
            Input::Text(text) => Ok(text.trim()),
            _ => Err(FlowError::missing("text input")),
        }
    }

    /// Payload of the fired job.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, FlowError> {
        match &self.input {
            Input::Timer(value) => Ok(serde_json::from_value(value.clone())?),
            _ => Err(FlowError::missing("timer payload")),
        }
    }

    /// Required scratch value.
    pub fn scratch<T: DeserializeOwned>(&self, key: &str) -> Result<T, FlowError> {
        self.session
            .scratch
            .get(key)?
            .ok_or_else(|| FlowError::missing(format!("scratch '{key}'")))
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), FlowError> {
        self.session.scratch.put(key, value)?;
        Ok(())
    }

    /// The user's calendar refresh token; empty when the user has none.
    pub async fn refresh_token(&self) -> Result<String, FlowError> {
        let user = self.services.directory.user(self.session_id()).await?;
        Ok(user
            .and_then(|u| u.google_refresh_token)
            .unwrap_or_default())
    }

    pub async fn events(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>, FlowError> {
        let token = self.refresh_token().await?;
        Ok(self.services.calendar.events(&token, query).await?)
    }

    /// Events in today's working window.
    pub async fn today_events(&self) -> Result<Vec<CalendarEvent>, FlowError> {
        let range = self.window().today(self.now());
        self.events(&EventQuery::range(range, self.services.event_limit))
            .await
    }

    /// Events in tomorrow's working window.
    pub async fn tomorrow_events(&self) -> Result<Vec<CalendarEvent>, FlowError> {
        let range = self.window().tomorrow(self.now());
        self.events(&EventQuery::range(range, self.services.event_limit))
            .await
    }

    pub fn editor_link(&self) -> String {
        self.services.calendar.editor_link(self.session_id())
    }
}

/// A conversation graph and the handlers for its steps.
#[async_trait]
pub trait Flow: Send + Sync {
    fn id(&self) -> FlowId;

    fn steps(&self) -> &'static [StepSpec];

    /// Run the handler for `step`. Replies go through `ctx`.
    async fn handle(&self, step: Step, ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_ids_are_unique_and_parse_back() {
        let mut seen = std::collections::HashSet::new();
        for step in Step::ALL {
            assert!(seen.insert(step.as_str()), "duplicate id {step}");
            assert_eq!(step.as_str().parse::<Step>().unwrap(), *step);
        }
    }

    #[test]
    fn step_serializes_as_callback_data() {
        let json = serde_json::to_string(&Step::BlockEndDone).unwrap();
        assert_eq!(json, "\"block_end_alert_yes\"");
        let step: Step = serde_json::from_str("\"night_flow_pick_time\"").unwrap();
        assert_eq!(step, Step::NightPickTime);
        assert!(serde_json::from_str::<Step>("\"nap\"").is_err());
    }
}
