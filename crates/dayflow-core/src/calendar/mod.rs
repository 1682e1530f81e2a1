//! Calendar gateway contract and schedule rendering.

mod google;

pub use google::GoogleCalendar;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{DayWindow, TimeRange};
use crate::error::GatewayError;
use crate::session::SessionId;

/// Shown instead of an empty schedule.
pub const NO_EVENTS: &str = "No upcoming events found.";

/// A calendar event as the flows see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Option<String>,
    pub title: String,
    pub start: DateTime<Utc>,
    /// Absent when the provider returned no end instant.
    pub end: Option<DateTime<Utc>>,
}

/// Event search parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub search: Option<String>,
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl EventQuery {
    /// Events overlapping `range`.
    pub fn range(range: TimeRange, limit: usize) -> Self {
        Self {
            search: None,
            time_min: Some(range.start),
            time_max: Some(range.end),
            limit,
        }
    }

    /// Free-text search.
    pub fn search(text: impl Into<String>, limit: usize) -> Self {
        Self {
            search: Some(text.into()),
            time_min: None,
            time_max: None,
            limit,
        }
    }

    /// Narrow to `range`.
    pub fn within(mut self, range: TimeRange) -> Self {
        self.time_min = Some(range.start);
        self.time_max = Some(range.end);
        self
    }
}

/// Event to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Calendar provider boundary. Auth refresh and retries live behind it.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    /// Events matching `query`, ordered by start.
    async fn events(
        &self,
        refresh_token: &str,
        query: &EventQuery,
    ) -> Result<Vec<CalendarEvent>, GatewayError>;

    async fn insert_event(
        &self,
        refresh_token: &str,
        event: &NewEvent,
    ) -> Result<CalendarEvent, GatewayError>;

    /// Link to the provider's editor UI for this user.
    fn editor_link(&self, user: &SessionId) -> String;
}

/// One line per event, local times. Never empty.
pub fn render_schedule(events: &[CalendarEvent], window: &DayWindow) -> String {
    if events.is_empty() {
        return NO_EVENTS.to_string();
    }
    events
        .iter()
        .map(|event| match event.end {
            Some(end) => format!(
                "{} - {}  {}",
                window.local_hhmm(event.start),
                window.local_hhmm(end),
                event.title
            ),
            None => format!("{}  {}", window.local_hhmm(event.start), event.title),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn window() -> DayWindow {
        DayWindow::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        )
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        chrono_tz::America::New_York
            .with_ymd_and_hms(2026, 10, 15, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn empty_schedule_renders_fallback() {
        assert_eq!(render_schedule(&[], &window()), NO_EVENTS);
    }

    #[test]
    fn schedule_lines_use_local_time() {
        let events = vec![
            CalendarEvent {
                id: None,
                title: "Write report".into(),
                start: at(13, 0),
                end: Some(at(15, 0)),
            },
            CalendarEvent {
                id: None,
                title: "Call mum".into(),
                start: at(18, 30),
                end: None,
            },
        ];
        assert_eq!(
            render_schedule(&events, &window()),
            "13:00 - 15:00  Write report\n18:30  Call mum"
        );
    }
}
