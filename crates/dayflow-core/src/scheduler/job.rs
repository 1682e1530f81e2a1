//! Job identity and timer payload types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::DayWindow;
use crate::flow::Step;
use crate::session::SessionId;

/// What a job reminds the user about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Daily, at day start.
    MorningPlan,
    /// Daily, at day end.
    NightReview,
    /// Shortly before a calendar block starts.
    BlockStart,
    /// When a calendar block ends.
    BlockEnd,
    /// User-picked time for a deferred nightly review.
    ReviewLater,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::MorningPlan,
        JobKind::NightReview,
        JobKind::BlockStart,
        JobKind::BlockEnd,
        JobKind::ReviewLater,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::MorningPlan => "morning_plan",
            JobKind::NightReview => "night_review",
            JobKind::BlockStart => "block_alert",
            JobKind::BlockEnd => "block_end",
            JobKind::ReviewLater => "review_later",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown job kind '{s}'"))
    }
}

/// At most one live job exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub session: SessionId,
    pub kind: JobKind,
    /// `title@HHMM` for block jobs, empty for per-session singletons.
    pub subject: String,
}

impl JobKey {
    pub fn new(session: SessionId, kind: JobKind, subject: impl Into<String>) -> Self {
        Self {
            session,
            kind,
            subject: subject.into(),
        }
    }

    /// Key for a job kind that exists once per session.
    pub fn singleton(session: SessionId, kind: JobKind) -> Self {
        Self::new(session, kind, "")
    }
}

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FireAt {
    /// Once, at an absolute instant.
    Once(DateTime<Utc>),
    /// Every day at a local time of the configured timezone.
    Daily(NaiveTime),
}

/// Everything needed to register a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub key: JobKey,
    pub fire: FireAt,
    pub callback_step: Step,
    pub payload: serde_json::Value,
}

/// Live job as seen from outside the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub id: Uuid,
    pub key: JobKey,
    pub generation: u64,
    pub fire: FireAt,
    pub next_fire: DateTime<Utc>,
    pub callback_step: Step,
    pub payload: serde_json::Value,
}

impl JobHandle {
    pub fn ticket(&self) -> JobTicket {
        JobTicket {
            key: self.key.clone(),
            generation: self.generation,
        }
    }

    /// The event delivered when this registration fires.
    pub fn fired(&self, at: DateTime<Utc>) -> TimerFired {
        TimerFired {
            ticket: self.ticket(),
            session: self.key.session.clone(),
            callback_step: self.callback_step,
            payload: self.payload.clone(),
            fired_at: at,
        }
    }

    /// Display name carrying kind, subject and local fire time.
    pub fn name(&self, window: &DayWindow) -> JobName {
        JobName {
            kind: self.key.kind,
            subject: self.key.subject.clone(),
            time: window.local_time(self.next_fire),
        }
    }
}

/// Identifies one particular registration of a key.
///
/// A replace or cancel bumps the generation, which makes every ticket handed
/// out for the previous registration stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobTicket {
    pub key: JobKey,
    pub generation: u64,
}

/// A job fired; re-enters the driver like user input.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerFired {
    pub ticket: JobTicket,
    pub session: SessionId,
    pub callback_step: Step,
    pub payload: serde_json::Value,
    pub fired_at: DateTime<Utc>,
}

/// Canonical string form `kind__subject__HHMM`, for logs and listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobName {
    pub kind: JobKind,
    pub subject: String,
    pub time: NaiveTime,
}

const SEPARATOR: &str = "__";

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.kind,
            self.subject,
            self.time.format("%H%M")
        )
    }
}

impl FromStr for JobName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| format!("job name '{s}' has no kind"))?;
        let (subject, time) = rest
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| format!("job name '{s}' has no time"))?;
        let time = crate::clock::parse_hhmm(time)
            .ok_or_else(|| format!("job name '{s}' has an invalid time"))?;
        Ok(JobName {
            kind: kind.parse()?,
            subject: subject.to_string(),
            time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_name_encodes_kind_subject_time() {
        let name = JobName {
            kind: JobKind::BlockStart,
            subject: "ReportWriting".into(),
            time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        };
        assert_eq!(name.to_string(), "block_alert__ReportWriting__1500");
    }

    #[test]
    fn job_name_decodes_subject_with_separator() {
        let name: JobName = "block_end__a__b__0930".parse().unwrap();
        assert_eq!(name.kind, JobKind::BlockEnd);
        assert_eq!(name.subject, "a__b");
        assert_eq!(name.time, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    }

    #[test]
    fn job_name_rejects_bad_input() {
        assert!("block_alert".parse::<JobName>().is_err());
        assert!("nap__Write__1500".parse::<JobName>().is_err());
        assert!("block_alert__Write__2500".parse::<JobName>().is_err());
    }
}
