//! Google Calendar adapter.
//!
//! Every call exchanges the user's refresh token for a short-lived access
//! token, then talks to the v3 REST API on the primary calendar.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{CalendarEvent, CalendarGateway, EventQuery, NewEvent};
use crate::clock::resolve_local;
use crate::error::GatewayError;
use crate::session::SessionId;
use crate::storage::CalendarConfig;

pub struct GoogleCalendar {
    client: Client,
    api_base_url: String,
    token_url: String,
    editor_url: String,
    client_id: String,
    client_secret: String,
    /// Zone all-day events are anchored in.
    tz: Tz,
}

impl GoogleCalendar {
    pub fn new(config: &CalendarConfig) -> Self {
        Self {
            client: Client::new(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
            editor_url: config.editor_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            tz: Tz::UTC,
        }
    }

    /// Place all-day events at local midnight of `tz` instead of UTC.
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    async fn access_token(&self, refresh_token: &str) -> Result<String, GatewayError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let body: Value = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = body.get("error") {
            return Err(GatewayError::Api(format!("token refresh failed: {error}")));
        }
        body["access_token"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| GatewayError::Malformed("token response has no access_token".into()))
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/primary/events", self.api_base_url)
    }
}

fn check_api_error(body: &Value) -> Result<(), GatewayError> {
    match body.get("error") {
        Some(error) => Err(GatewayError::Api(error.to_string())),
        None => Ok(()),
    }
}

fn parse_instant(value: &Value, tz: Tz) -> Option<DateTime<Utc>> {
    if let Some(text) = value["dateTime"].as_str() {
        return DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    // All-day events only carry a date.
    value["date"]
        .as_str()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(|d| resolve_local(tz, d.and_time(NaiveTime::MIN)))
}

fn parse_event(item: &Value, tz: Tz) -> Result<CalendarEvent, GatewayError> {
    let start = parse_instant(&item["start"], tz)
        .ok_or_else(|| GatewayError::Malformed(format!("event without start: {item}")))?;
    let end = item["end"]["dateTime"]
        .as_str()
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(CalendarEvent {
        id: item["id"].as_str().map(String::from),
        title: item["summary"].as_str().unwrap_or("(No title)").to_string(),
        start,
        end,
    })
}

#[async_trait]
impl CalendarGateway for GoogleCalendar {
    async fn events(
        &self,
        refresh_token: &str,
        query: &EventQuery,
    ) -> Result<Vec<CalendarEvent>, GatewayError> {
        let token = self.access_token(refresh_token).await?;

        let mut params = vec![
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", query.limit.max(1).to_string()),
        ];
        if let Some(min) = query.time_min {
            params.push(("timeMin", min.to_rfc3339()));
        }
        if let Some(max) = query.time_max {
            params.push(("timeMax", max.to_rfc3339()));
        }
        if let Some(search) = &query.search {
            params.push(("q", search.clone()));
        }

        let body: Value = self
            .client
            .get(self.events_url())
            .bearer_auth(&token)
            .query(&params)
            .send()
            .await?
            .json()
            .await?;
        check_api_error(&body)?;

        let items = body["items"]
            .as_array()
            .ok_or_else(|| GatewayError::Malformed("missing items in response".into()))?;
        debug!(count = items.len(), "fetched calendar events");
        items.iter().map(|item| parse_event(item, self.tz)).collect()
    }

    async fn insert_event(
        &self,
        refresh_token: &str,
        event: &NewEvent,
    ) -> Result<CalendarEvent, GatewayError> {
        let token = self.access_token(refresh_token).await?;
        let payload = json!({
            "summary": event.title,
            "start": { "dateTime": event.start.to_rfc3339() },
            "end": { "dateTime": event.end.to_rfc3339() },
        });

        let body: Value = self
            .client
            .post(self.events_url())
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;
        check_api_error(&body)?;
        parse_event(&body, self.tz)
    }

    fn editor_link(&self, user: &SessionId) -> String {
        Url::parse_with_params(&self.editor_url, &[("user", user.as_str())])
            .map(String::from)
            .unwrap_or_else(|_| self.editor_url.clone())
    }
}
