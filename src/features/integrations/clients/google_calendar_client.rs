use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::http::read_json;
use crate::features::integrations::error::IntegrationError;
use crate::features::integrations::models::{CalendarEvent, CalendarEventPage, NewCalendarEvent};

pub const GOOGLE_CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    start: EventTimeBody<'a>,
    end: EventTimeBody<'a>,
    attendees: Vec<AttendeeBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conference_data: Option<ConferenceDataBody>,
    reminders: RemindersBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTimeBody<'a> {
    date_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AttendeeBody<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConferenceDataBody {
    create_request: CreateConferenceRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateConferenceRequest {
    request_id: String,
    conference_solution_key: ConferenceSolutionKey,
}

#[derive(Debug, Serialize)]
struct ConferenceSolutionKey {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemindersBody {
    use_default: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventResource {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    html_link: Option<String>,
    #[serde(default)]
    hangout_link: Option<String>,
    #[serde(default)]
    start: Option<EventTimeResource>,
    #[serde(default)]
    end: Option<EventTimeResource>,
    #[serde(default)]
    attendees: Vec<AttendeeResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTimeResource {
    #[serde(default)]
    date_time: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

impl EventTimeResource {
    fn into_string(self) -> Option<String> {
        self.date_time.or(self.date)
    }
}

#[derive(Debug, Deserialize)]
struct AttendeeResource {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResource {
    #[serde(default)]
    items: Vec<EventResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl From<EventResource> for CalendarEvent {
    fn from(resource: EventResource) -> Self {
        Self {
            id: resource.id,
            summary: resource.summary,
            status: resource.status,
            html_link: resource.html_link,
            meet_link: resource.hangout_link,
            start: resource.start.and_then(EventTimeResource::into_string),
            end: resource.end.and_then(EventTimeResource::into_string),
            attendees: resource
                .attendees
                .into_iter()
                .filter_map(|a| a.email)
                .collect(),
        }
    }
}

/// Google Calendar v3 client for the user's primary calendar
#[derive(Clone)]
pub struct GoogleCalendarClient {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn create_event(
        &self,
        access_token: &str,
        event: &NewCalendarEvent,
    ) -> Result<CalendarEvent, IntegrationError> {
        let time_zone = event.time_zone.as_deref();
        let body = EventBody {
            summary: &event.summary,
            description: event.description.as_deref(),
            location: event.location.as_deref(),
            start: EventTimeBody {
                date_time: event.start,
                time_zone,
            },
            end: EventTimeBody {
                date_time: event.end,
                time_zone,
            },
            attendees: event
                .attendees
                .iter()
                .map(|email| AttendeeBody { email })
                .collect(),
            conference_data: event.add_meet_link.then(|| ConferenceDataBody {
                create_request: CreateConferenceRequest {
                    request_id: Uuid::new_v4().to_string(),
                    conference_solution_key: ConferenceSolutionKey {
                        kind: "hangoutsMeet",
                    },
                },
            }),
            reminders: RemindersBody { use_default: true },
        };

        let mut request = self
            .client
            .post(format!("{}/calendars/primary/events", self.base_url))
            .bearer_auth(access_token)
            .json(&body);
        if event.add_meet_link {
            request = request.query(&[("conferenceDataVersion", "1")]);
        }

        let created: EventResource = read_json(request.send().await?).await?;
        tracing::info!(event_id = %created.id, "Calendar event created");
        Ok(created.into())
    }

    pub async fn list_upcoming_events(
        &self,
        access_token: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<CalendarEventPage, IntegrationError> {
        let mut query = vec![
            ("timeMin".to_string(), Utc::now().to_rfc3339()),
            ("singleEvents".to_string(), "true".to_string()),
            ("orderBy".to_string(), "startTime".to_string()),
            ("maxResults".to_string(), max_results.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken".to_string(), token.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/calendars/primary/events", self.base_url))
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await?;

        let list: EventListResource = read_json(response).await?;
        Ok(CalendarEventPage {
            events: list.items.into_iter().map(Into::into).collect(),
            next_page_token: list.next_page_token,
        })
    }
}
