use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidateEmail, ValidationError};

use crate::features::integrations::models::{CalendarEvent, NewCalendarEvent};
use crate::shared::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::shared::validation::TIME_ZONE_REGEX;

/// Create request for an event on the connected Google Calendar
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_event_window"))]
pub struct CreateCalendarEventDto {
    #[validate(length(min = 1, max = 1024, message = "Summary must be 1-1024 characters"))]
    pub summary: String,

    #[validate(length(max = 8192, message = "Description must not exceed 8192 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 1024, message = "Location must not exceed 1024 characters"))]
    pub location: Option<String>,

    pub start: DateTime<Utc>,

    pub end: DateTime<Utc>,

    /// IANA zone name, e.g. `Europe/Berlin`
    #[validate(regex(path = *TIME_ZONE_REGEX, message = "Invalid time zone"))]
    pub time_zone: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_attendees"))]
    pub attendees: Vec<String>,

    /// Attach a Google Meet conference
    #[serde(default)]
    pub add_meet_link: bool,
}

fn validate_event_window(dto: &CreateCalendarEventDto) -> Result<(), ValidationError> {
    if dto.end <= dto.start {
        let mut err = ValidationError::new("event_window");
        err.message = Some("End must be after start".into());
        return Err(err);
    }
    Ok(())
}

fn validate_attendees(attendees: &Vec<String>) -> Result<(), ValidationError> {
    if attendees.iter().all(|email| email.validate_email()) {
        return Ok(());
    }
    let mut err = ValidationError::new("attendees");
    err.message = Some("Attendees must be valid email addresses".into());
    Err(err)
}

impl From<CreateCalendarEventDto> for NewCalendarEvent {
    fn from(dto: CreateCalendarEventDto) -> Self {
        Self {
            summary: dto.summary,
            description: dto.description,
            location: dto.location,
            start: dto.start,
            end: dto.end,
            time_zone: dto.time_zone,
            attendees: dto.attendees,
            add_meet_link: dto.add_meet_link,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct CalendarEventsQuery {
    /// Events per page (default 20, max 100)
    #[param(minimum = 1, maximum = 100)]
    pub max_results: Option<u32>,
    pub page_token: Option<String>,
}

impl CalendarEventsQuery {
    pub fn limit(&self) -> u32 {
        self.max_results
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CalendarEventDto {
    pub id: String,
    pub summary: Option<String>,
    pub status: Option<String>,
    pub html_link: Option<String>,
    pub meet_link: Option<String>,
    /// RFC 3339 timestamp, or a date for all-day events
    pub start: Option<String>,
    pub end: Option<String>,
    pub attendees: Vec<String>,
}

impl From<CalendarEvent> for CalendarEventDto {
    fn from(e: CalendarEvent) -> Self {
        Self {
            id: e.id,
            summary: e.summary,
            status: e.status,
            html_link: e.html_link,
            meet_link: e.meet_link,
            start: e.start,
            end: e.end,
            attendees: e.attendees,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn dto() -> CreateCalendarEventDto {
        let start = Utc::now();
        CreateCalendarEventDto {
            summary: "Pipeline review".to_string(),
            description: None,
            location: None,
            start,
            end: start + Duration::minutes(45),
            time_zone: Some("America/New_York".to_string()),
            attendees: vec!["lead@acme.test".to_string()],
            add_meet_link: true,
        }
    }

    #[test]
    fn test_valid_event() {
        assert!(dto().validate().is_ok());
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let mut event = dto();
        event.end = event.start - Duration::minutes(1);
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_bad_attendee_and_zone_are_rejected() {
        let mut event = dto();
        event.attendees.push("not-an-email".to_string());
        let errors = event.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("attendees"));

        let mut event = dto();
        event.time_zone = Some("New York".to_string());
        let errors = event.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("time_zone"));
    }
}
