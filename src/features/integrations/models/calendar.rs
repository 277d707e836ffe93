use chrono::{DateTime, Utc};

/// Event to create on the user's primary calendar
#[derive(Debug, Clone)]
pub struct NewCalendarEvent {
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub time_zone: Option<String>,
    pub attendees: Vec<String>,
    pub add_meet_link: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
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

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEventPage {
    pub events: Vec<CalendarEvent>,
    pub next_page_token: Option<String>,
}
