mod gmail_client;
mod google_calendar_client;
mod http;
mod outlook_client;
mod token_endpoint;

pub use gmail_client::{GmailClient, GMAIL_BASE_URL};
pub use google_calendar_client::{GoogleCalendarClient, GOOGLE_CALENDAR_BASE_URL};
pub use outlook_client::{OutlookClient, GRAPH_BASE_URL};
pub use token_endpoint::{HttpTokenEndpoint, TokenEndpoint};
