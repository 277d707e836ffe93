mod calendar;
mod connection;
mod credential;
mod mail;
mod pending_authorization;
mod provider;

pub use calendar::{CalendarEvent, CalendarEventPage, NewCalendarEvent};
pub use connection::{ConnectionState, ConnectionSummary};
pub use credential::{OAuthCredential, TokenGrant};
pub use mail::{MailMessage, MailMessageDetail, MailPage, OutgoingEmail, SentEmail};
pub use pending_authorization::PendingAuthorization;
pub use provider::{OAuthProvider, OAuthProviderConfig, ProviderFamily, ProviderRegistry};
