mod calendar_dto;
mod connection_dto;
mod mail_dto;

pub use calendar_dto::{CalendarEventDto, CalendarEventsQuery, CreateCalendarEventDto};
pub use connection_dto::{
    AuthorizationUrlDto, AuthorizeMode, AuthorizeQuery, CallbackQuery, ConnectionSummaryDto,
};
pub use mail_dto::{MailMessageDetailDto, MailMessageDto, MessagesQuery, SendEmailDto, SentEmailDto};
