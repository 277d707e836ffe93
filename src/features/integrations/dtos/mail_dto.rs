use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidateEmail, ValidationError};

use crate::features::integrations::models::{
    MailMessage, MailMessageDetail, OAuthProvider, OutgoingEmail, SentEmail,
};
use crate::shared::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct MessagesQuery {
    /// Messages per page (default 20, max 100)
    #[param(minimum = 1, maximum = 100)]
    pub page_size: Option<u32>,
    /// `next_page_token` from the previous page
    pub page_token: Option<String>,
}

impl MessagesQuery {
    pub fn limit(&self) -> u32 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MailMessageDto {
    pub provider: OAuthProvider,
    pub id: String,
    pub thread_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub snippet: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

impl From<MailMessage> for MailMessageDto {
    fn from(m: MailMessage) -> Self {
        Self {
            provider: m.provider,
            id: m.id,
            thread_id: m.thread_id,
            subject: m.subject,
            from: m.from,
            snippet: m.snippet,
            received_at: m.received_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MailMessageDetailDto {
    #[serde(flatten)]
    pub message: MailMessageDto,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    /// Gmail labels or Outlook categories
    pub labels: Vec<String>,
    pub has_attachments: bool,
}

impl From<MailMessageDetail> for MailMessageDetailDto {
    fn from(d: MailMessageDetail) -> Self {
        Self {
            message: d.message.into(),
            to: d.to,
            cc: d.cc,
            body_text: d.body_text,
            body_html: d.body_html,
            labels: d.labels,
            has_attachments: d.has_attachments,
        }
    }
}

/// Email to send from the connected Gmail or Outlook mailbox
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SendEmailDto {
    #[validate(
        length(min = 1, max = 100, message = "Between 1 and 100 recipients are required"),
        custom(function = "validate_addresses")
    )]
    pub to: Vec<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_addresses"))]
    pub cc: Vec<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_addresses"))]
    pub bcc: Vec<String>,

    #[validate(length(min = 1, max = 998, message = "Subject must be 1-998 characters"))]
    pub subject: String,

    #[validate(length(max = 100000, message = "Body must not exceed 100000 characters"))]
    pub body: String,

    /// Send `body` as HTML instead of plain text
    #[serde(default)]
    pub is_html: bool,

    /// Gmail thread to reply into; ignored by Outlook
    pub thread_id: Option<String>,
}

fn validate_addresses(addresses: &Vec<String>) -> Result<(), ValidationError> {
    if addresses.iter().all(|email| email.validate_email()) {
        return Ok(());
    }
    let mut err = ValidationError::new("addresses");
    err.message = Some("Recipients must be valid email addresses".into());
    Err(err)
}

impl From<SendEmailDto> for OutgoingEmail {
    fn from(dto: SendEmailDto) -> Self {
        Self {
            to: dto.to,
            cc: dto.cc,
            bcc: dto.bcc,
            subject: dto.subject,
            body: dto.body,
            is_html: dto.is_html,
            thread_id: dto.thread_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SentEmailDto {
    pub provider: OAuthProvider,
    /// Provider message id; Outlook does not report one
    pub id: Option<String>,
    pub thread_id: Option<String>,
}

impl From<SentEmail> for SentEmailDto {
    fn from(s: SentEmail) -> Self {
        Self {
            provider: s.provider,
            id: s.id,
            thread_id: s.thread_id,
        }
    }
}
