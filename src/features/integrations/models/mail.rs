use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};

use super::OAuthProvider;

/// Mailbox entry normalized across Gmail and Outlook. Gmail's list call
/// returns ids only, so the descriptive fields may be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub provider: OAuthProvider,
    pub id: String,
    pub thread_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub snippet: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailPage {
    pub messages: Vec<MailMessage>,
    pub next_page_token: Option<String>,
}

/// A single message with recipients and decoded bodies
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessageDetail {
    pub message: MailMessage,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub labels: Vec<String>,
    pub has_attachments: bool,
}

/// Message to send from the connected mailbox
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
    /// Gmail thread to reply into. Graph has no equivalent on sendMail.
    pub thread_id: Option<String>,
}

impl OutgoingEmail {
    pub fn mime_type(&self) -> &'static str {
        if self.is_html {
            "text/html"
        } else {
            "text/plain"
        }
    }

    /// RFC 2822 rendering for Gmail's `raw` field. Header values are
    /// flattened to one line; non-ASCII subjects become RFC 2047 words.
    pub fn to_rfc2822(&self) -> String {
        let mut lines = vec![format!("To: {}", header_value(&self.to.join(", ")))];
        if !self.cc.is_empty() {
            lines.push(format!("Cc: {}", header_value(&self.cc.join(", "))));
        }
        if !self.bcc.is_empty() {
            lines.push(format!("Bcc: {}", header_value(&self.bcc.join(", "))));
        }
        lines.push(format!("Subject: {}", encode_word(&header_value(&self.subject))));
        lines.push("MIME-Version: 1.0".to_string());
        lines.push(format!("Content-Type: {}; charset=UTF-8", self.mime_type()));
        lines.push(String::new());
        lines.push(self.body.replace("\r\n", "\n").replace('\n', "\r\n"));

        lines.join("\r\n")
    }
}

fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn encode_word(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value))
    }
}

/// Outcome of a send. Graph's sendMail answers 202 with no body, so the ids
/// are only known for Gmail.
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub provider: OAuthProvider,
    pub id: Option<String>,
    pub thread_id: Option<String>,
}
