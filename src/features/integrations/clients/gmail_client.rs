use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::http::read_json;
use crate::features::integrations::error::IntegrationError;
use crate::features::integrations::models::{
    MailMessage, MailMessageDetail, MailPage, OAuthProvider, OutgoingEmail, SentEmail,
};

pub const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResource {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    #[serde(default)]
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResource {
    id: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    snippet: Option<String>,
    /// Milliseconds since the epoch, as a string
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: PartBody,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    attachment_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
    raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<String>,
}

/// Text and HTML bodies plus attachment presence, collected from a MIME tree
#[derive(Debug, Default)]
struct Bodies {
    text: Option<String>,
    html: Option<String>,
    has_attachments: bool,
}

impl Bodies {
    fn collect(&mut self, part: &MessagePart) {
        let is_attachment = part.filename.as_deref().is_some_and(|f| !f.is_empty())
            || part.body.attachment_id.is_some();

        if is_attachment {
            self.has_attachments = true;
        } else if let Some(data) = part.body.data.as_deref() {
            let slot = match part.mime_type.as_str() {
                "text/plain" => &mut self.text,
                "text/html" => &mut self.html,
                _ => return,
            };
            if slot.is_none() {
                *slot = decode_body(data);
            }
        }

        for child in &part.parts {
            self.collect(child);
        }
    }
}

/// Gmail encodes bodies as base64url, sometimes padded
fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn address_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl From<MessageResource> for MailMessageDetail {
    fn from(resource: MessageResource) -> Self {
        let payload = resource.payload.unwrap_or_default();
        let mut bodies = Bodies::default();
        bodies.collect(&payload);

        let received_at = resource
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        MailMessageDetail {
            message: MailMessage {
                provider: OAuthProvider::Gmail,
                id: resource.id,
                thread_id: resource.thread_id,
                subject: header(&payload.headers, "Subject").map(str::to_string),
                from: header(&payload.headers, "From").map(str::to_string),
                snippet: resource.snippet,
                received_at,
            },
            to: address_list(header(&payload.headers, "To")),
            cc: address_list(header(&payload.headers, "Cc")),
            body_text: bodies.text,
            body_html: bodies.html,
            labels: resource.label_ids,
            has_attachments: bodies.has_attachments,
        }
    }
}

/// Gmail REST client for the authenticated user's mailbox
#[derive(Clone)]
pub struct GmailClient {
    client: reqwest::Client,
    base_url: String,
}

impl GmailClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn list_messages(
        &self,
        access_token: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<MailPage, IntegrationError> {
        let mut query = vec![("maxResults", max_results.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/users/me/messages", self.base_url))
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await?;

        let list: MessageListResource = read_json(response).await?;
        Ok(MailPage {
            messages: list
                .messages
                .into_iter()
                .map(|m| MailMessage {
                    provider: OAuthProvider::Gmail,
                    id: m.id,
                    thread_id: m.thread_id,
                    subject: None,
                    from: None,
                    snippet: None,
                    received_at: None,
                })
                .collect(),
            next_page_token: list.next_page_token,
        })
    }

    pub async fn get_message(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<MailMessageDetail, IntegrationError> {
        let response = self
            .client
            .get(format!(
                "{}/users/me/messages/{}",
                self.base_url,
                urlencoding::encode(message_id)
            ))
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await?;

        let resource: MessageResource = read_json(response).await?;
        Ok(resource.into())
    }

    pub async fn send_message(
        &self,
        access_token: &str,
        email: &OutgoingEmail,
    ) -> Result<SentEmail, IntegrationError> {
        let request = SendRequest {
            raw: URL_SAFE_NO_PAD.encode(email.to_rfc2822()),
            thread_id: email.thread_id.clone(),
        };

        let response = self
            .client
            .post(format!("{}/users/me/messages/send", self.base_url))
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await?;

        let sent: MessageRef = read_json(response).await?;
        tracing::debug!(message_id = %sent.id, "Gmail message sent");

        Ok(SentEmail {
            provider: OAuthProvider::Gmail,
            id: Some(sent.id),
            thread_id: sent.thread_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::spawn_mock_server;
    use axum::{
        extract::{Path, Query},
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use std::sync::{Arc, Mutex};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn list_handler(
        Query(query): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        match query.get("pageToken").map(String::as_str) {
            None => (
                StatusCode::OK,
                Json(json!({
                    "messages": [{"id": "m1", "threadId": "t1"}, {"id": "m2", "threadId": "t1"}],
                    "nextPageToken": "next",
                    "resultSizeEstimate": 2
                })),
            ),
            Some("next") => (StatusCode::OK, Json(json!({"resultSizeEstimate": 0}))),
            Some(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": {"code": 503, "message": "Backend Error"}})),
            ),
        }
    }

    async fn client() -> GmailClient {
        let base =
            spawn_mock_server(Router::new().route("/users/me/messages", get(list_handler))).await;
        GmailClient::new(reqwest::Client::new(), base)
    }

    #[tokio::test]
    async fn test_list_messages_pages() {
        let client = client().await;

        let first = client.list_messages("token", 2, None).await.unwrap();
        assert_eq!(first.messages.len(), 2);
        assert_eq!(first.messages[0].thread_id.as_deref(), Some("t1"));
        assert_eq!(first.next_page_token.as_deref(), Some("next"));

        let last = client.list_messages("token", 2, Some("next")).await.unwrap();
        assert!(last.messages.is_empty());
        assert_eq!(last.next_page_token, None);
    }

    #[tokio::test]
    async fn test_server_error_keeps_status_and_message() {
        let client = client().await;

        match client.list_messages("token", 2, Some("bad")).await {
            Err(IntegrationError::UpstreamError {
                status, message, ..
            }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "Backend Error");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    fn encoded(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text)
    }

    #[tokio::test]
    async fn test_get_message_parses_headers_and_nested_bodies() {
        let message = json!({
            "id": "m1",
            "threadId": "t1",
            "labelIds": ["INBOX", "UNREAD"],
            "snippet": "Can we move the call",
            "internalDate": "1792224000000",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "From", "value": "Dana <dana@acme.test>"},
                    {"name": "to", "value": "rep@nexus.test, lead@nexus.test"},
                    {"name": "Subject", "value": "Call on Friday"}
                ],
                "body": {"size": 0},
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "body": {"size": 0},
                        "parts": [
                            {"mimeType": "text/plain", "body": {"data": encoded("Can we move the call?"), "size": 21}},
                            {"mimeType": "text/html", "body": {"data": format!("{}==", encoded("<p>Can we move the call?</p>")), "size": 28}}
                        ]
                    },
                    {"mimeType": "application/pdf", "filename": "quote.pdf", "body": {"attachmentId": "att-1", "size": 1024}}
                ]
            }
        });
        let seen = Arc::new(Mutex::new(None::<(String, Option<String>)>));
        let recorded = Arc::clone(&seen);
        let handler = move |Path(id): Path<String>, Query(query): Query<HashMap<String, String>>| {
            let recorded = Arc::clone(&recorded);
            let message = message.clone();
            async move {
                *recorded.lock().unwrap() = Some((id, query.get("format").cloned()));
                Json(message)
            }
        };
        let base =
            spawn_mock_server(Router::new().route("/users/me/messages/{id}", get(handler))).await;
        let client = GmailClient::new(reqwest::Client::new(), base);

        let detail = client.get_message("token", "m1").await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            Some(("m1".to_string(), Some("full".to_string())))
        );
        assert_eq!(detail.message.subject.as_deref(), Some("Call on Friday"));
        assert_eq!(detail.message.from.as_deref(), Some("Dana <dana@acme.test>"));
        assert_eq!(detail.to, vec!["rep@nexus.test", "lead@nexus.test"]);
        assert!(detail.cc.is_empty());
        assert_eq!(detail.body_text.as_deref(), Some("Can we move the call?"));
        assert_eq!(detail.body_html.as_deref(), Some("<p>Can we move the call?</p>"));
        assert!(detail.has_attachments);
        assert_eq!(detail.labels, vec!["INBOX", "UNREAD"]);
        assert_eq!(
            detail.message.received_at,
            DateTime::<Utc>::from_timestamp_millis(1_792_224_000_000)
        );
    }

    #[tokio::test]
    async fn test_send_message_posts_raw_rfc2822() {
        let captured = Arc::new(Mutex::new(None::<Value>));
        let recorded = Arc::clone(&captured);
        let handler = move |Json(body): Json<Value>| {
            let recorded = Arc::clone(&recorded);
            async move {
                *recorded.lock().unwrap() = Some(body);
                Json(json!({"id": "sent-1", "threadId": "t9", "labelIds": ["SENT"]}))
            }
        };
        let base =
            spawn_mock_server(Router::new().route("/users/me/messages/send", post(handler))).await;
        let client = GmailClient::new(reqwest::Client::new(), base);
        let email = OutgoingEmail {
            to: vec!["dana@acme.test".to_string()],
            cc: vec![],
            bcc: vec![],
            subject: "Proposal".to_string(),
            body: "See attached.".to_string(),
            is_html: false,
            thread_id: Some("t9".to_string()),
        };

        let sent = client.send_message("token", &email).await.unwrap();

        assert_eq!(sent.id.as_deref(), Some("sent-1"));
        assert_eq!(sent.thread_id.as_deref(), Some("t9"));

        let body = captured.lock().unwrap().take().unwrap();
        assert_eq!(body["threadId"], "t9");
        let raw = URL_SAFE_NO_PAD
            .decode(body["raw"].as_str().unwrap())
            .unwrap();
        assert_eq!(String::from_utf8(raw).unwrap(), email.to_rfc2822());
    }
}
