use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::http::{ensure_success, read_json};
use crate::features::integrations::error::IntegrationError;
use crate::features::integrations::models::{
    MailMessage, MailMessageDetail, MailPage, OAuthProvider, OutgoingEmail, SentEmail,
};

pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

const MESSAGE_FIELDS: &str = "id,conversationId,subject,from,bodyPreview,receivedDateTime";

const MESSAGE_DETAIL_FIELDS: &str = "id,conversationId,subject,from,toRecipients,ccRecipients,\
bodyPreview,body,receivedDateTime,hasAttachments,categories";

#[derive(Debug, Deserialize)]
struct MessageListResource {
    #[serde(default)]
    value: Vec<MessageResource>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResource {
    id: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<Recipient>,
    #[serde(default)]
    body_preview: Option<String>,
    #[serde(default)]
    received_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetailResource {
    #[serde(flatten)]
    summary: MessageResource,
    #[serde(default)]
    to_recipients: Vec<Recipient>,
    #[serde(default)]
    cc_recipients: Vec<Recipient>,
    #[serde(default)]
    body: Option<ItemBody>,
    #[serde(default)]
    has_attachments: bool,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemBody {
    /// `text` or `html`; Graph accepts either case
    content_type: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: EmailAddress,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmailAddress {
    #[serde(default)]
    address: Option<String>,
}

impl Recipient {
    fn to(address: &str) -> Self {
        Self {
            email_address: EmailAddress {
                address: Some(address.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailRequest {
    message: OutgoingMessage,
    save_to_sent_items: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingMessage {
    subject: String,
    body: ItemBody,
    to_recipients: Vec<Recipient>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc_recipients: Vec<Recipient>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc_recipients: Vec<Recipient>,
}

fn recipients(addresses: &[String]) -> Vec<Recipient> {
    addresses.iter().map(|a| Recipient::to(a)).collect()
}

impl From<&OutgoingEmail> for SendMailRequest {
    fn from(email: &OutgoingEmail) -> Self {
        Self {
            message: OutgoingMessage {
                subject: email.subject.clone(),
                body: ItemBody {
                    content_type: if email.is_html { "HTML" } else { "Text" }.to_string(),
                    content: email.body.clone(),
                },
                to_recipients: recipients(&email.to),
                cc_recipients: recipients(&email.cc),
                bcc_recipients: recipients(&email.bcc),
            },
            save_to_sent_items: true,
        }
    }
}

impl From<MessageResource> for MailMessage {
    fn from(m: MessageResource) -> Self {
        MailMessage {
            provider: OAuthProvider::Outlook,
            id: m.id,
            thread_id: m.conversation_id,
            subject: m.subject,
            from: m.from.and_then(|f| f.email_address.address),
            snippet: m.body_preview,
            received_at: m.received_date_time,
        }
    }
}

fn addresses(recipients: Vec<Recipient>) -> Vec<String> {
    recipients
        .into_iter()
        .filter_map(|r| r.email_address.address)
        .collect()
}

impl From<MessageDetailResource> for MailMessageDetail {
    fn from(m: MessageDetailResource) -> Self {
        let (body_text, body_html) = match m.body {
            Some(body) if body.content_type.eq_ignore_ascii_case("html") => {
                (None, Some(body.content))
            }
            Some(body) => (Some(body.content), None),
            None => (None, None),
        };

        MailMessageDetail {
            message: m.summary.into(),
            to: addresses(m.to_recipients),
            cc: addresses(m.cc_recipients),
            body_text,
            body_html,
            labels: m.categories,
            has_attachments: m.has_attachments,
        }
    }
}

/// Graph paging is driven by `@odata.nextLink`; the `$skiptoken` inside it
/// is handed to clients as an opaque page token
fn skip_token(next_link: &str) -> Option<String> {
    let url = reqwest::Url::parse(next_link).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "$skiptoken")
        .map(|(_, value)| value.into_owned())
}

/// Microsoft Graph mail client for the signed-in user
#[derive(Clone)]
pub struct OutlookClient {
    client: reqwest::Client,
    base_url: String,
}

impl OutlookClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn list_messages(
        &self,
        access_token: &str,
        top: u32,
        page_token: Option<&str>,
    ) -> Result<MailPage, IntegrationError> {
        let mut query = vec![
            ("$top", top.to_string()),
            ("$select", MESSAGE_FIELDS.to_string()),
            ("$orderby", "receivedDateTime desc".to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("$skiptoken", token.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/me/messages", self.base_url))
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await?;

        let list: MessageListResource = read_json(response).await?;
        Ok(MailPage {
            messages: list.value.into_iter().map(Into::into).collect(),
            next_page_token: list.next_link.as_deref().and_then(skip_token),
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
                "{}/me/messages/{}",
                self.base_url,
                urlencoding::encode(message_id)
            ))
            .bearer_auth(access_token)
            .query(&[("$select", MESSAGE_DETAIL_FIELDS)])
            .send()
            .await?;

        let resource: MessageDetailResource = read_json(response).await?;
        Ok(resource.into())
    }

    /// Graph answers 202 with an empty body, so nothing identifies the sent
    /// message
    pub async fn send_message(
        &self,
        access_token: &str,
        email: &OutgoingEmail,
    ) -> Result<SentEmail, IntegrationError> {
        let response = self
            .client
            .post(format!("{}/me/sendMail", self.base_url))
            .bearer_auth(access_token)
            .json(&SendMailRequest::from(email))
            .send()
            .await?;

        ensure_success(response).await?;
        tracing::debug!(recipients = email.to.len(), "Outlook message sent");

        Ok(SentEmail {
            provider: OAuthProvider::Outlook,
            id: None,
            thread_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::spawn_mock_server;
    use axum::{
        extract::Query,
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
        if query.get("$skiptoken").is_some() {
            return (StatusCode::OK, Json(json!({"value": []})));
        }
        (
            StatusCode::OK,
            Json(json!({
                "value": [{
                    "id": "AAMk1",
                    "conversationId": "conv-1",
                    "subject": "Quote follow-up",
                    "from": {"emailAddress": {"name": "Dana", "address": "dana@fabrikam.test"}},
                    "bodyPreview": "Thanks for the proposal",
                    "receivedDateTime": "2026-10-17T09:30:00Z"
                }],
                "@odata.nextLink": "https://graph.microsoft.com/v1.0/me/messages?%24top=1&%24skiptoken=abc%3D%3D"
            })),
        )
    }

    #[test]
    fn test_skip_token_is_decoded() {
        assert_eq!(
            skip_token("https://graph.microsoft.com/v1.0/me/messages?%24skiptoken=abc%3D%3D")
                .as_deref(),
            Some("abc==")
        );
        assert_eq!(skip_token("https://graph.microsoft.com/v1.0/me/messages"), None);
    }

    #[tokio::test]
    async fn test_list_messages_maps_fields_and_cursor() {
        let base = spawn_mock_server(Router::new().route("/me/messages", get(list_handler))).await;
        let client = OutlookClient::new(reqwest::Client::new(), base);

        let page = client.list_messages("token", 1, None).await.unwrap();
        let message = &page.messages[0];

        assert_eq!(message.subject.as_deref(), Some("Quote follow-up"));
        assert_eq!(message.from.as_deref(), Some("dana@fabrikam.test"));
        assert_eq!(message.thread_id.as_deref(), Some("conv-1"));
        assert!(message.received_at.is_some());
        assert_eq!(page.next_page_token.as_deref(), Some("abc=="));

        let next = client
            .list_messages("token", 1, page.next_page_token.as_deref())
            .await
            .unwrap();
        assert!(next.messages.is_empty());
        assert_eq!(next.next_page_token, None);
    }

    #[tokio::test]
    async fn test_get_message_splits_body_by_content_type() {
        let handler = |Query(query): Query<HashMap<String, String>>| async move {
            assert!(query["$select"].contains("toRecipients"));
            Json(json!({
                "id": "AAMk1",
                "conversationId": "conv-1",
                "subject": "Quote follow-up",
                "from": {"emailAddress": {"address": "dana@fabrikam.test"}},
                "toRecipients": [{"emailAddress": {"name": "Rep", "address": "rep@nexus.test"}}],
                "ccRecipients": [],
                "body": {"contentType": "html", "content": "<p>Thanks</p>"},
                "hasAttachments": true,
                "categories": ["Customers"]
            }))
        };
        let base =
            spawn_mock_server(Router::new().route("/me/messages/{id}", get(handler))).await;
        let client = OutlookClient::new(reqwest::Client::new(), base);

        let detail = client.get_message("token", "AAMk1").await.unwrap();

        assert_eq!(detail.message.id, "AAMk1");
        assert_eq!(detail.message.from.as_deref(), Some("dana@fabrikam.test"));
        assert_eq!(detail.to, vec!["rep@nexus.test"]);
        assert_eq!(detail.body_html.as_deref(), Some("<p>Thanks</p>"));
        assert_eq!(detail.body_text, None);
        assert!(detail.has_attachments);
        assert_eq!(detail.labels, vec!["Customers"]);
    }

    #[tokio::test]
    async fn test_send_message_posts_graph_payload() {
        let captured = Arc::new(Mutex::new(None::<Value>));
        let recorded = Arc::clone(&captured);
        let handler = move |Json(body): Json<Value>| {
            let recorded = Arc::clone(&recorded);
            async move {
                *recorded.lock().unwrap() = Some(body);
                StatusCode::ACCEPTED
            }
        };
        let base = spawn_mock_server(Router::new().route("/me/sendMail", post(handler))).await;
        let client = OutlookClient::new(reqwest::Client::new(), base);
        let email = OutgoingEmail {
            to: vec!["dana@fabrikam.test".to_string()],
            cc: vec!["lee@fabrikam.test".to_string()],
            bcc: vec![],
            subject: "Proposal".to_string(),
            body: "<b>Attached</b>".to_string(),
            is_html: true,
            thread_id: None,
        };

        let sent = client.send_message("token", &email).await.unwrap();

        assert_eq!(sent.provider, OAuthProvider::Outlook);
        assert_eq!(sent.id, None);
        assert_eq!(
            captured.lock().unwrap().take().unwrap(),
            json!({
                "message": {
                    "subject": "Proposal",
                    "body": {"contentType": "HTML", "content": "<b>Attached</b>"},
                    "toRecipients": [{"emailAddress": {"address": "dana@fabrikam.test"}}],
                    "ccRecipients": [{"emailAddress": {"address": "lee@fabrikam.test"}}]
                },
                "saveToSentItems": true
            })
        );
    }

    #[tokio::test]
    async fn test_send_rejected_by_graph_keeps_status() {
        let handler = || async {
            (
                StatusCode::FORBIDDEN,
                Json(json!({"error": {"code": "ErrorAccessDenied", "message": "Access is denied."}})),
            )
        };
        let base = spawn_mock_server(Router::new().route("/me/sendMail", post(handler))).await;
        let client = OutlookClient::new(reqwest::Client::new(), base);
        let email = OutgoingEmail {
            to: vec!["dana@fabrikam.test".to_string()],
            cc: vec![],
            bcc: vec![],
            subject: "Proposal".to_string(),
            body: "Hi".to_string(),
            is_html: false,
            thread_id: None,
        };

        match client.send_message("token", &email).await {
            Err(IntegrationError::UpstreamError { status, message, .. }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "Access is denied.");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
