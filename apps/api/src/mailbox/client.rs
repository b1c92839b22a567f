//! Mailbox API boundary and its Gmail REST implementation.
//!
//! Token lifecycle belongs to the caller: `GmailClient` is handed a bearer
//! token and only reports whether the mailbox accepted it.

use std::time::Duration;

use async_trait::async_trait;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::MailboxError;

pub const DEFAULT_API_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Messages requested per listing page.
pub const PAGE_SIZE: u32 = 100;

/// Gmail encodes attachment bodies as URL-safe base64, padding optional.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ────────────────────────────────────────────────────────────────────────────
// Wire models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub payload: MessagePart,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default)]
    pub attachment_id: Option<String>,
    /// Inline body, set for small parts instead of `attachment_id`.
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
struct AttachmentBody {
    #[serde(default)]
    data: String,
}

/// Where an attachment's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    Remote(String),
    Inline(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub filename: String,
    pub source: AttachmentSource,
}

impl Message {
    /// First header named `name`, case-insensitively, from the top-level part.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Every named attachment, walking nested multipart trees depth-first.
    pub fn attachments(&self) -> Vec<AttachmentRef> {
        let mut found = Vec::new();
        collect_attachments(&self.payload, &mut found);
        found
    }
}

fn collect_attachments(part: &MessagePart, found: &mut Vec<AttachmentRef>) {
    if !part.filename.is_empty() {
        let source = match (&part.body.attachment_id, &part.body.data) {
            (Some(id), _) if !id.is_empty() => Some(AttachmentSource::Remote(id.clone())),
            (_, Some(data)) if !data.is_empty() => Some(AttachmentSource::Inline(data.clone())),
            _ => None,
        };
        if let Some(source) = source {
            found.push(AttachmentRef {
                filename: part.filename.clone(),
                source,
            });
        }
    }
    for child in &part.parts {
        collect_attachments(child, found);
    }
}

pub fn decode_body(data: &str) -> Result<Vec<u8>, MailboxError> {
    URL_SAFE_LENIENT
        .decode(data.trim())
        .map_err(|e| MailboxError::Decode(e.to_string()))
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Cheap authenticated call used to validate credentials up front.
    async fn verify_access(&self) -> Result<(), MailboxError>;

    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailboxError>;

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError>;

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError>;
}

// ────────────────────────────────────────────────────────────────────────────
// GmailClient
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_url: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl GmailConfig {
    pub fn new(access_token: String) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct GmailClient {
    client: Client,
    config: GmailConfig,
}

impl GmailClient {
    pub fn new(config: GmailConfig) -> Result<Self, MailboxError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// For testing: point the client at a mock server.
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.api_url = base_url.to_string();
        self
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.config.api_url, path))
            .bearer_auth(&self.config.access_token)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, MailboxError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MailboxError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailboxError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MailboxClient for GmailClient {
    async fn verify_access(&self) -> Result<(), MailboxError> {
        let _: serde_json::Value = self.send_json(self.get("/profile")).await?;
        debug!("mailbox credentials accepted");
        Ok(())
    }

    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailboxError> {
        let page_size = PAGE_SIZE.to_string();
        let mut params = vec![("q", query), ("maxResults", page_size.as_str())];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        self.send_json(self.get("/messages").query(&params)).await
    }

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        self.send_json(self.get(&format!("/messages/{id}")).query(&[("format", "full")]))
            .await
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError> {
        let body: AttachmentBody = self
            .send_json(self.get(&format!("/messages/{message_id}/attachments/{attachment_id}")))
            .await?;
        decode_body(&body.data)
    }
}
