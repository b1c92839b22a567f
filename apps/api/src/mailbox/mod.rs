//! RemoteSource — pulls applicant attachments out of a mailbox into the
//! DocumentStore.
//!
//! A fetch lists every message matching a query (page by page), then
//! processes each message independently: one unreadable message is retried
//! with linear backoff and, failing that, skipped. Only authentication at
//! construction, a listing failure, an empty listing, or cancellation end
//! the fetch.

pub mod client;
pub mod sender;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::documents::{DocumentError, DocumentStore};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::progress::{ProgressSink, ProgressUpdate};
use crate::pipeline::retry::{retry_with_backoff, Backoff, RetryError, RetryPolicy};

use self::client::{decode_body, AttachmentSource, MailboxClient, PAGE_SIZE};
use self::sender::{renamed_attachment, sender_name};

/// 3 attempts per page or message, waiting 1s then 2s between them.
pub const DEFAULT_ITEM_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    backoff: Backoff::Linear(Duration::from_secs(1)),
};

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("mailbox rejected the credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("mailbox API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("mailbox request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("attachment body is not valid base64: {0}")]
    Decode(String),

    #[error("could not store attachment: {0}")]
    Store(#[from] DocumentError),

    #[error("listing messages failed: {0}")]
    Listing(String),

    #[error("no messages match {query:?}")]
    NoMessages { query: String },

    #[error("mailbox fetch cancelled")]
    Cancelled,
}

/// Mailbox search query for applications sent with `subject`.
pub fn subject_query(subject: &str) -> String {
    format!("subject:({}) has:attachment", subject.trim())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub messages: usize,
    pub processed: usize,
    pub skipped: usize,
    pub files_written: usize,
}

pub struct RemoteSource {
    client: Arc<dyn MailboxClient>,
    store: DocumentStore,
    retry: RetryPolicy,
}

impl RemoteSource {
    /// Validates credentials before anything else. An auth failure here is
    /// returned as-is and never retried.
    pub async fn connect(
        client: Arc<dyn MailboxClient>,
        store: DocumentStore,
    ) -> Result<Self, MailboxError> {
        client.verify_access().await?;
        Ok(Self {
            client,
            store,
            retry: DEFAULT_ITEM_RETRY,
        })
    }

    /// Downloads every attachment of every message matching `query` into the
    /// store.
    ///
    /// Progress counts listed messages and then processed messages, so
    /// `total` is `2 × messages`. While listing, the message count is an
    /// estimate (one more full page whenever a next-page token exists).
    pub async fn fetch(
        &self,
        query: &str,
        cancel: &CancelToken,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<FetchSummary, MailboxError> {
        progress.report(ProgressUpdate {
            current: 0,
            total: 2 * PAGE_SIZE,
            message: "Listing messages...".to_string(),
        });

        let message_ids = self.list_all(query, cancel, progress.as_ref()).await?;
        if message_ids.is_empty() {
            return Err(MailboxError::NoMessages {
                query: query.to_string(),
            });
        }

        let total_messages = message_ids.len();
        info!(messages = total_messages, query, "processing mailbox messages");

        let mut summary = FetchSummary {
            messages: total_messages,
            ..Default::default()
        };
        let total = saturating_u32(2 * total_messages);

        for (index, message_id) in message_ids.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(MailboxError::Cancelled);
            }

            progress.report(ProgressUpdate {
                current: saturating_u32(total_messages + index),
                total,
                message: format!("Processing message {}/{}", index + 1, total_messages),
            });

            let outcome = retry_with_backoff(
                self.retry,
                cancel,
                |_: &MailboxError| true,
                |_, _, _| {},
                |attempt| {
                    debug!(message_id = %message_id, attempt, "fetching message");
                    self.process_message(message_id)
                },
            )
            .await;

            match outcome {
                Ok(written) => {
                    summary.processed += 1;
                    summary.files_written += written;
                }
                Err(RetryError::Cancelled) => return Err(MailboxError::Cancelled),
                Err(e) => {
                    warn!(message_id = %message_id, error = %e, "skipping message");
                    summary.skipped += 1;
                }
            }
        }

        progress.report(ProgressUpdate {
            current: total,
            total,
            message: format!("Downloaded {} attachments", summary.files_written),
        });
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            files = summary.files_written,
            "mailbox fetch complete"
        );

        Ok(summary)
    }

    async fn list_all(
        &self,
        query: &str,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<String>, MailboxError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(MailboxError::Cancelled);
            }

            let token = page_token.as_deref();
            let page = retry_with_backoff(
                self.retry,
                cancel,
                |e: &MailboxError| !matches!(e, MailboxError::Unauthorized { .. }),
                |_, _, _| {},
                |_| self.client.list_messages(query, token),
            )
            .await
            .map_err(|e| match e {
                RetryError::Cancelled => MailboxError::Cancelled,
                other => MailboxError::Listing(other.to_string()),
            })?;

            ids.extend(page.messages.into_iter().map(|m| m.id));
            page_token = page.next_page_token.filter(|t| !t.is_empty());

            let listed = ids.len();
            let estimate = listed + if page_token.is_some() { PAGE_SIZE as usize } else { 0 };
            progress.report(ProgressUpdate {
                current: saturating_u32(listed),
                total: saturating_u32(2 * estimate),
                message: format!("Listed {listed} messages..."),
            });

            if page_token.is_none() {
                return Ok(ids);
            }
        }
    }

    /// Fetches one message and stores all of its attachments. Returns how
    /// many files were written; zero is a success.
    async fn process_message(&self, message_id: &str) -> Result<usize, MailboxError> {
        let message = self.client.get_message(message_id).await?;
        let sender = sender_name(message.header("From"));

        let mut written = 0;
        for attachment in message.attachments() {
            let bytes = match &attachment.source {
                AttachmentSource::Remote(id) => self.client.get_attachment(message_id, id).await?,
                AttachmentSource::Inline(data) => decode_body(data)?,
            };
            let file_name = renamed_attachment(&sender, &attachment.filename);
            self.store.save(&file_name, &bytes).await?;
            debug!(message_id, file = %file_name, "downloaded attachment");
            written += 1;
        }

        if written == 0 {
            debug!(message_id, "message has no attachments");
        }
        Ok(written)
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
