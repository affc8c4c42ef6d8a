pub mod email;
pub mod smtp;

use crate::model::{NotifyError, Offer};
pub use smtp::LettreMailer;
use tracing::{info, warn};

/// One rendered email, ready for the transport.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<MailAttachment>,
}

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Transport seam; the pipeline only ever talks to this trait.
#[async_trait::async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotifyError>;
}

/// Which errors get retried, and how often, is configuration rather than
/// control flow buried in the send loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    fn is_retryable(&self, err: &NotifyError) -> bool {
        matches!(err, NotifyError::Transient(_))
    }
}

pub struct EmailNotifier {
    mailer: Box<dyn MailSender>,
    http: reqwest::Client,
    recipients: Vec<String>,
    retry: RetryPolicy,
}

impl EmailNotifier {
    pub fn new(mailer: Box<dyn MailSender>, recipients: Vec<String>, retry: RetryPolicy) -> Self {
        Self {
            mailer,
            http: reqwest::Client::new(),
            recipients,
            retry,
        }
    }

    /// Sends one email per offer and recipient. Auth errors and exhausted
    /// retries propagate and abort the remaining sends of the run.
    pub async fn notify_all(&self, offers: &[Offer]) -> Result<usize, NotifyError> {
        let mut sent = 0;
        for offer in offers {
            self.notify(offer).await?;
            sent += 1;
        }
        Ok(sent)
    }

    async fn notify(&self, offer: &Offer) -> Result<(), NotifyError> {
        let attachment = self.fetch_attachment(offer).await;
        for recipient in &self.recipients {
            let mail = OutgoingMail {
                to: recipient.clone(),
                subject: email::render_subject(offer),
                body: email::render_body(offer),
                attachment: attachment.clone(),
            };
            self.send_with_retry(&mail).await?;
            info!(offer_id = offer.id, "notification sent");
        }
        Ok(())
    }

    /// Best-effort image download; a failure means the mail goes out
    /// without the attachment.
    async fn fetch_attachment(&self, offer: &Offer) -> Option<MailAttachment> {
        let url = offer.photo_url.as_deref()?;
        match self.download(url).await {
            Ok(content) => Some(MailAttachment {
                filename: format!("image_{}.jpg", offer.id),
                content,
            }),
            Err(e) => {
                warn!(offer_id = offer.id, error = %e, "image fetch failed, sending without attachment");
                None
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, reqwest::Error> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn send_with_retry(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
        let mut attempt = 1;
        loop {
            match self.mailer.send(mail).await {
                Ok(()) => return Ok(()),
                Err(e) if self.retry.is_retryable(&e) && attempt < self.retry.max_attempts => {
                    warn!(attempt, error = %e, "transient send failure, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
