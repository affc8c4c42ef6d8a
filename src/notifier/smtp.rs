//! SMTP transport over lettre: STARTTLS, authenticated.

use super::{MailSender, OutgoingMail};
use crate::model::NotifyError;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

pub struct LettreMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl LettreMailer {
    pub fn new(host: &str, sender: &str, password: &str) -> Result<Self, NotifyError> {
        let from: Mailbox = sender
            .parse()
            .map_err(|e| NotifyError::Message(format!("invalid sender address: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| NotifyError::Message(format!("smtp relay setup failed: {e}")))?
            .credentials(Credentials::new(sender.to_string(), password.to_string()))
            .build();

        Ok(Self { transport, from })
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message, NotifyError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| NotifyError::Message(format!("invalid recipient address: {e}")))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone());

        let message = match &mail.attachment {
            Some(att) => {
                let content_type = ContentType::parse("image/jpeg")
                    .map_err(|e| NotifyError::Message(e.to_string()))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(mail.body.clone()))
                        .singlepart(
                            Attachment::new(att.filename.clone())
                                .body(att.content.clone(), content_type),
                        ),
                )
            }
            None => builder.body(mail.body.clone()),
        };

        message.map_err(|e| NotifyError::Message(e.to_string()))
    }
}

#[async_trait::async_trait]
impl MailSender for LettreMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
        let message = self.build_message(mail)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

/// Permanent rejections (bad credentials being the canonical case) must
/// not be retried; everything else is worth another attempt.
fn classify(err: lettre::transport::smtp::Error) -> NotifyError {
    if err.is_permanent() {
        NotifyError::Auth(err.to_string())
    } else {
        NotifyError::Transient(err.to_string())
    }
}
