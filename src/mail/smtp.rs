use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, error, info};

use super::{MailError, Mailer, OutgoingEmail};
use crate::config::SmtpSettings;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    settings: Arc<SmtpSettings>,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Result<Self, MailError> {
        let transport = Self::build_transport(&settings)?;
        Ok(Self {
            transport,
            settings: Arc::new(settings),
        })
    }

    fn build_transport(settings: &SmtpSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let mut builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| MailError::Transport(format!("failed to create SMTP relay: {}", e)))?
                .port(settings.port)
        } else {
            // plain connection for local catchers such as Mailpit
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host).port(settings.port)
        };

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, MailError> {
        let from: Mailbox = format!("{} <{}>", self.settings.from_name, self.settings.from_email)
            .parse()
            .map_err(|e| MailError::Address(format!("from: {}", e)))?;

        let to: Mailbox = if email.to_name.is_empty() {
            email.to_email.parse()
        } else {
            format!("{} <{}>", email.to_name, email.to_email).parse()
        }
        .map_err(|e| MailError::Address(format!("to: {}", e)))?;

        let body = MultiPart::alternative()
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(email.text_body.clone()),
            )
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(email.html_body.clone()),
            );

        let builder = Message::builder().from(from).to(to).subject(&email.subject);

        let message = match &email.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| MailError::Build(format!("content type: {}", e)))?;
                builder.multipart(
                    MultiPart::mixed()
                        .multipart(body)
                        .singlepart(
                            Attachment::new(attachment.filename.clone())
                                .body(attachment.bytes.clone(), content_type),
                        ),
                )
            }
            None => builder.multipart(body),
        };

        message.map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        debug!(
            to = %email.to_email,
            subject = %email.subject,
            host = %self.settings.host,
            port = %self.settings.port,
            has_attachment = email.attachment.is_some(),
            "sending email via SMTP"
        );

        let message = self.build_message(email)?;

        self.transport.send(message).await.map_err(|e| {
            error!(to = %email.to_email, error = %e, "failed to send email via SMTP");
            MailError::Transport(e.to_string())
        })?;

        info!(to = %email.to_email, "email sent via SMTP");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MailAttachment;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "localhost".to_string(),
            port: 1025,
            from_email: "noreply@example.com".to_string(),
            from_name: "Enrollments".to_string(),
            username: None,
            password: None,
            use_tls: false,
        }
    }

    #[tokio::test]
    async fn test_build_message_with_attachment() {
        let mailer = SmtpMailer::new(settings()).expect("mailer");
        let email = OutgoingEmail {
            to_email: "student@example.com".to_string(),
            to_name: "Asha".to_string(),
            subject: "Python Curriculum Download".to_string(),
            html_body: "<p>hi</p>".to_string(),
            text_body: "hi".to_string(),
            attachment: Some(MailAttachment {
                filename: "Python_Curriculum.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                bytes: b"%PDF".to_vec(),
            }),
        };

        let message = mailer.build_message(&email).expect("message");
        let raw = String::from_utf8(message.formatted()).expect("utf8");
        assert!(raw.contains("Python_Curriculum.pdf"));
        assert!(raw.contains("multipart/mixed"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected() {
        let mailer = SmtpMailer::new(settings()).expect("mailer");
        let email = OutgoingEmail {
            to_email: "not an address".to_string(),
            ..OutgoingEmail::default()
        };
        assert!(matches!(mailer.build_message(&email), Err(MailError::Address(_))));
    }
}
