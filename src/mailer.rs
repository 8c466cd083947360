//! Digest delivery over SMTP.

use anyhow::{Context, Result};
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::SmtpConfig;

pub struct Mailer {
    config: SmtpConfig,
}

impl Mailer {
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Build a multipart/alternative message with text and HTML bodies.
    ///
    /// # Errors
    ///
    /// Returns an error if an address does not parse.
    pub fn build_message(&self, subject: &str, text_body: &str, html_body: &str) -> Result<Message> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .context("Invalid from email address")?;
        let to: Mailbox = self
            .config
            .to
            .parse()
            .context("Invalid to email address")?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .context("Failed to build email message")
    }

    /// Send a digest via STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be built or delivered.
    pub async fn send(&self, subject: &str, text_body: &str, html_body: &str) -> Result<()> {
        let email = self.build_message(subject, text_body, html_body)?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let transport: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                .context("Failed to create SMTP transport")?
                .port(self.config.port)
                .credentials(creds)
                .build();

        transport
            .send(email)
            .await
            .context("Failed to send email via SMTP")?;

        info!(to = %self.config.to, subject = subject, "Digest sent");
        Ok(())
    }
}
