use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::error::{AppError, AppResult};

/// Outbound mail
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// SMTP relay with STARTTLS and login credentials
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        sender: &str,
        host: &str,
        port: u16,
        user: String,
        password: String,
    ) -> AppResult<Self> {
        let sender = sender
            .parse::<Mailbox>()
            .map_err(|e| AppError::InvalidInput(format!("Invalid sender address '{}': {}", sender, e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::Internal(format!("Invalid SMTP relay '{}': {}", host, e)))?
            .port(port)
            .credentials(Credentials::new(user, password))
            .build();

        Ok(Self { transport, sender })
    }
}

#[async_trait::async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> AppResult<()> {
        let to = recipient.parse::<Mailbox>().map_err(|e| {
            AppError::InvalidInput(format!("Invalid recipient address '{}': {}", recipient, e))
        })?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::ExternalApi(format!("SMTP delivery failed: {}", e)))?;

        tracing::info!(recipient = %recipient, subject = %subject, "Email sent");
        Ok(())
    }
}
