use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PasswordResetMailer: Send + Sync {
    async fn send_password_reset(&self, to_email: &str, reset_url: &str) -> Result<()>;
}

pub struct SmtpMailer {
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mailer = if config.skip_send {
            None
        } else {
            let host = config.host.as_deref().unwrap_or("localhost");
            let transport = match (&config.username, &config.password) {
                (Some(username), password) => {
                    let creds = Credentials::new(
                        username.clone(),
                        password.clone().unwrap_or_default(),
                    );
                    AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
                        .port(config.port)
                        .credentials(creds)
                        .build()
                }
                (None, _) => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                    .port(config.port)
                    .build(),
            };
            Some(transport)
        };

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }
}

fn password_reset_body(reset_url: &str) -> String {
    format!(
        r#"
We received a request to reset your Check In password.

Open the link below to choose a new password:

{}

The link is valid for one hour. If you did not ask for a reset, you can
ignore this email.
"#,
        reset_url
    )
}

#[async_trait]
impl PasswordResetMailer for SmtpMailer {
    async fn send_password_reset(&self, to_email: &str, reset_url: &str) -> Result<()> {
        let Some(mailer) = &self.mailer else {
            tracing::debug!("SMTP_SKIP_SEND set; password reset email not sent");
            return Ok(());
        };

        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(to_email.parse()?)
            .subject("Reset your Check In password")
            .header(ContentType::TEXT_PLAIN)
            .body(password_reset_body(reset_url))?;

        mailer.send(email).await?;
        Ok(())
    }
}
