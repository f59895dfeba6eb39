//! Outbound mail dispatch for password-recovery links.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::MailerConfig;

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to: &str, link: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: String,
}

/// HTTP mail-relay client. The relay accepts a JSON message and performs
/// the actual SMTP delivery.
pub struct RelayMailer {
    client: Client,
    endpoint: String,
    api_key: String,
    from_address: String,
}

impl RelayMailer {
    pub fn new(config: &MailerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Salus/1.0")
            .build()
            .context("Failed to build mailer HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Mailer for RelayMailer {
    async fn send_password_reset(&self, to: &str, link: &str) -> Result<()> {
        let message = RelayMessage {
            from: &self.from_address,
            to,
            subject: "Recuperación de contraseña",
            html: format!(
                "<p>Para restablecer tu contraseña, haz clic en el siguiente enlace \
                 (válido por una hora):</p><p><a href=\"{link}\">{link}</a></p>\
                 <p>Si no solicitaste este cambio, ignora este mensaje.</p>"
            ),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()
            .await
            .context("Mail relay request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("Mail relay rejected message: {status}");
            anyhow::bail!("Mail relay returned {status}");
        }

        Ok(())
    }
}

/// Used when the mailer is disabled (local development): logs the link
/// instead of sending it.
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, to: &str, link: &str) -> Result<()> {
        info!("Mailer disabled; reset link for {to}: {link}");
        Ok(())
    }
}

/// Test double that records every dispatched message. A poisoned instance
/// fails each send, for exercising dispatch-failure paths.
#[derive(Default)]
pub struct MemoryMailer {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl MemoryMailer {
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait::async_trait]
impl Mailer for MemoryMailer {
    async fn send_password_reset(&self, to: &str, link: &str) -> Result<()> {
        if self.fail {
            anyhow::bail!("simulated dispatch failure");
        }

        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push((to.to_string(), link.to_string()));
        Ok(())
    }
}
