//! WhatsApp delivery through the Twilio Messages API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::channel::MessageChannel;
use crate::error::{NotifyError, NotifyResult};

const WHATSAPP_PREFIX: &str = "whatsapp:";

#[derive(Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number, with or without the `whatsapp:` prefix
    pub from_number: String,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"***")
            .field("from_number", &self.from_number)
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl TwilioConfig {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
            api_base: "https://api.twilio.com".to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Read credentials from the environment.
    ///
    /// Returns `None` unless `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN` and
    /// `TWILIO_PHONE_NUMBER` are all set.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let mut config = Self::new(
            var("TWILIO_ACCOUNT_SID")?,
            var("TWILIO_AUTH_TOKEN")?,
            var("TWILIO_PHONE_NUMBER")?,
        );
        if let Some(base) = var("TWILIO_API_BASE") {
            config.api_base = base;
        }
        Some(config)
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
}

/// Sends WhatsApp messages via Twilio.
pub struct TwilioWhatsApp {
    client: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioWhatsApp {
    pub fn new(config: TwilioConfig) -> NotifyResult<Self> {
        if config.account_sid.is_empty() || config.auth_token.is_empty() {
            return Err(NotifyError::config("Twilio credentials are empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| NotifyError::config(e.to_string()))?;

        Ok(Self { client, config })
    }
}

/// Prefix an address for the WhatsApp channel, once.
pub fn whatsapp_address(number: &str) -> String {
    if number.starts_with(WHATSAPP_PREFIX) {
        number.to_string()
    } else {
        format!("{}{}", WHATSAPP_PREFIX, number)
    }
}

#[async_trait]
impl MessageChannel for TwilioWhatsApp {
    fn name(&self) -> &'static str {
        "twilio_whatsapp"
    }

    async fn send(&self, to: &str, body: &str) -> NotifyResult<()> {
        let from = whatsapp_address(&self.config.from_number);
        let to = whatsapp_address(to);

        let response = self
            .client
            .post(self.config.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("From", from.as_str()), ("To", to.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| NotifyError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TwilioErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(text);
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let resource: MessageResource = response
            .json()
            .await
            .unwrap_or(MessageResource { sid: None });
        debug!(to = %to, sid = ?resource.sid, "Twilio accepted message");
        Ok(())
    }
}
