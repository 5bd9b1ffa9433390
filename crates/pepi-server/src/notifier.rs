//! Email providers.
//!
//! - `log`: writes each message to the log (development)
//! - `resend`: posts to Resend's `/emails` endpoint with bearer auth
//! - `disabled`: drops every message

use std::time::Duration;

use pepi_core::notify::{Notification, Notifier};
use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;

use crate::settings::{EmailConfig, EmailProvider};

#[derive(Debug, Error)]
pub enum EmailError {
  #[error("email provider not configured: {0}")]
  NotConfigured(String),

  #[error("email request failed: {0}")]
  Http(#[from] reqwest::Error),

  /// The provider answered with a non-success status.
  #[error("email provider rejected the message ({status}): {body}")]
  Rejected { status: u16, body: String },
}

/// Resend API client. Cheap to clone; the inner [`Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ResendClient {
  client:   Client,
  api_key:  String,
  from:     String,
  endpoint: String,
}

impl ResendClient {
  pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
    let api_key = config
      .api_key
      .clone()
      .filter(|k| !k.trim().is_empty())
      .ok_or_else(|| EmailError::NotConfigured("resend requires email.api_key".into()))?;
    let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
    Ok(Self {
      client,
      api_key,
      from: format!("{} <{}>", config.sender_name, config.sender_email),
      endpoint: format!("{}/emails", config.api_base.trim_end_matches('/')),
    })
  }

  async fn send(&self, message: &Notification) -> Result<(), EmailError> {
    let resp = self
      .client
      .post(&self.endpoint)
      .bearer_auth(&self.api_key)
      .json(&payload(&self.from, message))
      .send()
      .await?;

    let status = resp.status();
    if status.is_success() {
      tracing::info!(to = %message.to, subject = %message.subject, "email sent via resend");
      Ok(())
    } else {
      let body = resp.text().await.unwrap_or_default();
      Err(EmailError::Rejected { status: status.as_u16(), body })
    }
  }
}

/// The JSON body of a Resend `POST /emails` call.
fn payload(from: &str, message: &Notification) -> Value {
  let mut body = json!({
    "from": from,
    "to": [message.to],
    "subject": message.subject,
    "text": message.body_text,
    "tags": message.tags,
  });
  if let Some(html) = &message.body_html {
    body["html"] = json!(html);
  }
  body
}

/// The configured email backend.
#[derive(Clone)]
pub enum EmailNotifier {
  Log,
  Resend(ResendClient),
  Disabled,
}

impl EmailNotifier {
  pub fn from_config(config: &EmailConfig) -> Result<Self, EmailError> {
    Ok(match config.provider {
      EmailProvider::Log => Self::Log,
      EmailProvider::Resend => Self::Resend(ResendClient::new(config)?),
      EmailProvider::Disabled => Self::Disabled,
    })
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Log => "log",
      Self::Resend(_) => "resend",
      Self::Disabled => "disabled",
    }
  }
}

impl Notifier for EmailNotifier {
  type Error = EmailError;

  async fn send(&self, message: Notification) -> Result<(), EmailError> {
    match self {
      Self::Log => {
        tracing::info!(
          to = %message.to,
          subject = %message.subject,
          body = %message.body_text,
          "email (log provider)"
        );
        Ok(())
      }
      Self::Resend(client) => client.send(&message).await,
      Self::Disabled => {
        tracing::debug!(to = %message.to, "email disabled, skipping send");
        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use pepi_core::notify::EmailTag;

  use super::*;

  fn message() -> Notification {
    Notification {
      to:        "agent@unit.example".into(),
      subject:   "PEPI spending of $150.00 approved".into(),
      body_text: "Approved.".into(),
      body_html: None,
      tags:      vec![EmailTag::new("category", "transaction_reviewed")],
    }
  }

  #[test]
  fn resend_without_api_key_is_not_configured() {
    let config = EmailConfig { provider: EmailProvider::Resend, ..EmailConfig::default() };
    let err = EmailNotifier::from_config(&config).err().unwrap();
    assert!(matches!(err, EmailError::NotConfigured(_)));
  }

  #[test]
  fn resend_endpoint_and_sender() {
    let config = EmailConfig {
      provider: EmailProvider::Resend,
      api_key: Some("re_test".into()),
      api_base: "https://mail.internal/".into(),
      ..EmailConfig::default()
    };
    let EmailNotifier::Resend(client) = EmailNotifier::from_config(&config).unwrap() else {
      panic!("expected resend provider");
    };
    assert_eq!(client.endpoint, "https://mail.internal/emails");
    assert_eq!(client.from, "PEPI Fund <pepi@localhost>");
  }

  #[test]
  fn payload_carries_tags_and_optional_html() {
    let body = payload("PEPI Fund <pepi@localhost>", &message());
    assert_eq!(body["to"][0], "agent@unit.example");
    assert_eq!(body["tags"][0]["name"], "category");
    assert!(body.get("html").is_none());

    let mut html = message();
    html.body_html = Some("<p>Approved.</p>".into());
    assert_eq!(payload("x", &html)["html"], "<p>Approved.</p>");
  }

  #[tokio::test]
  async fn log_and_disabled_always_succeed() {
    assert!(EmailNotifier::Log.send(message()).await.is_ok());
    assert!(EmailNotifier::Disabled.send(message()).await.is_ok());
  }
}
