//! Outbound email notifications.
//!
//! Delivery is advisory: the workflow logs a failed send and moves on.

use std::future::Future;

use serde::Serialize;

use crate::{
  agent::Agent,
  ci_payment::CiPayment,
  fund_request::FundRequest,
  review::Decision,
  transaction::Transaction,
};

/// A provider-side tag used to group and filter sent mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailTag {
  pub name:  String,
  pub value: String,
}

impl EmailTag {
  pub fn new(name: &str, value: impl Into<String>) -> Self {
    Self { name: name.to_owned(), value: value.into() }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub to:        String,
  pub subject:   String,
  pub body_text: String,
  pub body_html: Option<String>,
  pub tags:      Vec<EmailTag>,
}

/// An email-sending capability.
pub trait Notifier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn send(
    &self,
    message: Notification,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

/// A notifier that drops every message. For deployments without email.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
  type Error = std::convert::Infallible;

  async fn send(&self, message: Notification) -> Result<(), Self::Error> {
    tracing::debug!(to = %message.to, subject = %message.subject, "notification dropped");
    Ok(())
  }
}

// ─── Templates ───────────────────────────────────────────────────────────────

fn decision_lines(decision: &Decision) -> String {
  match decision {
    Decision::Approve => String::new(),
    Decision::Reject { reason: Some(reason) } => format!("\nReason: {reason}\n"),
    Decision::Reject { reason: None } => "\nNo reason was given.\n".to_owned(),
  }
}

fn html_paragraphs(text: &str) -> String {
  text
    .split("\n\n")
    .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
    .collect()
}

fn escape_html(s: &str) -> String {
  s.replace('&', "&amp;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
    .replace('"', "&quot;")
}

fn render(
  to: &str,
  subject: String,
  body_text: String,
  tags: Vec<EmailTag>,
) -> Notification {
  let body_html = Some(format!(
    "<!DOCTYPE html><html><body style=\"font-family: sans-serif\">{}</body></html>",
    html_paragraphs(&body_text)
  ));
  Notification { to: to.to_owned(), subject, body_text, body_html, tags }
}

/// Tell `recipient` how their transaction was reviewed.
pub fn transaction_reviewed(
  to: &str,
  recipient: &Agent,
  tx: &Transaction,
  decision: &Decision,
  app_url: &str,
) -> Notification {
  let verb = decision.verb();
  let subject = format!(
    "PEPI {} of {} {}",
    tx.transaction_type, tx.amount, verb
  );
  let body = format!(
    "Hi {name},\n\nYour {kind} of {amount} (\"{description}\") was {verb}.\n{reason}\nView it at {url}/transactions/{id}\n\nPEPI Fund",
    name = recipient.name,
    kind = tx.transaction_type,
    amount = tx.amount,
    description = tx.description,
    reason = decision_lines(decision),
    url = app_url.trim_end_matches('/'),
    id = tx.id,
  );
  render(to, subject, body, vec![
    EmailTag::new("category", "transaction_review"),
    EmailTag::new("decision", verb),
  ])
}

pub fn ci_payment_reviewed(
  to: &str,
  recipient: &Agent,
  payment: &CiPayment,
  decision: &Decision,
  app_url: &str,
) -> Notification {
  let verb = decision.verb();
  let subject = format!("CI payment of {} {}", payment.amount, verb);
  let body = format!(
    "Hi {name},\n\nThe CI payment of {amount} to {code} on {date} was {verb}.\n{reason}\nView it at {url}/ci-payments/{id}\n\nPEPI Fund",
    name = recipient.name,
    amount = payment.amount,
    code = payment.informant_code,
    date = payment.payment_date,
    reason = decision_lines(decision),
    url = app_url.trim_end_matches('/'),
    id = payment.id,
  );
  render(to, subject, body, vec![
    EmailTag::new("category", "ci_payment_review"),
    EmailTag::new("decision", verb),
  ])
}

pub fn fund_request_reviewed(
  to: &str,
  recipient: &Agent,
  request: &FundRequest,
  decision: &Decision,
  app_url: &str,
) -> Notification {
  let verb = decision.verb();
  let subject = format!("Fund request for {} {}", request.amount, verb);
  let body = format!(
    "Hi {name},\n\nYour request for {amount} ({purpose}) was {verb}.\n{reason}\nView it at {url}/fund-requests/{id}\n\nPEPI Fund",
    name = recipient.name,
    amount = request.amount,
    purpose = request.purpose,
    reason = decision_lines(decision),
    url = app_url.trim_end_matches('/'),
    id = request.id,
  );
  render(to, subject, body, vec![
    EmailTag::new("category", "fund_request_review"),
    EmailTag::new("decision", verb),
  ])
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::{
    agent::Role,
    review::ReviewStatus,
    transaction::{TransactionType, fixtures::tx},
  };

  #[test]
  fn rejection_mail_carries_reason_and_escapes_html() {
    let agent = Agent {
      id:           Uuid::new_v4(),
      name:         "Lee <Field>".into(),
      badge_number: "9".into(),
      email:        Some("lee@example.org".into()),
      role:         Role::Agent,
      user_id:      Uuid::new_v4(),
      created_at:   Utc::now(),
    };
    let t = tx(TransactionType::Spending, 150, ReviewStatus::Rejected);
    let mail = transaction_reviewed(
      "lee@example.org",
      &agent,
      &t,
      &Decision::Reject { reason: Some("needs receipt".into()) },
      "https://pepi.example.org/",
    );

    assert_eq!(mail.subject, "PEPI spending of $150.00 rejected");
    assert!(mail.body_text.contains("Reason: needs receipt"));
    assert!(mail.body_text.contains("https://pepi.example.org/transactions/"));
    let html = mail.body_html.unwrap();
    assert!(html.contains("Lee &lt;Field&gt;"));
    assert!(mail.tags.contains(&EmailTag::new("decision", "rejected")));
  }
}
