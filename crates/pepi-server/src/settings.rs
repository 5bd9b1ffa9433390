//! Server configuration, deserialised from `config.toml` layered under
//! `PEPI_*` environment variables.
//!
//! Nested keys use a double underscore: `PEPI_EMAIL__API_KEY`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Runtime server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub email:      EmailConfig,
}

impl ServerConfig {
  /// Read `path` (optional) and the environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("PEPI")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Which email backend delivers decision notices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailProvider {
  /// Write every message to the log.
  #[default]
  Log,
  /// Resend's HTTP API.
  Resend,
  Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
  #[serde(default)]
  pub provider:     EmailProvider,
  pub api_key:      Option<String>,
  #[serde(default = "default_sender_email")]
  pub sender_email: String,
  #[serde(default = "default_sender_name")]
  pub sender_name:  String,
  /// Base URL of the web UI, used for links in message bodies.
  #[serde(default = "default_app_url")]
  pub app_url:      String,
  #[serde(default = "default_api_base")]
  pub api_base:     String,
}

impl Default for EmailConfig {
  fn default() -> Self {
    Self {
      provider:     EmailProvider::default(),
      api_key:      None,
      sender_email: default_sender_email(),
      sender_name:  default_sender_name(),
      app_url:      default_app_url(),
      api_base:     default_api_base(),
    }
  }
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("pepi.db") }
fn default_sender_email() -> String { "pepi@localhost".into() }
fn default_sender_name() -> String { "PEPI Fund".into() }
fn default_app_url() -> String { "http://localhost:8080".into() }
fn default_api_base() -> String { "https://api.resend.com".into() }

#[cfg(test)]
mod tests {
  use config::{Config, File, FileFormat};

  use super::*;

  fn from_toml(toml: &str) -> ServerConfig {
    Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_takes_defaults() {
    let cfg = from_toml("");
    assert_eq!(cfg.address(), "127.0.0.1:8080");
    assert_eq!(cfg.store_path, PathBuf::from("pepi.db"));
    assert_eq!(cfg.email.provider, EmailProvider::Log);
    assert!(cfg.email.api_key.is_none());
  }

  #[test]
  fn email_section_overrides() {
    let cfg = from_toml(
      r#"
        port = 9000
        store_path = "~/pepi/pepi.db"

        [email]
        provider = "resend"
        api_key = "re_test"
        sender_email = "fund@unit.example"
      "#,
    );
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.email.provider, EmailProvider::Resend);
    assert_eq!(cfg.email.api_key.as_deref(), Some("re_test"));
    assert_eq!(cfg.email.sender_name, "PEPI Fund");
  }
}
