//! Runtime pieces of the PEPI server binary: configuration and the email
//! providers behind [`pepi_core::notify::Notifier`].

pub mod notifier;
pub mod settings;

pub use notifier::{EmailError, EmailNotifier};
pub use settings::{EmailConfig, EmailProvider, ServerConfig};
