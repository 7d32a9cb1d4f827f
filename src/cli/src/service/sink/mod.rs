pub(crate) mod console;
pub(crate) mod webhook;

use crate::config;
use crate::service::inverter::{clean_model, Snapshot};
use crate::service::modbus::Plan;

/// The inverter a sink reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Inverter {
  pub(crate) host: String,
  pub(crate) model: Option<String>,
}

impl Inverter {
  pub(crate) fn model(&self) -> &str {
    self.model.as_deref().unwrap_or("UNKNOWN")
  }

  pub(crate) fn clean_model(&self) -> String {
    clean_model(self.model())
  }
}

/// Read-only view of a finished scrape.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Publication<'a> {
  pub(crate) snapshot: &'a Snapshot,
  pub(crate) plan: &'a Plan,
  pub(crate) inverter: &'a Inverter,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SinkError {
  #[error("Unknown sink {0:?}")]
  Unknown(String),

  #[error("Invalid sink settings")]
  Settings(#[from] serde_json::Error),

  #[error("HTTP client construction error")]
  Http(#[from] reqwest::Error),

  #[error("Invalid header error")]
  InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Destination for every published snapshot.
///
/// Publishing never fails from the caller's point of view, sinks log their
/// own errors.
#[async_trait::async_trait]
pub(crate) trait Sink: Send + Sync {
  fn name(&self) -> &'static str;

  fn configure(
    &mut self,
    settings: &serde_json::Value,
    inverter: &Inverter,
  ) -> Result<(), SinkError>;

  async fn publish(&self, publication: Publication<'_>);
}

pub(crate) fn for_name(name: &str) -> Result<Box<dyn Sink>, SinkError> {
  match name {
    "console" => Ok(Box::new(console::Sink::default())),
    "webhook" => Ok(Box::new(webhook::Sink::default())),
    _ => Err(SinkError::Unknown(name.to_owned())),
  }
}

/// Enabled and successfully configured sinks in configuration order.
pub(crate) fn load(
  exports: &[config::Export],
  inverter: &Inverter,
) -> Vec<Box<dyn Sink>> {
  let mut sinks = Vec::new();
  for export in exports.iter().filter(|export| export.enabled) {
    let configured = for_name(&export.name).and_then(|mut sink| {
      sink.configure(&export.settings, inverter)?;
      Ok(sink)
    });
    match configured {
      Ok(sink) => {
        tracing::info!("Loaded sink {}", sink.name());
        sinks.push(sink);
      }
      Err(error) => {
        tracing::error!("Failed loading sink {}: {}", export.name, error);
      }
    }
  }

  sinks
}

/// Hands the publication to every sink in order.
pub(crate) async fn publish_all(
  sinks: &[Box<dyn Sink>],
  publication: Publication<'_>,
) {
  for sink in sinks {
    tracing::trace!("Publishing to {}", sink.name());
    sink.publish(publication).await;
  }
}
