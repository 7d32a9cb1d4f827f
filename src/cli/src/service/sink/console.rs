use itertools::Itertools;
use serde::Deserialize;

use super::{Inverter, Publication, SinkError};

#[derive(Debug, Clone, Default, Deserialize)]
struct Settings {
  /// Also list values the plan knows nothing about.
  #[serde(default)]
  all: bool,
}

/// Logs a table of the snapshot.
#[derive(Debug, Default)]
pub(crate) struct Sink {
  settings: Settings,
}

#[async_trait::async_trait]
impl super::Sink for Sink {
  fn name(&self) -> &'static str {
    "console"
  }

  fn configure(
    &mut self,
    settings: &serde_json::Value,
    inverter: &Inverter,
  ) -> Result<(), SinkError> {
    self.settings = serde_json::from_value(settings.clone())?;
    tracing::info!(
      "Logging scrapes of {} at {}",
      inverter.model(),
      inverter.host
    );

    Ok(())
  }

  async fn publish(&self, publication: Publication<'_>) {
    let rows = self.rows(publication);
    tracing::info!(
      "{} {} at {}: {} values\n{}",
      publication.inverter.model(),
      publication
        .snapshot
        .text("timestamp")
        .unwrap_or("without timestamp"),
      publication.inverter.host,
      rows.len(),
      rows.iter().join("\n")
    );
  }
}

impl Sink {
  fn rows(&self, publication: Publication<'_>) -> Vec<String> {
    let order = publication.plan.names().collect::<Vec<_>>();
    publication
      .snapshot
      .iter()
      .filter(|(name, _)| self.settings.all || order.contains(name))
      .sorted_by_key(|(name, _)| {
        order
          .iter()
          .position(|known| known == name)
          .unwrap_or(order.len())
      })
      .map(|(name, value)| {
        format!(
          "{:<8}{:<40}{:>12} {}",
          publication.plan.address(name).unwrap_or_else(|| "----".to_owned()),
          name,
          value.to_string(),
          publication.plan.unit(name).unwrap_or_default()
        )
      })
      .collect()
  }
}
