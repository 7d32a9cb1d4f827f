use crate::service::{inverter::Outcome, sink};
use crate::*;

pub(crate) struct Process {
  config: config::Values,
  services: service::Container,
}

impl process::Process for Process {}

#[async_trait::async_trait]
impl process::Recurring for Process {
  #[tracing::instrument(skip(self))]
  async fn execute(&self) -> anyhow::Result<()> {
    let outcome = self.scrape().await;
    if !outcome.is_publishable() {
      tracing::warn!(
        "Data collection failed ({}), skipped publishing, retrying in {} secs",
        outcome,
        self.config.inverter.scan_interval.num_seconds()
      );
    }

    Ok(())
  }
}

impl Process {
  pub(crate) fn new(
    config: config::Values,
    services: service::Container,
  ) -> Self {
    Self { config, services }
  }

  /// One scrape followed by publishing to every sink.
  pub(crate) async fn scrape(&self) -> Outcome {
    let mut scraper = self.services.scraper().lock_owned().await;
    let outcome = scraper.cycle().await;
    if !outcome.is_publishable() {
      return outcome;
    }

    sink::publish_all(
      self.services.sinks(),
      sink::Publication {
        snapshot: scraper.snapshot(),
        plan: scraper.plan(),
        inverter: self.services.inverter(),
      },
    )
    .await;
    scraper.finish().await;
    tracing::debug!("Scraper is {:?} after publishing", scraper.state());

    tracing::info!(
      "Published {} values of {}",
      scraper.snapshot().len(),
      scraper.model().unwrap_or("unknown model")
    );

    outcome
  }
}
