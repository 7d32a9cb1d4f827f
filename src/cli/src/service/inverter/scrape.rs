use std::fmt::Display;

use crate::service::modbus::*;

use super::derive::{Derivation, RUN_STATE_ON};
use super::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
  Disconnected,
  Connecting,
  Connected,
  Scraping,
}

/// How a scrape cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
  Success { total: usize },
  PartialFailure { failed: usize, total: usize },
  TotalFailure { failed: usize, total: usize },
  ConnectFailed,
}

impl Outcome {
  /// Whether the snapshot was updated and should be published.
  pub(crate) fn is_publishable(self) -> bool {
    matches!(self, Outcome::Success { .. } | Outcome::PartialFailure { .. })
  }
}

impl Display for Outcome {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Outcome::Success { total } => write!(f, "read all {} ranges", total),
      Outcome::PartialFailure { failed, total } => {
        write!(f, "{}/{} ranges failed", failed, total)
      }
      Outcome::TotalFailure { failed, total } => {
        write!(f, "{}/{} ranges failed", failed, total)
      }
      Outcome::ConnectFailed => f.write_str("failed connecting"),
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
  pub(crate) level: u8,
  pub(crate) use_local_time: bool,
  pub(crate) settle_delay: chrono::Duration,
  pub(crate) keep_session: bool,
}

/// Owns the transport and the snapshot and runs one scrape at a time.
#[derive(Debug)]
pub(crate) struct Scraper<T: Transport> {
  transport: T,
  plan: Plan,
  model: Option<String>,
  settings: Settings,
  snapshot: Snapshot,
  state: State,
}

impl<T: Transport> Scraper<T> {
  pub(crate) fn new(
    transport: T,
    plan: Plan,
    model: Option<String>,
    settings: Settings,
  ) -> Self {
    let state = if transport.is_live() {
      State::Connected
    } else {
      State::Disconnected
    };

    Self {
      transport,
      plan,
      model,
      settings,
      snapshot: Snapshot::new(),
      state,
    }
  }

  pub(crate) fn snapshot(&self) -> &Snapshot {
    &self.snapshot
  }

  pub(crate) fn plan(&self) -> &Plan {
    &self.plan
  }

  pub(crate) fn model(&self) -> Option<&str> {
    self.model.as_deref()
  }

  pub(crate) fn state(&self) -> State {
    self.state
  }

  #[cfg(test)]
  pub(crate) fn transport(&self) -> &T {
    &self.transport
  }

  /// Connects unless the previous session is still live.
  pub(crate) async fn ensure_connected(&mut self) -> Result<(), ConnectError> {
    if self.transport.is_live() {
      tracing::debug!("Session is still connected");
      self.state = State::Connected;
      return Ok(());
    }

    self.state = State::Connecting;
    tracing::info!("Connecting new session");
    if let Err(error) = self.transport.connect().await {
      self.state = State::Disconnected;
      return Err(error);
    }
    self.state = State::Connected;

    // slow inverters drop requests sent right after connecting
    if let Ok(delay) = self.settings.settle_delay.to_std() {
      tokio::time::sleep(delay).await;
    }

    Ok(())
  }

  /// Reads every planned range, merges the results and derives metrics.
  ///
  /// The snapshot is left untouched when nothing could be read.
  #[tracing::instrument(skip(self))]
  pub(crate) async fn cycle(&mut self) -> Outcome {
    if let Err(error) = self.ensure_connected().await {
      tracing::warn!("Failed connecting to inverter: {}", error);
      return Outcome::ConnectFailed;
    }

    self.state = State::Scraping;
    let total = self.plan.ranges().len();
    let mut failed = 0;
    let mut reads = Vec::with_capacity(total);
    for range in self.plan.ranges().to_vec() {
      tracing::debug!("Scraping {}", range);
      match self.read(&range).await {
        Ok(decoded) => reads.push(decoded),
        Err(error) => {
          tracing::warn!("Failed scraping {}: {}", range, error);
          failed += 1;
        }
      }
    }

    if failed == total {
      tracing::warn!("All scrapes failed, disconnecting");
      self.transport.close().await;
      self.state = State::Disconnected;
      return Outcome::TotalFailure { failed, total };
    }
    self.state = State::Connected;

    if failed > 0 {
      tracing::warn!("{}/{} ranges failed to scrape", failed, total);
    }

    let run_state = match self.snapshot.get("run_state") {
      Some(run_state) if run_state.is_truthy() => run_state.clone(),
      _ => Value::from(RUN_STATE_ON),
    };
    if let Some(model) = &self.model {
      self.snapshot.set(MODEL_REGISTER, model.as_str());
    }
    self.snapshot.set("run_state", run_state);
    for decoded in reads {
      self.snapshot.merge(decoded);
    }

    Derivation {
      plan: &self.plan,
      level: self.settings.level,
      use_local_time: self.settings.use_local_time,
      now: chrono::Local::now().naive_local(),
    }
    .apply(&mut self.snapshot);

    if failed > 0 {
      Outcome::PartialFailure { failed, total }
    } else {
      Outcome::Success { total }
    }
  }

  /// Ends a published cycle, closing the session unless it must persist.
  pub(crate) async fn finish(&mut self) {
    if !self.settings.keep_session {
      self.transport.close().await;
      self.state = State::Disconnected;
    }
  }

  async fn read(&mut self, range: &ScanRange) -> anyhow::Result<Decoded> {
    let words = self.transport.read_range(range.bank, range.span()).await?;
    let decoded = range::decode(range, &words, self.plan.registers())?;
    Ok(decoded)
  }
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use crate::service::modbus::testing::ScriptedTransport;

  use super::*;

  fn plan() -> Plan {
    Plan::new(
      &Catalog::new(
        None,
        vec![
          RegisterDefinition::new(
            "daily_power_yields",
            Bank::Input,
            5003,
            RegisterKind::U16,
          )
          .with_accuracy(dec!(0.1))
          .with_level(1),
          RegisterDefinition::new(
            "total_active_power",
            Bank::Input,
            5031,
            RegisterKind::U32,
          )
          .with_level(1),
          RegisterDefinition::new(
            "start_stop",
            Bank::Holding,
            5006,
            RegisterKind::U16,
          )
          .with_table(&[
            (0xCF, Value::from("Start")),
            (0xCE, Value::from("Stop")),
          ])
          .with_level(1),
        ],
        vec![
          ScanRange {
            bank: Bank::Input,
            start: 5000,
            length: 10,
          },
          ScanRange {
            bank: Bank::Input,
            start: 5030,
            length: 5,
          },
          ScanRange {
            bank: Bank::Holding,
            start: 5000,
            length: 10,
          },
        ],
      ),
      &Filter {
        level: 1,
        model: None,
        smart_meter: false,
      },
    )
  }

  fn settings(keep_session: bool) -> Settings {
    Settings {
      level: 1,
      use_local_time: false,
      settle_delay: chrono::Duration::zero(),
      keep_session,
    }
  }

  fn transport() -> ScriptedTransport {
    ScriptedTransport::default()
      .with_block(
        Bank::Input,
        5000,
        &[0, 0, 42, 0, 0, 0, 0, 0, 0, 0],
      )
      .with_block(Bank::Input, 5030, &[1200, 0, 0, 0, 0])
      .with_block(Bank::Holding, 5000, &[0, 0, 0, 0, 0, 0xCF, 0, 0, 0, 0])
  }

  #[tokio::test]
  async fn successful_cycle_fills_snapshot() {
    let mut scraper = Scraper::new(
      transport(),
      plan(),
      Some("SG10RT".to_owned()),
      settings(false),
    );

    let outcome = scraper.cycle().await;

    assert_eq!(outcome, Outcome::Success { total: 3 });
    let snapshot = scraper.snapshot();
    assert_eq!(snapshot.number("daily_power_yields"), Some(dec!(4.2)));
    assert_eq!(snapshot.number("total_active_power"), Some(dec!(1200)));
    assert_eq!(snapshot.text("start_stop"), Some("Start"));
    assert_eq!(snapshot.text(MODEL_REGISTER), Some("SG10RT"));
    assert_eq!(scraper.transport().connects, 1);
    assert_eq!(scraper.state(), State::Connected);

    scraper.finish().await;
    assert_eq!(scraper.transport().closes, 1);
    assert_eq!(scraper.state(), State::Disconnected);
  }

  #[tokio::test]
  async fn stale_field_survives_partial_failure() {
    let mut scraper = Scraper::new(transport(), plan(), None, settings(true));
    scraper.cycle().await;

    scraper.transport.failing.insert((Bank::Input, 5000));
    scraper
      .transport
      .blocks
      .insert((Bank::Input, 5030), vec![1500, 0, 0, 0, 0]);
    let outcome = scraper.cycle().await;

    assert_eq!(outcome, Outcome::PartialFailure { failed: 1, total: 3 });
    assert!(outcome.is_publishable());
    let snapshot = scraper.snapshot();
    assert_eq!(snapshot.number("daily_power_yields"), Some(dec!(4.2)));
    assert_eq!(snapshot.number("total_active_power"), Some(dec!(1500)));
  }

  #[tokio::test]
  async fn total_failure_tears_down_without_changes() {
    let mut scraper = Scraper::new(transport(), plan(), None, settings(true));
    scraper.cycle().await;
    let before = scraper.snapshot().clone();

    scraper.transport.failing.insert((Bank::Input, 5000));
    scraper.transport.failing.insert((Bank::Input, 5030));
    scraper.transport.failing.insert((Bank::Holding, 5000));
    let outcome = scraper.cycle().await;

    assert_eq!(outcome, Outcome::TotalFailure { failed: 3, total: 3 });
    assert!(!outcome.is_publishable());
    assert_eq!(scraper.snapshot(), &before);
    assert_eq!(scraper.transport().closes, 1);
    assert_eq!(scraper.state(), State::Disconnected);
  }

  #[tokio::test]
  async fn mismatched_block_counts_as_failed_range() {
    let mut scraper = Scraper::new(
      transport().with_block(Bank::Input, 5030, &[1200, 0]),
      plan(),
      None,
      settings(false),
    );

    let outcome = scraper.cycle().await;

    assert_eq!(outcome, Outcome::PartialFailure { failed: 1, total: 3 });
    assert_eq!(scraper.snapshot().get("total_active_power"), None);
  }

  #[tokio::test]
  async fn connect_failure_aborts_cycle() {
    let mut transport = transport();
    transport.refuse_connect = true;
    let mut scraper = Scraper::new(transport, plan(), None, settings(false));

    let outcome = scraper.cycle().await;

    assert_eq!(outcome, Outcome::ConnectFailed);
    assert!(scraper.snapshot().is_empty());
    assert!(scraper.transport().reads.is_empty());
    assert_eq!(scraper.state(), State::Disconnected);
  }

  #[tokio::test]
  async fn live_session_is_reused() {
    let mut scraper = Scraper::new(transport(), plan(), None, settings(true));

    scraper.cycle().await;
    scraper.finish().await;
    scraper.cycle().await;

    assert_eq!(scraper.transport().connects, 1);
    assert_eq!(scraper.transport().closes, 0);
  }

  #[tokio::test]
  async fn stopped_inverter_reports_off() {
    let mut scraper = Scraper::new(
      transport().with_block(Bank::Holding, 5000, &[0; 10]),
      plan(),
      None,
      settings(false),
    );

    scraper.cycle().await;

    assert_eq!(scraper.snapshot().text("run_state"), Some("OFF"));
  }
}
