mod scrape;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{config, service};

pub(crate) trait Process {
  fn process_name(&self) -> &'static str {
    std::any::type_name::<Self>()
  }
}

#[async_trait::async_trait]
pub(crate) trait Recurring: Process {
  async fn execute(&self) -> anyhow::Result<()>;
}

pub(crate) struct Container {
  config: config::Values,
  services: service::Container,
  handles: Arc<Mutex<Option<Vec<Handle>>>>,
}

impl Container {
  pub(crate) fn new(
    config: config::Values,
    services: service::Container,
  ) -> Self {
    Self {
      config,
      services,
      handles: Arc::new(Mutex::new(None)),
    }
  }

  /// Runs a single scrape and fails unless it was published.
  pub(crate) async fn run_once(&self) -> anyhow::Result<()> {
    let process =
      scrape::Process::new(self.config.clone(), self.services.clone());
    let outcome = process.scrape().await;
    if !outcome.is_publishable() {
      return Err(anyhow::anyhow!("Scrape failed: {}", outcome));
    }

    Ok(())
  }

  pub(crate) async fn cancel(&self) {
    {
      let mut handles = self.handles.clone().lock_owned().await;
      if let Some(handles) = &mut *handles {
        for handle in handles.iter() {
          handle.token.cancel();
        }

        for handle in handles.drain(0..) {
          if let Err(error) = handle.join.await {
            tracing::error! {
              %error,
              "Joining process handle on cancel failed"
            }
          }
        }
      }
      *handles = None;
    }
  }
}

macro_rules! make_recurring_spec {
  ($self: ident, $type: ty, $interval: expr) => {
    RecurringSpec {
      process: Box::new(<$type>::new(
        $self.config.clone(),
        $self.services.clone(),
      )),
      interval: $interval,
    }
  };
}

impl Container {
  pub(crate) async fn spawn(&self) {
    let specs = vec![make_recurring_spec!(
      self,
      scrape::Process,
      self.config.inverter.scan_interval
    )];

    {
      let mut handles = self.handles.clone().lock_owned().await;
      *handles = Some(specs.into_iter().map(Handle::recurring).collect());
    }
  }
}

/// Wait before the next execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pause {
  /// What is left of the interval.
  Remaining(chrono::Duration),
  /// Execution left at most a second of the interval.
  Overrun(chrono::Duration),
}

impl Pause {
  pub(crate) fn duration(self) -> chrono::Duration {
    match self {
      Pause::Remaining(duration) | Pause::Overrun(duration) => duration,
    }
  }
}

pub(crate) fn next_pause(
  interval: chrono::Duration,
  elapsed: chrono::Duration,
) -> Pause {
  let remaining = interval - elapsed;
  if remaining <= chrono::Duration::seconds(1) {
    Pause::Overrun(elapsed)
  } else {
    Pause::Remaining(remaining)
  }
}

struct Handle {
  token: tokio_util::sync::CancellationToken,
  join: tokio::task::JoinHandle<()>,
}

struct RecurringSpec {
  process: Box<dyn Recurring + Sync + Send>,
  interval: chrono::Duration,
}

impl Handle {
  fn recurring(spec: RecurringSpec) -> Self {
    let token = tokio_util::sync::CancellationToken::new();
    let child_token = token.child_token();
    let join = tokio::spawn(async move {
      loop {
        let start = std::time::Instant::now();
        if let Err(error) = spec.process.execute().await {
          tracing::error!(
            "Process execution failed {} for {}",
            error,
            spec.process.process_name()
          );
        }
        let elapsed = chrono::Duration::from_std(start.elapsed())
          .unwrap_or_else(|_| chrono::Duration::zero());

        let pause = next_pause(spec.interval, elapsed);
        match pause {
          Pause::Remaining(remaining) => {
            tracing::info!(
              "Next execution of {} in {} secs",
              spec.process.process_name(),
              remaining.num_seconds()
            );
          }
          Pause::Overrun(elapsed) => {
            tracing::warn!(
              "{} took {} ms which is about its interval of {} secs, \
              increase the interval",
              spec.process.process_name(),
              elapsed.num_milliseconds(),
              spec.interval.num_seconds()
            );
          }
        }

        let pause = pause.duration().to_std().unwrap_or_default();
        tokio::select! {
          _ = child_token.cancelled() => { return; },
          _ = tokio::time::sleep(pause) => { }
        }
      }
    });
    Self { token, join }
  }
}
