pub(crate) mod inverter;
pub(crate) mod modbus;
pub(crate) mod sink;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config;

use self::modbus::Transport;

pub(crate) type Scraper = inverter::Scraper<modbus::Connection>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StartError {
  #[error("Failed connecting to inverter {host}:{port}")]
  Connect {
    host: String,
    port: u16,
    #[source]
    source: modbus::ConnectError,
  },
}

/// Everything a scrape needs, set up once at startup.
#[derive(Clone)]
pub(crate) struct Container {
  scraper: Arc<Mutex<Scraper>>,
  sinks: Arc<[Box<dyn sink::Sink>]>,
  inverter: sink::Inverter,
}

impl Container {
  /// Connects, resolves the model, plans the reads and loads the sinks.
  ///
  /// Only a failed first connection is fatal. An unresolved model leaves
  /// model specific registers unfiltered.
  #[tracing::instrument(skip_all, fields(host = %values.inverter.host))]
  pub(crate) async fn start(
    values: &config::Values,
    catalog: modbus::Catalog,
  ) -> Result<Self, StartError> {
    let config::Inverter {
      host,
      port,
      timeout,
      retries,
      slave,
      settle_delay,
      connection: kind,
      model: declared,
      smart_meter,
      use_local_time,
      level,
      ..
    } = values.inverter.clone();
    let connect_error = |source| StartError::Connect {
      host: host.clone(),
      port,
      source,
    };

    let mut connection = modbus::Connection::new(
      kind,
      modbus::Destination {
        host: host.clone(),
        port,
        slave,
      },
      modbus::Params::new(timeout, retries),
    )
    .map_err(connect_error)?;
    connection.connect().await.map_err(connect_error)?;
    if let Ok(delay) = settle_delay.to_std() {
      tokio::time::sleep(delay).await;
    }

    let model =
      match inverter::resolve(declared.as_deref(), &catalog, &mut connection)
        .await
      {
        Ok(model) => Some(model),
        Err(error) => {
          tracing::warn!(
            "Model detection failed, set the model in the config: {}",
            error
          );
          None
        }
      };

    let plan = modbus::Plan::new(
      &catalog,
      &modbus::Filter {
        level,
        model: model.clone(),
        smart_meter,
      },
    );
    tracing::info!(
      "Planned {} registers in {} ranges",
      plan.registers().len(),
      plan.ranges().len()
    );

    let keep_session = kind.keeps_session();
    if !keep_session {
      connection.close().await;
    }

    let device = sink::Inverter {
      host,
      model: model.clone(),
    };
    let sinks = sink::load(&values.exports, &device);

    let scraper = inverter::Scraper::new(
      connection,
      plan,
      model,
      inverter::Settings {
        level,
        use_local_time,
        settle_delay,
        keep_session,
      },
    );

    Ok(Self {
      scraper: Arc::new(Mutex::new(scraper)),
      sinks: sinks.into(),
      inverter: device,
    })
  }

  pub(crate) fn scraper(&self) -> Arc<Mutex<Scraper>> {
    self.scraper.clone()
  }

  pub(crate) fn sinks(&self) -> &[Box<dyn sink::Sink>] {
    &self.sinks
  }

  pub(crate) fn inverter(&self) -> &sink::Inverter {
    &self.inverter
  }
}
