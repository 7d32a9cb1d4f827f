use futures_time::future::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_modbus::{client::Context, prelude::Reader, Slave};

use super::register::Bank;
use super::span::SimpleSpan;

pub(crate) type Response = Vec<u16>;

/// How the inverter is reached.
///
/// Only plain Modbus TCP is spoken here. The vendor transports are accepted
/// in configuration so a config written for them fails with a clear error.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ConnectionKind {
  #[default]
  Modbus,
  Sungrow,
  Http,
}

impl ConnectionKind {
  /// Whether the session has to stay open between scrapes.
  pub(crate) fn keeps_session(self) -> bool {
    matches!(self, ConnectionKind::Http)
  }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectError {
  #[error("Failed to connect")]
  Connect(#[from] std::io::Error),

  #[error("Failed resolving {0:?}")]
  Unresolved(String),

  #[error("Wrong slave number {0}")]
  Slave(u8),

  #[error("Connection kind {0:?} is not supported")]
  Unsupported(ConnectionKind),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ReadError {
  #[error("Not connected")]
  Disconnected,

  #[error("Failed reading")]
  Connection(std::io::Error),

  #[error("Read timed out")]
  Timeout(std::io::Error),
}

/// Bulk register access to one inverter.
///
/// Retries and timeouts live behind this trait - callers see one result per
/// requested block.
#[async_trait::async_trait]
pub(crate) trait Transport: Send {
  async fn connect(&mut self) -> Result<(), ConnectError>;

  fn is_live(&self) -> bool;

  async fn read_range(
    &mut self,
    bank: Bank,
    span: SimpleSpan,
  ) -> Result<Response, ReadError>;

  async fn close(&mut self);
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub(crate) struct Destination {
  pub(crate) host: String,
  pub(crate) port: u16,
  pub(crate) slave: u8,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct Params {
  timeout: futures_time::time::Duration,
  retries: u32,
}

impl Params {
  pub(crate) fn new(timeout: chrono::Duration, retries: u32) -> Self {
    Self {
      timeout: timeout_from_chrono(timeout),
      retries,
    }
  }
}

#[derive(Debug)]
pub(crate) struct Connection {
  destination: Destination,
  params: Params,
  ctx: Option<Context>,
}

impl Connection {
  pub(crate) fn new(
    kind: ConnectionKind,
    destination: Destination,
    params: Params,
  ) -> Result<Self, ConnectError> {
    if kind != ConnectionKind::Modbus {
      return Err(ConnectError::Unsupported(kind));
    }

    Ok(Self {
      destination,
      params,
      ctx: None,
    })
  }

  async fn read_once(
    &mut self,
    bank: Bank,
    span: SimpleSpan,
  ) -> Result<Response, ReadError> {
    let timeout = self.params.timeout;
    let ctx = self.ctx.as_mut().ok_or(ReadError::Disconnected)?;
    let response = match bank {
      Bank::Input => {
        ctx
          .read_input_registers(span.address, span.quantity)
          .timeout(timeout)
          .await
      }
      Bank::Holding => {
        ctx
          .read_holding_registers(span.address, span.quantity)
          .timeout(timeout)
          .await
      }
    };

    match response {
      Ok(Ok(response)) => Ok(response),
      Ok(Err(connection_error)) => Err(ReadError::Connection(connection_error)),
      Err(timeout_error) => Err(ReadError::Timeout(timeout_error)),
    }
  }
}

#[async_trait::async_trait]
impl Transport for Connection {
  #[tracing::instrument(skip(self), fields(host = %self.destination.host))]
  async fn connect(&mut self) -> Result<(), ConnectError> {
    let Destination { host, port, slave } = self.destination.clone();
    let socket = tokio::net::lookup_host((host.as_str(), port))
      .await?
      .next()
      .ok_or_else(|| ConnectError::Unresolved(host.clone()))?;

    if Slave(slave) < Slave::min_device() || Slave(slave) > Slave::max_device()
    {
      return Err(ConnectError::Slave(slave));
    }

    let stream = tokio::net::TcpStream::connect(socket)
      .timeout(self.params.timeout)
      .await??;
    let ctx = tokio_modbus::prelude::tcp::attach_slave(stream, Slave(slave));
    self.ctx = Some(ctx);

    tracing::info!("Connected to {}:{} as slave {}", host, port, slave);

    Ok(())
  }

  fn is_live(&self) -> bool {
    self.ctx.is_some()
  }

  async fn read_range(
    &mut self,
    bank: Bank,
    span: SimpleSpan,
  ) -> Result<Response, ReadError> {
    let attempts = self.params.retries.max(1);
    let mut attempt = 0;
    loop {
      attempt += 1;
      tracing::trace!(
        "Reading {}, {}:{} attempt {}",
        bank,
        span.address,
        span.quantity,
        attempt
      );

      match self.read_once(bank, span).await {
        Ok(response) => return Ok(response),
        Err(ReadError::Disconnected) => return Err(ReadError::Disconnected),
        Err(error) if attempt < attempts => {
          tracing::debug!(
            "Retrying {}, {}:{} after {}",
            bank,
            span.address,
            span.quantity,
            error
          );
        }
        Err(error) => return Err(error),
      }
    }
  }

  async fn close(&mut self) {
    if self.ctx.take().is_some() {
      tracing::info!(
        "Closing session to {}:{}",
        self.destination.host,
        self.destination.port
      );
    }
  }
}

fn timeout_from_chrono(
  timeout: chrono::Duration,
) -> futures_time::time::Duration {
  futures_time::time::Duration::from_millis(timeout.num_milliseconds() as u64)
}

#[cfg(test)]
pub(crate) mod testing {
  use std::collections::{HashMap, HashSet};

  use tokio_modbus::Address;

  use super::*;

  /// In-memory inverter answering from fixed word blocks.
  #[derive(Debug, Default)]
  pub(crate) struct ScriptedTransport {
    pub(crate) blocks: HashMap<(Bank, Address), Response>,
    pub(crate) failing: HashSet<(Bank, Address)>,
    pub(crate) refuse_connect: bool,
    pub(crate) live: bool,
    pub(crate) connects: usize,
    pub(crate) closes: usize,
    pub(crate) reads: Vec<(Bank, SimpleSpan)>,
  }

  impl ScriptedTransport {
    pub(crate) fn with_block(
      mut self,
      bank: Bank,
      start: Address,
      words: &[u16],
    ) -> Self {
      self.blocks.insert((bank, start), words.to_vec());
      self
    }
  }

  #[async_trait::async_trait]
  impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), ConnectError> {
      self.connects += 1;
      if self.refuse_connect {
        return Err(ConnectError::Connect(std::io::Error::new(
          std::io::ErrorKind::ConnectionRefused,
          "scripted refusal",
        )));
      }
      self.live = true;
      Ok(())
    }

    fn is_live(&self) -> bool {
      self.live
    }

    async fn read_range(
      &mut self,
      bank: Bank,
      span: SimpleSpan,
    ) -> Result<Response, ReadError> {
      self.reads.push((bank, span));
      if !self.live {
        return Err(ReadError::Disconnected);
      }
      if self.failing.contains(&(bank, span.address)) {
        return Err(ReadError::Connection(std::io::Error::new(
          std::io::ErrorKind::BrokenPipe,
          "scripted failure",
        )));
      }
      self
        .blocks
        .get(&(bank, span.address))
        .cloned()
        .ok_or(ReadError::Disconnected)
    }

    async fn close(&mut self) {
      self.closes += 1;
      self.live = false;
    }
  }
}
