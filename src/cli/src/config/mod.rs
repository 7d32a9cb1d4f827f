mod args;
mod env;
mod file;
mod registers;

use std::path::PathBuf;

use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::service::modbus::{Catalog, ConnectionKind, LEVEL_ALL};

pub(crate) const DEFAULT_REGISTERS: &str = "registers-sungrow.yaml";

#[derive(Debug, Clone)]
pub(crate) struct Inverter {
  pub(crate) host: String,
  pub(crate) port: u16,
  pub(crate) timeout: chrono::Duration,
  pub(crate) retries: u32,
  pub(crate) slave: u8,
  pub(crate) scan_interval: chrono::Duration,
  pub(crate) settle_delay: chrono::Duration,
  pub(crate) connection: ConnectionKind,
  pub(crate) model: Option<String>,
  pub(crate) smart_meter: bool,
  pub(crate) use_local_time: bool,
  pub(crate) level: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct Export {
  pub(crate) name: String,
  pub(crate) enabled: bool,
  pub(crate) settings: serde_json::Value,
}

#[derive(Debug, Clone)]
pub(crate) struct Values {
  pub(crate) inverter: Inverter,
  pub(crate) exports: Vec<Export>,
  pub(crate) registers: PathBuf,
  pub(crate) runonce: bool,
}

#[derive(Debug, Clone)]
struct Unparsed {
  from_args: args::Values,
  from_env: env::Values,
  from_file: file::Values,
}

#[derive(Debug, Clone)]
pub(crate) struct Manager {
  config: Unparsed,
}

#[derive(Debug, Error)]
pub(crate) enum ReadError {
  #[error("Failed reading file")]
  FileReadError(#[from] file::ParseError),

  #[error("Failed reading env")]
  EnvReadError(#[from] env::ParseError),
}

#[derive(Debug, Error)]
pub(crate) enum ValidationError {
  #[error("Inverter host is required")]
  MissingHost,

  #[error("Level {0} is not one of 0, 1, 2 or 3")]
  InvalidLevel(u8),
}

impl Manager {
  pub(crate) async fn new() -> Result<Self, ReadError> {
    let config = Self::read_async().await?;

    Ok(Self { config })
  }

  pub(crate) fn values(&self) -> Result<Values, ValidationError> {
    Self::parse(self.config.clone())
  }

  /// Log level available before the rest of the configuration is validated.
  pub(crate) fn log_level(&self) -> LevelFilter {
    Self::parse_log_level(&self.config)
  }

  pub(crate) async fn catalog(&self) -> Result<Catalog, file::ParseError> {
    registers::parse_async(&self.registers()).await
  }

  fn registers(&self) -> PathBuf {
    Self::parse_registers(&self.config)
  }

  fn parse(config: Unparsed) -> Result<Values, ValidationError> {
    let registers = Self::parse_registers(&config);
    let Unparsed {
      from_args,
      from_env,
      from_file,
    } = config;
    let inverter = from_file.inverter;

    let host = from_env
      .host
      .or(inverter.host)
      .filter(|host| !host.is_empty())
      .ok_or(ValidationError::MissingHost)?;

    let level = inverter.level.unwrap_or(1);
    if level > LEVEL_ALL {
      return Err(ValidationError::InvalidLevel(level));
    }

    Ok(Values {
      inverter: Inverter {
        host,
        port: from_env.port.or(inverter.port).unwrap_or(502),
        timeout: file::seconds_to_chrono(inverter.timeout.unwrap_or(10)),
        retries: inverter.retries.unwrap_or(3),
        slave: inverter.slave.unwrap_or(0x01),
        scan_interval: file::seconds_to_chrono(
          inverter.scan_interval.unwrap_or(30),
        ),
        settle_delay: file::seconds_to_chrono(
          inverter.settle_delay.unwrap_or(3),
        ),
        connection: inverter.connection.unwrap_or_default(),
        model: from_env.model.or(inverter.model),
        smart_meter: inverter.smart_meter.unwrap_or(false),
        use_local_time: inverter.use_local_time.unwrap_or(false),
        level,
      },
      exports: from_file
        .exports
        .into_iter()
        .map(|export| Export {
          name: export.name,
          enabled: export.enabled,
          settings: serde_json::Value::Object(export.settings),
        })
        .collect(),
      registers,
      runonce: from_args.runonce,
    })
  }

  fn parse_log_level(config: &Unparsed) -> LevelFilter {
    match config.from_args.verbosity {
      Some(args::Verbosity::Trace) => LevelFilter::TRACE,
      Some(args::Verbosity::Debug) => LevelFilter::DEBUG,
      Some(args::Verbosity::Info) => LevelFilter::INFO,
      Some(args::Verbosity::Warn) => LevelFilter::WARN,
      Some(args::Verbosity::Error) => LevelFilter::ERROR,
      None => config.from_file.inverter.log_console.map_or_else(
        || {
          #[cfg(debug_assertions)]
          {
            LevelFilter::DEBUG
          }
          #[cfg(not(debug_assertions))]
          {
            LevelFilter::INFO
          }
        },
        |log_level| match log_level {
          file::LogLevel::Trace => LevelFilter::TRACE,
          file::LogLevel::Debug => LevelFilter::DEBUG,
          file::LogLevel::Info => LevelFilter::INFO,
          file::LogLevel::Warn => LevelFilter::WARN,
          file::LogLevel::Error => LevelFilter::ERROR,
        },
      ),
    }
  }

  fn parse_registers(config: &Unparsed) -> PathBuf {
    config
      .from_args
      .registers
      .as_deref()
      .or(config.from_file.inverter.registers.as_deref())
      .map_or_else(|| PathBuf::from(DEFAULT_REGISTERS), PathBuf::from)
  }

  async fn read_async() -> Result<Unparsed, ReadError> {
    let from_args = args::parse();
    let from_env = env::parse()?;
    let from_file = file::parse_async(from_args.config.as_deref()).await?;

    Ok(Unparsed {
      from_args,
      from_env,
      from_file,
    })
  }
}
