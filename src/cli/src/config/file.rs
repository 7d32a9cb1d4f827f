use serde::{Deserialize, Serialize};

use crate::service::modbus::ConnectionKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) enum LogLevel {
  #[serde(alias = "trace", alias = "TRACE")]
  Trace,
  #[serde(alias = "debug", alias = "DEBUG")]
  Debug,
  #[serde(alias = "info", alias = "INFO")]
  Info,
  #[serde(alias = "warn", alias = "WARN", alias = "WARNING")]
  Warn,
  #[serde(alias = "error", alias = "ERROR")]
  Error,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Inverter {
  pub(crate) host: Option<String>,
  pub(crate) port: Option<u16>,
  pub(crate) timeout: Option<u32>,
  pub(crate) retries: Option<u32>,
  pub(crate) slave: Option<u8>,
  pub(crate) scan_interval: Option<u32>,
  pub(crate) settle_delay: Option<u32>,
  pub(crate) connection: Option<ConnectionKind>,
  pub(crate) model: Option<String>,
  pub(crate) smart_meter: Option<bool>,
  pub(crate) use_local_time: Option<bool>,
  pub(crate) log_console: Option<LogLevel>,
  pub(crate) level: Option<u8>,
  pub(crate) registers: Option<String>,
}

/// One sink entry, everything besides the name and flag goes to the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Export {
  pub(crate) name: String,
  #[serde(default)]
  pub(crate) enabled: bool,
  #[serde(flatten)]
  pub(crate) settings: serde_json::Map<String, serde_json::Value>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Values {
  #[serde(default)]
  pub(crate) inverter: Inverter,
  #[serde(default)]
  pub(crate) exports: Vec<Export>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseError {
  #[error("Failed creating project directories")]
  MissingProjectDirs,

  #[error("Failed reading file")]
  Read(#[from] std::io::Error),

  #[error("File is missing an extension")]
  MissingExtension,

  #[error("File has invalid extension")]
  InvalidExtension,

  #[error("Failed deserializing from yaml")]
  DeserializationYaml(#[from] serde_yaml::Error),

  #[error("Failed deserializing from toml")]
  DeserializationToml(#[from] toml::de::Error),

  #[error("Failed deserializing from json")]
  DeserializationJson(#[from] serde_json::Error),
}

pub(crate) fn project_dirs() -> Result<directories::ProjectDirs, ParseError> {
  directories::ProjectDirs::from("app", "sunpoll", "sunpoll")
    .ok_or(ParseError::MissingProjectDirs)
}

pub(crate) async fn parse_async(
  location: Option<&str>,
) -> Result<Values, ParseError> {
  let location = match location {
    Some(location) => std::path::PathBuf::from(location),
    None => project_dirs()?.config_dir().join("config.yaml"),
  };

  let raw = tokio::fs::read_to_string(&location).await?;
  tracing::info!("Loaded config {}", location.display());

  parse_by_extension(&location, raw.as_str())
}

/// Deserializes `raw` according to the extension of `location`.
pub(crate) fn parse_by_extension<T: serde::de::DeserializeOwned>(
  location: &std::path::Path,
  raw: &str,
) -> Result<T, ParseError> {
  let values = match location.extension().and_then(|str| str.to_str()) {
    None => return Err(ParseError::MissingExtension),
    Some("yaml" | "yml") => serde_yaml::from_str::<T>(raw)?,
    Some("toml") => toml::from_str::<T>(raw)?,
    Some("json") => serde_json::from_str::<T>(raw)?,
    Some(_) => return Err(ParseError::InvalidExtension),
  };

  Ok(values)
}

pub(crate) fn seconds_to_chrono(seconds: u32) -> chrono::Duration {
  chrono::Duration::seconds(seconds as i64)
}
