use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::service::modbus::{self, Bank, Catalog, LEVEL_ALL};

use super::file::{self, ParseError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DataRange {
  pub(crate) response: u16,
  pub(crate) value: modbus::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Register {
  pub(crate) name: String,
  pub(crate) address: u16,
  pub(crate) datatype: modbus::RegisterKind,
  pub(crate) level: Option<u8>,
  pub(crate) accuracy: Option<Decimal>,
  pub(crate) mask: Option<u16>,
  pub(crate) unit: Option<String>,
  #[serde(default)]
  pub(crate) datarange: Vec<DataRange>,
  pub(crate) models: Option<Vec<String>>,
  #[serde(default)]
  pub(crate) smart_meter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Scan {
  pub(crate) start: u16,
  pub(crate) range: u16,
}

/// `{read: [...]}` and `{hold: [...]}` groups of the document.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
  deserialize = "T: Deserialize<'de>",
  serialize = "T: Serialize"
))]
pub(crate) struct Banked<T> {
  #[serde(default)]
  pub(crate) read: Vec<T>,
  #[serde(default)]
  pub(crate) hold: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Document {
  pub(crate) version: Option<String>,
  #[serde(default)]
  pub(crate) registers: Vec<Banked<Register>>,
  #[serde(default)]
  pub(crate) scan: Vec<Banked<Scan>>,
}

pub(crate) async fn parse_async(
  location: &std::path::Path,
) -> Result<Catalog, ParseError> {
  let raw = tokio::fs::read_to_string(location).await?;
  let document = file::parse_by_extension::<Document>(location, raw.as_str())?;
  let catalog = to_catalog(document);

  tracing::info!(
    "Loaded {} registers from {} version {}",
    catalog.registers().len(),
    location.display(),
    catalog.version().unwrap_or("UNKNOWN")
  );

  Ok(catalog)
}

pub(crate) fn to_catalog(document: Document) -> Catalog {
  let registers = flatten(document.registers)
    .map(|(bank, register)| to_register_definition(bank, register))
    .collect();
  let ranges = flatten(document.scan)
    .map(|(bank, scan)| modbus::ScanRange {
      bank,
      start: scan.start,
      length: scan.range,
    })
    .collect();

  Catalog::new(document.version, registers, ranges)
}

fn flatten<T>(groups: Vec<Banked<T>>) -> impl Iterator<Item = (Bank, T)> {
  groups.into_iter().flat_map(|group| {
    group
      .read
      .into_iter()
      .map(|item| (Bank::Input, item))
      .chain(group.hold.into_iter().map(|item| (Bank::Holding, item)))
  })
}

fn to_register_definition(
  bank: Bank,
  register: Register,
) -> modbus::RegisterDefinition {
  modbus::RegisterDefinition {
    name: register.name,
    bank,
    address: register.address,
    kind: register.datatype,
    mask: register.mask,
    accuracy: register.accuracy,
    table: register
      .datarange
      .into_iter()
      .map(|entry| modbus::TableEntry {
        response: entry.response,
        value: entry.value,
      })
      .collect(),
    unit: register.unit,
    level: register.level.unwrap_or(LEVEL_ALL),
    models: register.models,
    smart_meter: register.smart_meter,
  }
}
