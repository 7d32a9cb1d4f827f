use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::service::modbus::{Decoded, Value};

/// Latest known value of every register and derived metric.
///
/// Lives for the whole process and is only ever updated in place, so a
/// register that failed to read keeps the value from an earlier scrape.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Snapshot {
  values: BTreeMap<String, Value>,
}

impl Snapshot {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn get(&self, name: &str) -> Option<&Value> {
    self.values.get(name)
  }

  pub(crate) fn number(&self, name: &str) -> Option<Decimal> {
    self.get(name).and_then(Value::as_number)
  }

  pub(crate) fn text(&self, name: &str) -> Option<&str> {
    self.get(name).and_then(Value::as_text)
  }

  pub(crate) fn is_truthy(&self, name: &str) -> bool {
    self.get(name).is_some_and(Value::is_truthy)
  }

  #[cfg(test)]
  pub(crate) fn contains(&self, name: &str) -> bool {
    self.values.contains_key(name)
  }

  pub(crate) fn set(&mut self, name: &str, value: impl Into<Value>) {
    self.values.insert(name.to_owned(), value.into());
  }

  pub(crate) fn remove(&mut self, name: &str) -> Option<Value> {
    self.values.remove(name)
  }

  /// Overwrites every decoded value and leaves the rest untouched.
  pub(crate) fn merge(&mut self, decoded: Decoded) {
    self.values.extend(decoded);
  }

  pub(crate) fn len(&self) -> usize {
    self.values.len()
  }

  #[cfg(test)]
  pub(crate) fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.values.iter().map(|(name, value)| (name.as_str(), value))
  }

  pub(crate) fn to_json(&self) -> serde_json::Value {
    serde_json::Value::Object(
      self
        .values
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect(),
    )
  }
}
