use std::fmt::Display;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use tokio_modbus::{Address, Quantity};

use super::encoding::*;
use super::span::Span;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum Bank {
  Input,
  Holding,
}

impl Bank {
  pub(crate) const ALL: [Bank; 2] = [Bank::Input, Bank::Holding];
}

impl Display for Bank {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Bank::Input => f.write_str("read"),
      Bank::Holding => f.write_str("hold"),
    }
  }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) enum RegisterKind {
  U16,
  S16,
  U32,
  S32,
}

impl RegisterKind {
  pub(crate) fn quantity(self) -> Quantity {
    match self {
      RegisterKind::U16 | RegisterKind::S16 => 1,
      RegisterKind::U32 | RegisterKind::S32 => 2,
    }
  }
}

/// A decoded register or derived metric.
///
/// Numbers keep exact decimal scaling so `1234 * 0.1` stays `123.4`.
/// Text comes from value tables (`"Run"`, `"Start"`, model names).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Value {
  Text(String),
  Number(Decimal),
}

impl Value {
  pub(crate) fn as_number(&self) -> Option<Decimal> {
    match self {
      Value::Number(number) => Some(*number),
      Value::Text(_) => None,
    }
  }

  pub(crate) fn as_text(&self) -> Option<&str> {
    match self {
      Value::Number(_) => None,
      Value::Text(text) => Some(text.as_str()),
    }
  }

  pub(crate) fn is_truthy(&self) -> bool {
    match self {
      Value::Number(number) => !number.is_zero(),
      Value::Text(text) => !text.is_empty(),
    }
  }

  pub(crate) fn to_json(&self) -> serde_json::Value {
    match self {
      Value::Text(text) => serde_json::Value::String(text.clone()),
      Value::Number(number) => {
        let number = number.normalize();
        if number.scale() == 0 {
          if let Some(integer) = number.to_i64() {
            return serde_json::Value::from(integer);
          }
        }
        number
          .to_f64()
          .and_then(serde_json::Number::from_f64)
          .map_or(serde_json::Value::Null, serde_json::Value::Number)
      }
    }
  }
}

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.to_json().serialize(serializer)
  }
}

impl Display for Value {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Value::Number(number) => Display::fmt(&number.normalize(), f),
      Value::Text(text) => f.write_str(text),
    }
  }
}

impl From<Decimal> for Value {
  fn from(value: Decimal) -> Self {
    Value::Number(value)
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Number(Decimal::from(value))
  }
}

impl From<i32> for Value {
  fn from(value: i32) -> Self {
    Value::Number(Decimal::from(value))
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::Text(value.to_owned())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::Text(value)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableEntry {
  pub(crate) response: u16,
  pub(crate) value: Value,
}

#[derive(Debug, Clone)]
pub(crate) struct RegisterDefinition {
  pub(crate) name: String,
  pub(crate) bank: Bank,
  pub(crate) address: Address,
  pub(crate) kind: RegisterKind,
  pub(crate) mask: Option<u16>,
  pub(crate) accuracy: Option<Decimal>,
  pub(crate) table: Vec<TableEntry>,
  pub(crate) unit: Option<String>,
  pub(crate) level: u8,
  pub(crate) models: Option<Vec<String>>,
  pub(crate) smart_meter: bool,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RegisterDecodeError {
  #[error(
    "Register {name:?} needs {needed} words but only {available} are left"
  )]
  Truncated {
    name: String,
    needed: usize,
    available: usize,
  },

  #[error("Scaling register {0:?} overflowed")]
  Overflow(String),
}

impl RegisterDefinition {
  /// Decodes the register from the words starting at its own address.
  pub(crate) fn decode(
    &self,
    words: &[u16],
  ) -> Result<Value, RegisterDecodeError> {
    let needed = self.kind.quantity() as usize;
    if words.len() < needed {
      return Err(RegisterDecodeError::Truncated {
        name: self.name.clone(),
        needed,
        available: words.len(),
      });
    }

    let raw = words[0];
    let numeric = match self.kind {
      RegisterKind::U16 => decode_u16(raw, self.mask),
      RegisterKind::S16 => decode_s16(raw),
      RegisterKind::U32 => decode_u32(raw, words[1]),
      RegisterKind::S32 => decode_s32(raw, words[1]),
    };

    let value = match self.table.iter().find(|entry| entry.response == raw) {
      Some(entry) => entry.value.clone(),
      None => Value::from(numeric),
    };

    match (value, self.accuracy) {
      (Value::Number(number), Some(accuracy)) => number
        .checked_mul(accuracy)
        .map(|scaled| Value::Number(scaled.round_dp(2)))
        .ok_or_else(|| RegisterDecodeError::Overflow(self.name.clone())),
      (value, _) => Ok(value),
    }
  }
}

impl Span for RegisterDefinition {
  fn address(&self) -> Address {
    self.address
  }

  fn quantity(&self) -> Quantity {
    self.kind.quantity()
  }
}

#[cfg(test)]
impl RegisterDefinition {
  pub(crate) fn new(
    name: &str,
    bank: Bank,
    address: Address,
    kind: RegisterKind,
  ) -> Self {
    Self {
      name: name.to_owned(),
      bank,
      address,
      kind,
      mask: None,
      accuracy: None,
      table: Vec::new(),
      unit: None,
      level: 0,
      models: None,
      smart_meter: false,
    }
  }

  pub(crate) fn with_accuracy(mut self, accuracy: Decimal) -> Self {
    self.accuracy = Some(accuracy);
    self
  }

  pub(crate) fn with_mask(mut self, mask: u16) -> Self {
    self.mask = Some(mask);
    self
  }

  pub(crate) fn with_table(mut self, table: &[(u16, Value)]) -> Self {
    self.table = table
      .iter()
      .map(|(response, value)| TableEntry {
        response: *response,
        value: value.clone(),
      })
      .collect();
    self
  }

  pub(crate) fn with_level(mut self, level: u8) -> Self {
    self.level = level;
    self
  }

  pub(crate) fn with_models(mut self, models: &[&str]) -> Self {
    self.models =
      Some(models.iter().map(|model| (*model).to_owned()).collect());
    self
  }

  pub(crate) fn with_smart_meter(mut self) -> Self {
    self.smart_meter = true;
    self
  }

  pub(crate) fn with_unit(mut self, unit: &str) -> Self {
    self.unit = Some(unit.to_owned());
    self
  }
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;

  #[test]
  fn accuracy_rounds_to_two_decimals() {
    let register =
      RegisterDefinition::new("v", Bank::Input, 1, RegisterKind::U16)
        .with_accuracy(dec!(0.1));

    let value = register.decode(&[1234]).unwrap();

    assert_eq!(value, Value::Number(dec!(123.4)));
    assert_eq!(value.to_string(), "123.4");
    assert_eq!(value.to_json(), serde_json::json!(123.4));
  }

  #[test]
  fn accuracy_applies_after_sign_conversion() {
    let register =
      RegisterDefinition::new("t", Bank::Input, 1, RegisterKind::S16)
        .with_accuracy(dec!(0.1));

    assert_eq!(register.decode(&[0xFFF6]).unwrap(), Value::from(dec!(-1.0)));
  }

  #[test]
  fn value_table_overrides_sentinel() {
    let register =
      RegisterDefinition::new("state", Bank::Input, 1, RegisterKind::U16)
        .with_table(&[
          (0xFFFF, Value::from("Unknown")),
          (0, Value::from("Run")),
        ]);

    assert_eq!(register.decode(&[0xFFFF]).unwrap(), Value::from("Unknown"));
    assert_eq!(register.decode(&[0]).unwrap(), Value::from("Run"));
    assert_eq!(register.decode(&[7]).unwrap(), Value::from(7));
  }

  #[test]
  fn value_table_matches_low_word_of_wide_registers() {
    let register =
      RegisterDefinition::new("code", Bank::Input, 1, RegisterKind::U32)
        .with_table(&[(5, Value::from("Five"))]);

    assert_eq!(register.decode(&[5, 1]).unwrap(), Value::from("Five"));
    assert_eq!(register.decode(&[6, 1]).unwrap(), Value::from(65542));
  }

  #[test]
  fn numeric_table_values_are_scaled() {
    let register =
      RegisterDefinition::new("n", Bank::Input, 1, RegisterKind::U16)
        .with_table(&[(3, Value::from(30))])
        .with_accuracy(dec!(0.5));

    assert_eq!(register.decode(&[3]).unwrap(), Value::from(dec!(15.0)));
  }

  #[test]
  fn wide_register_without_high_word_is_truncated() {
    let register =
      RegisterDefinition::new("e", Bank::Input, 1, RegisterKind::S32);

    assert!(matches!(
      register.decode(&[1]),
      Err(RegisterDecodeError::Truncated { needed: 2, available: 1, .. })
    ));
  }

  #[test]
  fn integral_numbers_serialize_as_integers() {
    assert_eq!(Value::from(dec!(100.00)).to_json(), serde_json::json!(100));
    assert_eq!(Value::from(-5).to_json(), serde_json::json!(-5));
    assert_eq!(Value::from("Stop").to_json(), serde_json::json!("Stop"));
  }

  #[test]
  fn truthiness_follows_zero_and_empty() {
    assert!(!Value::from(0).is_truthy());
    assert!(Value::from(dec!(0.01)).is_truthy());
    assert!(!Value::from("").is_truthy());
    assert!(Value::from("Start").is_truthy());
  }
}
