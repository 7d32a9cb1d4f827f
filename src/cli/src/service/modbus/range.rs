use std::collections::BTreeMap;
use std::fmt::Display;

use tokio_modbus::{Address, Quantity};

use super::register::*;
use super::span::*;

pub(crate) type Decoded = BTreeMap<String, Value>;

/// A block of words the inverter is known to answer in a single request.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub(crate) struct ScanRange {
  pub(crate) bank: Bank,
  pub(crate) start: Address,
  pub(crate) length: Quantity,
}

impl ScanRange {
  pub(crate) fn covers(&self, register: &RegisterDefinition) -> bool {
    register.bank == self.bank
      && register.address >= self.start
      && u32::from(register.address) <= self.end()
  }

  pub(crate) fn span(&self) -> SimpleSpan {
    SimpleSpan {
      address: self.start,
      quantity: self.length,
    }
  }
}

impl Span for ScanRange {
  fn address(&self) -> Address {
    self.start
  }

  fn quantity(&self) -> Quantity {
    self.length
  }
}

impl Display for ScanRange {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}, {}:{}", self.bank, self.start, self.length)
  }
}

/// Picks the known ranges that contain at least one of `registers`.
///
/// Ranges are never merged or split. Input ranges come first, then holding
/// ranges, each in catalog order.
pub(crate) fn plan(
  registers: &[RegisterDefinition],
  ranges: &[ScanRange],
) -> Vec<ScanRange> {
  Bank::ALL
    .iter()
    .flat_map(|bank| ranges.iter().filter(move |range| range.bank == *bank))
    .filter(|range| registers.iter().any(|register| range.covers(register)))
    .copied()
    .collect()
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum DecodeError {
  #[error("Mismatched number of registers read {got} != {expected}")]
  Mismatch { got: usize, expected: usize },
}

/// Decodes every register of `registers` whose address falls in the block.
///
/// Word `i` of the block holds address `range.start + i + 1`.
pub(crate) fn decode(
  range: &ScanRange,
  words: &[u16],
  registers: &[RegisterDefinition],
) -> Result<Decoded, DecodeError> {
  if words.len() != range.length as usize {
    return Err(DecodeError::Mismatch {
      got: words.len(),
      expected: range.length as usize,
    });
  }

  let mut decoded = Decoded::new();
  for index in 0..words.len() {
    let address = u32::from(range.start) + index as u32 + 1;
    for register in registers.iter().filter(|register| {
      register.bank == range.bank && u32::from(register.address) == address
    }) {
      match register.decode(&words[index..]) {
        Ok(value) => {
          decoded.insert(register.name.clone(), value);
        }
        Err(error) => {
          tracing::warn!("Skipping register in {}: {}", range, error);
        }
      }
    }
  }

  Ok(decoded)
}
