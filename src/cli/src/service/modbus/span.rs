use tokio_modbus::{Address, Quantity};

pub(crate) trait Span {
  fn address(&self) -> Address;

  fn quantity(&self) -> Quantity;

  /// `address + quantity` - scan ranges match registers up to and including it.
  fn end(&self) -> u32 {
    u32::from(self.address()) + u32::from(self.quantity())
  }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub(crate) struct SimpleSpan {
  pub(crate) address: Address,
  pub(crate) quantity: Quantity,
}

impl Span for SimpleSpan {
  fn address(&self) -> Address {
    self.address
  }

  fn quantity(&self) -> Quantity {
    self.quantity
  }
}
