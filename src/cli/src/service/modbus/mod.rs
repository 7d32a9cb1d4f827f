pub(crate) mod catalog;
pub(crate) mod connection;
pub(crate) mod encoding;
pub(crate) mod range;
pub(crate) mod register;
pub(crate) mod span;

pub(crate) use catalog::*;
pub(crate) use connection::*;
pub(crate) use range::{DecodeError, Decoded, ScanRange};
pub(crate) use register::*;
