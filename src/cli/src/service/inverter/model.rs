use crate::service::modbus::*;

lazy_static::lazy_static! {
  static ref MODEL_PUNCTUATION_REGEX: regex::Regex =
    regex::Regex::new(r"[.\-]").unwrap();
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProbeError {
  #[error("Register catalog has no {0:?} register")]
  MissingRegister(&'static str),

  #[error("Failed reading the model register")]
  Read(#[from] ReadError),

  #[error("Failed decoding the model register")]
  Decode(#[from] DecodeError),

  #[error("Unknown type code {0}")]
  UnknownCode(Value),
}

/// Inverter model used for register filtering.
///
/// A declared model wins without touching the transport. Otherwise the
/// model register is read once and its value table names the model.
#[tracing::instrument(skip(catalog, transport))]
pub(crate) async fn resolve<T: Transport + ?Sized>(
  declared: Option<&str>,
  catalog: &Catalog,
  transport: &mut T,
) -> Result<String, ProbeError> {
  if let Some(declared) = declared {
    tracing::info!("Bypassing model detection, using {}", declared);
    return Ok(declared.to_owned());
  }

  let register = catalog
    .find(MODEL_REGISTER)
    .ok_or(ProbeError::MissingRegister(MODEL_REGISTER))?;
  let range = probe_range(register);
  let words = transport.read_range(range.bank, range.span()).await?;
  let decoded = range::decode(&range, &words, std::slice::from_ref(register))?;

  match decoded.get(MODEL_REGISTER) {
    Some(Value::Text(model)) => {
      tracing::info!("Detected model {}", model);
      Ok(model.clone())
    }
    Some(code) => Err(ProbeError::UnknownCode(code.clone())),
    None => Err(ProbeError::MissingRegister(MODEL_REGISTER)),
  }
}

/// Model name without dots and dashes, `SG7.0RT` becomes `SG70RT`.
pub(crate) fn clean_model(model: &str) -> String {
  MODEL_PUNCTUATION_REGEX.replace_all(model, "").into_owned()
}
