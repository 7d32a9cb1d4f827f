#[derive(Debug, Clone, Default)]
pub(crate) struct Values {
  pub(crate) host: Option<String>,
  pub(crate) port: Option<u16>,
  pub(crate) model: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseError {
  #[error("Failed parsing SUNPOLL_PORT")]
  Port(#[from] std::num::ParseIntError),
}

pub(crate) fn parse() -> Result<Values, ParseError> {
  let _ = dotenv::dotenv();

  let values = Values {
    host: std::env::var("SUNPOLL_HOST").ok(),
    port: std::env::var("SUNPOLL_PORT")
      .ok()
      .map(|port| port.parse::<u16>())
      .transpose()?,
    model: std::env::var("SUNPOLL_MODEL").ok(),
  };

  Ok(values)
}
