#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub(crate) enum Verbosity {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
}

#[derive(Debug, Clone, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Values {
  /// Alternative configuration location
  #[arg(short, long)]
  pub(crate) config: Option<String>,

  /// Alternative register catalog location
  #[arg(short, long)]
  pub(crate) registers: Option<String>,

  /// Log level, overrides the configured one
  #[arg(short, long, value_enum)]
  pub(crate) verbosity: Option<Verbosity>,

  /// Scrape once and exit
  #[arg(long)]
  pub(crate) runonce: bool,
}

pub(crate) fn parse() -> Values {
  clap::Parser::parse()
}
