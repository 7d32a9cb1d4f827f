#![deny(
  unsafe_code,
  // reason = "Let's just not do it"
)]
#![deny(
  clippy::unwrap_used,
  clippy::expect_used,
  clippy::panic,
  clippy::unreachable,
  // reason = "We have to handle errors properly"
)]

mod config;
mod process;
mod service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config = config::Manager::new().await?;

  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.log_level().into())
        .from_env_lossy(),
    )
    .init();

  let values = config.values()?;
  tracing::info!(
    "Starting {} {} with registers {}",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_VERSION"),
    values.registers.display()
  );

  let catalog = config.catalog().await?;
  let services = service::Container::start(&values, catalog).await?;
  let processes = process::Container::new(values.clone(), services);

  if values.runonce {
    return processes.run_once().await;
  }

  processes.spawn().await;
  tokio::signal::ctrl_c().await?;
  processes.cancel().await;

  Ok(())
}
