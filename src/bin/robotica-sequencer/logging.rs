use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::{filter::ParseError, layer::SubscriberExt, util::SubscriberInitExt};
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Default)]
pub struct Config {
    /// Filter directives, used when `RUST_LOG` is not set.
    pub filter: Option<String>,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("TryInitError error: {0}")]
    TryInit(#[from] tracing_subscriber::util::TryInitError),
}

pub fn init_tracing_subscriber(config: &Config) -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter.as_deref().unwrap_or("info")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
