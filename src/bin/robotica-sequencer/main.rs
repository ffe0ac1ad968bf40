//! Play a list of cues from a config file.
#![warn(missing_docs)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod config;
mod cues;
mod logging;

use robotica_sequencer::Sequencer;
use tokio::select;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    color_backtrace::install();

    let env = config::Environment::load()?;
    let config = env.config()?;

    logging::init_tracing_subscriber(&config.logging)?;

    info!("Starting robotica-sequencer");

    let fps = config.clock.fps();
    let time_source = config.clock.build()?;
    let sequencer = Sequencer::from_config(&config.sequencer, time_source)?;

    let handles = cues::add_cues(&sequencer, &config.cues, fps)?;
    info!("Loaded {} cues", handles.len());

    sequencer.start()?;
    wait_for_cues(&sequencer).await;
    sequencer.stop().await;

    let remaining = serde_json::to_string(&sequencer.snapshot())?;
    info!("Remaining events: {remaining}");

    Ok(())
}

/// Wait until every cue has finished, or until interrupted.
async fn wait_for_cues(sequencer: &Sequencer) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut interval = tokio::time::interval(sequencer.tick_interval());

    loop {
        select! {
            result = &mut ctrl_c => {
                if let Err(err) = result {
                    error!("Error waiting for Ctrl-C: {err}");
                }
                info!("Interrupted");
                break;
            }
            _ = interval.tick() => {
                if sequencer.snapshot().iter().all(|event| event.fired) {
                    info!("All cues finished");
                    break;
                }
            }
        }
    }
}
