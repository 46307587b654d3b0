//! Core application runner for `ruuvi-relay`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit
//! codes so the pipeline can be tested deterministically with injected frame
//! sources and outputs.

use crate::capture::{self, CaptureError};
use crate::config::{Config, ConfigError, OutputKind};
use crate::hcidump::Frame;
use crate::metrics::PipelineMetrics;
use crate::observation::ResolvedObservation;
use crate::output::ObservationOutput;
use crate::output::console::ConsoleOutput;
use crate::output::queue::{OBSERVATION_CHANNEL_CAPACITY, QueueOutput};
use crate::queue::tcp::TcpQueueTransport;
use crate::ruuvi::{self, DecodeError};
use crate::whitelist::{self, SensorWhitelist, WhitelistEntry};
use clap::Parser;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::watch;

/// Capacity of the channel carrying reassembled frames from the capture
/// reader into the processing loop.
pub const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Path to the configuration file
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Additional whitelist entry on top of the configured ones.
    /// Format: --sensor fb:72:36:09:90:15=Sauna
    #[arg(long = "sensor", value_parser = whitelist::parse_entry, value_name = "SENSOR")]
    pub sensors: Vec<WhitelistEntry>,

    /// Verbose output, log advertisements that do not decode as sensor data
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Run the whole pipeline until the capture stream ends or shutdown is
/// requested.
pub async fn run(options: Options, signal: watch::Receiver<bool>) -> Result<(), RunError> {
    let config = Config::load(&options.config)?;

    let mut sensor_whitelist = config.sensor_whitelist.clone();
    for entry in &options.sensors {
        sensor_whitelist.insert(entry.address, entry.name.clone());
    }

    let metrics = Arc::new(PipelineMetrics::default());
    let output = build_output(&config, metrics.clone())?;

    let (observations_tx, observations_rx) = mpsc::channel(OBSERVATION_CHANNEL_CAPACITY);
    let output_task = tokio::spawn(output.run(observations_rx, signal.clone()));

    let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let capture_task = tokio::spawn(capture::run(frames_tx, signal.clone()));

    process_frames(
        frames_rx,
        &sensor_whitelist,
        observations_tx,
        &metrics,
        options.verbose,
    )
    .await;

    // observations_tx was consumed above; the closed channel lets the
    // output drain whatever is still queued, unless shutdown cuts it short
    let capture_result = capture_task.await;
    let _ = output_task.await;

    info!("session totals: {}", metrics.snapshot());

    match capture_result {
        Ok(result) => result?,
        Err(err) => error!("capture task failed: {err}"),
    }

    Ok(())
}

fn build_output(
    config: &Config,
    metrics: Arc<PipelineMetrics>,
) -> Result<Box<dyn ObservationOutput>, RunError> {
    match config.output {
        OutputKind::Console => Ok(Box::new(ConsoleOutput)),
        OutputKind::Queue => {
            let Some(queue) = &config.queue else {
                return Err(RunError::Config(ConfigError::MissingQueueConfig));
            };

            let transport = Arc::new(TcpQueueTransport::new(queue.endpoint.clone()));
            let output = QueueOutput::new(transport, metrics)
                .with_send_timeout(queue.send_timeout)
                .with_min_send_interval(queue.min_send_interval);

            Ok(Box::new(output))
        }
    }
}

/// Decode and resolve captured frames, forwarding whitelisted observations.
///
/// This is the synchronous middle of the pipeline: it owns the decoder and
/// the whitelist and runs until the frame source closes or the output side
/// goes away. The blocking send into the observation channel is what
/// backpressures capture when the output is slow.
pub async fn process_frames(
    mut frames: mpsc::Receiver<Frame>,
    sensor_whitelist: &SensorWhitelist,
    observations: mpsc::Sender<ResolvedObservation>,
    metrics: &PipelineMetrics,
    verbose: bool,
) {
    while let Some(frame) = frames.recv().await {
        metrics.record_frame();

        let observation = match ruuvi::decode_frame(&frame) {
            Ok(Some(observation)) => observation,
            Ok(None) => continue,
            Err(DecodeError::UnknownFormat) => {
                // plenty of non-sensor traffic shares the airwaves
                metrics.record_decode_mismatch();
                if verbose {
                    debug!("skipping frame: unknown advertisement format");
                }
                continue;
            }
            Err(err @ DecodeError::TooShort(_)) => {
                metrics.record_truncated_frame();
                warn!("skipping frame: {err}");
                continue;
            }
        };

        metrics.record_decoded();

        let sensor_addr = observation.sensor_addr;
        match whitelist::resolve(sensor_whitelist, observation) {
            Some(resolved) => {
                if observations.send(resolved).await.is_err() {
                    break;
                }
            }
            None => {
                metrics.record_unresolved_sensor();
                info!("unknown sensor traffic from {sensor_addr}");
            }
        }
    }
}
