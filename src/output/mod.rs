//! Output sinks for resolved observations.
//!
//! This module provides a trait for consuming the stream of resolved
//! observations and implementations for the available sinks: the console
//! (JSON lines on stdout) and the batching remote-queue pipeline. Which one
//! runs is selected by configuration.

pub mod console;
pub mod queue;

use crate::observation::ResolvedObservation;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::sync::watch;

/// A sink consuming the stream of resolved observations.
///
/// `run` takes ownership of the sink and drives it until the observation
/// channel closes or shutdown is requested, whichever comes first.
pub trait ObservationOutput: Send {
    fn run(
        self: Box<Self>,
        observations: mpsc::Receiver<ResolvedObservation>,
        signal: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}
