//! Console sink: one JSON line per resolved observation.

use crate::observation::ResolvedObservation;
use crate::output::ObservationOutput;
use crate::shutdown;
use log::error;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::sync::watch;

/// Prints resolved observations to stdout as they arrive.
#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl ObservationOutput for ConsoleOutput {
    fn run(
        self: Box<Self>,
        mut observations: mpsc::Receiver<ResolvedObservation>,
        mut signal: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            loop {
                let observation = tokio::select! {
                    biased;
                    _ = shutdown::requested(&mut signal) => break,
                    item = observations.recv() => match item {
                        Some(observation) => observation,
                        None => break,
                    },
                };

                match serde_json::to_string(&observation) {
                    Ok(line) => println!("{line}"),
                    Err(err) => error!("cannot serialize observation: {err}"),
                }
            }
        })
    }
}
