//! Batching queue sink: the delivery pipeline.
//!
//! A single worker task accumulates resolved observations into bounded
//! batches and hands them to the remote transport, one batch in flight at a
//! time. Batch formation never waits for more data: once the first item is
//! in hand, whatever is already queued (up to the per-call limit) joins the
//! batch. Below-capacity batches are paced to bound the rate of transport
//! calls; at-capacity batches ship immediately, which is worth an operator's
//! attention because it means the source outruns the configured batch size.

use crate::metrics::PipelineMetrics;
use crate::observation::ResolvedObservation;
use crate::output::ObservationOutput;
use crate::queue::{
    DeliveryError, MAX_ITEMS_PER_BATCH, QueueEntry, QueueTransport, deliver_with_retry,
};
use crate::shutdown;
use log::{error, info, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;

/// Capacity of the observation channel feeding the worker. Sized so a slow
/// transport backpressures the producer instead of growing memory.
pub const OBSERVATION_CHANNEL_CAPACITY: usize = 2 * MAX_ITEMS_PER_BATCH;

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MIN_SEND_INTERVAL: Duration = Duration::from_secs(1);

/// Called with the entries that are about to be dropped after the retry
/// budget for their batch is exhausted.
pub type DiscardHandler = Box<dyn FnMut(Vec<QueueEntry>) + Send>;

/// The batching remote-queue sink.
pub struct QueueOutput {
    transport: Arc<dyn QueueTransport>,
    metrics: Arc<PipelineMetrics>,
    send_timeout: Duration,
    min_send_interval: Duration,
    on_discarded: Option<DiscardHandler>,
}

impl QueueOutput {
    pub fn new(transport: Arc<dyn QueueTransport>, metrics: Arc<PipelineMetrics>) -> Self {
        QueueOutput {
            transport,
            metrics,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            min_send_interval: DEFAULT_MIN_SEND_INTERVAL,
            on_discarded: None,
        }
    }

    /// Overall retry budget for one batch.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Minimum interval between batch submissions below capacity.
    pub fn with_min_send_interval(mut self, interval: Duration) -> Self {
        self.min_send_interval = interval;
        self
    }

    /// Observe entries that were dropped after the retry budget ran out.
    pub fn with_discard_handler(mut self, handler: DiscardHandler) -> Self {
        self.on_discarded = Some(handler);
        self
    }

    async fn worker(
        mut self,
        mut observations: mpsc::Receiver<ResolvedObservation>,
        mut signal: watch::Receiver<bool>,
    ) {
        loop {
            let first = tokio::select! {
                biased;
                _ = shutdown::requested(&mut signal) => break,
                item = observations.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            // grab what is already queued, don't wait for more
            let mut batch = vec![first];
            while batch.len() < MAX_ITEMS_PER_BATCH {
                match observations.try_recv() {
                    Ok(item) => batch.push(item),
                    Err(_) => break,
                }
            }

            let batch_len = batch.len();
            let batch_started = Instant::now();

            let entries = match to_entries(&batch) {
                Ok(entries) => entries,
                Err(err) => {
                    error!("cannot serialize batch of {batch_len}: {err}");
                    continue;
                }
            };

            let delivery = deliver_with_retry(
                self.transport.as_ref(),
                entries,
                self.send_timeout,
                &mut signal,
                |err| warn!("queue send attempt: {err}"),
            )
            .await;

            match delivery {
                Ok(()) => self.metrics.record_batch_sent(batch_len),
                Err(DeliveryError::TimedOut { undelivered }) => {
                    error!(
                        "dropping {} entries after retry budget ran out",
                        undelivered.len()
                    );
                    self.metrics.record_batch_sent(batch_len - undelivered.len());
                    self.metrics.record_entries_discarded(undelivered.len());
                    if let Some(handler) = self.on_discarded.as_mut() {
                        handler(undelivered);
                    }
                }
                Err(DeliveryError::Cancelled { undelivered }) => {
                    info!("stopping with {} entries undelivered", undelivered.len());
                    break;
                }
            }

            if batch_len < MAX_ITEMS_PER_BATCH {
                tokio::select! {
                    biased;
                    _ = shutdown::requested(&mut signal) => break,
                    _ = tokio::time::sleep_until(batch_started + self.min_send_interval) => {}
                }
            } else {
                info!("operating at queue send capacity: {batch_len}");
            }
        }
    }
}

impl ObservationOutput for QueueOutput {
    fn run(
        self: Box<Self>,
        observations: mpsc::Receiver<ResolvedObservation>,
        signal: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self.worker(observations, signal))
    }
}

fn to_entries(batch: &[ResolvedObservation]) -> Result<Vec<QueueEntry>, serde_json::Error> {
    batch
        .iter()
        .enumerate()
        .map(|(idx, observation)| {
            Ok(QueueEntry {
                id: idx.to_string(),
                body: serde_json::to_string(observation)?,
            })
        })
        .collect()
}
