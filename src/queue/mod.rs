//! Remote queue transport contract and batch delivery with retry.
//!
//! The transport is a best-effort batch send primitive: one call submits up
//! to [`MAX_ITEMS_PER_BATCH`] entries and reports which of them the service
//! did not accept. [`deliver_with_retry`] drives a transport until a batch
//! is fully delivered, retrying only the undelivered remainder under an
//! exponential backoff, bounded by an overall timeout and the shutdown
//! signal.

pub mod backoff;
pub mod tcp;

use crate::shutdown;
use backoff::Backoff;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Upper bound on entries per transport call, a service-side limitation.
pub const MAX_ITEMS_PER_BATCH: usize = 10;

/// One entry of a batch: an id unique within the batch plus the message
/// body. The id is how the transport's response refers back to the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub body: String,
}

/// The transport's report for one batch call: ids of entries the service
/// did not accept. An empty list means full success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub failed: Vec<String>,
}

/// Errors from a single transport call. The whole attempt counts as
/// undelivered when one of these is returned.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("queue I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("queue response error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("queue protocol error: {0}")]
    Protocol(String),
}

/// Best-effort batch send primitive.
///
/// Implementations submit the entries in one service call and report the
/// per-entry failures. They do not retry; retrying is the caller's job.
pub trait QueueTransport: Send + Sync {
    fn send_batch<'a>(
        &'a self,
        entries: &'a [QueueEntry],
    ) -> Pin<Box<dyn Future<Output = Result<SendResponse, TransportError>> + Send + 'a>>;
}

/// What went wrong with one delivery attempt. Reported through the attempt
/// callback of [`deliver_with_retry`]; the retry loop keeps going.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{failed}/{total} entries failed")]
    PartialFailure { failed: usize, total: usize },
    /// The response's failed ids did not reconcile with the batch that was
    /// sent; the response cannot be trusted as-is.
    #[error("response reports {reported} failed entries but {matched} match the batch")]
    InconsistentResponse { reported: usize, matched: usize },
}

/// Terminal delivery failures. Both carry the entries that never made it.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("delivery timed out with {} entries undelivered", undelivered.len())]
    TimedOut { undelivered: Vec<QueueEntry> },
    #[error("delivery cancelled with {} entries undelivered", undelivered.len())]
    Cancelled { undelivered: Vec<QueueEntry> },
}

enum Waited {
    Attempt(Result<SendResponse, TransportError>),
    DeadlinePassed,
    Stopped,
}

/// Deliver `batch` through `transport`, retrying the undelivered remainder
/// until it is empty, `timeout` elapses, or shutdown is requested.
///
/// `on_attempt_error` is invoked once per failed attempt, including for
/// responses that fail the consistency check.
pub async fn deliver_with_retry(
    transport: &dyn QueueTransport,
    batch: Vec<QueueEntry>,
    timeout: Duration,
    signal: &mut watch::Receiver<bool>,
    mut on_attempt_error: impl FnMut(&AttemptError),
) -> Result<(), DeliveryError> {
    let deadline = Instant::now() + timeout;
    let mut backoff = Backoff::default();
    let mut undelivered = batch;

    loop {
        let waited = {
            let mut attempt = transport.send_batch(&undelivered);
            tokio::select! {
                biased;
                _ = shutdown::requested(signal) => Waited::Stopped,
                _ = tokio::time::sleep_until(deadline) => Waited::DeadlinePassed,
                result = &mut attempt => Waited::Attempt(result),
            }
        };

        match waited {
            Waited::Stopped => return Err(DeliveryError::Cancelled { undelivered }),
            Waited::DeadlinePassed => return Err(DeliveryError::TimedOut { undelivered }),
            Waited::Attempt(Ok(response)) => {
                if response.failed.is_empty() {
                    return Ok(());
                }

                let reported = response.failed.len();
                let total = undelivered.len();
                undelivered.retain(|entry| response.failed.contains(&entry.id));

                let error = if undelivered.len() != reported {
                    AttemptError::InconsistentResponse {
                        reported,
                        matched: undelivered.len(),
                    }
                } else {
                    AttemptError::PartialFailure {
                        failed: reported,
                        total,
                    }
                };
                on_attempt_error(&error);

                // nothing left that reconciles with the batch; everything
                // we sent was accepted
                if undelivered.is_empty() {
                    return Ok(());
                }
            }
            Waited::Attempt(Err(error)) => {
                // whole remainder stays undelivered
                on_attempt_error(&AttemptError::Transport(error));
            }
        }

        let delay = backoff.next_delay();
        tokio::select! {
            biased;
            _ = shutdown::requested(signal) => return Err(DeliveryError::Cancelled { undelivered }),
            _ = tokio::time::sleep_until(deadline) => return Err(DeliveryError::TimedOut { undelivered }),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
