//! Cooperative shutdown signal shared by the pipeline tasks.
//!
//! A `watch` channel carries a single "stop requested" flag. Every
//! suspension point in the pipeline selects against [`requested`] so that a
//! termination request interrupts waits, sleeps and backoffs promptly.

use tokio::sync::watch;

/// Create a fresh shutdown signal pair. Send `true` to request shutdown.
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Wait until shutdown has been requested.
///
/// Resolves immediately if the request already happened. A dropped sender
/// counts as a request, so orphaned workers always stop.
pub async fn requested(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|stop| *stop).await;
}

/// Non-blocking check of the current state.
pub fn is_requested(signal: &watch::Receiver<bool>) -> bool {
    *signal.borrow()
}
