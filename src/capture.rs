//! Supervision of the external capture processes.
//!
//! Two helpers do the actual radio work: `hcitool lescan` keeps the adapter
//! in passive scan mode (and is restarted if it exits), while `hcidump
//! --raw` prints every captured frame as text. This module owns both child
//! processes, feeds the dump output through a [`FrameAssembler`] and
//! publishes completed frames to a bounded channel.

use crate::hcidump::{Frame, FrameAssembler, FramingError};
use crate::shutdown;
use log::{error, info};
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::sync::watch;

const LESCAN_COMMAND: &str = "hcitool";
const LESCAN_ARGS: [&str; 3] = ["lescan", "--duplicates", "--passive"];

const DUMP_COMMAND: &str = "hcidump";
const DUMP_ARGS: [&str; 1] = ["--raw"];

const LESCAN_RESTART_DELAY: Duration = Duration::from_secs(3);

/// Errors that end the capture run.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Run both capture processes until shutdown is requested or the dump
/// stream ends or corrupts.
///
/// Completed frames are sent into `frames`; the send blocks when the
/// channel is full, which backpressures the capture read.
pub async fn run(
    frames: mpsc::Sender<Frame>,
    signal: watch::Receiver<bool>,
) -> Result<(), CaptureError> {
    let scan = tokio::spawn(keep_scanning(signal.clone()));

    let result = dump_frames(frames, signal).await;

    // capture is over either way; stop scanning (kill_on_drop reaps the
    // child) instead of waiting for the shutdown signal
    scan.abort();
    let _ = scan.await;

    result
}

/// Keep `hcitool lescan` running, restarting it after unexpected exits.
async fn keep_scanning(mut signal: watch::Receiver<bool>) {
    info!("scan keeper starting");

    loop {
        let child = Command::new(LESCAN_COMMAND)
            .args(LESCAN_ARGS)
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match child {
            Ok(mut child) => {
                tokio::select! {
                    biased;
                    _ = shutdown::requested(&mut signal) => {
                        let _ = child.kill().await;
                        break;
                    }
                    status = child.wait() => {
                        if shutdown::is_requested(&signal) {
                            break;
                        }
                        match status {
                            Ok(status) => error!("{LESCAN_COMMAND} exited unexpectedly ({status}); restarting"),
                            Err(err) => error!("{LESCAN_COMMAND} wait failed: {err}; restarting"),
                        }
                    }
                }
            }
            Err(err) => {
                if shutdown::is_requested(&signal) {
                    break;
                }
                error!("failed to spawn {LESCAN_COMMAND}: {err}; retrying");
            }
        }

        tokio::select! {
            biased;
            _ = shutdown::requested(&mut signal) => break,
            _ = tokio::time::sleep(LESCAN_RESTART_DELAY) => {}
        }
    }

    info!("scan keeper stopped");
}

/// Read `hcidump --raw` output line by line, reassembling frames.
async fn dump_frames(
    frames: mpsc::Sender<Frame>,
    mut signal: watch::Receiver<bool>,
) -> Result<(), CaptureError> {
    let mut child = Command::new(DUMP_COMMAND)
        .args(DUMP_ARGS)
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CaptureError::Spawn {
            command: DUMP_COMMAND,
            source,
        })?;

    let Some(stdout) = child.stdout.take() else {
        return Err(CaptureError::Io(io::Error::other(
            "hcidump stdout was not captured",
        )));
    };

    info!("capture starting");

    let mut lines = BufReader::new(stdout).lines();
    let mut assembler = FrameAssembler::new();

    let result = loop {
        let line = tokio::select! {
            biased;
            _ = shutdown::requested(&mut signal) => break Ok(()),
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => match assembler.feed_line(&line) {
                Ok(Some(frame)) => {
                    if frames.send(frame).await.is_err() {
                        // the consumer is gone, nothing left to capture for
                        break Ok(());
                    }
                }
                Ok(None) => {}
                Err(err) => break Err(CaptureError::Framing(err)),
            },
            Ok(None) => break Ok(()),
            Err(err) => break Err(CaptureError::Io(err)),
        }
    };

    let _ = child.kill().await;
    info!("capture stopped");

    result
}
