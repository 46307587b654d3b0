//! Reassembly of frames from hcidump's line-oriented text output.
//!
//! `hcidump --raw` prints each captured frame as space-separated hex octets,
//! wrapped over multiple lines. There are three kinds of lines:
//!
//! - begins with `"> "`: start of an inbound frame
//! - begins with `"< "`: start of an outbound frame
//! - begins with two spaces: continuation of the previous line
//!
//! A line alone never tells whether more continuation lines follow, so a
//! buffered frame is only known to be complete when the next directional
//! line arrives. The tool also prints a couple of banner lines on startup
//! that belong on stderr but aren't; those are skipped.

use std::io::BufRead;
use thiserror::Error;

const PREFIX_INBOUND: &str = "> ";
const PREFIX_OUTBOUND: &str = "< ";
const PREFIX_CONTINUATION: &str = "  ";

/// Startup chatter from hcidump itself, not frame data.
const BANNER_PREFIXES: [&str; 2] = ["HCI sniffer", "device: hci"];

/// Direction of a captured frame relative to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One reassembled capture frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub direction: Direction,
    pub data: Vec<u8>,
}

/// Errors that are fatal to stream reassembly.
///
/// A single unrecognized line or undecodable hex buffer means the stream is
/// structurally corrupt; processing stops rather than guessing at frame
/// boundaries.
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("invalid format for line: {0}")]
    InvalidLine(String),
    #[error("invalid hex in frame: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Line-by-line frame reassembly state.
///
/// Feed lines in order with [`FrameAssembler::feed_line`]; a completed frame
/// is returned when the line that started the *next* frame arrives. The
/// final buffered frame is never returned, since nothing marks it complete.
#[derive(Debug)]
pub struct FrameAssembler {
    direction: Direction,
    buffer: String,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        FrameAssembler {
            direction: Direction::Inbound,
            buffer: String::new(),
        }
    }

    /// Process one line of hcidump output.
    ///
    /// Returns the previously buffered frame when `line` starts a new one.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<Frame>, FramingError> {
        if let Some(rest) = line.strip_prefix(PREFIX_INBOUND) {
            let finished = self.take_buffered()?;
            self.direction = Direction::Inbound;
            self.buffer.push_str(rest);
            Ok(finished)
        } else if let Some(rest) = line.strip_prefix(PREFIX_OUTBOUND) {
            let finished = self.take_buffered()?;
            self.direction = Direction::Outbound;
            self.buffer.push_str(rest);
            Ok(finished)
        } else if let Some(rest) = line.strip_prefix(PREFIX_CONTINUATION) {
            self.buffer.push(' ');
            self.buffer.push_str(rest);
            Ok(None)
        } else if BANNER_PREFIXES.iter().any(|p| line.starts_with(p)) {
            Ok(None)
        } else {
            Err(FramingError::InvalidLine(line.to_string()))
        }
    }

    fn take_buffered(&mut self) -> Result<Option<Frame>, FramingError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let compact: String = self.buffer.replace(' ', "");
        let data = hex::decode(compact)?;
        self.buffer.clear();

        Ok(Some(Frame {
            direction: self.direction,
            data,
        }))
    }
}

/// Reassemble all frames from a line-oriented reader, invoking `on_frame`
/// for each completed frame.
///
/// The last buffered frame is never emitted: the format carries no
/// end-of-frame marker, so its completeness cannot be known at end of
/// stream.
pub fn parse_stream<R: BufRead>(
    reader: R,
    mut on_frame: impl FnMut(Frame),
) -> Result<(), FramingError> {
    let mut assembler = FrameAssembler::new();

    for line in reader.lines() {
        let line = line?;
        if let Some(frame) = assembler.feed_line(&line)? {
            on_frame(frame);
        }
    }

    Ok(())
}
