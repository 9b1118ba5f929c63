// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reassembly of log lines that the container runtime split into fragments.
//!
//! The runtime cuts long lines into several entries flagged as partial. The
//! [`PartialLineAssembler`] accumulates those fragments and emits a single
//! [`AssembledMessage`] once the line is complete, or once it has been held
//! for too long or grown too large. The size and time checks run regardless
//! of the partial flag, so a producer that never completes its line cannot
//! hold messages back forever.

use crate::errors::AssemblerError;
use crate::record::{AssembledMessage, LogEntry};
use std::time::{Duration, Instant};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// No pending bytes.
    Empty,
    /// Holds bytes from at least one entry since the last reset.
    Accumulating,
}

#[derive(Debug)]
pub struct PartialLineAssembler {
    buffer: Vec<u8>,
    last_reset: Instant,
    state: AssemblerState,
    hold_duration: Duration,
    buffer_maximum: usize,
}

impl PartialLineAssembler {
    #[must_use]
    pub fn new(hold_duration: Duration, buffer_maximum: usize) -> Self {
        PartialLineAssembler {
            buffer: Vec::new(),
            last_reset: Instant::now(),
            state: AssemblerState::Empty,
            hold_duration,
            buffer_maximum,
        }
    }

    #[must_use]
    pub fn state(&self) -> AssemblerState {
        self.state
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends the entry's bytes to the pending line.
    ///
    /// If the buffer cannot grow the pending line is abandoned and the
    /// assembler is reset.
    pub fn append(&mut self, entry: &LogEntry, now: Instant) -> Result<(), AssemblerError> {
        if self.buffer.is_empty() {
            debug!("First fragment of a line, resetting hold timer");
            self.last_reset = now;
        }
        if let Err(source) = self.buffer.try_reserve(entry.line.len()) {
            error!(
                "Error appending to temp buffer with size {}: {source}",
                self.buffer.len()
            );
            self.reset(now);
            return Err(AssemblerError::Append {
                size: entry.line.len(),
                source,
            });
        }
        self.buffer.extend_from_slice(&entry.line);
        self.state = AssemblerState::Accumulating;
        Ok(())
    }

    /// True once the pending line is over the size maximum or has been held
    /// longer than the hold duration.
    #[must_use]
    pub fn should_flush(&self, now: Instant) -> bool {
        self.has_length_exceeded() || self.has_hold_duration_expired(now)
    }

    fn has_length_exceeded(&self) -> bool {
        self.buffer.len() > self.buffer_maximum
    }

    fn has_hold_duration_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_reset) > self.hold_duration
    }

    /// Folds one entry into the pending line and returns the assembled
    /// message when the entry completes the line or a flush is forced.
    pub fn process(&mut self, entry: &LogEntry, now: Instant) -> Option<AssembledMessage> {
        if self.append(entry, now).is_err() {
            return None;
        }
        if entry.partial && !self.should_flush(now) {
            return None;
        }
        let message = AssembledMessage {
            line: std::mem::take(&mut self.buffer),
            source: entry.source.clone(),
            timestamp_nanos: entry.time_nano,
            partial: entry.partial,
        };
        self.reset(now);
        Some(message)
    }

    /// Emits whatever is still held, as a partial line. Used when the stream
    /// ends in the middle of a line.
    pub fn drain(&mut self, source: &str, timestamp_nanos: i64) -> Option<AssembledMessage> {
        if self.buffer.is_empty() {
            return None;
        }
        let message = AssembledMessage {
            line: std::mem::take(&mut self.buffer),
            source: source.to_string(),
            timestamp_nanos,
            partial: true,
        };
        self.reset(Instant::now());
        Some(message)
    }

    fn reset(&mut self, now: Instant) {
        self.buffer.clear();
        self.last_reset = now;
        self.state = AssemblerState::Empty;
        debug!("Reset partial line buffer");
    }
}

/// Lines holding nothing but whitespace are dropped before assembly. Bytes
/// that are not valid UTF-8 are kept.
#[must_use]
pub fn should_send_message(line: &[u8]) -> bool {
    let text = String::from_utf8_lossy(line);
    if text.trim().is_empty() {
        debug!("Ignoring empty string");
        return false;
    }
    true
}
