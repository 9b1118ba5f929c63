// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of the length-prefixed record stream written by the container
//! runtime.
//!
//! Each record is a 4-byte big-endian length followed by a protobuf encoded
//! [`LogEntry`]. Transient read or decode errors rebuild the decoder on the
//! same stream after a short pause; end-of-stream ends the sequence.

use crate::config::DecodeRetries;
use crate::record::LogEntry;
use futures::StreamExt;
use prost::Message;
use std::io;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::time::sleep;
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};
use tracing::{debug, error, info};

/// Upper bound of a single record payload.
pub const MAX_RECORD_SIZE: usize = 1_000_000;

fn record_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_RECORD_SIZE)
        .new_codec()
}

#[derive(Debug, thiserror::Error)]
enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to decode log entry: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl ReadError {
    /// Errors meaning the writer went away, which ends the stream normally.
    fn is_closed(&self) -> bool {
        matches!(
            self,
            ReadError::Io(e) if matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected
            )
        )
    }
}

pub struct RecordStreamReader<R> {
    framed: Option<FramedRead<R, LengthDelimitedCodec>>,
    stream_id: String,
    retries: DecodeRetries,
    backoff: Duration,
    attempts: u32,
}

impl<R> RecordStreamReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        stream: R,
        stream_id: impl Into<String>,
        retries: DecodeRetries,
        backoff: Duration,
    ) -> Self {
        RecordStreamReader {
            framed: Some(FramedRead::new(stream, record_codec())),
            stream_id: stream_id.into(),
            retries,
            backoff,
            attempts: 0,
        }
    }

    /// Whether the underlying stream has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.framed.is_none()
    }

    /// Returns the next record, or `None` once the stream is finished.
    ///
    /// The stream handle is dropped the first time `None` is returned, and
    /// every later call returns `None` right away.
    pub async fn next_record(&mut self) -> Option<LogEntry> {
        loop {
            let framed = self.framed.as_mut()?;
            let result = match framed.next().await {
                None => {
                    info!(id = %self.stream_id, "log stream closed, shutting down loggers");
                    self.close();
                    return None;
                }
                Some(frame) => frame
                    .map_err(ReadError::from)
                    .and_then(|bytes| LogEntry::decode(bytes.freeze()).map_err(ReadError::from)),
            };

            match result {
                Ok(entry) => {
                    self.attempts = 0;
                    return Some(entry);
                }
                Err(e) if e.is_closed() => {
                    info!(id = %self.stream_id, "log stream closed ({e}), shutting down loggers");
                    self.close();
                    return None;
                }
                Err(e) => {
                    if !self.retries.allows(self.attempts) {
                        error!(
                            id = %self.stream_id,
                            cur_retry_number = self.attempts,
                            retry_number = ?self.retries,
                            "Stop retrying. Shutting down loggers: {e}"
                        );
                        self.close();
                        return None;
                    }
                    self.attempts += 1;
                    error!(
                        id = %self.stream_id,
                        cur_retry_number = self.attempts,
                        retry_number = ?self.retries,
                        "Encountered error and retrying: {e}"
                    );
                    sleep(self.backoff).await;
                    self.reopen();
                }
            }
        }
    }

    /// Builds a fresh decoder over the same underlying stream.
    fn reopen(&mut self) {
        if let Some(framed) = self.framed.take() {
            self.framed = Some(FramedRead::new(framed.into_inner(), record_codec()));
        }
    }

    fn close(&mut self) {
        if self.framed.take().is_some() {
            debug!(id = %self.stream_id, "Closing log stream");
        }
    }
}
