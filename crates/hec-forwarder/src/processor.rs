// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per stream processing loop: decode, filter, reassemble, hand to sinks.

use crate::config::{Config, DecodeRetries};
use crate::partial::{should_send_message, PartialLineAssembler};
use crate::reader::RecordStreamReader;
use crate::record::AssembledMessage;
use crate::sink::Sink;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tracing::{debug, error, warn};

/// The sinks fed by one container stream.
#[derive(Clone)]
pub struct LogPair {
    pub container_id: String,
    pub primary: Arc<dyn Sink>,
    /// Local copy of the logs, only fed when JSON logs are enabled.
    pub mirror: Option<Arc<dyn Sink>>,
}

impl LogPair {
    pub async fn close(&self) {
        self.primary.close().await;
        if let Some(mirror) = &self.mirror {
            mirror.close().await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageProcessor {
    retries: DecodeRetries,
    backoff: Duration,
    hold_duration: Duration,
    buffer_maximum: usize,
    json_logs: bool,
}

impl MessageProcessor {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        MessageProcessor {
            retries: config.read_fifo_error_retry_number,
            backoff: config.read_fifo_error_backoff,
            hold_duration: config.partial_msg_buffer_hold_duration,
            buffer_maximum: config.partial_msg_buffer_maximum,
            json_logs: config.json_logs,
        }
    }

    /// Runs until `stream` ends, then flushes any held fragment and closes
    /// the sinks.
    pub async fn consume_log<R>(&self, stream: R, pair: &LogPair)
    where
        R: AsyncRead + Unpin,
    {
        debug!(id = %pair.container_id, "Start to consume log");
        let mut reader =
            RecordStreamReader::new(stream, &pair.container_id, self.retries, self.backoff);
        let mut assembler = PartialLineAssembler::new(self.hold_duration, self.buffer_maximum);
        let mut last_source = String::new();
        let mut last_timestamp = 0;

        while let Some(entry) = reader.next_record().await {
            if !should_send_message(&entry.line) {
                continue;
            }
            if std::str::from_utf8(&entry.line).is_err() {
                warn!("{:?} is not UTF-8 decodable", entry.line);
            }
            if let Some(message) = assembler.process(&entry, Instant::now()) {
                self.send(pair, &message).await;
            }
            last_source = entry.source;
            last_timestamp = entry.time_nano;
        }

        if let Some(message) = assembler.drain(&last_source, last_timestamp) {
            debug!(id = %pair.container_id, "Flushing held fragment at end of stream");
            self.send(pair, &message).await;
        }
        pair.close().await;
    }

    async fn send(&self, pair: &LogPair, message: &AssembledMessage) {
        if let Err(e) = pair.primary.log(message).await {
            error!(id = %pair.container_id, "Error writing log message: {e}");
        }
        if !self.json_logs {
            return;
        }
        if let Some(mirror) = &pair.mirror {
            if let Err(e) = mirror.log(message).await {
                error!(id = %pair.container_id, "Error writing log message: {e}");
            }
        }
    }
}
