// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The HEC logger: envelope building on the caller side, batching and
//! delivery on a dedicated worker task.
//!
//! ```text
//!   log(message)                      worker task
//!       │                                  │
//!       │ build envelope                   │ recv ──┐
//!       v                                  │        │ pending.len() % batch == 0
//!   DeliveryQueue ───────────────────────> │ <──────┘ or timer tick
//!       ^                                  │ post_messages(pending)
//!       │                                  │
//!   close() ── waits ── last chance post, drop client, finish()
//! ```

use crate::config::Config;
use crate::envelope::HecMessage;
use crate::errors::{ConfigError, QueueError, SinkError};
use crate::format::EnvelopeBuilder;
use crate::hec_client::HecClient;
use crate::http::get_client;
use crate::options::LoggerOptions;
use crate::queue::{self, DeliveryQueue, QueueConsumer};
use crate::record::AssembledMessage;
use crate::sink::Sink;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

const MIN_POST_MESSAGES_FREQUENCY: Duration = Duration::from_millis(1);

pub struct HecLogger {
    builder: EnvelopeBuilder,
    queue: DeliveryQueue<HecMessage>,
}

impl HecLogger {
    /// Builds the client, optionally checks the collector is reachable and
    /// starts the delivery worker.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(options: &LoggerOptions, config: &Config) -> Result<Self, ConfigError> {
        let hec = HecClient::new(get_client(config)?, options, config);
        if options.verify_connection {
            hec.verify_connection().await?;
        }
        info!(
            id = %options.container_id,
            format = %options.format,
            url = %options.url,
            "Starting HEC logger"
        );
        Ok(Self::with_client(
            hec,
            EnvelopeBuilder::from_options(options),
            config,
        ))
    }

    #[must_use]
    pub fn with_client(hec: HecClient, builder: EnvelopeBuilder, config: &Config) -> Self {
        let (queue, consumer) = queue::channel(config.stream_channel_size);
        let worker = Worker {
            hec,
            consumer,
            frequency: config
                .post_messages_frequency
                .max(MIN_POST_MESSAGES_FREQUENCY),
        };
        tokio::spawn(worker.run());
        HecLogger { builder, queue }
    }

    /// Queues the message for delivery, waiting while the queue is full.
    pub async fn log(&self, message: &AssembledMessage) -> Result<(), QueueError> {
        self.queue.enqueue(self.builder.build(message)).await
    }

    /// Stops accepting messages and returns once everything queued has been
    /// delivered or logged and dropped.
    pub async fn close(&self) {
        self.queue.close().await;
    }
}

#[async_trait]
impl Sink for HecLogger {
    async fn log(&self, message: &AssembledMessage) -> Result<(), SinkError> {
        Ok(HecLogger::log(self, message).await?)
    }

    async fn close(&self) {
        HecLogger::close(self).await;
    }
}

struct Worker {
    hec: HecClient,
    consumer: QueueConsumer<HecMessage>,
    frequency: Duration,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.frequency, self.frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let batch_size = self.hec.batch_size();
        let mut pending: Vec<HecMessage> = Vec::new();

        loop {
            tokio::select! {
                message = self.consumer.recv() => {
                    let Some(message) = message else {
                        debug!("stream is closed with {} events", pending.len());
                        self.hec.post_messages(pending, true).await;
                        break;
                    };
                    pending.push(message);
                    // only on exact multiples, so a failing endpoint is not
                    // retried on every new message
                    if pending.len() % batch_size == 0 {
                        pending = self.hec.post_messages(pending, false).await;
                    }
                }
                _ = ticker.tick() => {
                    debug!("messages buffer timeout, sending {} events", pending.len());
                    pending = self.hec.post_messages(pending, false).await;
                }
            }
        }

        let Worker { hec, consumer, .. } = self;
        // releases the connection pool before close() returns
        drop(hec);
        consumer.finish();
    }
}
