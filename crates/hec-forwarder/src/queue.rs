// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded hand-off between the producers of envelopes and the single
//! delivery worker.
//!
//! ```text
//!    ┌───────────────┐
//!    │ DeliveryQueue │ (many producers)
//!    └───────┬───────┘
//!            │ bounded channel, blocks when full
//!            v
//!    ┌───────────────┐
//!    │ QueueConsumer │ (delivery worker)
//!    └───────┬───────┘
//!            │ finish() once the last batch is posted
//!            v
//!        close() returns
//! ```
//!
//! Closing takes the sender under the write lock, so an in-flight `enqueue`
//! either lands before the channel closes or observes the closed state. The
//! lock is released before waiting on the worker, so producers arriving
//! during the drain fail fast with `QueueError::Closed`.

use crate::errors::QueueError;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::debug;

pub struct DeliveryQueue<T> {
    tx: RwLock<Option<mpsc::Sender<T>>>,
    drained: watch::Receiver<bool>,
}

pub struct QueueConsumer<T> {
    rx: mpsc::Receiver<T>,
    drained: watch::Sender<bool>,
}

/// Creates a queue holding at most `capacity` items (at least one).
#[must_use]
pub fn channel<T>(capacity: usize) -> (DeliveryQueue<T>, QueueConsumer<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (drained_tx, drained_rx) = watch::channel(false);
    (
        DeliveryQueue {
            tx: RwLock::new(Some(tx)),
            drained: drained_rx,
        },
        QueueConsumer {
            rx,
            drained: drained_tx,
        },
    )
}

impl<T> DeliveryQueue<T> {
    /// Hands an item to the worker, waiting while the queue is full.
    pub async fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let tx = self.tx.read().await;
        let tx = tx.as_ref().ok_or(QueueError::Closed)?;
        tx.send(item).await.map_err(|_| QueueError::Closed)
    }

    pub async fn is_closed(&self) -> bool {
        self.tx.read().await.is_none()
    }

    /// Stops accepting items and waits until the consumer has finished
    /// draining. Every caller waits for the same drain.
    pub async fn close(&self) {
        let tx = self.tx.write().await.take();
        if tx.is_some() {
            debug!("Delivery queue closed, waiting for worker to drain");
        }
        drop(tx);

        let mut drained = self.drained.clone();
        // a consumer dropped without finishing is done as well
        let _ = drained.wait_for(|done| *done).await;
    }
}

impl<T> QueueConsumer<T> {
    /// Next queued item, or `None` once the queue is closed and empty.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Signals that everything received has been handled.
    pub fn finish(self) {
        self.drained.send_replace(true);
    }
}
