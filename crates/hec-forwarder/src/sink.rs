// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::SinkError;
use crate::record::AssembledMessage;
use async_trait::async_trait;

/// Destination of assembled messages.
///
/// Implementations decide how to buffer or deliver. Errors are reported to
/// the processing loop, which logs them and moves on.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn log(&self, message: &AssembledMessage) -> Result<(), SinkError>;

    /// Called once the stream feeding this sink has ended.
    async fn close(&self) {}
}
