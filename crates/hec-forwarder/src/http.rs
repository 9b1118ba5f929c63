// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client shared by the delivery worker of one logger.

use crate::config::Config;
use crate::errors::ConfigError;
use core::time::Duration;

/// Builds the client used for every POST of a logger instance.
///
/// Requests time out after `post_messages_timeout`. Idle pooled connections
/// are kept for 270s and probed with TCP keep-alive.
pub fn get_client(config: &Config) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(config.post_messages_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)))
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}
