// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types shared across the forwarding pipeline.

use reqwest::StatusCode;

/// Fatal error raised while building a logger instance from its options.
///
/// The logger is never created when this error is returned, so the caller
/// must fail the request that asked for it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("splunk: {0} is expected")]
    MissingOption(&'static str),
    #[error("unknown log opt '{0}' for splunk log driver")]
    UnknownOption(String),
    #[error("splunk: failed to parse {value} as url value in {key}")]
    InvalidUrl { key: &'static str, value: String },
    #[error("splunk: expected format scheme://dns_name_or_ip:port for {0}")]
    UrlFormat(&'static str),
    #[error("splunk: expected format /path/to/collector for {0}")]
    UrlPathFormat(&'static str),
    #[error("splunk: invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("unknown format specified {0}, supported formats are inline, json, hec and raw")]
    UnknownFormat(String),
    #[error("not supported level '{0}' for splunk-gzip-level (supported values between -1 and 9)")]
    CompressionLevel(String),
    #[error("splunk: invalid env-regex: {0}")]
    EnvRegex(#[from] regex::Error),
    #[error("splunk: cannot access hostname to set source field")]
    MissingHostname,
    #[error("splunk: failed to build http client: {0}")]
    Client(String),
    #[error(transparent)]
    Verification(#[from] DeliveryError),
}

/// Failure of a single POST (or health check) against the collector.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("splunk: failed to send event - {0}")]
    Transport(#[from] reqwest::Error),
    #[error("splunk: failed to send event - {status} - {body}")]
    Status { status: StatusCode, body: String },
    #[error("splunk: failed to verify connection - {status} - {body}")]
    Verification { status: StatusCode, body: String },
    #[error("splunk: failed to compress payload - {0}")]
    Compression(#[from] std::io::Error),
}

/// Returned by the delivery queue once shutdown has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("splunk: driver is closed")]
    Closed,
}

/// Raised by the partial line assembler when its buffer cannot grow.
#[derive(Debug, thiserror::Error)]
pub enum AssemblerError {
    #[error("error appending {size} bytes to temp buffer: {source}")]
    Append {
        size: usize,
        #[source]
        source: std::collections::TryReserveError,
    },
}

/// Error reported by a sink when it refuses a message.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Queue(#[from] QueueError),
}
