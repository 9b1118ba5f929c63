// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Advanced tuning options for the forwarding pipeline.
//!
//! The options are read once at startup into an immutable [`Config`] that is
//! handed to every component constructor. Nothing below this module reads
//! process state on its own.
//!
//! Every option has a hard-coded default and can be overridden through an
//! environment variable. A value that fails to parse is reported and the
//! default is kept, so a bad override never prevents the driver from starting.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::error;

/// How often pending messages are posted when the batch size is not reached.
pub const DEFAULT_POST_MESSAGES_FREQUENCY: Duration = Duration::from_secs(5);
/// Number of messages posted in a single request.
pub const DEFAULT_POST_MESSAGES_BATCH_SIZE: usize = 1_000;
/// Number of undelivered messages kept for retry before they are dropped.
pub const DEFAULT_BUFFER_MAXIMUM: usize = 10 * DEFAULT_POST_MESSAGES_BATCH_SIZE;
/// Capacity of the queue between stream processing and delivery.
pub const DEFAULT_STREAM_CHANNEL_SIZE: usize = 4 * DEFAULT_POST_MESSAGES_BATCH_SIZE;
/// How long a partial line may be held before it is forced out.
pub const DEFAULT_PARTIAL_MSG_BUFFER_HOLD_DURATION: Duration = Duration::from_secs(5);
/// Size above which a partial line is forced out.
pub const DEFAULT_PARTIAL_MSG_BUFFER_MAXIMUM: usize = 1024 * 1024;
/// Consecutive decode errors tolerated on a log stream.
pub const DEFAULT_READ_FIFO_ERROR_RETRY_NUMBER: i64 = 3;
/// Pause before the record decoder is rebuilt after an error.
pub const DEFAULT_READ_FIFO_ERROR_BACKOFF: Duration = Duration::from_millis(500);
/// Whether the mirror sink receives a copy of every message.
pub const DEFAULT_JSON_LOGS: bool = true;
/// Transport timeout applied to every POST.
pub const DEFAULT_POST_MESSAGES_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_POST_MESSAGES_FREQUENCY: &str = "SPLUNK_LOGGING_DRIVER_POST_MESSAGES_FREQUENCY";
pub const ENV_POST_MESSAGES_BATCH_SIZE: &str = "SPLUNK_LOGGING_DRIVER_POST_MESSAGES_BATCH_SIZE";
pub const ENV_BUFFER_MAXIMUM: &str = "SPLUNK_LOGGING_DRIVER_BUFFER_MAX";
pub const ENV_STREAM_CHANNEL_SIZE: &str = "SPLUNK_LOGGING_DRIVER_CHANNEL_SIZE";
pub const ENV_PARTIAL_MSG_BUFFER_HOLD_DURATION: &str =
    "SPLUNK_LOGGING_DRIVER_TEMP_MESSAGES_HOLD_DURATION";
pub const ENV_PARTIAL_MSG_BUFFER_MAXIMUM: &str = "SPLUNK_LOGGING_DRIVER_TEMP_MESSAGES_BUFFER_SIZE";
pub const ENV_READ_FIFO_ERROR_RETRY_NUMBER: &str = "SPLUNK_LOGGING_DRIVER_FIFO_ERROR_RETRY_TIME";
pub const ENV_READ_FIFO_ERROR_BACKOFF: &str = "SPLUNK_LOGGING_DRIVER_FIFO_ERROR_BACKOFF";
pub const ENV_JSON_LOGS: &str = "SPLUNK_LOGGING_DRIVER_JSON_LOGS";
pub const ENV_POST_MESSAGES_TIMEOUT: &str = "SPLUNK_LOGGING_DRIVER_POST_MESSAGES_TIMEOUT";

/// Budget of consecutive decode errors before a stream is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeRetries {
    Unbounded,
    Limited(u32),
}

impl DecodeRetries {
    /// Maps the raw option value, where `-1` means retry forever.
    #[must_use]
    pub fn from_raw(value: i64) -> Option<Self> {
        match value {
            -1 => Some(DecodeRetries::Unbounded),
            n if n >= 0 => u32::try_from(n).ok().map(DecodeRetries::Limited),
            _ => None,
        }
    }

    /// Whether another retry is allowed after `attempts` retries already made.
    #[must_use]
    pub fn allows(&self, attempts: u32) -> bool {
        match self {
            DecodeRetries::Unbounded => true,
            DecodeRetries::Limited(max) => attempts < *max,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub post_messages_frequency: Duration,
    pub post_messages_batch_size: usize,
    pub buffer_maximum: usize,
    pub stream_channel_size: usize,
    pub partial_msg_buffer_hold_duration: Duration,
    pub partial_msg_buffer_maximum: usize,
    pub read_fifo_error_retry_number: DecodeRetries,
    pub read_fifo_error_backoff: Duration,
    pub json_logs: bool,
    pub post_messages_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            post_messages_frequency: DEFAULT_POST_MESSAGES_FREQUENCY,
            post_messages_batch_size: DEFAULT_POST_MESSAGES_BATCH_SIZE,
            buffer_maximum: DEFAULT_BUFFER_MAXIMUM,
            stream_channel_size: DEFAULT_STREAM_CHANNEL_SIZE,
            partial_msg_buffer_hold_duration: DEFAULT_PARTIAL_MSG_BUFFER_HOLD_DURATION,
            partial_msg_buffer_maximum: DEFAULT_PARTIAL_MSG_BUFFER_MAXIMUM,
            read_fifo_error_retry_number: DecodeRetries::Limited(
                DEFAULT_READ_FIFO_ERROR_RETRY_NUMBER as u32,
            ),
            read_fifo_error_backoff: DEFAULT_READ_FIFO_ERROR_BACKOFF,
            json_logs: DEFAULT_JSON_LOGS,
            post_messages_timeout: DEFAULT_POST_MESSAGES_TIMEOUT,
        }
    }
}

impl Config {
    /// Reads every option from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads every option through `lookup`, falling back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let retry_number = option_int(
            &lookup,
            ENV_READ_FIFO_ERROR_RETRY_NUMBER,
            DEFAULT_READ_FIFO_ERROR_RETRY_NUMBER,
        );
        let read_fifo_error_retry_number = DecodeRetries::from_raw(retry_number)
            .unwrap_or_else(|| {
                error!(
                    "{ENV_READ_FIFO_ERROR_RETRY_NUMBER} must be -1 or a positive number, got {retry_number}. Using default {DEFAULT_READ_FIFO_ERROR_RETRY_NUMBER}"
                );
                Config::default().read_fifo_error_retry_number
            });

        Config {
            post_messages_frequency: option_duration(
                &lookup,
                ENV_POST_MESSAGES_FREQUENCY,
                DEFAULT_POST_MESSAGES_FREQUENCY,
            ),
            post_messages_batch_size: option_size(
                &lookup,
                ENV_POST_MESSAGES_BATCH_SIZE,
                DEFAULT_POST_MESSAGES_BATCH_SIZE,
            ),
            buffer_maximum: option_size(&lookup, ENV_BUFFER_MAXIMUM, DEFAULT_BUFFER_MAXIMUM),
            stream_channel_size: option_size(
                &lookup,
                ENV_STREAM_CHANNEL_SIZE,
                DEFAULT_STREAM_CHANNEL_SIZE,
            ),
            partial_msg_buffer_hold_duration: option_duration(
                &lookup,
                ENV_PARTIAL_MSG_BUFFER_HOLD_DURATION,
                DEFAULT_PARTIAL_MSG_BUFFER_HOLD_DURATION,
            ),
            partial_msg_buffer_maximum: option_size(
                &lookup,
                ENV_PARTIAL_MSG_BUFFER_MAXIMUM,
                DEFAULT_PARTIAL_MSG_BUFFER_MAXIMUM,
            ),
            read_fifo_error_retry_number,
            read_fifo_error_backoff: option_duration(
                &lookup,
                ENV_READ_FIFO_ERROR_BACKOFF,
                DEFAULT_READ_FIFO_ERROR_BACKOFF,
            ),
            json_logs: option_bool(&lookup, ENV_JSON_LOGS, DEFAULT_JSON_LOGS),
            post_messages_timeout: option_duration(
                &lookup,
                ENV_POST_MESSAGES_TIMEOUT,
                DEFAULT_POST_MESSAGES_TIMEOUT,
            ),
        }
    }
}

/// Parses booleans with the spellings accepted by the plugin host.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn lookup_non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.is_empty())
}

fn option_duration<F>(lookup: &F, name: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup_non_empty(lookup, name) else {
        return default;
    };
    match humantime::parse_duration(value.trim()) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Failed to parse value of {name} as duration. Using default {default:?}. {e}");
            default
        }
    }
}

fn option_int<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup_non_empty(lookup, name) else {
        return default;
    };
    match value.trim().parse::<T>() {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Failed to parse value of {name} as integer. Using default {default}. {e}");
            default
        }
    }
}

/// Sizes of zero would stall batching or the queue, so they keep the default.
fn option_size<F>(lookup: &F, name: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    match option_int(lookup, name, default) {
        0 => {
            error!("{name} must be greater than zero. Using default {default}");
            default
        }
        size => size,
    }
}

fn option_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup_non_empty(lookup, name) else {
        return default;
    };
    match parse_bool(value.trim()) {
        Some(parsed) => parsed,
        None => {
            error!("Failed to parse value of {name} as boolean. Using default {default}");
            default
        }
    }
}
