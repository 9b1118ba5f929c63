// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Records flowing through the pipeline.
//!
//! [`LogEntry`] is the unit decoded from the container log stream. Several
//! partial entries are folded into one [`AssembledMessage`] before delivery.

/// Log entry as written by the container runtime on the log stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LogEntry {
    #[prost(string, tag = "1")]
    pub source: String,
    #[prost(int64, tag = "2")]
    pub time_nano: i64,
    #[prost(bytes = "vec", tag = "3")]
    pub line: Vec<u8>,
    #[prost(bool, tag = "4")]
    pub partial: bool,
    #[prost(message, optional, tag = "5")]
    pub partial_log_metadata: Option<PartialLogEntryMetadata>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PartialLogEntryMetadata {
    #[prost(bool, tag = "1")]
    pub last: bool,
    #[prost(string, tag = "2")]
    pub id: String,
    #[prost(int32, tag = "3")]
    pub ordinal: i32,
}

/// A complete (or forcibly flushed) log line ready for the sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    pub line: Vec<u8>,
    pub source: String,
    pub timestamp_nanos: i64,
    /// Carried from the entry that triggered the flush. `true` means the line
    /// was forced out by size or time before its producer completed it.
    pub partial: bool,
}

impl AssembledMessage {
    /// Unix time with fractional seconds, the `time` field of an envelope.
    #[must_use]
    pub fn epoch_seconds(&self) -> String {
        let sign = if self.timestamp_nanos < 0 { "-" } else { "" };
        // rounded to the microsecond
        let micros = (u128::from(self.timestamp_nanos.unsigned_abs()) + 500) / 1_000;
        format!("{sign}{}.{:06}", micros / 1_000_000, micros % 1_000_000)
    }
}
