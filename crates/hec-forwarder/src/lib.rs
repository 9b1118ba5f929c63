// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwarding of container log streams to an HTTP Event Collector.
//!
//! ```text
//!   length-prefixed records
//!          │
//!          v
//!   RecordStreamReader ──> PartialLineAssembler ──> Sink(s)
//!                                                     │
//!                                        HecLogger ───┤
//!                                                     v
//!                                   DeliveryQueue ──> worker ──> HecClient ──> collector
//! ```
//!
//! - [`processor`]: one loop per container stream, feeding the sinks
//! - [`logger`]: the HEC sink and its delivery worker
//! - [`hec_client`]: batching, compression, retry and drop policy
//! - [`config`] and [`options`]: process wide settings and per logger options

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]

pub mod config;
pub mod envelope;
pub mod errors;
pub mod format;
pub mod hec_client;
pub mod http;
pub mod logger;
pub mod options;
pub mod partial;
pub mod processor;
pub mod queue;
pub mod reader;
pub mod record;
pub mod sink;

pub use config::Config;
pub use logger::HecLogger;
pub use options::{ContainerInfo, LoggerOptions};
pub use processor::{LogPair, MessageProcessor};
