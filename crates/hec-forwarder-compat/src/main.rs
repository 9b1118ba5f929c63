// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{collections::HashMap, env, process, sync::Arc};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use hec_forwarder::{
    options::SUPPORTED_KEYS, Config, ContainerInfo, HecLogger, LogPair, LoggerOptions,
    MessageProcessor,
};

const ENV_PREFIX: &str = "HEC_FORWARDER_";
const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// `splunk-url` is read from `HEC_FORWARDER_SPLUNK_URL`.
fn option_env_name(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_uppercase().replace('-', "_"))
}

fn container_info() -> ContainerInfo {
    let var = |name: &str| env::var(format!("{ENV_PREFIX}{name}")).ok();

    let config: HashMap<String, String> = SUPPORTED_KEYS
        .iter()
        .filter_map(|key| {
            env::var(option_env_name(key))
                .ok()
                .map(|value| (key.to_string(), value))
        })
        .collect();

    ContainerInfo {
        container_id: var("CONTAINER_ID").unwrap_or_else(|| "hec-forwarder".to_string()),
        container_name: var("CONTAINER_NAME").unwrap_or_default(),
        container_image_name: var("IMAGE_NAME").unwrap_or_default(),
        container_image_id: var("IMAGE_ID").unwrap_or_default(),
        hostname: var("HOSTNAME").or_else(|| env::var("HOSTNAME").ok()),
        config,
        labels: HashMap::new(),
        env: env::vars().map(|(k, v)| format!("{k}={v}")).collect(),
    }
}

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    if !LOG_LEVELS.contains(&log_level.as_str()) {
        eprintln!("invalid log level: {log_level}");
        process::exit(1);
    }

    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = Config::from_env();
    let info = container_info();

    let options = match LoggerOptions::from_info(&info) {
        Ok(options) => options,
        Err(e) => {
            error!("Error creating logger options: {e}");
            process::exit(1);
        }
    };
    let logger = match HecLogger::new(&options, &config).await {
        Ok(logger) => logger,
        Err(e) => {
            error!("Error creating HEC logger: {e}");
            process::exit(1);
        }
    };

    let pair = LogPair {
        container_id: info.container_id.clone(),
        primary: Arc::new(logger),
        mirror: None,
    };
    let processor = MessageProcessor::new(&config);

    match env::var(format!("{ENV_PREFIX}INPUT")) {
        Ok(path) => {
            let file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    error!("Unable to open log stream {path}: {e}");
                    pair.close().await;
                    process::exit(1);
                }
            };
            info!("Forwarding log stream from {path}");
            processor.consume_log(file, &pair).await;
        }
        Err(_) => {
            info!("Forwarding log stream from stdin");
            processor.consume_log(tokio::io::stdin(), &pair).await;
        }
    }

    info!("Log stream ended, all messages flushed");
}
