// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch delivery to the HTTP Event Collector.
//!
//! ```text
//!   pending envelopes
//!          │ split into sub-batches of `batch_size`
//!          v
//!   ┌─────────────┐
//!   │  Serialize  │ (JSON objects back to back)
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │  Compress   │ (gzip, optional)
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │  HTTP POST  │ (one sub-batch in flight, in order)
//!   └──────┬──────┘
//!          v
//!   failed tail kept for the next trigger, or logged and dropped
//! ```

use crate::config::Config;
use crate::envelope::HecMessage;
use crate::errors::DeliveryError;
use crate::options::LoggerOptions;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::io::Write;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct HecClient {
    client: reqwest::Client,
    url: String,
    health_check_url: String,
    auth: String,
    compression: Option<Compression>,
    batch_size: usize,
    buffer_maximum: usize,
}

impl HecClient {
    #[must_use]
    pub fn new(client: reqwest::Client, options: &LoggerOptions, config: &Config) -> Self {
        let compression = options.gzip.then(|| {
            u32::try_from(options.gzip_level).map_or(Compression::default(), Compression::new)
        });
        HecClient {
            client,
            url: options.url.to_string(),
            health_check_url: options.health_check_url.clone(),
            auth: format!("Splunk {}", options.token),
            compression,
            batch_size: config.post_messages_batch_size.max(1),
            buffer_maximum: config.buffer_maximum,
        }
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Posts `messages` in sub-batches and returns the envelopes that still
    /// need delivering.
    ///
    /// The first failing sub-batch stops the attempt. Its tail is returned
    /// for a later retry unless it has reached the buffer maximum or this is
    /// the last chance, in which case every envelope of the tail is written
    /// to the log and dropped.
    pub async fn post_messages(
        &self,
        mut messages: Vec<HecMessage>,
        last_chance: bool,
    ) -> Vec<HecMessage> {
        let total = messages.len();
        debug!("Received {total} messages.");

        let mut start = 0;
        while start < total {
            let end = (start + self.batch_size).min(total);
            if let Err(e) = self.try_post_messages(&messages[start..end]).await {
                error!("{e}");
                if total - start >= self.buffer_maximum || last_chance {
                    for message in &messages[start..] {
                        match serde_json::to_string(message) {
                            Ok(json) => error!("Failed to send a message '{json}'"),
                            Err(e) => error!("Failed to serialize message: {e}"),
                        }
                    }
                    return Vec::new();
                }
                debug!("{} messages failed to send", total - start);
                return messages.split_off(start);
            }
            start = end;
        }

        debug!("{total} messages were sent successfully");
        Vec::new()
    }

    /// Sends one sub-batch in a single request.
    pub async fn try_post_messages(&self, messages: &[HecMessage]) -> Result<(), DeliveryError> {
        if messages.is_empty() {
            debug!("No message to post");
            return Ok(());
        }

        let mut payload = Vec::new();
        for message in messages {
            match serde_json::to_vec(message) {
                Ok(json) => payload.extend_from_slice(&json),
                Err(e) => error!("Dropping message that cannot be serialized: {e}"),
            }
        }

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, &self.auth);

        if let Some(level) = self.compression {
            let mut encoder = GzEncoder::new(Vec::new(), level);
            encoder.write_all(&payload)?;
            payload = encoder.finish()?;
            request = request.header(CONTENT_ENCODING, "gzip");
        }

        let response = request.body(payload).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }
        Ok(())
    }

    /// Unauthenticated health check against the collector.
    pub async fn verify_connection(&self) -> Result<(), DeliveryError> {
        let response = self
            .client
            .request(Method::OPTIONS, &self.health_check_url)
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Verification { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::envelope::{Event, MessageTemplate};
    use crate::options::ContainerInfo;
    use flate2::read::GzDecoder;
    use mockito::{Matcher, Server};
    use std::io::Read;
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    pub(crate) const PATH: &str = "/services/collector/event/1.0";

    pub(crate) fn options(url: &str, extra: &[(&str, &str)]) -> LoggerOptions {
        let mut config: std::collections::HashMap<String, String> = [
            ("splunk-url", url),
            ("splunk-token", "secret"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        config.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        LoggerOptions::from_info(&ContainerInfo {
            container_id: "0123456789abcdef".to_string(),
            hostname: Some("host".to_string()),
            config,
            ..ContainerInfo::default()
        })
        .unwrap()
    }

    pub(crate) fn client(url: &str, batch_size: usize, buffer_maximum: usize) -> HecClient {
        let config = Config {
            post_messages_batch_size: batch_size,
            buffer_maximum,
            ..Config::default()
        };
        HecClient::new(reqwest::Client::new(), &options(url, &[]), &config)
    }

    pub(crate) fn envelope(event: &str) -> HecMessage {
        MessageTemplate {
            host: "host".to_string(),
            source: String::new(),
            source_type: "splunk_connect_docker".to_string(),
            index: String::new(),
        }
        .instantiate("1.000000".to_string(), Event::Raw(event.to_string()))
    }

    pub(crate) fn events_of(body: &[u8]) -> Vec<String> {
        serde_json::Deserializer::from_slice(body)
            .into_iter::<serde_json::Value>()
            .map(|v| v.unwrap()["event"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_posts_concatenated_envelopes() {
        let mut server = Server::new_async().await;
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let captured = bodies.clone();
        let mock = server
            .mock("POST", PATH)
            .match_header("Authorization", "Splunk secret")
            .match_header("Content-Type", "application/json")
            .match_header("Content-Encoding", Matcher::Missing)
            .with_status(200)
            .with_body_from_request(move |request| {
                captured.lock().unwrap().push(request.body().unwrap().clone());
                b"{\"text\":\"Success\",\"code\":0}".to_vec()
            })
            .expect(1)
            .create_async()
            .await;

        let hec = client(&server.url(), 10, 100);
        let remaining = hec
            .post_messages(vec![envelope("a"), envelope("b")], false)
            .await;

        assert!(remaining.is_empty());
        mock.assert_async().await;
        let bodies = bodies.lock().unwrap();
        assert!(!bodies[0].contains(&b'\n'));
        assert_eq!(events_of(&bodies[0]), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_gzip_payload() {
        let mut server = Server::new_async().await;
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let captured = bodies.clone();
        let mock = server
            .mock("POST", PATH)
            .match_header("Content-Encoding", "gzip")
            .with_status(200)
            .with_body_from_request(move |request| {
                captured.lock().unwrap().push(request.body().unwrap().clone());
                Vec::new()
            })
            .expect(1)
            .create_async()
            .await;

        let options = options(
            &server.url(),
            &[("splunk-gzip", "true"), ("splunk-gzip-level", "9")],
        );
        let hec = HecClient::new(reqwest::Client::new(), &options, &Config::default());
        hec.try_post_messages(&[envelope("zipped")]).await.unwrap();

        mock.assert_async().await;
        let bodies = bodies.lock().unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(bodies[0].as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(events_of(&decoded), vec!["zipped"]);
    }

    #[tokio::test]
    async fn test_non_ok_status_is_failure_with_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(403)
            .with_body("{\"text\":\"Invalid token\",\"code\":4}")
            .create_async()
            .await;

        let hec = client(&server.url(), 10, 100);
        let err = hec.try_post_messages(&[envelope("a")]).await.unwrap_err();
        match err {
            DeliveryError::Status { status, body } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert!(body.contains("Invalid token"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_failed_tail_is_kept_for_retry() {
        let mut server = Server::new_async().await;
        let _ok = server
            .mock("POST", PATH)
            .match_body(Matcher::Regex("\"first\"".to_string()))
            .with_status(200)
            .create_async()
            .await;
        let _fail = server
            .mock("POST", PATH)
            .match_body(Matcher::Regex("\"second\"".to_string()))
            .with_status(503)
            .create_async()
            .await;

        let hec = client(&server.url(), 1, 100);
        let remaining = hec
            .post_messages(
                vec![envelope("first"), envelope("second"), envelope("third")],
                false,
            )
            .await;

        let events: Vec<_> = remaining
            .iter()
            .map(|m| serde_json::to_value(m).unwrap()["event"].clone())
            .collect();
        assert_eq!(events, vec!["second", "third"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_tail_over_buffer_maximum_is_logged_and_dropped() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let hec = client(&server.url(), 2, 3);
        let remaining = hec
            .post_messages(
                vec![envelope("m1"), envelope("m2"), envelope("m3"), envelope("m4")],
                false,
            )
            .await;

        assert!(remaining.is_empty());
        mock.assert_async().await;
        assert!(logs_contain("Failed to send a message"));
        assert!(logs_contain("\"event\":\"m4\""));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_last_chance_drops_everything_left() {
        let mut server = Server::new_async().await;
        let _mock = server.mock("POST", PATH).with_status(500).create_async().await;

        let hec = client(&server.url(), 10, 1_000);
        let remaining = hec.post_messages(vec![envelope("late")], true).await;

        assert!(remaining.is_empty());
        assert!(logs_contain("\"event\":\"late\""));
    }

    #[tokio::test]
    async fn test_transport_error_is_failure() {
        // nothing listens on the discard port
        let hec = client("http://127.0.0.1:9", 10, 100);
        let remaining = hec.post_messages(vec![envelope("a")], false).await;
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_verify_connection() {
        let mut server = Server::new_async().await;
        let healthy = server
            .mock("OPTIONS", "/services/collector/health")
            .match_header("Authorization", Matcher::Missing)
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let hec = client(&server.url(), 10, 100);
        hec.verify_connection().await.unwrap();
        healthy.assert_async().await;

        let mut down = Server::new_async().await;
        let _unhealthy = down
            .mock("OPTIONS", "/services/collector/health")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;
        let hec = client(&down.url(), 10, 100);
        let err = hec.verify_connection().await.unwrap_err();
        assert!(
            matches!(err, DeliveryError::Verification { status, ref body } if status == StatusCode::SERVICE_UNAVAILABLE && body == "unavailable")
        );
    }
}
