// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire shape of the events posted to the HTTP Event Collector.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HecMessage {
    pub event: Event,
    pub time: String,
    pub host: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(rename = "sourcetype", skip_serializing_if = "String::is_empty")]
    pub source_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub index: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

/// Payload of an envelope. The variant depends on the configured format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    Line(LineEvent),
    Raw(String),
    Json(RawJson),
    /// A `hec` line without an `event` key, sent as `null`.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Line {
    Text(String),
    Json(RawJson),
}

/// JSON copied from the log line as written, never re-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawJson(Box<RawValue>);

impl RawJson {
    /// Returns `None` unless `bytes` hold exactly one JSON value.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Box<RawValue>>(bytes).ok().map(RawJson)
    }

    #[must_use]
    pub fn get(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for RawJson {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineEvent {
    pub line: Line,
    pub source: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tag: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

/// Fields a `hec` formatted line may carry to override the template.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct HecOverride {
    pub event: Option<RawJson>,
    pub time: Option<String>,
    pub host: Option<String>,
    pub source: Option<String>,
    pub sourcetype: Option<String>,
    pub index: Option<String>,
    pub fields: Option<BTreeMap<String, String>>,
}

/// Per logger values copied into every envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pub host: String,
    pub source: String,
    pub source_type: String,
    pub index: String,
}

impl MessageTemplate {
    #[must_use]
    pub fn instantiate(&self, time: String, event: Event) -> HecMessage {
        HecMessage {
            event,
            time,
            host: self.host.clone(),
            source: self.source.clone(),
            source_type: self.source_type.clone(),
            index: self.index.clone(),
            fields: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> MessageTemplate {
        MessageTemplate {
            host: "web-1".to_string(),
            source: String::new(),
            source_type: "splunk_connect_docker".to_string(),
            index: String::new(),
        }
    }

    #[test]
    fn test_empty_optional_fields_are_omitted() {
        let message = template().instantiate("1.000000".to_string(), Event::Raw("hi".to_string()));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "hi",
                "time": "1.000000",
                "host": "web-1",
                "sourcetype": "splunk_connect_docker",
            })
        );
    }

    #[test]
    fn test_line_event_shape() {
        let mut attrs = BTreeMap::new();
        attrs.insert("env".to_string(), "prod".to_string());
        let event = Event::Line(LineEvent {
            line: Line::Text("hello".to_string()),
            source: "stdout".to_string(),
            tag: "abc123".to_string(),
            attrs,
        });
        let mut message = template().instantiate("2.500000".to_string(), event);
        message.index = "main".to_string();

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value["event"],
            json!({"line": "hello", "source": "stdout", "tag": "abc123", "attrs": {"env": "prod"}})
        );
        assert_eq!(value["index"], "main");
        assert!(value.get("fields").is_none());
    }

    #[test]
    fn test_serialized_envelope_has_no_newlines() {
        let message = template().instantiate(
            "3.000000".to_string(),
            Event::Raw("multi\nline".to_string()),
        );
        let bytes = serde_json::to_vec(&message).unwrap();
        assert!(!bytes.contains(&b'\n'));
    }

    #[test]
    fn test_raw_json_keeps_the_original_text() {
        let text = r#"{"zeta":1,"alpha":12345678901234567890123,"n":1e2}"#;
        let raw = RawJson::parse(text.as_bytes()).unwrap();
        assert_eq!(raw.get(), text);
        assert_eq!(serde_json::to_string(&raw).unwrap(), text);

        assert!(RawJson::parse(b"not json").is_none());
        assert!(RawJson::parse(b"{\"a\":1} trailing").is_none());
    }
}
