// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Conversion of assembled lines into envelopes, one shape per format.

use crate::envelope::{Event, HecMessage, HecOverride, Line, LineEvent, MessageTemplate, RawJson};
use crate::errors::ConfigError;
use crate::options::LoggerOptions;
use crate::record::AssembledMessage;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// The line as a string inside an event object.
    #[default]
    Inline,
    /// Like `Inline`, with lines holding JSON embedded as JSON.
    Json,
    /// Lines are partial envelopes that override the template.
    Hec,
    /// The line as a plain string, prefixed with the tag and attributes.
    Raw,
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inline" => Ok(Format::Inline),
            "json" => Ok(Format::Json),
            "hec" => Ok(Format::Hec),
            "raw" => Ok(Format::Raw),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Inline => "inline",
            Format::Json => "json",
            Format::Hec => "hec",
            Format::Raw => "raw",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    format: Format,
    template: MessageTemplate,
    tag: String,
    attrs: BTreeMap<String, String>,
    raw_prefix: String,
}

impl EnvelopeBuilder {
    #[must_use]
    pub fn new(
        format: Format,
        template: MessageTemplate,
        tag: String,
        attrs: BTreeMap<String, String>,
    ) -> Self {
        let mut raw_prefix = String::new();
        if !tag.is_empty() {
            raw_prefix.push_str(&tag);
            raw_prefix.push(' ');
        }
        for (key, value) in &attrs {
            raw_prefix.push_str(key);
            raw_prefix.push('=');
            raw_prefix.push_str(value);
            raw_prefix.push(' ');
        }
        EnvelopeBuilder {
            format,
            template,
            tag,
            attrs,
            raw_prefix,
        }
    }

    #[must_use]
    pub fn from_options(options: &LoggerOptions) -> Self {
        let template = MessageTemplate {
            host: options.hostname.clone(),
            source: options.source.clone(),
            source_type: options.source_type.clone(),
            index: options.index.clone(),
        };
        Self::new(
            options.format,
            template,
            options.tag.clone(),
            options.attrs.clone(),
        )
    }

    pub fn build(&self, message: &AssembledMessage) -> HecMessage {
        let time = message.epoch_seconds();
        match self.format {
            Format::Inline => {
                let line = Line::Text(lossy(&message.line));
                self.template.instantiate(time, self.line_event(line, message))
            }
            Format::Json => {
                let line = RawJson::parse(&message.line)
                    .map_or_else(|| Line::Text(lossy(&message.line)), Line::Json);
                self.template.instantiate(time, self.line_event(line, message))
            }
            Format::Hec => match serde_json::from_slice::<HecOverride>(&message.line) {
                Ok(overrides) => self.apply_overrides(time, overrides),
                Err(_) => {
                    let line = Line::Text(lossy(&message.line));
                    self.template.instantiate(time, self.line_event(line, message))
                }
            },
            Format::Raw => {
                let mut event = self.raw_prefix.clone();
                event.push_str(&lossy(&message.line));
                self.template.instantiate(time, Event::Raw(event))
            }
        }
    }

    fn line_event(&self, line: Line, message: &AssembledMessage) -> Event {
        Event::Line(LineEvent {
            line,
            source: message.source.clone(),
            tag: self.tag.clone(),
            attrs: self.attrs.clone(),
        })
    }

    fn apply_overrides(&self, time: String, overrides: HecOverride) -> HecMessage {
        let event = overrides.event.map_or(Event::Empty, Event::Json);
        let mut message = self.template.instantiate(time, event);
        if let Some(time) = overrides.time {
            message.time = time;
        }
        if let Some(host) = overrides.host {
            message.host = host;
        }
        if let Some(source) = overrides.source {
            message.source = source;
        }
        if let Some(source_type) = overrides.sourcetype {
            message.source_type = source_type;
        }
        if let Some(index) = overrides.index {
            message.index = index;
        }

        let mut fields = overrides.fields.unwrap_or_default();
        fields.extend(self.attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
        if !self.tag.is_empty() {
            fields.insert("container_tag".to_string(), self.tag.clone());
        }
        message.fields = fields;
        message
    }
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}
