// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per logger options handed over by the plugin host.
//!
//! Everything here is validated once when a logger is created. Any problem
//! is a [`ConfigError`] and the logger is never built.

use crate::config::parse_bool;
use crate::errors::ConfigError;
use crate::format::Format;
use regex::Regex;
use reqwest::Url;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

pub const SPLUNK_URL_KEY: &str = "splunk-url";
pub const SPLUNK_URL_PATH_KEY: &str = "splunk-url-path";
pub const SPLUNK_TOKEN_KEY: &str = "splunk-token";
pub const SPLUNK_SOURCE_KEY: &str = "splunk-source";
pub const SPLUNK_SOURCE_TYPE_KEY: &str = "splunk-sourcetype";
pub const SPLUNK_INDEX_KEY: &str = "splunk-index";
pub const SPLUNK_CA_PATH_KEY: &str = "splunk-capath";
pub const SPLUNK_CA_NAME_KEY: &str = "splunk-caname";
pub const SPLUNK_INSECURE_SKIP_VERIFY_KEY: &str = "splunk-insecureskipverify";
pub const SPLUNK_FORMAT_KEY: &str = "splunk-format";
pub const SPLUNK_VERIFY_CONNECTION_KEY: &str = "splunk-verify-connection";
pub const SPLUNK_GZIP_COMPRESSION_KEY: &str = "splunk-gzip";
pub const SPLUNK_GZIP_COMPRESSION_LEVEL_KEY: &str = "splunk-gzip-level";
pub const ENV_KEY: &str = "env";
pub const ENV_REGEX_KEY: &str = "env-regex";
pub const LABELS_KEY: &str = "labels";
pub const TAG_KEY: &str = "tag";

pub const SUPPORTED_KEYS: [&str; 17] = [
    SPLUNK_URL_KEY,
    SPLUNK_URL_PATH_KEY,
    SPLUNK_TOKEN_KEY,
    SPLUNK_SOURCE_KEY,
    SPLUNK_SOURCE_TYPE_KEY,
    SPLUNK_INDEX_KEY,
    SPLUNK_CA_PATH_KEY,
    SPLUNK_CA_NAME_KEY,
    SPLUNK_INSECURE_SKIP_VERIFY_KEY,
    SPLUNK_FORMAT_KEY,
    SPLUNK_VERIFY_CONNECTION_KEY,
    SPLUNK_GZIP_COMPRESSION_KEY,
    SPLUNK_GZIP_COMPRESSION_LEVEL_KEY,
    ENV_KEY,
    ENV_REGEX_KEY,
    LABELS_KEY,
    TAG_KEY,
];

pub const DEFAULT_URL_PATH: &str = "/services/collector/event/1.0";
pub const HEALTH_CHECK_PATH: &str = "/services/collector/health";
pub const DEFAULT_SOURCE_TYPE: &str = "splunk_connect_docker";
pub const DEFAULT_TAG_TEMPLATE: &str = "{{.ID}}";

/// Gzip levels accepted by `splunk-gzip-level`. `-1` selects the default.
pub const GZIP_LEVELS: std::ops::RangeInclusive<i32> = -1..=9;

/// Rejects any log option the driver does not know about.
pub fn validate_log_opts(opts: &HashMap<String, String>) -> Result<(), ConfigError> {
    match opts.keys().find(|key| !SUPPORTED_KEYS.contains(&key.as_str())) {
        Some(key) => Err(ConfigError::UnknownOption(key.clone())),
        None => Ok(()),
    }
}

/// What the plugin host knows about the container being logged.
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    pub container_id: String,
    pub container_name: String,
    pub container_image_name: String,
    pub container_image_id: String,
    pub hostname: Option<String>,
    pub config: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
}

impl ContainerInfo {
    /// Short container id, as shown by `docker ps`.
    #[must_use]
    pub fn id(&self) -> &str {
        truncate_id(&self.container_id)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.container_name.trim_start_matches('/')
    }

    fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|pair| pair.split_once('='))
    }

    /// Attributes taken from the labels and env vars the options name.
    pub fn extra_attributes(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut attrs = BTreeMap::new();

        if let Some(labels) = self.config.get(LABELS_KEY) {
            for name in comma_list(labels) {
                if let Some(value) = self.labels.get(name) {
                    attrs.insert(name.to_string(), value.clone());
                }
            }
        }

        if let Some(names) = self.config.get(ENV_KEY) {
            let wanted: Vec<&str> = comma_list(names).collect();
            for (key, value) in self.env_pairs() {
                if wanted.contains(&key) {
                    attrs.insert(key.to_string(), value.to_string());
                }
            }
        }

        if let Some(pattern) = self.config.get(ENV_REGEX_KEY) {
            let regex = Regex::new(pattern)?;
            for (key, value) in self.env_pairs() {
                if regex.is_match(key) {
                    attrs.insert(key.to_string(), value.to_string());
                }
            }
        }

        Ok(attrs)
    }

    /// Renders the `tag` option. An explicitly empty tag disables tagging.
    pub fn tag(&self) -> Result<String, ConfigError> {
        match self.config.get(TAG_KEY) {
            Some(template) if template.is_empty() => Ok(String::new()),
            Some(template) => render_tag(template, self),
            None => render_tag(DEFAULT_TAG_TEMPLATE, self),
        }
    }
}

fn truncate_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn comma_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn render_tag(template: &str, info: &ContainerInfo) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: TAG_KEY,
        value: template.to_string(),
    };

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(invalid)?;
        let value: &str = match after[..end].trim() {
            ".ID" => info.id(),
            ".FullID" => &info.container_id,
            ".Name" => info.name(),
            ".ImageName" => &info.container_image_name,
            ".ImageID" => truncate_id(info.container_image_id.trim_start_matches("sha256:")),
            ".ImageFullID" => &info.container_image_id,
            ".DaemonName" => "docker",
            _ => return Err(invalid()),
        };
        rendered.push_str(value);
        rest = &after[end + 2..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

/// Validated options of one logger instance.
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub container_id: String,
    pub url: Url,
    pub health_check_url: String,
    pub token: String,
    pub hostname: String,
    pub source: String,
    pub source_type: String,
    pub index: String,
    pub format: Format,
    pub gzip: bool,
    pub gzip_level: i32,
    pub insecure_skip_verify: bool,
    pub verify_connection: bool,
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
}

impl LoggerOptions {
    pub fn from_info(info: &ContainerInfo) -> Result<Self, ConfigError> {
        let config = &info.config;
        validate_log_opts(config)?;

        let hostname = info
            .hostname
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or(ConfigError::MissingHostname)?;

        let url = parse_url(config)?;
        let health_check_url = compose_health_check_url(&url);

        let token = config
            .get(SPLUNK_TOKEN_KEY)
            .cloned()
            .ok_or(ConfigError::MissingOption(SPLUNK_TOKEN_KEY))?;

        let insecure_skip_verify = bool_option(config, SPLUNK_INSECURE_SKIP_VERIFY_KEY)?;
        if insecure_skip_verify {
            warn!("{SPLUNK_INSECURE_SKIP_VERIFY_KEY} is set but certificates are always verified");
        }
        for key in [SPLUNK_CA_PATH_KEY, SPLUNK_CA_NAME_KEY] {
            if config.contains_key(key) {
                warn!("{key} is not supported by this forwarder and is ignored");
            }
        }

        let gzip = bool_option(config, SPLUNK_GZIP_COMPRESSION_KEY)?;
        let gzip_level = match config.get(SPLUNK_GZIP_COMPRESSION_LEVEL_KEY) {
            None => -1,
            Some(raw) => {
                let level: i32 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: SPLUNK_GZIP_COMPRESSION_LEVEL_KEY,
                    value: raw.clone(),
                })?;
                if !GZIP_LEVELS.contains(&level) {
                    return Err(ConfigError::CompressionLevel(raw.clone()));
                }
                level
            }
        };

        let source_type = match config.get(SPLUNK_SOURCE_TYPE_KEY) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => DEFAULT_SOURCE_TYPE.to_string(),
        };

        let format = match config.get(SPLUNK_FORMAT_KEY) {
            Some(value) => value.parse()?,
            None => Format::Inline,
        };

        Ok(LoggerOptions {
            container_id: info.container_id.clone(),
            url,
            health_check_url,
            token,
            hostname,
            source: config.get(SPLUNK_SOURCE_KEY).cloned().unwrap_or_default(),
            source_type,
            index: config.get(SPLUNK_INDEX_KEY).cloned().unwrap_or_default(),
            format,
            gzip,
            gzip_level,
            insecure_skip_verify,
            verify_connection: bool_option(config, SPLUNK_VERIFY_CONNECTION_KEY)?,
            tag: info.tag()?,
            attrs: info.extra_attributes()?,
        })
    }
}

fn bool_option(config: &HashMap<String, String>, key: &'static str) -> Result<bool, ConfigError> {
    match config.get(key) {
        None => Ok(false),
        Some(value) => parse_bool(value).ok_or_else(|| ConfigError::InvalidValue {
            key,
            value: value.clone(),
        }),
    }
}

/// Accepts `scheme://host[:port]` with an optional trailing slash and sets
/// the collector path on it.
fn parse_url(config: &HashMap<String, String>) -> Result<Url, ConfigError> {
    let raw = config
        .get(SPLUNK_URL_KEY)
        .ok_or(ConfigError::MissingOption(SPLUNK_URL_KEY))?;

    let mut url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl {
        key: SPLUNK_URL_KEY,
        value: raw.clone(),
    })?;

    let scheme_ok = matches!(url.scheme(), "http" | "https");
    let path_ok = matches!(url.path(), "" | "/");
    let query_ok = url.query().map_or(true, str::is_empty);
    let fragment_ok = url.fragment().map_or(true, str::is_empty);
    if !scheme_ok || url.host_str().is_none() || !path_ok || !query_ok || !fragment_ok {
        return Err(ConfigError::UrlFormat(SPLUNK_URL_KEY));
    }
    url.set_query(None);
    url.set_fragment(None);

    match config.get(SPLUNK_URL_PATH_KEY) {
        None => url.set_path(DEFAULT_URL_PATH),
        Some(path) if path.starts_with('/') => url.set_path(path),
        Some(_) => return Err(ConfigError::UrlPathFormat(SPLUNK_URL_PATH_KEY)),
    }
    Ok(url)
}

fn compose_health_check_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}{HEALTH_CHECK_PATH}", url.scheme()),
        None => format!("{}://{host}{HEALTH_CHECK_PATH}", url.scheme()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn info(opts: &[(&str, &str)]) -> ContainerInfo {
        ContainerInfo {
            container_id: "0123456789abcdef0123".to_string(),
            container_name: "/web".to_string(),
            container_image_name: "nginx:latest".to_string(),
            container_image_id: "sha256:feedfacecafebeef00".to_string(),
            hostname: Some("docker-host".to_string()),
            config: opts
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            labels: HashMap::new(),
            env: Vec::new(),
        }
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            (SPLUNK_URL_KEY, "https://splunk.example.com:8088"),
            (SPLUNK_TOKEN_KEY, "00000000-0000-0000-0000-000000000000"),
        ]
    }

    fn with(extra: &[(&'static str, &'static str)]) -> ContainerInfo {
        let mut opts = required();
        opts.extend_from_slice(extra);
        info(&opts)
    }

    #[test]
    fn test_defaults() {
        let options = LoggerOptions::from_info(&with(&[])).unwrap();
        assert_eq!(
            options.url.as_str(),
            "https://splunk.example.com:8088/services/collector/event/1.0"
        );
        assert_eq!(
            options.health_check_url,
            "https://splunk.example.com:8088/services/collector/health"
        );
        assert_eq!(options.source_type, DEFAULT_SOURCE_TYPE);
        assert_eq!(options.format, Format::Inline);
        assert_eq!(options.tag, "0123456789ab");
        assert_eq!(options.hostname, "docker-host");
        assert!(!options.gzip);
        assert_eq!(options.gzip_level, -1);
        assert!(!options.verify_connection);
        assert!(options.attrs.is_empty());
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let err = LoggerOptions::from_info(&with(&[("splunk-colour", "blue")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption(key) if key == "splunk-colour"));
    }

    #[test]
    fn test_required_options() {
        let err = LoggerOptions::from_info(&info(&[(SPLUNK_TOKEN_KEY, "t")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption(SPLUNK_URL_KEY)));

        let err =
            LoggerOptions::from_info(&info(&[(SPLUNK_URL_KEY, "http://h:8088")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption(SPLUNK_TOKEN_KEY)));

        let mut no_host = with(&[]);
        no_host.hostname = None;
        assert!(matches!(
            LoggerOptions::from_info(&no_host).unwrap_err(),
            ConfigError::MissingHostname
        ));
    }

    #[test]
    fn test_url_validation() {
        for bad in [
            "ftp://splunk:8088",
            "http://splunk:8088/path",
            "http://splunk:8088/?a=b",
            "http://splunk:8088/#frag",
        ] {
            let err = LoggerOptions::from_info(&info(&[
                (SPLUNK_URL_KEY, bad),
                (SPLUNK_TOKEN_KEY, "t"),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::UrlFormat(_)), "{bad}: {err}");
        }

        let err = LoggerOptions::from_info(&info(&[
            (SPLUNK_URL_KEY, "not a url"),
            (SPLUNK_TOKEN_KEY, "t"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));

        let options = LoggerOptions::from_info(&info(&[
            (SPLUNK_URL_KEY, "http://splunk/"),
            (SPLUNK_TOKEN_KEY, "t"),
            (SPLUNK_URL_PATH_KEY, "/services/collector/raw"),
        ]))
        .unwrap();
        assert_eq!(options.url.as_str(), "http://splunk/services/collector/raw");
        assert_eq!(
            options.health_check_url,
            "http://splunk/services/collector/health"
        );

        let err =
            LoggerOptions::from_info(&with(&[(SPLUNK_URL_PATH_KEY, "services/collector")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::UrlPathFormat(_)));
    }

    #[test]
    fn test_gzip_level() {
        let options = LoggerOptions::from_info(&with(&[
            (SPLUNK_GZIP_COMPRESSION_KEY, "true"),
            (SPLUNK_GZIP_COMPRESSION_LEVEL_KEY, "9"),
        ]))
        .unwrap();
        assert!(options.gzip);
        assert_eq!(options.gzip_level, 9);

        let err = LoggerOptions::from_info(&with(&[(SPLUNK_GZIP_COMPRESSION_LEVEL_KEY, "10")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::CompressionLevel(level) if level == "10"));

        let err = LoggerOptions::from_info(&with(&[(SPLUNK_GZIP_COMPRESSION_LEVEL_KEY, "-2")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::CompressionLevel(_)));

        let err = LoggerOptions::from_info(&with(&[(SPLUNK_GZIP_COMPRESSION_KEY, "yes")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = LoggerOptions::from_info(&with(&[(SPLUNK_FORMAT_KEY, "xml")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFormat(f) if f == "xml"));

        let options = LoggerOptions::from_info(&with(&[(SPLUNK_FORMAT_KEY, "raw")])).unwrap();
        assert_eq!(options.format, Format::Raw);
    }

    #[test]
    fn test_tag_rendering() {
        let options = LoggerOptions::from_info(&with(&[(TAG_KEY, "")])).unwrap();
        assert_eq!(options.tag, "");

        let options = LoggerOptions::from_info(&with(&[(
            TAG_KEY,
            "{{.Name}}/{{.ImageName}}/{{ .FullID }}",
        )]))
        .unwrap();
        assert_eq!(options.tag, "web/nginx:latest/0123456789abcdef0123");

        let options = LoggerOptions::from_info(&with(&[(TAG_KEY, "{{.ImageID}}")])).unwrap();
        assert_eq!(options.tag, "feedfacecafe");

        let err = LoggerOptions::from_info(&with(&[(TAG_KEY, "{{.Nope}}")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: TAG_KEY, .. }));
    }

    #[test]
    fn test_extra_attributes() {
        let mut info = with(&[
            (LABELS_KEY, "team,missing"),
            (ENV_KEY, "STAGE"),
            (ENV_REGEX_KEY, "^APP_"),
        ]);
        info.labels.insert("team".to_string(), "core".to_string());
        info.labels.insert("other".to_string(), "x".to_string());
        info.env = vec![
            "STAGE=prod".to_string(),
            "APP_VERSION=1.2".to_string(),
            "PATH=/bin".to_string(),
        ];

        let options = LoggerOptions::from_info(&info).unwrap();
        let expected: BTreeMap<String, String> = [
            ("team", "core"),
            ("STAGE", "prod"),
            ("APP_VERSION", "1.2"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(options.attrs, expected);
    }

    #[test]
    fn test_invalid_env_regex() {
        let err = LoggerOptions::from_info(&with(&[(ENV_REGEX_KEY, "(")])).unwrap_err();
        assert!(matches!(err, ConfigError::EnvRegex(_)));
    }
}
