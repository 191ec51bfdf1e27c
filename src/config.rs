// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration loaded from `NETBOX_PDNS_`-prefixed environment variables.
//!
//! Every field is read and validated exactly once at process start; there is
//! no late binding. A validation failure aborts startup with a message that
//! names the offending variable.
//!
//! # Required variables
//!
//! - `NETBOX_PDNS_API_KEY` - secret authenticating inbound webhooks
//! - `NETBOX_PDNS_NB_URL` - NetBox base URL (http/https)
//! - `NETBOX_PDNS_NB_TOKEN` - NetBox API token
//! - `NETBOX_PDNS_NB_NS_ID` - NetBox id of this instance's Nameserver object
//! - `NETBOX_PDNS_PDNS_URL` - PowerDNS API base URL (http/https)
//! - `NETBOX_PDNS_PDNS_TOKEN` - PowerDNS API key
//!
//! Optional variables cover the webhook HMAC secret, sync schedule, log
//! level, PowerDNS server id, the managed record-type set, and the MQTT
//! subscriber block.

use crate::errors::ConfigError;
use crate::model::{default_managed_types, parse_managed_types};
use std::collections::HashSet;
use url::Url;

/// Prefix applied to every environment variable this engine reads.
pub const ENV_PREFIX: &str = "NETBOX_PDNS_";

/// Default full-sync schedule: every 15 minutes.
pub const DEFAULT_SYNC_CRONTAB: &str = "*/15 * * * *";

/// Log levels accepted by `NETBOX_PDNS_LOG_LEVEL`.
const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// MQTT subscriber settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Whether the subscriber runs at all
    pub enabled: bool,
    /// Broker URL, scheme `mqtt` (plain) or `mqtts` (TLS)
    pub broker_url: String,
    /// Client identifier presented to the broker (1-23 chars)
    pub client_id: String,
    /// Topic prefix under which zone events are published
    pub topic_prefix: String,
    /// Subscription quality of service (0, 1, or 2)
    pub qos: u8,
    /// Keepalive interval in seconds (10-3600)
    pub keepalive: u64,
    /// Initial reconnect delay in seconds (1-300); doubles per failure
    pub reconnect_delay: u64,
    /// Broker username; requires `password`
    pub username: Option<String>,
    /// Broker password; requires `username`
    pub password: Option<String>,
}

/// The complete, validated configuration record.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secret expected in the `x-netbox-pdns-api-key` webhook header
    pub api_key: String,
    /// Optional HMAC-SHA256 secret for webhook body signatures
    pub webhook_secret: Option<String>,
    /// 5-field crontab expression for the periodic full sync
    pub sync_crontab: String,
    /// Console log level (uppercased)
    pub log_level: String,
    /// NetBox base URL, trailing slash stripped
    pub nb_url: String,
    /// NetBox API token
    pub nb_token: String,
    /// NetBox id of the Nameserver object owned by this instance
    pub nb_ns_id: u64,
    /// PowerDNS API base URL, trailing slash stripped
    pub pdns_url: String,
    /// PowerDNS API key
    pub pdns_token: String,
    /// PowerDNS server identifier in API paths
    pub pdns_server_id: String,
    /// RR types this engine is allowed to mutate on the replica
    pub managed_types: HashSet<String>,
    /// MQTT subscriber block
    pub mqtt: MqttConfig,
}

impl Config {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first variable that is missing or
    /// invalid. Callers treat this as fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// `from_env` delegates here; tests pass a map-backed closure so they
    /// never touch the process-global environment.
    ///
    /// # Errors
    ///
    /// Same contract as [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            let name = format!("{ENV_PREFIX}{key}");
            match lookup(&name) {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(ConfigError::Missing { name }),
            }
        };
        let optional = |key: &str| -> Option<String> {
            let name = format!("{ENV_PREFIX}{key}");
            lookup(&name).filter(|v| !v.trim().is_empty())
        };

        let api_key = required("API_KEY")?;
        let webhook_secret = optional("WEBHOOK_SECRET");

        let sync_crontab = optional("SYNC_CRONTAB")
            .map_or_else(|| Ok(DEFAULT_SYNC_CRONTAB.to_string()), |v| {
                validate_crontab("SYNC_CRONTAB", &v)
            })?;

        let log_level = optional("LOG_LEVEL")
            .map_or_else(|| Ok("INFO".to_string()), |v| validate_log_level(&v))?;

        let nb_url = validate_http_url("NB_URL", &required("NB_URL")?)?;
        let nb_token = required("NB_TOKEN")?;
        let nb_ns_id = parse_int("NB_NS_ID", &required("NB_NS_ID")?, 1, u64::MAX)?;
        let pdns_url = validate_http_url("PDNS_URL", &required("PDNS_URL")?)?;
        let pdns_token = required("PDNS_TOKEN")?;
        let pdns_server_id = optional("PDNS_SERVER_ID").unwrap_or_else(|| "localhost".to_string());

        let managed_types = optional("MANAGED_TYPES")
            .map_or_else(default_managed_types, |v| parse_managed_types(&v));

        let mqtt_enabled = match optional("MQTT_ENABLED") {
            None => false,
            Some(v) => parse_bool("MQTT_ENABLED", &v)?,
        };
        let broker_url = optional("MQTT_BROKER_URL")
            .map_or_else(|| Ok("mqtt://localhost:1883".to_string()), |v| {
                validate_broker_url("MQTT_BROKER_URL", &v)
            })?;
        let client_id = optional("MQTT_CLIENT_ID")
            .map_or_else(|| Ok("netbox-pdns".to_string()), |v| validate_client_id(&v))?;
        let topic_prefix = optional("MQTT_TOPIC_PREFIX")
            .map_or_else(|| Ok("dns/zones".to_string()), |v| validate_topic_prefix(&v))?;
        let qos = u8::try_from(match optional("MQTT_QOS") {
            None => 1,
            Some(v) => parse_int("MQTT_QOS", &v, 0, 2)?,
        })
        .unwrap_or(1);
        let keepalive = match optional("MQTT_KEEPALIVE") {
            None => 60,
            Some(v) => parse_int("MQTT_KEEPALIVE", &v, 10, 3600)?,
        };
        let reconnect_delay = match optional("MQTT_RECONNECT_DELAY") {
            None => 5,
            Some(v) => parse_int("MQTT_RECONNECT_DELAY", &v, 1, 300)?,
        };
        let username = optional("MQTT_USERNAME");
        let password = optional("MQTT_PASSWORD");

        if mqtt_enabled && username.is_some() != password.is_some() {
            return Err(ConfigError::Invalid {
                name: format!("{ENV_PREFIX}MQTT_USERNAME"),
                reason: "MQTT_USERNAME and MQTT_PASSWORD must be provided together, or both omitted"
                    .to_string(),
            });
        }

        Ok(Self {
            api_key,
            webhook_secret,
            sync_crontab,
            log_level,
            nb_url,
            nb_token,
            nb_ns_id,
            pdns_url,
            pdns_token,
            pdns_server_id,
            managed_types,
            mqtt: MqttConfig {
                enabled: mqtt_enabled,
                broker_url,
                client_id,
                topic_prefix,
                qos,
                keepalive,
                reconnect_delay,
                username,
                password,
            },
        })
    }

    /// The `tracing` filter directive corresponding to the configured level.
    #[must_use]
    pub fn tracing_level(&self) -> &'static str {
        match self.log_level.as_str() {
            "DEBUG" => "debug",
            "WARNING" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name: format!("{ENV_PREFIX}{key}"),
        reason: reason.into(),
    }
}

fn parse_int(key: &str, value: &str, min: u64, max: u64) -> Result<u64, ConfigError> {
    let parsed: u64 = value
        .trim()
        .parse()
        .map_err(|_| invalid(key, format!("expected an integer, got {value:?}")))?;
    if parsed < min || parsed > max {
        return Err(invalid(key, format!("{parsed} is outside the range {min}-{max}")));
    }
    Ok(parsed)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(invalid(key, format!("expected a boolean, got {other:?}"))),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    let parsed = Url::parse(trimmed).map_err(|e| invalid(key, format!("not a URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(
            key,
            format!("URL must use http or https scheme, got {}", parsed.scheme()),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(invalid(key, "URL has no host"));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn validate_broker_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    let parsed = Url::parse(trimmed).map_err(|e| invalid(key, format!("not a URL: {e}")))?;
    if !matches!(parsed.scheme(), "mqtt" | "mqtts") {
        return Err(invalid(
            key,
            format!("URL must use mqtt or mqtts scheme, got {}", parsed.scheme()),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(invalid(key, "URL has no host"));
    }
    Ok(trimmed.to_string())
}

fn validate_crontab(key: &str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    let fields = trimmed.split_whitespace().count();
    if fields != 5 {
        return Err(invalid(
            key,
            format!("expected 5 fields (minute hour day month weekday), got {fields}"),
        ));
    }
    crate::scheduler::parse_crontab(trimmed)
        .map_err(|e| invalid(key, format!("unparseable crontab {trimmed:?}: {e}")))?;
    Ok(trimmed.to_string())
}

fn validate_log_level(value: &str) -> Result<String, ConfigError> {
    let upper = value.trim().to_uppercase();
    if LOG_LEVELS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(invalid(
            "LOG_LEVEL",
            format!("unknown level {value:?}, expected one of {}", LOG_LEVELS.join("/")),
        ))
    }
}

fn validate_client_id(value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > 23 {
        return Err(invalid("MQTT_CLIENT_ID", "client id must be 1-23 characters"));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(
            "MQTT_CLIENT_ID",
            "client id may only contain alphanumerics, dashes, and underscores",
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_topic_prefix(value: &str) -> Result<String, ConfigError> {
    let cleaned = value.trim().trim_matches('/').to_string();
    if cleaned.is_empty() {
        return Err(invalid("MQTT_TOPIC_PREFIX", "topic prefix cannot be empty"));
    }
    if !cleaned
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/'))
    {
        return Err(invalid(
            "MQTT_TOPIC_PREFIX",
            "topic prefix may only contain alphanumerics, dashes, underscores, and slashes",
        ));
    }
    Ok(cleaned)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
