// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! MQTT subscriber translating zone-event messages into reconciles.
//!
//! Zone events arrive on `<topic_prefix>/<zone>/<event>` with `<event>` one
//! of `created`, `updated`, `deleted`. Each valid message crosses a bounded
//! channel into a worker task that reconciles the zone under the sync gate,
//! so the broker event loop is never re-entered by sync work.
//!
//! The connection reconnects with a delay that doubles per failure up to
//! 60 seconds and resets on a successful CONNACK. Messages are validated
//! for topic/payload consistency and age; anything invalid is logged and
//! discarded. Duplicate deliveries are harmless because reconciliation is
//! idempotent.

use crate::context::AppContext;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

/// Reconnect delay ceiling (60 seconds)
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Messages older than this are dropped (5 minutes)
const MAX_MESSAGE_AGE_SECS: f64 = 300.0;

/// Capacity of the event-loop to worker channel
const EVENT_BUFFER: usize = 64;

/// The kind of zone event carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneEventKind {
    Created,
    Updated,
    Deleted,
}

impl ZoneEventKind {
    /// Parse a topic event segment. Both the `created` and `create` forms
    /// are accepted.
    #[must_use]
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            "created" | "create" => Some(Self::Created),
            "updated" | "update" => Some(Self::Updated),
            "deleted" | "delete" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Gate operation name for contention logs.
    #[must_use]
    pub fn gate_operation(self) -> &'static str {
        match self {
            Self::Created => "mqtt_zone_create",
            Self::Updated => "mqtt_zone_update",
            Self::Deleted => "mqtt_zone_delete",
        }
    }
}

/// A validated zone event ready for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEvent {
    /// Zone name as carried by the message
    pub zone: String,
    /// What happened to it
    pub kind: ZoneEventKind,
}

/// Message payload. `name` is required; the other fields are validated when
/// present. The legacy `zone` key is accepted as an alias.
#[derive(Debug, Deserialize)]
struct ZoneEventPayload {
    #[serde(alias = "zone")]
    name: String,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    serial: Option<u64>,
    #[serde(default)]
    timestamp: Option<f64>,
}

/// Split a broker URL into host, port, and TLS flag.
///
/// `mqtt` defaults to port 1883 without TLS; `mqtts` to 8883 with TLS.
fn parse_broker_url(broker_url: &str) -> Result<(String, u16, bool), String> {
    let parsed = Url::parse(broker_url).map_err(|e| format!("invalid broker URL: {e}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| "broker URL has no host".to_string())?
        .to_string();

    match parsed.scheme() {
        "mqtt" => Ok((host, parsed.port().unwrap_or(1883), false)),
        "mqtts" => Ok((host, parsed.port().unwrap_or(8883), true)),
        other => Err(format!("unsupported broker scheme: {other}")),
    }
}

fn qos_level(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

fn connack_reason(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Success => "accepted",
        ConnectReturnCode::RefusedProtocolVersion => {
            "connection refused - incorrect protocol version"
        }
        ConnectReturnCode::BadClientId => "connection refused - invalid client identifier",
        ConnectReturnCode::ServiceUnavailable => "connection refused - server unavailable",
        ConnectReturnCode::BadUserNamePassword => "connection refused - bad username or password",
        ConnectReturnCode::NotAuthorized => "connection refused - not authorized",
    }
}

fn doubled(delay: Duration) -> Duration {
    (delay * 2).min(MAX_RECONNECT_DELAY)
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Validate one publish into a [`ZoneEvent`].
///
/// Checks, in order: topic shape under the prefix, known event kind, JSON
/// payload, zone-name consistency between topic and payload, event-kind
/// consistency, and message age.
fn parse_publish(
    topic: &str,
    payload: &[u8],
    topic_prefix: &str,
    now: f64,
) -> Result<ZoneEvent, String> {
    let parts: Vec<&str> = topic.split('/').collect();
    let prefix_parts: Vec<&str> = topic_prefix.split('/').collect();

    if parts.len() != prefix_parts.len() + 2 || parts[..prefix_parts.len()] != prefix_parts[..] {
        return Err(format!("topic does not match {topic_prefix}/<zone>/<event>"));
    }
    let topic_zone = parts[prefix_parts.len()];
    let topic_event = parts[prefix_parts.len() + 1];

    let kind = ZoneEventKind::from_event(topic_event)
        .ok_or_else(|| format!("unknown event type {topic_event:?}"))?;

    let parsed: ZoneEventPayload =
        serde_json::from_slice(payload).map_err(|e| format!("invalid JSON payload: {e}"))?;

    if parsed.name.trim().is_empty() {
        return Err("payload zone name is empty".to_string());
    }
    if parsed.name != topic_zone {
        return Err(format!(
            "zone name mismatch: topic={topic_zone}, payload={}",
            parsed.name
        ));
    }
    if let Some(event) = parsed.event.as_deref() {
        if ZoneEventKind::from_event(event) != Some(kind) {
            return Err(format!(
                "event type mismatch: topic={topic_event}, payload={event}"
            ));
        }
    }
    if let Some(timestamp) = parsed.timestamp {
        let age = now - timestamp;
        if age > MAX_MESSAGE_AGE_SECS {
            return Err(format!("message is {age:.1}s old, ignoring"));
        }
    }

    Ok(ZoneEvent {
        zone: parsed.name,
        kind,
    })
}

/// Status object served by `/mqtt/status` and embedded in `/status`.
#[must_use]
pub fn status_json(ctx: &AppContext) -> Value {
    let mqtt = &ctx.config.mqtt;
    json!({
        "enabled": mqtt.enabled,
        "connected": ctx.state.mqtt_connected(),
        "broker_url": mqtt.broker_url,
        "client_id": mqtt.client_id,
        "topic_prefix": mqtt.topic_prefix,
        "qos": mqtt.qos,
    })
}

/// Spawn the subscriber: a broker event loop and a reconcile worker joined
/// by a bounded channel.
///
/// Both tasks run until aborted; shutdown drops the event loop, which
/// closes the channel and lets the worker drain out. Undelivered broker
/// messages are intentionally not drained - the next process reconciles on
/// startup anyway.
#[must_use]
pub fn spawn(ctx: Arc<AppContext>) -> (JoinHandle<()>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ZoneEvent>(EVENT_BUFFER);

    let worker_ctx = ctx.clone();
    let worker = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let operation = event.kind.gate_operation();
            match worker_ctx
                .engine
                .sync_zone("message_bus", operation, &event.zone)
                .await
            {
                Ok(outcome) => {
                    info!(zone = %event.zone, operation, ?outcome, "bus reconcile finished");
                }
                Err(e) => {
                    error!(zone = %event.zone, operation, error = %e, "bus reconcile failed");
                }
            }
        }
    });

    let event_loop = tokio::spawn(async move {
        let mqtt = &ctx.config.mqtt;
        let (host, port, use_tls) = match parse_broker_url(&mqtt.broker_url) {
            Ok(endpoint) => endpoint,
            Err(reason) => {
                // Config validation should have caught this
                error!(broker = %mqtt.broker_url, reason, "cannot start MQTT subscriber");
                return;
            }
        };

        let mut options = MqttOptions::new(mqtt.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(mqtt.keepalive));
        if let (Some(username), Some(password)) = (&mqtt.username, &mqtt.password) {
            options.set_credentials(username.clone(), password.clone());
        }
        if use_tls {
            options.set_transport(Transport::Tls(TlsConfiguration::Native));
        }

        let (client, mut event_loop) = AsyncClient::new(options, EVENT_BUFFER);
        let topic = format!("{}/+/+", mqtt.topic_prefix);
        let qos = qos_level(mqtt.qos);
        let mut reconnect_delay = Duration::from_secs(mqtt.reconnect_delay);

        info!(broker = %mqtt.broker_url, topic = %topic, "starting MQTT subscriber");

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        ctx.state.set_mqtt_connected(true);
                        reconnect_delay = Duration::from_secs(mqtt.reconnect_delay);
                        info!(broker = %mqtt.broker_url, "connected to MQTT broker");
                        if let Err(e) = client.subscribe(topic.clone(), qos).await {
                            error!(topic = %topic, error = %e, "MQTT subscribe failed");
                        }
                    } else {
                        ctx.state.set_mqtt_connected(false);
                        error!(
                            reason = connack_reason(ack.code),
                            "MQTT broker refused connection"
                        );
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!(topic = %topic, "MQTT subscription confirmed");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match parse_publish(
                        &publish.topic,
                        &publish.payload,
                        &mqtt.topic_prefix,
                        unix_now(),
                    ) {
                        Ok(event) => {
                            info!(zone = %event.zone, kind = ?event.kind, "zone event received");
                            if tx.try_send(event).is_err() {
                                warn!("zone event buffer full, dropping message");
                            }
                        }
                        Err(reason) => {
                            warn!(topic = %publish.topic, reason, "discarding MQTT message");
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    ctx.state.set_mqtt_connected(false);
                    warn!("MQTT broker requested disconnect");
                }
                Ok(_) => {}
                Err(e) => {
                    ctx.state.set_mqtt_connected(false);
                    warn!(
                        error = %e,
                        retry_in = ?reconnect_delay,
                        "MQTT connection lost, reconnecting"
                    );
                    tokio::time::sleep(reconnect_delay).await;
                    reconnect_delay = doubled(reconnect_delay);
                }
            }
        }
    });

    (event_loop, worker)
}

#[cfg(test)]
#[path = "mqtt_tests.rs"]
mod mqtt_tests;
