//! Live broker producer
//!
//! Subscribes to one wildcard topic per measurement category and forwards
//! every decodable publish as a [`RawEvent`]. Malformed messages are logged
//! and skipped. A failed connection attempt or a dropped link is reported
//! through [`LinkStatus`]; reacting to it (falling back to synthetic data) is
//! the lifecycle controller's job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::config::BrokerConfig;
use super::event::decode_publish;
use super::topic::{SensorCategory, TopicScheme};
use super::{EventSender, ProducerKind, TelemetryProducer};
use crate::clock::SharedClock;
use crate::error::{Error, Result};
use crate::reading::SensorId;

/// How long `stop` waits for the broker task to flush a clean disconnect
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// State of the broker link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Never connected, or stopped on purpose
    Unconnected,
    /// Connected and subscribed
    Connected,
    /// Was connected, then lost the link
    Disconnected,
}

/// Producer backed by an MQTT broker subscription
pub struct LiveProducer {
    config: BrokerConfig,
    topics: TopicScheme,
    clock: SharedClock,
    client: Option<AsyncClient>,
    task: Option<JoinHandle<()>>,
    status: Arc<watch::Sender<LinkStatus>>,
}

impl LiveProducer {
    /// Create an unconnected producer
    pub fn new(config: BrokerConfig, clock: SharedClock) -> Self {
        let (status, _) = watch::channel(LinkStatus::Unconnected);
        Self {
            topics: config.topics(),
            config,
            clock,
            client: None,
            task: None,
            status: Arc::new(status),
        }
    }

    /// Current link status
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Watch link status changes
    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// Publish a command to one sensor
    ///
    /// The body is `{command, timestamp, ...extra}`; keys in `extra` win over
    /// the defaults.
    pub async fn publish_command(
        &self,
        sensor_id: &SensorId,
        command: &str,
        extra: Map<String, Value>,
    ) -> Result<()> {
        let client = match (&self.client, self.status()) {
            (Some(client), LinkStatus::Connected) => client,
            _ => {
                tracing::warn!(sensor = %sensor_id, command = command, "Cannot publish command: broker not connected");
                return Err(Error::NotConnected);
            }
        };

        let body = serde_json::to_vec(&command_payload(command, extra, self.clock.now()))?;
        client
            .publish(self.topics.command_topic(sensor_id), QoS::AtLeastOnce, false, body)
            .await
            .map_err(|e| Error::Broker(e.to_string()))?;

        tracing::info!(sensor = %sensor_id, command = command, "Published sensor command");
        Ok(())
    }

    async fn connect(&self) -> Result<(AsyncClient, EventLoop)> {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        // The client rejects sub-second keep-alives.
        options.set_keep_alive(self.config.keep_alive.max(Duration::from_secs(1)));
        options.set_clean_session(true);

        // Room for every subscription before the event loop starts draining.
        let capacity = self.config.request_capacity.max(SensorCategory::ALL.len() + 1);
        let (client, mut eventloop) = AsyncClient::new(options, capacity);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return match ack.code {
                            ConnectReturnCode::Success => Ok(()),
                            code => Err(Error::Broker(format!("connection refused: {:?}", code))),
                        };
                    }
                    Ok(_) => {}
                    Err(e) => return Err(Error::Broker(e.to_string())),
                }
            }
        };

        match tokio::time::timeout(self.config.connect_timeout, handshake).await {
            Ok(Ok(())) => Ok((client, eventloop)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Broker(format!(
                "no acknowledgement from {}:{} within {:?}",
                self.config.host, self.config.port, self.config.connect_timeout
            ))),
        }
    }
}

impl TelemetryProducer for LiveProducer {
    async fn start(&mut self, events: EventSender) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }

        tracing::info!(host = %self.config.host, port = self.config.port, "Connecting to broker");
        let (client, eventloop) = match self.connect().await {
            Ok(pair) => pair,
            Err(e) => {
                self.status.send_replace(LinkStatus::Unconnected);
                return Err(e);
            }
        };

        for filter in self.topics.subscription_filters() {
            client
                .subscribe(filter.clone(), QoS::AtMostOnce)
                .await
                .map_err(|e| Error::Broker(e.to_string()))?;
            tracing::debug!(topic = %filter, "Subscribed");
        }

        self.status.send_replace(LinkStatus::Connected);
        self.task = Some(tokio::spawn(pump_broker(
            eventloop,
            self.topics.clone(),
            self.clock.clone(),
            events,
            Arc::clone(&self.status),
        )));
        self.client = Some(client);

        tracing::info!(host = %self.config.host, port = self.config.port, "Live producer started");
        Ok(())
    }

    async fn stop(&mut self) {
        // Mark the shutdown first so the pump doesn't report it as a lost link.
        self.status.send_replace(LinkStatus::Unconnected);

        if let Some(client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                tracing::debug!(error = %e, "Broker disconnect request failed");
            }
        }

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                task.abort();
            }
            tracing::info!("Live producer stopped");
        }
    }

    fn kind(&self) -> ProducerKind {
        ProducerKind::Live
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// Drive the broker event loop, forwarding publishes until the link drops
async fn pump_broker(
    mut eventloop: EventLoop,
    topics: TopicScheme,
    clock: SharedClock,
    events: EventSender,
    status: Arc<watch::Sender<LinkStatus>>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match decode_publish(&topics, &publish.topic, &publish.payload, clock.now()) {
                    Ok(event) => {
                        tracing::trace!(sensor = %event.sensor_id, topic = %event.topic, "Broker message received");
                        if events.send(event).await.is_err() {
                            tracing::debug!("Event receiver dropped, live producer exiting");
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(topic = %publish.topic, error = %e, "Dropping malformed broker message");
                    }
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                tracing::debug!(pkid = ack.pkid, "Subscription acknowledged");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => return,
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::warn!("Broker closed the session");
                mark_lost(&status);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Broker connection lost");
                mark_lost(&status);
                return;
            }
        }
    }
}

fn mark_lost(status: &watch::Sender<LinkStatus>) {
    status.send_if_modified(|current| {
        if *current == LinkStatus::Connected {
            *current = LinkStatus::Disconnected;
            true
        } else {
            false
        }
    });
}

/// Command body published to a sensor
pub fn command_payload(command: &str, extra: Map<String, Value>, now: DateTime<Utc>) -> Value {
    let mut body = Map::new();
    body.insert("command".to_string(), Value::from(command));
    body.insert("timestamp".to_string(), Value::from(now.to_rfc3339()));
    body.extend(extra);
    Value::Object(body)
}
