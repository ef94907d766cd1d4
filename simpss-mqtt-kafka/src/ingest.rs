//! Ingest path: MQTT subscription feeding the bounded queue.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use simpss_common::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::enrich::Enricher;
use crate::error::{BridgeError, Result};
use crate::queue::QueueSender;
use crate::stats::SharedStats;

/// Capacity of the request channel between `AsyncClient` and `EventLoop`.
const CLIENT_CHANNEL_CAPACITY: usize = 10;

/// Map a configured QoS level to the MQTT client's QoS.
pub fn qos_from_level(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BridgeError::config(format!(
            "unsupported MQTT QoS level {}",
            other
        ))),
    }
}

/// Human-readable reason for a CONNACK return code.
pub fn refusal_reason(code: ConnectReturnCode) -> &'static str {
    #[allow(unreachable_patterns)]
    match code {
        ConnectReturnCode::Success => "connection accepted",
        ConnectReturnCode::RefusedProtocolVersion => "incorrect protocol version",
        ConnectReturnCode::BadClientId => "invalid client identifier",
        ConnectReturnCode::ServiceUnavailable => "server unavailable",
        ConnectReturnCode::BadUserNamePassword => "bad username or password",
        ConnectReturnCode::NotAuthorized => "not authorised",
        _ => "unknown reason",
    }
}

/// Build client options: clean session, keep-alive, in-flight window, credentials.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.address, config.port);
    options.set_keep_alive(config.keepalive());
    options.set_clean_session(true);
    options.set_inflight(config.max_inflight);

    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.clone().unwrap_or_default());
    }

    options
}

/// Per-message work of the ingest path: enrich, then enqueue.
#[derive(Debug, Clone)]
pub struct IngestHandler {
    enricher: Enricher,
    queue: QueueSender,
    stats: Arc<SharedStats>,
}

impl IngestHandler {
    pub fn new(enricher: Enricher, queue: QueueSender, stats: Arc<SharedStats>) -> Self {
        Self {
            enricher,
            queue,
            stats,
        }
    }

    /// Handle one inbound payload.
    ///
    /// Under the block policy this waits for queue space. Errors mean the
    /// record was dropped; none of them stop the pipeline except
    /// [`Error::QueueClosed`].
    pub async fn handle(&self, payload: &[u8]) -> simpss_common::Result<()> {
        self.stats.update(|s| s.received += 1);

        let record = match self.enricher.enrich(payload) {
            Ok(record) => record,
            Err(e) => {
                self.stats.update(|s| match e {
                    Error::Decode(_) => s.decode_errors += 1,
                    _ => s.unknown_sensor += 1,
                });
                return Err(e);
            }
        };

        match self.queue.enqueue(record).await {
            Ok(()) => {
                self.stats.update(|s| s.enqueued += 1);
                Ok(())
            }
            Err(e) => {
                if matches!(e, Error::QueueFull) {
                    self.stats.update(|s| s.dropped += 1);
                }
                Err(e)
            }
        }
    }

    /// [`handle`](Self::handle), abandoned when `shutdown` changes first.
    ///
    /// Returns `None` when shutdown won, which also cancels a wait for queue
    /// space.
    pub async fn handle_or_shutdown(
        &self,
        payload: &[u8],
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<simpss_common::Result<()>> {
        tokio::select! {
            result = self.handle(payload) => Some(result),
            _ = shutdown.changed() => None,
        }
    }
}

/// MQTT client loop driving the ingest path.
pub struct MqttIngest {
    client: AsyncClient,
    eventloop: EventLoop,
    handler: IngestHandler,
    broker: String,
    topic: String,
    qos: QoS,
    reconnect_delay: Duration,
    disconnect_grace: Duration,
}

impl MqttIngest {
    /// Create the client. Nothing is sent until [`run`](Self::run) polls.
    pub fn new(
        config: &MqttConfig,
        handler: IngestHandler,
        disconnect_grace: Duration,
    ) -> Result<Self> {
        let qos = qos_from_level(config.qos)?;
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), CLIENT_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            eventloop,
            handler,
            broker: format!("{}:{}", config.address, config.port),
            topic: config.topic.clone(),
            qos,
            reconnect_delay: config.reconnect_delay(),
            disconnect_grace,
        })
    }

    /// Poll the broker until shutdown, then unsubscribe and disconnect.
    ///
    /// Fails only when the dispatch side has gone away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(broker = %self.broker, topic = %self.topic, "Connecting to MQTT broker");
        let mut outcome = Ok(());

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => self.on_connect(ack.code),
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some(result) = self
                            .handler
                            .handle_or_shutdown(&publish.payload, &mut shutdown)
                            .await
                        else {
                            break;
                        };
                        if let Err(e) = result {
                            if matches!(e, Error::QueueClosed) {
                                outcome = Err(e.into());
                                break;
                            }
                            log_dropped(&publish.topic, &e);
                        }
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!(topic = %self.topic, "Subscribed");
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!(broker = %self.broker, "Unexpected disconnection");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log_connection_error(&self.broker, &e);
                        tokio::select! {
                            _ = tokio::time::sleep(self.reconnect_delay) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                },
            }
        }

        self.disconnect().await;
        outcome
    }

    fn on_connect(&self, code: ConnectReturnCode) {
        match code {
            ConnectReturnCode::Success => {
                info!(broker = %self.broker, "Connected to MQTT broker");
                info!(topic = %self.topic, qos = ?self.qos, "Subscribing to topic");
                if let Err(e) = self.client.try_subscribe(&self.topic, self.qos) {
                    error!(topic = %self.topic, error = %e, "Failed to subscribe");
                }
            }
            other => {
                error!(broker = %self.broker, reason = refusal_reason(other), "Connection refused");
            }
        }
    }

    /// Unsubscribe, keep the network loop alive for the grace period so
    /// in-flight acknowledgements land, then disconnect.
    async fn disconnect(mut self) {
        info!(topic = %self.topic, "Stopping MQTT client");
        if let Err(e) = self.client.try_unsubscribe(&self.topic) {
            warn!(topic = %self.topic, error = %e, "Failed to unsubscribe");
        }

        let grace = tokio::time::sleep(self.disconnect_grace);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                _ = &mut grace => break,
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::UnsubAck(_))) => {
                        info!(topic = %self.topic, "Unsubscribed");
                        if let Err(e) = self.client.try_disconnect() {
                            warn!(error = %e, "Failed to request disconnect");
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!(topic = %publish.topic, "Discarding message received during shutdown");
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!(broker = %self.broker, "Peacefully disconnected");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "MQTT loop ended during shutdown");
                        return;
                    }
                },
            }
        }

        warn!(
            grace_secs = self.disconnect_grace.as_secs(),
            "MQTT client did not disconnect within the grace period"
        );
    }
}

fn log_dropped(topic: &str, error: &Error) {
    match error {
        Error::QueueFull => debug!(topic, "Queue full, dropping newest record"),
        _ => warn!(topic, error = %error, "Dropping message"),
    }
}

fn log_connection_error(broker: &str, error: &ConnectionError) {
    match error {
        ConnectionError::ConnectionRefused(code) => {
            error!(broker, reason = refusal_reason(*code), "Connection refused");
        }
        other => warn!(broker, error = %other, "MQTT connection error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{OverflowPolicy, bounded};
    use simpss_common::{SENSOR_GROUP, SensorGroups};

    fn handler(capacity: usize, policy: OverflowPolicy) -> (IngestHandler, crate::queue::QueueReceiver, Arc<SharedStats>) {
        let groups = SensorGroups::from_pairs([(120, "g1"), (121, "g1"), (122, "g2")]).unwrap();
        let (tx, rx) = bounded(capacity, policy);
        let stats = Arc::new(SharedStats::new());
        let handler = IngestHandler::new(Enricher::new(Arc::new(groups), "id"), tx, stats.clone());
        (handler, rx, stats)
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(qos_from_level(3), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_refusal_reasons() {
        assert_eq!(
            refusal_reason(ConnectReturnCode::BadUserNamePassword),
            "bad username or password"
        );
        assert_eq!(refusal_reason(ConnectReturnCode::NotAuthorized), "not authorised");
    }

    #[test]
    fn test_mqtt_options() {
        let config = MqttConfig {
            client_id: "bridge-1".to_string(),
            address: "broker.local".to_string(),
            keepalive_secs: 30,
            ..Default::default()
        };

        let options = mqtt_options(&config);
        assert_eq!(options.client_id(), "bridge-1");
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert!(options.clean_session());
    }

    #[tokio::test]
    async fn test_handle_enqueues_enriched_record() {
        let (handler, mut rx, stats) = handler(4, OverflowPolicy::Block);

        handler.handle(br#"{"id": 121, "T": 20}"#).await.unwrap();

        let record = rx.try_dequeue().expect("record queued");
        assert_eq!(record.get(SENSOR_GROUP).unwrap().to_string(), "g1");
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.received, 1);
        assert_eq!(snapshot.enqueued, 1);
    }

    #[tokio::test]
    async fn test_handle_drops_bad_payloads() {
        let (handler, mut rx, stats) = handler(4, OverflowPolicy::Block);

        assert!(matches!(
            handler.handle(br#"{"id": 999}"#).await,
            Err(Error::UnknownSensor(_))
        ));
        assert!(matches!(
            handler.handle(b"garbage").await,
            Err(Error::Decode(_))
        ));
        handler.handle(br#"{"id": 122}"#).await.unwrap();

        // Only the mapped reading reached the queue
        let record = rx.try_dequeue().unwrap();
        assert_eq!(record.get(SENSOR_GROUP).unwrap().to_string(), "g2");
        assert_eq!(rx.try_dequeue(), None);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.received, 3);
        assert_eq!(snapshot.unknown_sensor, 1);
        assert_eq!(snapshot.decode_errors, 1);
        assert_eq!(snapshot.enqueued, 1);
    }

    #[tokio::test]
    async fn test_handle_counts_drops() {
        let (handler, _rx, stats) = handler(1, OverflowPolicy::Drop);

        handler.handle(br#"{"id": 120}"#).await.unwrap();
        assert!(matches!(
            handler.handle(br#"{"id": 121}"#).await,
            Err(Error::QueueFull)
        ));

        assert_eq!(stats.snapshot().dropped, 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_blocked_enqueue() {
        let (handler, mut rx, stats) = handler(1, OverflowPolicy::Block);
        let (shutdown_tx, mut shutdown) = watch::channel(false);

        handler.handle(br#"{"id": 120}"#).await.unwrap();

        let blocked = tokio::spawn(async move {
            handler
                .handle_or_shutdown(br#"{"id": 121}"#, &mut shutdown)
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        shutdown_tx.send(true).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("enqueue still blocked after shutdown")
            .unwrap();
        assert!(outcome.is_none());

        // The cancelled record never reached the queue
        assert!(rx.try_dequeue().is_some());
        assert_eq!(rx.try_dequeue(), None);
        assert_eq!(stats.snapshot().enqueued, 1);
    }

    #[tokio::test]
    async fn test_run_stops_within_grace_without_broker() {
        let (handler, _rx, _stats) = handler(4, OverflowPolicy::Block);
        let config = MqttConfig {
            address: "127.0.0.1".to_string(),
            port: 1,
            reconnect_delay_ms: 20,
            ..Default::default()
        };
        let grace = Duration::from_millis(200);
        let ingest = MqttIngest::new(&config, handler, grace).unwrap();

        let (shutdown_tx, shutdown) = watch::channel(false);
        let running = tokio::spawn(ingest.run(shutdown));
        tokio::time::sleep(Duration::from_millis(100)).await;

        shutdown_tx.send(true).unwrap();
        let outcome = tokio::time::timeout(grace + Duration::from_millis(500), running)
            .await
            .expect("ingest loop outlived the grace period")
            .unwrap();
        assert!(outcome.is_ok());
    }
}
