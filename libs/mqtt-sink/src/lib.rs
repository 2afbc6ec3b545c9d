use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;

use telemetry_api::{QosLevel, SinkError, SinkEvent, TelemetrySink, now_ms};

// ════════════════════════════════════════════════════════════════
//  Options
// ════════════════════════════════════════════════════════════════

/// Broker connection options. Everything here is externally settable;
/// `client_id = None` derives one from the process start time.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub keep_alive: Duration,
    pub clean_session: bool,
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: None,
            keep_alive: Duration::from_secs(30),
            clean_session: true,
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(5),
        }
    }
}

impl SinkOptions {
    /// Effective client id: the configured value, or `solar-gen-<unix ms>`.
    pub fn effective_client_id(&self) -> String {
        match self.client_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("solar-gen-{}", now_ms()),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  MqttSink
// ════════════════════════════════════════════════════════════════

const EVENT_BUFFER: usize = 256;

/// MQTT sink backed by rumqttc.
///
/// Owns the async client; a background driver task keeps polling the
/// event loop (rumqttc re-establishes the session on re-poll) and forwards
/// `ConnectionLost` / `DeliveryComplete` notifications over a channel.
pub struct MqttSink {
    client: AsyncClient,
    events: mpsc::Receiver<SinkEvent>,
    ack_timeout: Duration,
    closed: bool,
}

impl MqttSink {
    /// Connect and wait for the broker CONNACK.
    ///
    /// Anything that prevents the session from being established within
    /// `connect_timeout` (refused socket, broker rejection, silence) is
    /// a fatal `SinkError::Connect`.
    pub async fn connect(opts: SinkOptions) -> Result<Self, SinkError> {
        let client_id = opts.effective_client_id();
        let mut mqtt_opts = MqttOptions::new(&client_id, &opts.host, opts.port);
        mqtt_opts.set_keep_alive(opts.keep_alive);
        mqtt_opts.set_clean_session(opts.clean_session);

        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 16);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return match ack.code {
                            ConnectReturnCode::Success => Ok(()),
                            code => Err(SinkError::Connect(format!(
                                "broker refused session: {code:?}"
                            ))),
                        };
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(SinkError::Connect(e.to_string())),
                }
            }
        };
        match tokio::time::timeout(opts.connect_timeout, handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SinkError::Connect(format!(
                    "no CONNACK within {} ms",
                    opts.connect_timeout.as_millis()
                )));
            }
        }
        tracing::info!(host = %opts.host, port = opts.port, client_id = %client_id, "connected");

        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(drive_event_loop(eventloop, event_tx));

        Ok(Self {
            client,
            events,
            ack_timeout: opts.ack_timeout,
            closed: false,
        })
    }

    /// Graceful MQTT disconnect. Publishing after close returns `Closed`.
    pub async fn close(&mut self) {
        self.closed = true;
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "disconnect");
        }
    }

    /// Acks belong to the previous publish; a stale one must not satisfy
    /// the next. The loop publishes sequentially, so draining between
    /// messages keeps the ordering correlation sound.
    fn drain_stale_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if let SinkEvent::ConnectionLost(reason) = event {
                tracing::debug!(%reason, "stale connection-loss notification");
            }
        }
    }

    async fn next_ack(&mut self, topic: &str) -> Result<(), SinkError> {
        loop {
            match self.events.recv().await {
                Some(SinkEvent::DeliveryComplete(pkid)) => {
                    tracing::debug!(%topic, pkid, "delivery complete");
                    return Ok(());
                }
                Some(SinkEvent::ConnectionLost(reason)) => {
                    return Err(SinkError::Publish {
                        topic: topic.to_string(),
                        reason,
                    });
                }
                None => return Err(SinkError::Closed),
            }
        }
    }

    async fn wait_for_ack(&mut self, topic: &str) -> Result<(), SinkError> {
        let wait = self.ack_timeout;
        match tokio::time::timeout(wait, self.next_ack(topic)).await {
            Ok(res) => res,
            Err(_) => Err(SinkError::AckTimeout {
                topic: topic.to_string(),
                waited_ms: wait.as_millis() as u64,
            }),
        }
    }
}

impl TelemetrySink for MqttSink {
    fn publish<'a>(
        &'a mut self,
        topic: &'a str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            if self.closed {
                return Err(SinkError::Closed);
            }
            self.drain_stale_events();
            self.client
                .publish(topic, map_qos(qos), retain, payload)
                .await
                .map_err(|e| SinkError::Publish {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
            if qos == QosLevel::AtMostOnce {
                return Ok(());
            }
            self.wait_for_ack(topic).await
        })
    }
}

fn map_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

// ════════════════════════════════════════════════════════════════
//  Event-loop driver
// ════════════════════════════════════════════════════════════════

/// Keep the rumqttc event loop alive for the life of the sink. On error
/// the next poll reconnects; the task exits only when the sink side of
/// the event channel is gone.
async fn drive_event_loop(mut eventloop: EventLoop, tx: mpsc::Sender<SinkEvent>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("session re-established");
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                if !forward(&tx, SinkEvent::DeliveryComplete(ack.pkid)) {
                    return;
                }
            }
            // QoS 2 handshake completion
            Ok(Event::Incoming(Packet::PubComp(comp))) => {
                if !forward(&tx, SinkEvent::DeliveryComplete(comp.pkid)) {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "connection lost");
                if !forward(&tx, SinkEvent::ConnectionLost(e.to_string())) {
                    return;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// try_send with drop-on-full: the publisher drains between messages, and
/// a dropped notification only widens one ack wait. Returns false once
/// the receiver is gone.
fn forward(tx: &mpsc::Sender<SinkEvent>, event: SinkEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!("event channel full, dropping notification");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
