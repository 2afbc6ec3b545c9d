use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use mqtt_sink::MqttSink;
use telemetry_api::{QosLevel, TelemetrySink};

use super::config::{Effective, Topics};
use super::domain::PayloadBuilder;
use super::error::SolarGenError;

// ═══════════════════════════════════════════════════════════════
//  Publisher
// ═══════════════════════════════════════════════════════════════

/// Drives the repeating publish cycle.
///
/// Cycle policy: primary telemetry every tick, irradiation every 3rd,
/// status every 5th, an alert once in ten ticks on average. The counter
/// never resets.
pub struct Publisher {
    cycle: u64,
    builder: PayloadBuilder,
    topics: Topics,
    qos: QosLevel,
}

impl Publisher {
    pub fn new(seed: u64, topics: Topics, qos: QosLevel) -> Self {
        Self {
            cycle: 0,
            builder: PayloadBuilder::new(seed),
            topics,
            qos,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// One publish cycle. Per-message failures are logged and dropped;
    /// the tick always runs to completion.
    pub async fn tick(&mut self, sink: &mut dyn TelemetrySink) {
        self.cycle += 1;

        let record = self.builder.primary();
        self.send(sink, &self.topics.primary, &record).await;

        if self.cycle % 3 == 0 {
            let record = self.builder.irradiation();
            self.send(sink, &self.topics.irradiation, &record).await;
        }
        if self.cycle % 5 == 0 {
            let record = self.builder.status();
            self.send(sink, &self.topics.status, &record).await;
        }
        if self.builder.alert_due() {
            let record = self.builder.alert();
            self.send(sink, &self.topics.alerts, &record).await;
        }
    }

    async fn send<T: Serialize>(&self, sink: &mut dyn TelemetrySink, topic: &str, record: &T) {
        let payload = match serde_json::to_vec(record) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%topic, error = %e, "bad record, skipping");
                return;
            }
        };
        match sink.publish(topic, payload, self.qos, false).await {
            Ok(()) => tracing::debug!(%topic, "published"),
            Err(e) => tracing::error!(%topic, error = %e, "publish error, message dropped"),
        }
    }

    /// Run until cancelled, or until `max_ticks` cycles when non-zero.
    /// Cadence is best-effort: sleep-then-repeat, drift is expected.
    pub async fn run(
        &mut self,
        sink: &mut dyn TelemetrySink,
        interval: Duration,
        max_ticks: u64,
        token: CancellationToken,
    ) {
        loop {
            self.tick(sink).await;
            if max_ticks != 0 && self.cycle >= max_ticks {
                tracing::info!(cycles = self.cycle, "tick limit reached, stopping");
                return;
            }
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!(cycles = self.cycle, "cancelled, stopping");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Entry point
// ═══════════════════════════════════════════════════════════════

/// Connect and run the publish loop. A connect failure is fatal and
/// surfaces before anything is published; everything after connect is
/// best-effort until cancellation.
pub async fn run(eff: &Effective) -> Result<(), SolarGenError> {
    tracing::info!(
        host = %eff.sink.host,
        port = eff.sink.port,
        qos = %eff.qos,
        interval_ms = eff.interval.as_millis() as u64,
        primary = %eff.topics.primary,
        irradiation = %eff.topics.irradiation,
        status = %eff.topics.status,
        alerts = %eff.topics.alerts,
        "starting publisher"
    );

    let mut sink = MqttSink::connect(eff.sink.clone()).await?;

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            signal_token.cancel();
        }
    });

    let mut publisher = Publisher::new(eff.seed, eff.topics.clone(), eff.qos);
    publisher
        .run(&mut sink, eff.interval, eff.ticks, token)
        .await;

    sink.close().await;
    tracing::info!(cycles = publisher.cycle(), "publisher stopped");
    Ok(())
}
