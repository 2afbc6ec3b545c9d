use std::future::Future;
use std::pin::Pin;

mod error;
mod util;

pub use error::SinkError;
pub use util::now_ms;

// ════════════════════════════════════════════════════════════════
//  QoS
// ════════════════════════════════════════════════════════════════

/// Delivery guarantee requested per publish (MQTT levels 0..=2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosLevel {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QosLevel {
    /// Map the numeric config value. None for anything outside 0..=2.
    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(QosLevel::AtMostOnce),
            1 => Some(QosLevel::AtLeastOnce),
            2 => Some(QosLevel::ExactlyOnce),
            _ => None,
        }
    }
}

impl std::fmt::Display for QosLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QosLevel::AtMostOnce => f.write_str("at_most_once"),
            QosLevel::AtLeastOnce => f.write_str("at_least_once"),
            QosLevel::ExactlyOnce => f.write_str("exactly_once"),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Sink events
// ════════════════════════════════════════════════════════════════

/// Asynchronous notifications surfaced by the transport driver.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    /// Broker connection dropped. The transport reconnects on its own;
    /// publishes during the window fail and are dropped by the caller.
    ConnectionLost(String),
    /// Broker acknowledged a QoS >= 1 delivery (MQTT packet id).
    DeliveryComplete(u16),
}

// ════════════════════════════════════════════════════════════════
//  Sink trait
// ════════════════════════════════════════════════════════════════

/// Outbound telemetry boundary.
///
/// The publish loop is the single caller and publishes sequentially; an
/// implementation may rely on at most one publish being in flight.
pub trait TelemetrySink: Send {
    /// Publish one serialized record. For QoS >= 1 the future resolves
    /// once the broker acknowledges delivery, bounded by the
    /// implementation's ack timeout.
    fn publish<'a>(
        &'a mut self,
        topic: &'a str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_from_u8() {
        assert_eq!(QosLevel::from_u8(0), Some(QosLevel::AtMostOnce));
        assert_eq!(QosLevel::from_u8(1), Some(QosLevel::AtLeastOnce));
        assert_eq!(QosLevel::from_u8(2), Some(QosLevel::ExactlyOnce));
        assert_eq!(QosLevel::from_u8(3), None);
    }
}
