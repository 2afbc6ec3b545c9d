/// Transport-boundary errors.
///
/// `Connect` is permanent: fail at startup. `Publish` and `AckTimeout`
/// are per-message: the caller logs them and drops the message, a newer
/// sample supersedes a stale one.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("connect: {0}")]
    Connect(String),

    #[error("publish ({topic}): {reason}")]
    Publish { topic: String, reason: String },

    #[error("publish ({topic}): no acknowledgment within {waited_ms} ms")]
    AckTimeout { topic: String, waited_ms: u64 },

    #[error("sink closed")]
    Closed,
}
