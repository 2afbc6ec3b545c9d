use telemetry_api::SinkError;

#[derive(Debug, thiserror::Error)]
pub enum SolarGenError {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Sink(#[from] SinkError),
}
