use std::time::Duration;

use clap::Args;
use serde::Deserialize;

use mqtt_sink::SinkOptions;
use telemetry_api::QosLevel;

use super::error::SolarGenError;

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub client_id: Option<String>,
    pub qos: Option<u8>,
    pub interval_ms: Option<u64>,
    pub ack_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub keep_alive_secs: Option<u64>,
    pub seed: Option<u64>,
    pub ticks: Option<u64>,
    #[serde(default)]
    pub topics: TopicsConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopicsConfig {
    pub primary: Option<String>,
    pub irradiation: Option<String>,
    pub status: Option<String>,
    pub alerts: Option<String>,
}

pub fn load_config(path: &str) -> Result<Config, SolarGenError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SolarGenError::Config(format!("cannot read config {path}: {e}")))?;
    toml::from_str(&content).map_err(|e| SolarGenError::Config(format!("bad config {path}: {e}")))
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct GenArgs {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml", env = "SOLAR_GEN_CONFIG")]
    pub config: String,

    /// Broker host
    #[arg(long)]
    pub host: Option<String>,

    /// Broker port
    #[arg(long)]
    pub port: Option<u16>,

    /// MQTT client id (default: derived from process start time)
    #[arg(long)]
    pub client_id: Option<String>,

    /// QoS level: 0, 1 or 2
    #[arg(long)]
    pub qos: Option<u8>,

    /// Publish interval in milliseconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Seed for the PRNG (0 = entropy)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after N cycles (0 = run until interrupted)
    #[arg(long)]
    pub ticks: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════
//  Topics
// ═══════════════════════════════════════════════════════════════

/// Resolved topic names, one per record channel. Fixed for the lifetime
/// of the process; consumers key on them.
#[derive(Debug, Clone)]
pub struct Topics {
    pub primary: String,
    pub irradiation: String,
    pub status: String,
    pub alerts: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            primary: "solar/data".into(),
            irradiation: "solar/irradiation".into(),
            status: "solar/status".into(),
            alerts: "solar/alerts".into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Merged configuration: defaults < config.toml < env/CLI.
pub struct Effective {
    pub sink: SinkOptions,
    pub qos: QosLevel,
    pub interval: Duration,
    pub seed: u64,
    pub ticks: u64,
    pub topics: Topics,
}

impl Effective {
    pub fn new(args: &GenArgs) -> Result<Self, SolarGenError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };

        let qos_num = args.qos.or(cfg.qos).unwrap_or(1);
        let qos = QosLevel::from_u8(qos_num).ok_or_else(|| {
            SolarGenError::Config(format!("qos must be 0, 1 or 2, got {qos_num}"))
        })?;

        let sink = SinkOptions {
            host: args
                .host
                .clone()
                .or(cfg.host)
                .unwrap_or_else(|| "localhost".into()),
            port: args.port.or(cfg.port).unwrap_or(1883),
            client_id: args.client_id.clone().or(cfg.client_id),
            keep_alive: Duration::from_secs(cfg.keep_alive_secs.unwrap_or(30)),
            clean_session: true,
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms.unwrap_or(10_000)),
            ack_timeout: Duration::from_millis(cfg.ack_timeout_ms.unwrap_or(5_000)),
        };

        let dt = Topics::default();
        let topics = Topics {
            primary: cfg.topics.primary.unwrap_or(dt.primary),
            irradiation: cfg.topics.irradiation.unwrap_or(dt.irradiation),
            status: cfg.topics.status.unwrap_or(dt.status),
            alerts: cfg.topics.alerts.unwrap_or(dt.alerts),
        };

        Ok(Self {
            sink,
            qos,
            interval: Duration::from_millis(args.interval.or(cfg.interval_ms).unwrap_or(2_000)),
            seed: args.seed.or(cfg.seed).unwrap_or(0),
            ticks: args.ticks.or(cfg.ticks).unwrap_or(0),
            topics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(config: &str) -> GenArgs {
        GenArgs {
            config: config.into(),
            host: None,
            port: None,
            client_id: None,
            qos: None,
            interval: None,
            seed: None,
            ticks: None,
        }
    }

    #[test]
    fn defaults_when_no_config_file() {
        let eff = Effective::new(&args("/nonexistent/solar-gen.toml")).unwrap();
        assert_eq!(eff.sink.host, "localhost");
        assert_eq!(eff.sink.port, 1883);
        assert_eq!(eff.qos, QosLevel::AtLeastOnce);
        assert_eq!(eff.interval, Duration::from_millis(2_000));
        assert_eq!(eff.sink.ack_timeout, Duration::from_millis(5_000));
        assert_eq!(eff.topics.primary, "solar/data");
        assert_eq!(eff.topics.irradiation, "solar/irradiation");
        assert_eq!(eff.topics.status, "solar/status");
        assert_eq!(eff.topics.alerts, "solar/alerts");
        assert_eq!(eff.ticks, 0);
    }

    #[test]
    fn cli_overrides_config_file() {
        let path = std::env::temp_dir().join("solar-gen-test-config.toml");
        std::fs::write(
            &path,
            "port = 2883\ninterval_ms = 500\n[topics]\nprimary = \"plant/data\"\n",
        )
        .unwrap();
        let mut a = args(path.to_str().unwrap());
        a.port = Some(9883);
        let eff = Effective::new(&a).unwrap();
        std::fs::remove_file(&path).ok();

        // CLI wins over file, file wins over defaults
        assert_eq!(eff.sink.port, 9883);
        assert_eq!(eff.interval, Duration::from_millis(500));
        assert_eq!(eff.topics.primary, "plant/data");
        assert_eq!(eff.topics.status, "solar/status");
    }

    #[test]
    fn invalid_qos_is_rejected() {
        let mut a = args("/nonexistent/solar-gen.toml");
        a.qos = Some(3);
        let res = Effective::new(&a);
        assert!(matches!(res, Err(SolarGenError::Config(_))));
    }

    #[test]
    fn bad_config_file_is_an_error() {
        let path = std::env::temp_dir().join("solar-gen-test-bad.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        let res = Effective::new(&args(path.to_str().unwrap()));
        std::fs::remove_file(&path).ok();
        assert!(res.is_err());
    }
}
