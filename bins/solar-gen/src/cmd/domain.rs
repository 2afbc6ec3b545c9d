use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use telemetry_api::now_ms;

/// Source tag stamped on every primary record.
pub const SOURCE: &str = "solar-gen";

// ═══════════════════════════════════════════════════════════════
//  Sampler
// ═══════════════════════════════════════════════════════════════

/// Uniform bounded sampler with fixed-precision rounding.
///
/// Rounding is `f64::round` (half away from zero). The RNG is seeded once
/// per process: seed 0 draws from OS entropy, anything else is used
/// verbatim so runs are reproducible.
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Uniform draw over the closed interval `[min, max]`, rounded to
    /// `precision` decimal digits. `min == max` is legal and returns the
    /// constant.
    pub fn sample(&mut self, min: f64, max: f64, precision: u32) -> f64 {
        if min == max {
            return round_to(min, precision);
        }
        round_to(self.rng.gen_range(min..=max), precision)
    }

    /// Uniform pick from a fixed set.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.rng.gen_range(0..items.len())]
    }

    /// Bernoulli gate: true once in `n` draws on average.
    pub fn one_in(&mut self, n: u32) -> bool {
        self.rng.gen_range(0..n) == 0
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

// ═══════════════════════════════════════════════════════════════
//  Records
// ═══════════════════════════════════════════════════════════════

/// Electrical/thermal snapshot, published every cycle.
///
/// `power` and `dc_power` are derived from the sampled inputs of the same
/// record, never sampled on their own.
#[derive(Debug, Clone, Serialize)]
pub struct PrimaryTelemetry {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub temperature: f64,
    pub efficiency: f64,
    pub irradiation: f64,
    pub frequency_ref: f64,
    pub output_freq: f64,
    pub output_power: f64,
    pub dc_bus_voltage: i64,
    pub dc_current: f64,
    pub dc_power: f64,
    pub dc_efficiency: f64,
    pub module_temp: f64,
    pub timestamp: i64,
    pub source: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct IrradiationReading {
    pub value: f64,
    pub unit: &'static str,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelStatus {
    Normal,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReading {
    pub status: PanelStatus,
    pub uptime: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Overheat,
    LowVoltage,
    HighCurrent,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: f64,
    pub message: &'static str,
    pub timestamp: i64,
}

// ═══════════════════════════════════════════════════════════════
//  PayloadBuilder
// ═══════════════════════════════════════════════════════════════

const ALERT_KINDS: [AlertKind; 3] = [
    AlertKind::Overheat,
    AlertKind::LowVoltage,
    AlertKind::HighCurrent,
];

/// Builds one record per call, sampling every field per the fixed range
/// table of the telemetry contract.
pub struct PayloadBuilder {
    sampler: Sampler,
}

impl PayloadBuilder {
    pub fn new(seed: u64) -> Self {
        Self {
            sampler: Sampler::new(seed),
        }
    }

    pub fn primary(&mut self) -> PrimaryTelemetry {
        let s = &mut self.sampler;
        let voltage = s.sample(300.0, 500.0, 2);
        let current = s.sample(5.0, 16.0, 2);
        let dc_bus_voltage = s.sample(600.0, 800.0, 0) as i64;
        let dc_current = s.sample(10.0, 21.0, 2);
        PrimaryTelemetry {
            voltage,
            current,
            power: voltage * current,
            temperature: s.sample(25.0, 41.0, 2),
            efficiency: s.sample(15.0, 26.0, 2),
            irradiation: s.sample(500.0, 1000.0, 2),
            frequency_ref: s.sample(50.0, 70.0, 1),
            output_freq: s.sample(50.0, 60.0, 1),
            output_power: s.sample(50.0, 100.0, 2),
            dc_bus_voltage,
            dc_current,
            // bus volts x amps gives watts; the feed reports kW
            dc_power: dc_bus_voltage as f64 * dc_current / 1000.0,
            dc_efficiency: s.sample(90.0, 100.0, 2),
            module_temp: s.sample(25.0, 36.0, 2),
            timestamp: now_ms(),
            source: SOURCE,
        }
    }

    pub fn irradiation(&mut self) -> IrradiationReading {
        IrradiationReading {
            value: self.sampler.sample(500.0, 1000.0, 2),
            unit: "W/m²",
            timestamp: now_ms(),
        }
    }

    pub fn status(&mut self) -> StatusReading {
        StatusReading {
            status: PanelStatus::Normal,
            uptime: self.sampler.sample(0.0, 100.0, 2),
            timestamp: now_ms(),
        }
    }

    pub fn alert(&mut self) -> AlertEvent {
        AlertEvent {
            kind: *self.sampler.pick(&ALERT_KINDS),
            severity: self.sampler.sample(1.0, 3.0, 2),
            message: "Check system immediately",
            timestamp: now_ms(),
        }
    }

    /// Alert gate for the current cycle: fires once in ten on average.
    pub fn alert_due(&mut self) -> bool {
        self.sampler.one_in(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGES: &[(f64, f64, u32)] = &[
        (300.0, 500.0, 2),  // voltage
        (5.0, 16.0, 2),     // current
        (25.0, 41.0, 2),    // temperature
        (15.0, 26.0, 2),    // efficiency
        (90.0, 100.0, 2),   // dc_efficiency
        (500.0, 1000.0, 2), // irradiation
        (50.0, 70.0, 1),    // frequency_ref
        (50.0, 60.0, 1),    // output_freq
        (50.0, 100.0, 2),   // output_power
        (600.0, 800.0, 0),  // dc_bus_voltage
        (10.0, 21.0, 2),    // dc_current
        (25.0, 36.0, 2),    // module_temp
        (0.0, 100.0, 2),    // uptime
        (1.0, 3.0, 2),      // severity
    ];

    #[test]
    fn samples_stay_in_bounds() {
        let mut sampler = Sampler::new(7);
        for &(min, max, precision) in RANGES {
            for _ in 0..10_000 {
                let v = sampler.sample(min, max, precision);
                assert!(v >= min && v <= max, "{v} outside [{min}, {max}]");
            }
        }
    }

    #[test]
    fn rounding_is_idempotent() {
        let mut sampler = Sampler::new(11);
        for _ in 0..10_000 {
            let v = sampler.sample(5.0, 16.0, 2);
            assert_eq!(v, round_to(v, 2));
        }
        for _ in 0..10_000 {
            let v = sampler.sample(600.0, 800.0, 0);
            assert_eq!(v, round_to(v, 0));
        }
    }

    #[test]
    fn min_equals_max_returns_the_constant() {
        let mut sampler = Sampler::new(3);
        assert_eq!(sampler.sample(42.0, 42.0, 2), 42.0);
    }

    #[test]
    fn power_is_derived_from_the_same_record() {
        let mut builder = PayloadBuilder::new(99);
        for _ in 0..1_000 {
            let rec = builder.primary();
            assert!((rec.power - rec.voltage * rec.current).abs() < 1e-9);
            let dc = rec.dc_bus_voltage as f64 * rec.dc_current / 1000.0;
            assert!((rec.dc_power - dc).abs() < 1e-9);
        }
    }

    #[test]
    fn alert_fields_come_from_the_fixed_sets() {
        let mut builder = PayloadBuilder::new(5);
        for _ in 0..100 {
            let alert = builder.alert();
            assert!(ALERT_KINDS.contains(&alert.kind));
            assert!(alert.severity >= 1.0 && alert.severity <= 3.0);
            assert_eq!(alert.message, "Check system immediately");
        }
    }

    #[test]
    fn primary_wire_schema_is_stable() {
        let mut builder = PayloadBuilder::new(1);
        let value = serde_json::to_value(builder.primary()).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "current",
                "dc_bus_voltage",
                "dc_current",
                "dc_efficiency",
                "dc_power",
                "efficiency",
                "frequency_ref",
                "irradiation",
                "module_temp",
                "output_freq",
                "output_power",
                "power",
                "source",
                "temperature",
                "timestamp",
                "voltage",
            ]
        );
        assert!(obj["dc_bus_voltage"].is_i64());
        assert!(obj["timestamp"].is_i64());
        assert_eq!(obj["source"], SOURCE);
    }

    #[test]
    fn enum_wire_names() {
        let alert = AlertEvent {
            kind: AlertKind::LowVoltage,
            severity: 2.0,
            message: "Check system immediately",
            timestamp: 0,
        };
        let v = serde_json::to_value(&alert).unwrap();
        assert_eq!(v["type"], "low_voltage");

        let status = StatusReading {
            status: PanelStatus::Normal,
            uptime: 50.0,
            timestamp: 0,
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["status"], "normal");

        let irr = IrradiationReading {
            value: 700.0,
            unit: "W/m²",
            timestamp: 0,
        };
        let v = serde_json::to_value(&irr).unwrap();
        assert_eq!(v["unit"], "W/m²");
    }
}
