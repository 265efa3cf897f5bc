// How much of the tires' combined grip a lap uses, from longitudinal and lateral acceleration.

use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use super::{TraceAnalyzer, lat_accel, long_accel, mean};
use crate::LapDeltaError;
use crate::config::GripConfig;
use crate::table::{Table, TabularReport};
use crate::telemetry::physics::GRAVITY;
use crate::telemetry::{Channel, TelemetryTrace};

/// Grip usage over one lap. Accelerations are in g.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GripUtilization {
    pub max_long_accel_g: f64,
    /// Most negative longitudinal acceleration
    pub max_long_decel_g: f64,
    pub max_lateral_g: f64,
    pub max_combined_g: f64,
    pub mean_combined_g: f64,
    pub braking_pct: f64,
    pub accelerating_pct: f64,
    pub high_lateral_pct: f64,
    /// Lateral acceleration came from the X/Y path rather than a recorded channel
    pub lateral_derived: bool,
}

pub struct GripAnalyzer {
    config: GripConfig,
    label: String,
}

impl GripAnalyzer {
    pub fn new(config: GripConfig) -> Self {
        Self {
            config,
            label: "lap".to_string(),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }
}

impl TraceAnalyzer for GripAnalyzer {
    type Output = GripUtilization;

    fn analyze(&self, trace: &TelemetryTrace) -> Result<GripUtilization, LapDeltaError> {
        if trace.len() < 2 {
            return Err(LapDeltaError::TooFewSamples {
                count: trace.len(),
                required: 2,
            });
        }
        let (lateral, lateral_derived) = lat_accel(trace).ok_or_else(|| LapDeltaError::MissingChannel {
            channel: Channel::LatAccel,
            trace: self.label.clone(),
        })?;
        if lateral_derived {
            warn!("{}: no lateral acceleration recorded, deriving it from track position", self.label);
        }
        let (longitudinal, _) = long_accel(trace);

        let ax = longitudinal.iter().map(|a| a / GRAVITY).collect_vec();
        let ay = lateral.iter().map(|a| a / GRAVITY).collect_vec();
        let combined = ax.iter().zip(&ay).map(|(x, y)| x.hypot(*y)).collect_vec();
        let share = |count: usize| count as f64 / ax.len() as f64 * 100.;
        let config = &self.config;

        let grip = GripUtilization {
            max_long_accel_g: ax.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            max_long_decel_g: ax.iter().copied().fold(f64::INFINITY, f64::min),
            max_lateral_g: ay.iter().map(|a| a.abs()).fold(0., f64::max),
            max_combined_g: combined.iter().copied().fold(0., f64::max),
            mean_combined_g: mean(&combined).unwrap_or(0.),
            braking_pct: share(ax.iter().filter(|a| **a < -config.braking_g).count()),
            accelerating_pct: share(ax.iter().filter(|a| **a > config.traction_g).count()),
            high_lateral_pct: share(ay.iter().filter(|a| a.abs() > config.cornering_g).count()),
            lateral_derived,
        };
        info!(
            "{}: peak combined {:.2} g, mean {:.2} g",
            self.label, grip.max_combined_g, grip.mean_combined_g
        );
        Ok(grip)
    }
}

impl TabularReport for GripUtilization {
    fn to_table(&self) -> Table {
        let rows = [
            ("max_long_accel_g", self.max_long_accel_g),
            ("max_long_decel_g", self.max_long_decel_g),
            ("max_lateral_g", self.max_lateral_g),
            ("max_combined_g", self.max_combined_g),
            ("mean_combined_g", self.mean_combined_g),
            ("percent_braking", self.braking_pct),
            ("percent_accelerating", self.accelerating_pct),
            ("percent_high_lateral", self.high_lateral_pct),
        ];
        Table::new()
            .with_column("statistic", rows.iter().map(|(name, _)| *name))
            .with_column("value", rows.iter().map(|(_, value)| *value))
    }
}
