// Lap-to-lap consistency of one driver, and a fingerprint of how a reference lap differs from
// the driver's other laps.

use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

use super::segments::{analyze_segments, minisector_variance};
use super::{mean, population_std};
use crate::LapDeltaError;
use crate::alignment::align_traces;
use crate::config::{AnalysisConfig, ConsistencyConfig};
use crate::table::{Table, TableValue, TabularReport};
use crate::telemetry::{LapRecord, TelemetryTrace};

/// Spread of lap times over a run of laps.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LapConsistency {
    pub lap_count: usize,
    pub mean_lap_time: f64,
    /// Population standard deviation
    pub std_lap_time: f64,
    /// Standard deviation over mean
    pub coefficient_of_variation: f64,
    /// 100 for identical laps, falling to 0 as the coefficient of variation grows
    pub consistency_score: f64,
    /// Lap numbers further than `outlier_sigma` standard deviations from the mean
    pub outlier_laps: Vec<u32>,
    pub best_lap: u32,
    pub worst_lap: u32,
}

/// Scores the valid, timed laps in `laps`. At least two are needed.
pub fn lap_consistency(laps: &[LapRecord], config: &ConsistencyConfig) -> Result<LapConsistency, LapDeltaError> {
    let timed = laps
        .iter()
        .filter(|lap| lap.is_valid)
        .filter_map(|lap| Some((lap.lap_number, lap.lap_time_s.filter(|t| t.is_finite() && *t > 0.)?)))
        .collect_vec();
    if timed.len() < 2 {
        return Err(LapDeltaError::TooFewSamples {
            count: timed.len(),
            required: 2,
        });
    }
    let times = timed.iter().map(|(_, t)| *t).collect_vec();
    let (Some(mean_lap_time), Some(std_lap_time)) = (mean(&times), population_std(&times)) else {
        return Err(LapDeltaError::TooFewSamples { count: 0, required: 2 });
    };
    let coefficient_of_variation = std_lap_time / mean_lap_time;
    let consistency_score = (100. * (1. - coefficient_of_variation * config.cv_scale)).clamp(0., 100.);

    let outlier_laps = timed
        .iter()
        .filter(|(_, t)| (t - mean_lap_time).abs() > config.outlier_sigma * std_lap_time)
        .map(|(lap, _)| *lap)
        .collect_vec();
    let by_time = |a: &&(u32, f64), b: &&(u32, f64)| a.1.total_cmp(&b.1);
    let best_lap = timed.iter().min_by(by_time).map_or(0, |(lap, _)| *lap);
    let worst_lap = timed.iter().max_by(by_time).map_or(0, |(lap, _)| *lap);

    info!(
        "Lap consistency over {} laps: score {:.1}, {} outliers",
        timed.len(),
        consistency_score,
        outlier_laps.len()
    );
    Ok(LapConsistency {
        lap_count: timed.len(),
        mean_lap_time,
        std_lap_time,
        coefficient_of_variation,
        consistency_score,
        outlier_laps,
        best_lap,
        worst_lap,
    })
}

impl TabularReport for LapConsistency {
    fn to_table(&self) -> Table {
        let outliers = self.outlier_laps.iter().map(|lap| lap.to_string()).join(",");
        Table::new()
            .with_column(
                "statistic",
                [
                    "lap_count",
                    "mean_lap_time",
                    "std_lap_time",
                    "coefficient_of_variation",
                    "consistency_score",
                    "best_lap",
                    "worst_lap",
                    "outlier_laps",
                ],
            )
            .with_column(
                "value",
                [
                    TableValue::from(self.lap_count),
                    self.mean_lap_time.into(),
                    self.std_lap_time.into(),
                    self.coefficient_of_variation.into(),
                    self.consistency_score.into(),
                    self.best_lap.into(),
                    self.worst_lap.into(),
                    TableValue::Text(outliers),
                ],
            )
    }
}

/// How a driver's reference lap differs from their other laps.
///
/// Deltas are `other - reference`, averaged over the other laps. Aggressiveness figures run
/// from 0 to 100 with 50 as neutral.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriverFingerprint {
    pub driver: String,
    pub compared_laps: usize,
    /// Meters; negative when the other laps brake earlier than the reference. `None` when no
    /// pair of laps both recorded a brake application.
    pub avg_brake_onset_delta: Option<f64>,
    /// km/h; negative when the other laps are slower at their slowest point
    pub avg_min_speed_delta: f64,
    /// Mean throttle of the reference lap, `None` without a throttle channel
    pub throttle_aggressiveness: Option<f64>,
    /// Above 50 when the reference lap brakes later than the others
    pub braking_aggressiveness: Option<f64>,
    /// 100 when every minisector is as fast on every lap, falling as their spread grows
    pub consistency_index: f64,
}

/// Distance of the first sample braking harder than `threshold` percent.
fn brake_onset(trace: &TelemetryTrace, threshold: f64) -> Option<f64> {
    let brake = trace.brake_pct()?;
    brake
        .iter()
        .position(|b| *b > threshold)
        .map(|i| trace.distance()[i])
}

fn min_speed(trace: &TelemetryTrace) -> f64 {
    trace.speed().iter().copied().fold(f64::INFINITY, f64::min)
}

pub fn driver_fingerprint(
    driver: &str,
    reference: &TelemetryTrace,
    others: &[TelemetryTrace],
    config: &AnalysisConfig,
) -> Result<DriverFingerprint, LapDeltaError> {
    if others.is_empty() {
        return Err(LapDeltaError::TooFewSamples { count: 1, required: 2 });
    }
    config.validate()?;

    let analyses = others
        .iter()
        .map(|other| {
            let pair = align_traces(reference, other, &config.alignment)?;
            analyze_segments(&pair, &config.segments, &config.integration)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let variance = minisector_variance(&analyses, &config.segments)?;
    let mean_spread = mean(&variance.std_delta).unwrap_or(0.);
    let consistency_index = (100. * (1. - mean_spread * config.consistency.variance_scale)).clamp(0., 100.);

    let threshold = config.braking_zones.brake_threshold;
    let onset_deltas = brake_onset(reference, threshold)
        .map(|reference_onset| {
            others
                .iter()
                .filter_map(|other| brake_onset(other, threshold))
                .map(|onset| onset - reference_onset)
                .collect_vec()
        })
        .unwrap_or_default();
    if onset_deltas.len() < others.len() {
        debug!(
            "Brake onset compared on {} of {} laps",
            onset_deltas.len(),
            others.len()
        );
    }
    let avg_brake_onset_delta = mean(&onset_deltas);
    let braking_aggressiveness = avg_brake_onset_delta.map(|delta| (50. - delta * 2.).clamp(0., 100.));

    let reference_min = min_speed(reference);
    let min_speed_deltas = others.iter().map(|other| min_speed(other) - reference_min).collect_vec();
    let throttle_aggressiveness = reference.throttle().and_then(mean).map(|t| t.min(100.));

    let fingerprint = DriverFingerprint {
        driver: driver.to_string(),
        compared_laps: others.len(),
        avg_brake_onset_delta,
        avg_min_speed_delta: mean(&min_speed_deltas).unwrap_or(0.),
        throttle_aggressiveness,
        braking_aggressiveness,
        consistency_index,
    };
    info!(
        "Fingerprint for {} against {} laps: consistency index {:.1}",
        driver, fingerprint.compared_laps, fingerprint.consistency_index
    );
    Ok(fingerprint)
}

impl TabularReport for DriverFingerprint {
    fn to_table(&self) -> Table {
        Table::new()
            .with_column(
                "statistic",
                [
                    "driver",
                    "compared_laps",
                    "avg_brake_onset_delta",
                    "avg_min_speed_delta",
                    "throttle_aggressiveness",
                    "braking_aggressiveness",
                    "consistency_index",
                ],
            )
            .with_column(
                "value",
                [
                    TableValue::from(self.driver.clone()),
                    self.compared_laps.into(),
                    self.avg_brake_onset_delta.into(),
                    self.avg_min_speed_delta.into(),
                    self.throttle_aggressiveness.into(),
                    self.braking_aggressiveness.into(),
                    self.consistency_index.into(),
                ],
            )
    }
}
