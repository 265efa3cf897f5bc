use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;

use super::matching::match_by_distance;
use super::{TraceAnalyzer, long_accel, mean};
use crate::LapDeltaError;
use crate::alignment::{AlignedPair, validate_distance};
use crate::config::{BrakingZoneConfig, IntegrationConfig};
use crate::table::{Table, TabularReport};
use crate::telemetry::physics::elapsed_time;
use crate::telemetry::{Channel, TelemetryTrace};

/// A stretch of track where one driver had the brake applied and lost speed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BrakingZone {
    /// Sequential number in ascending distance order, starting at 1
    pub zone_id: u32,
    pub start_distance: f64,
    /// Last braking sample
    pub end_distance: f64,
    pub entry_speed: f64,
    pub min_speed: f64,
    pub exit_speed: f64,
    /// Most negative longitudinal acceleration inside the zone, m/s^2
    pub peak_decel: f64,
    /// Seconds spent in the zone
    pub duration: f64,
}

impl BrakingZone {
    pub fn length(&self) -> f64 {
        self.end_distance - self.start_distance
    }
}

pub struct BrakingZoneDetector {
    config: BrakingZoneConfig,
    integration: IntegrationConfig,
    label: String,
}

impl BrakingZoneDetector {
    pub fn new(config: BrakingZoneConfig, integration: IntegrationConfig) -> Self {
        Self {
            config,
            integration,
            label: "lap".to_string(),
        }
    }

    /// Name used for this trace in errors and logs.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }
}

impl TraceAnalyzer for BrakingZoneDetector {
    type Output = Vec<BrakingZone>;

    fn analyze(&self, trace: &TelemetryTrace) -> Result<Vec<BrakingZone>, LapDeltaError> {
        validate_distance(trace.distance())?;
        let brake = trace.brake_pct().ok_or_else(|| LapDeltaError::MissingChannel {
            channel: Channel::Brake,
            trace: self.label.clone(),
        })?;
        let distance = trace.distance();
        let speed = trace.speed();
        let (accel, _) = long_accel(trace);

        // contiguous runs of samples above the brake threshold, as inclusive index ranges
        let runs = brake
            .iter()
            .enumerate()
            .chunk_by(|(_, b)| **b > self.config.brake_threshold)
            .into_iter()
            .filter(|(braking, _)| *braking)
            .filter_map(|(_, run)| run.map(|(i, _)| i).minmax().into_option())
            .collect_vec();

        let mut zones = Vec::new();
        for (start, end) in runs {
            let length = distance[end] - distance[start];
            let min_speed = speed[start..=end].iter().copied().fold(f64::INFINITY, f64::min);
            let speed_drop = speed[start] - min_speed;
            if length < self.config.min_zone_length || speed_drop < self.config.min_speed_drop {
                debug!(
                    "{}: discarded brake application at {:.1} m ({:.1} m, -{:.1} km/h)",
                    self.label, distance[start], length, speed_drop
                );
                continue;
            }
            zones.push(BrakingZone {
                zone_id: zones.len() as u32 + 1,
                start_distance: distance[start],
                end_distance: distance[end],
                entry_speed: speed[start],
                min_speed,
                exit_speed: speed[end],
                peak_decel: accel[start..=end].iter().copied().fold(f64::INFINITY, f64::min),
                duration: elapsed_time(
                    distance,
                    speed,
                    distance[start],
                    distance[end],
                    self.integration.min_speed_kmh,
                ),
            });
        }
        info!("{}: detected {} braking zones", self.label, zones.len());
        Ok(zones)
    }
}

/// A braking zone matched across the two laps. Metric deltas are `a - b`, `time_delta` is
/// `time_b - time_a` over the union of both zones.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BrakingZoneComparison {
    pub zone_id_a: u32,
    pub zone_id_b: u32,
    pub start_distance_a: f64,
    pub start_distance_b: f64,
    /// Negative when A braked earlier
    pub brake_start_delta: f64,
    pub entry_speed_delta: f64,
    pub min_speed_delta: f64,
    pub exit_speed_delta: f64,
    pub peak_decel_delta: f64,
    pub duration_delta: f64,
    pub time_delta: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BrakingZoneReport {
    pub comparisons: Vec<BrakingZoneComparison>,
    pub unmatched_a: Vec<u32>,
    pub unmatched_b: Vec<u32>,
}

impl BrakingZoneReport {
    /// The `n` comparisons with the largest brake point difference.
    pub fn top_differences(&self, n: usize) -> Vec<&BrakingZoneComparison> {
        self.comparisons
            .iter()
            .sorted_by(|x, y| {
                y.brake_start_delta
                    .abs()
                    .total_cmp(&x.brake_start_delta.abs())
                    .then(x.zone_id_a.cmp(&y.zone_id_a))
            })
            .take(n)
            .collect()
    }
}

impl TabularReport for BrakingZoneReport {
    fn to_table(&self) -> Table {
        let c = &self.comparisons;
        Table::new()
            .with_column("zone_a", c.iter().map(|c| c.zone_id_a))
            .with_column("zone_b", c.iter().map(|c| c.zone_id_b))
            .with_column("start_distance_a", c.iter().map(|c| c.start_distance_a))
            .with_column("start_distance_b", c.iter().map(|c| c.start_distance_b))
            .with_column("brake_start_delta", c.iter().map(|c| c.brake_start_delta))
            .with_column("entry_speed_delta", c.iter().map(|c| c.entry_speed_delta))
            .with_column("min_speed_delta", c.iter().map(|c| c.min_speed_delta))
            .with_column("exit_speed_delta", c.iter().map(|c| c.exit_speed_delta))
            .with_column("peak_decel_delta", c.iter().map(|c| c.peak_decel_delta))
            .with_column("duration_delta", c.iter().map(|c| c.duration_delta))
            .with_column("time_delta", c.iter().map(|c| c.time_delta))
    }
}

/// Pairs braking zones of the two laps by start distance and reports the differences.
pub fn compare_braking_zones(
    pair: &AlignedPair,
    zones_a: &[BrakingZone],
    zones_b: &[BrakingZone],
    config: &BrakingZoneConfig,
    integration: &IntegrationConfig,
) -> BrakingZoneReport {
    let starts_a = zones_a.iter().map(|z| z.start_distance).collect_vec();
    let starts_b = zones_b.iter().map(|z| z.start_distance).collect_vec();
    let matching = match_by_distance(&starts_a, &starts_b, config.match_tolerance);

    let distance = pair.distance();
    let comparisons = matching
        .pairs
        .iter()
        .map(|(i, j)| {
            let (a, b) = (&zones_a[*i], &zones_b[*j]);
            let lo = a.start_distance.min(b.start_distance);
            let hi = a.end_distance.max(b.end_distance);
            let time_delta = elapsed_time(distance, pair.b().speed(), lo, hi, integration.min_speed_kmh)
                - elapsed_time(distance, pair.a().speed(), lo, hi, integration.min_speed_kmh);
            BrakingZoneComparison {
                zone_id_a: a.zone_id,
                zone_id_b: b.zone_id,
                start_distance_a: a.start_distance,
                start_distance_b: b.start_distance,
                brake_start_delta: a.start_distance - b.start_distance,
                entry_speed_delta: a.entry_speed - b.entry_speed,
                min_speed_delta: a.min_speed - b.min_speed,
                exit_speed_delta: a.exit_speed - b.exit_speed,
                peak_decel_delta: a.peak_decel - b.peak_decel,
                duration_delta: a.duration - b.duration,
                time_delta,
            }
        })
        .collect_vec();

    let report = BrakingZoneReport {
        comparisons,
        unmatched_a: matching.unmatched_a.iter().map(|i| zones_a[*i].zone_id).collect(),
        unmatched_b: matching.unmatched_b.iter().map(|j| zones_b[*j].zone_id).collect(),
    };
    if !report.unmatched_a.is_empty() || !report.unmatched_b.is_empty() {
        warn!(
            "Braking zones without a counterpart within {} m: A {:?}, B {:?}",
            config.match_tolerance, report.unmatched_a, report.unmatched_b
        );
    }
    info!("Matched {} braking zones", report.comparisons.len());
    report
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BrakingZoneSummary {
    pub zone_count_a: usize,
    pub zone_count_b: usize,
    pub mean_peak_decel_a: Option<f64>,
    pub mean_peak_decel_b: Option<f64>,
    /// Meters spent braking over the lap
    pub total_braking_distance_a: f64,
    pub total_braking_distance_b: f64,
}

pub fn summarize_braking_zones(zones_a: &[BrakingZone], zones_b: &[BrakingZone]) -> BrakingZoneSummary {
    let decels = |zones: &[BrakingZone]| zones.iter().map(|z| z.peak_decel).collect_vec();
    BrakingZoneSummary {
        zone_count_a: zones_a.len(),
        zone_count_b: zones_b.len(),
        mean_peak_decel_a: mean(&decels(zones_a)),
        mean_peak_decel_b: mean(&decels(zones_b)),
        total_braking_distance_a: zones_a.iter().map(BrakingZone::length).sum(),
        total_braking_distance_b: zones_b.iter().map(BrakingZone::length).sum(),
    }
}
