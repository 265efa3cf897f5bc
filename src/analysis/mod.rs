pub mod braking_zones;
pub mod consistency;
pub mod corners;
pub mod decomposition;
pub mod grip;
pub mod matching;
pub mod segments;
pub mod stints;
pub mod style;

use crate::LapDeltaError;
use crate::telemetry::physics::{derive_lat_accel, derive_long_accel};
use crate::telemetry::{Channel, TelemetryTrace};

pub use braking_zones::{
    BrakingZone, BrakingZoneComparison, BrakingZoneDetector, BrakingZoneReport, BrakingZoneSummary,
    compare_braking_zones, summarize_braking_zones,
};
pub use consistency::{DriverFingerprint, LapConsistency, driver_fingerprint, lap_consistency};
pub use corners::{Corner, CornerDetection, CornerDetector, CornerSpeedClass, HeadingFilter, detect_corners};
pub use decomposition::{CornerDeltaDecomposition, CornerPhase, DecompositionReport, decompose_corners};
pub use grip::{GripAnalyzer, GripUtilization};
pub use matching::{DistanceMatching, match_by_distance};
pub use segments::{
    MinisectorVariance, Segment, SegmentAnalysis, SegmentWinner, analyze_segments, delta_time_curve,
    minisector_variance, segment_boundaries,
};
pub use stints::{LapExclusion, PaceStats, Stint, StintLap, StintPace, segment_stints};
pub use style::{DriverStyleProfile, LapStyleAnalyzer, LapStyleStats, StyleComparison, aggregate_style, compare_styles};

/// Analyses that run over one trace at a time, independent of any other lap.
pub trait TraceAnalyzer {
    type Output;

    fn analyze(&self, trace: &TelemetryTrace) -> Result<Self::Output, LapDeltaError>;
}

/// Lateral acceleration derived from track position is bounded to this, g
const MAX_DERIVED_LATERAL_G: f64 = 6.0;

/// Longitudinal acceleration in m/s^2, from the channel when recorded. The flag is set when it
/// was derived from speed instead.
pub(crate) fn long_accel(trace: &TelemetryTrace) -> (Vec<f64>, bool) {
    match trace.channel(Channel::LongAccel) {
        Some(accel) => (accel.to_vec(), false),
        None => (derive_long_accel(trace.distance(), trace.speed()), true),
    }
}

/// Lateral acceleration in m/s^2, from the channel when recorded, otherwise from the curvature
/// of the X/Y path. `None` when neither is available.
pub(crate) fn lat_accel(trace: &TelemetryTrace) -> Option<(Vec<f64>, bool)> {
    if let Some(lat) = trace.channel(Channel::LatAccel) {
        return Some((lat.to_vec(), false));
    }
    let (x, y) = (trace.channel(Channel::X)?, trace.channel(Channel::Y)?);
    Some((
        derive_lat_accel(trace.distance(), trace.speed(), x, y, MAX_DERIVED_LATERAL_G),
        true,
    ))
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.
    } else {
        sorted[mid]
    })
}

/// Population standard deviation.
pub(crate) fn population_std(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}
