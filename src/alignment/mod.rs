pub mod resampler;

use log::{debug, info};

use crate::LapDeltaError;
use crate::config::AlignmentConfig;
use crate::telemetry::TelemetryTrace;

pub use resampler::{resample, validate_distance};

/// Slack when snapping the overlap bounds onto grid multiples
const GRID_EPSILON: f64 = 1e-9;

/// Two traces resampled onto one shared, uniform distance grid.
///
/// Both traces always have the same length and identical distance values; the constructor
/// refuses anything else, so every analysis can index them in lockstep.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedPair {
    trace_a: TelemetryTrace,
    trace_b: TelemetryTrace,
    resolution: f64,
}

impl AlignedPair {
    pub fn from_traces(
        trace_a: TelemetryTrace,
        trace_b: TelemetryTrace,
        resolution: f64,
    ) -> Result<Self, LapDeltaError> {
        if trace_a.len() != trace_b.len() {
            return Err(LapDeltaError::NotAligned {
                reason: format!("trace lengths differ ({} vs {})", trace_a.len(), trace_b.len()),
            });
        }
        if trace_a.distance() != trace_b.distance() {
            return Err(LapDeltaError::NotAligned {
                reason: "distance grids differ".to_string(),
            });
        }
        validate_distance(trace_a.distance())?;
        Ok(Self {
            trace_a,
            trace_b,
            resolution,
        })
    }

    pub fn a(&self) -> &TelemetryTrace {
        &self.trace_a
    }

    pub fn b(&self) -> &TelemetryTrace {
        &self.trace_b
    }

    /// The shared distance grid.
    pub fn distance(&self) -> &[f64] {
        self.trace_a.distance()
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.trace_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace_a.is_empty()
    }

    pub fn start_distance(&self) -> f64 {
        self.distance().first().copied().unwrap_or(0.)
    }

    pub fn end_distance(&self) -> f64 {
        self.distance().last().copied().unwrap_or(0.)
    }

    pub fn total_length(&self) -> f64 {
        self.end_distance() - self.start_distance()
    }
}

/// Builds the uniform grid `k * step` covering `[lo, hi]`, snapped inward to multiples of
/// `step`. Empty when no multiple of `step` falls inside the range.
pub fn build_grid(lo: f64, hi: f64, step: f64) -> Vec<f64> {
    let first = (lo / step - GRID_EPSILON).ceil() as i64;
    let last = (hi / step + GRID_EPSILON).floor() as i64;
    if last < first {
        return Vec::new();
    }
    (first..=last).map(|k| k as f64 * step).collect()
}

/// Resamples two recorded laps onto a common distance grid.
///
/// The grid covers the overlap of both native distance ranges. Every channel present in both
/// traces is carried over; channels missing from either side are left out.
pub fn align_traces(
    trace_a: &TelemetryTrace,
    trace_b: &TelemetryTrace,
    config: &AlignmentConfig,
) -> Result<AlignedPair, LapDeltaError> {
    validate_distance(trace_a.distance())?;
    validate_distance(trace_b.distance())?;

    let step = config.resolution;
    let (Some(min_a), Some(max_a), Some(min_b), Some(max_b)) = (
        trace_a.min_distance(),
        trace_a.max_distance(),
        trace_b.min_distance(),
        trace_b.max_distance(),
    ) else {
        return Err(LapDeltaError::TooFewSamples {
            count: 0,
            required: 2,
        });
    };
    let lo = min_a.max(min_b);
    let d_max = max_a.min(max_b);
    let required = step * config.min_overlap_steps as f64;

    let grid = build_grid(lo, d_max, step);
    if grid.len() < config.min_overlap_steps + 1 {
        return Err(LapDeltaError::InsufficientOverlap {
            overlap: (d_max - lo).max(0.),
            required,
        });
    }

    let resample_trace = |trace: &TelemetryTrace, other: &TelemetryTrace| {
        let mut aligned = TelemetryTrace::new(
            grid.clone(),
            resample(trace.distance(), trace.speed(), &grid)?,
        )?
        .with_brake_scale(trace.brake_scale());
        for channel in trace.optional_channels().filter(|c| other.has(*c)) {
            if let Some(values) = trace.channel(channel) {
                aligned = aligned.with_channel(channel, resample(trace.distance(), values, &grid)?)?;
            }
        }
        Ok::<_, LapDeltaError>(aligned)
    };
    let aligned_a = resample_trace(trace_a, trace_b)?;
    let aligned_b = resample_trace(trace_b, trace_a)?;

    let dropped = trace_a
        .optional_channels()
        .chain(trace_b.optional_channels())
        .filter(|c| !(trace_a.has(*c) && trace_b.has(*c)))
        .collect::<Vec<_>>();
    if !dropped.is_empty() {
        debug!("Channels present in only one trace, not aligned: {:?}", dropped);
    }
    info!(
        "Aligned traces on {} grid points from {:.1} m to {:.1} m at {} m resolution",
        grid.len(),
        grid[0],
        grid[grid.len() - 1],
        step
    );

    AlignedPair::from_traces(aligned_a, aligned_b, step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Channel;
    use proptest::prelude::*;

    fn trace(distance: Vec<f64>, speed: f64) -> TelemetryTrace {
        let n = distance.len();
        TelemetryTrace::new(distance, vec![speed; n]).unwrap()
    }

    #[test]
    fn test_grid_clipped_to_shorter_trace() {
        let a = trace((0..=200).map(|i| i as f64 * 5.1).collect(), 150.);
        let b = trace((0..=100).map(|i| i as f64 * 9.87).collect(), 160.);
        let pair = align_traces(&a, &b, &AlignmentConfig::default()).unwrap();

        assert_eq!(pair.a().len(), pair.b().len());
        assert_eq!(pair.a().distance(), pair.b().distance());
        // min(1020, 987) rounded down to the 5 m step
        assert!((pair.end_distance() - 985.).abs() < 1e-9);
        assert_eq!(pair.start_distance(), 0.);
        assert!((pair.total_length() - 985.).abs() < 1e-9);
    }

    #[test]
    fn test_channels_only_in_one_trace_are_dropped() {
        let a = trace(vec![0., 10., 20., 30.], 100.)
            .with_channel(Channel::Throttle, vec![0., 50., 100., 100.])
            .unwrap()
            .with_channel(Channel::Brake, vec![0., 0., 0., 0.])
            .unwrap();
        let b = trace(vec![0., 15., 30.], 100.)
            .with_channel(Channel::Throttle, vec![100., 100., 100.])
            .unwrap();
        let pair = align_traces(&a, &b, &AlignmentConfig::default()).unwrap();
        assert!(pair.a().has(Channel::Throttle));
        assert!(pair.b().has(Channel::Throttle));
        assert!(!pair.a().has(Channel::Brake));
        assert_eq!(pair.a().throttle().unwrap()[1], 25.);
    }

    #[test]
    fn test_insufficient_overlap() {
        let a = trace(vec![0., 5., 12.], 100.);
        let b = trace(vec![0., 5., 12.], 100.);
        assert!(matches!(
            align_traces(&a, &b, &AlignmentConfig::default()),
            Err(LapDeltaError::InsufficientOverlap { .. })
        ));
    }

    #[test]
    fn test_disjoint_traces() {
        let a = trace(vec![0., 50., 100.], 100.);
        let b = trace(vec![200., 250., 300.], 100.);
        assert!(matches!(
            align_traces(&a, &b, &AlignmentConfig::default()),
            Err(LapDeltaError::InsufficientOverlap { .. })
        ));
    }

    #[test]
    fn test_duplicate_distance_rejected() {
        let a = trace(vec![0., 50., 50., 100.], 100.);
        let b = trace(vec![0., 50., 100.], 100.);
        assert!(matches!(
            align_traces(&a, &b, &AlignmentConfig::default()),
            Err(LapDeltaError::DataGap { .. })
        ));
    }

    #[test]
    fn test_from_traces_rejects_mismatched_grids() {
        let a = trace(vec![0., 5., 10.], 100.);
        let b = trace(vec![0., 5., 11.], 100.);
        assert!(matches!(
            AlignedPair::from_traces(a, b, 5.),
            Err(LapDeltaError::NotAligned { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_aligned_pair_shares_grid(
            len_a in 50.0f64..3000.,
            len_b in 50.0f64..3000.,
            n_a in 5usize..400,
            n_b in 5usize..400,
            resolution in 1.0f64..10.,
        ) {
            let a = trace((0..n_a).map(|i| len_a * i as f64 / (n_a - 1) as f64).collect(), 120.);
            let b = trace((0..n_b).map(|i| len_b * i as f64 / (n_b - 1) as f64).collect(), 130.);
            let config = AlignmentConfig { resolution, min_overlap_steps: 3 };
            let pair = align_traces(&a, &b, &config).unwrap();

            prop_assert_eq!(pair.a().len(), pair.b().len());
            prop_assert_eq!(pair.a().distance(), pair.b().distance());
            let expected_max = (len_a.min(len_b) / resolution + GRID_EPSILON).floor() * resolution;
            prop_assert!((pair.end_distance() - expected_max).abs() < 1e-6);
            prop_assert!(pair.end_distance() <= len_a.min(len_b) + 1e-6);
        }
    }
}
