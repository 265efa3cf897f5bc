use itertools::Itertools;

use crate::LapDeltaError;

/// Grid points this close outside the native range are snapped onto its edge
const RANGE_TOLERANCE: f64 = 1e-6;

/// Checks that a native distance base is strictly increasing and long enough to
/// interpolate.
pub fn validate_distance(distance: &[f64]) -> Result<(), LapDeltaError> {
    if distance.len() < 2 {
        return Err(LapDeltaError::TooFewSamples {
            count: distance.len(),
            required: 2,
        });
    }
    match distance
        .iter()
        .tuple_windows()
        .position(|(previous, current)| current <= previous || current.is_nan())
    {
        Some(index) => Err(LapDeltaError::DataGap {
            index: index + 1,
            previous: distance[index],
            current: distance[index + 1],
        }),
        None => Ok(()),
    }
}

/// Piecewise-linear resampling of one channel from its native distance base onto `grid`.
///
/// Grid points outside the native range are rejected rather than extrapolated; callers clip
/// the grid to the overlap of every trace they resample.
pub fn resample(native_distance: &[f64], values: &[f64], grid: &[f64]) -> Result<Vec<f64>, LapDeltaError> {
    if values.len() != native_distance.len() {
        return Err(LapDeltaError::ChannelLengthMismatch {
            values: values.len(),
            distances: native_distance.len(),
        });
    }
    validate_distance(native_distance)?;

    let min = native_distance[0];
    let max = native_distance[native_distance.len() - 1];
    grid.iter()
        .map(|g| {
            if *g < min - RANGE_TOLERANCE || *g > max + RANGE_TOLERANCE || g.is_nan() {
                return Err(LapDeltaError::GridOutOfRange {
                    distance: *g,
                    min,
                    max,
                });
            }
            let at = g.clamp(min, max);
            let upper = native_distance.partition_point(|d| *d <= at);
            if upper >= native_distance.len() {
                return Ok(values[values.len() - 1]);
            }
            let lower = upper - 1;
            let (d0, d1) = (native_distance[lower], native_distance[upper]);
            Ok(values[lower] + (values[upper] - values[lower]) * (at - d0) / (d1 - d0))
        })
        .collect()
}
