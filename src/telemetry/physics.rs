// Kinematic helpers shared by the analyses.
//
// These are approximations: vehicle mass, drag, elevation and tire state are ignored.

use std::f64::consts::{PI, TAU};

use itertools::Itertools;
use simple_moving_average::{SMA, SumTreeSMA};
use uom::si::f64::Velocity;
use uom::si::velocity::{kilometer_per_hour, meter_per_second};

/// Standard gravity, m/s^2
pub const GRAVITY: f64 = 9.81;

/// Number of samples averaged by [`smooth`]
const SMOOTHING_WINDOW: usize = 5;

/// Smallest distance step used when differentiating heading, meters
const MIN_CURVATURE_STEP: f64 = 0.1;

pub fn kmh_to_mps(speed_kmh: f64) -> f64 {
    Velocity::new::<kilometer_per_hour>(speed_kmh).get::<meter_per_second>()
}

/// Linear interpolation of `values` at distance `at`. `at` is clamped to the trace range.
pub fn interpolate_at(distance: &[f64], values: &[f64], at: f64) -> f64 {
    let upper = distance.partition_point(|d| *d <= at);
    if upper == 0 {
        return values[0];
    }
    if upper >= distance.len() {
        return values[distance.len() - 1];
    }
    lerp(
        distance[upper - 1],
        distance[upper],
        values[upper - 1],
        values[upper],
        at,
    )
}

fn lerp(d0: f64, d1: f64, v0: f64, v1: f64, at: f64) -> f64 {
    if d1 <= d0 {
        return v0;
    }
    v0 + (v1 - v0) * (at - d0) / (d1 - d0)
}

/// Trapezoidal integral of `f(value)` over `[start, end]`, with the piecewise-linear
/// `values` interpolated at the window edges.
fn integrate(distance: &[f64], values: &[f64], start: f64, end: f64, f: impl Fn(f64) -> f64) -> f64 {
    if end <= start || distance.len() < 2 {
        return 0.;
    }
    let first = distance.partition_point(|d| *d <= start).saturating_sub(1);
    let mut total = 0.;
    for i in first..distance.len() - 1 {
        let (d0, d1) = (distance[i], distance[i + 1]);
        if d0 >= end {
            break;
        }
        let lo = d0.max(start);
        let hi = d1.min(end);
        if hi <= lo {
            continue;
        }
        let v_lo = lerp(d0, d1, values[i], values[i + 1], lo);
        let v_hi = lerp(d0, d1, values[i], values[i + 1], hi);
        total += (hi - lo) * 0.5 * (f(v_lo) + f(v_hi));
    }
    total
}

/// Time to cover sample interval `i`, trapezoidal in `1/speed`.
fn interval_time(distance: &[f64], speed_kmh: &[f64], i: usize, min_speed_kmh: f64) -> f64 {
    let pace = |v: f64| 1. / kmh_to_mps(v.max(min_speed_kmh));
    (distance[i + 1] - distance[i]) * 0.5 * (pace(speed_kmh[i]) + pace(speed_kmh[i + 1]))
}

/// Index of the sample interval holding `at` and how far into it `at` lies, in `[0, 1]`.
fn interval_position(distance: &[f64], at: f64) -> (usize, f64) {
    let i = distance
        .partition_point(|d| *d <= at)
        .saturating_sub(1)
        .min(distance.len() - 2);
    let span = distance[i + 1] - distance[i];
    let fraction = if span > 0. { (at - distance[i]) / span } else { 0. };
    (i, fraction.clamp(0., 1.))
}

/// Time in seconds to cover `[start, end]`.
///
/// Each sample interval takes the trapezoidal time of `1/speed`; inside an interval elapsed
/// time grows linearly. Windows are differences of that cumulative time, so adjacent windows
/// always add up to the window spanning both. Speeds below `min_speed_kmh` are clamped to it
/// so standing samples cannot blow up the integral.
pub fn elapsed_time(distance: &[f64], speed_kmh: &[f64], start: f64, end: f64, min_speed_kmh: f64) -> f64 {
    if end <= start || distance.len() < 2 {
        return 0.;
    }
    let (first, from) = interval_position(distance, start);
    let (last, to) = interval_position(distance, end);
    let whole = (first..last)
        .map(|i| interval_time(distance, speed_kmh, i, min_speed_kmh))
        .sum::<f64>();
    whole + to * interval_time(distance, speed_kmh, last, min_speed_kmh)
        - from * interval_time(distance, speed_kmh, first, min_speed_kmh)
}

/// Distance-weighted mean of `values` over `[start, end]`.
pub fn mean_over(distance: &[f64], values: &[f64], start: f64, end: f64) -> f64 {
    if end <= start {
        return interpolate_at(distance, values, start);
    }
    integrate(distance, values, start, end, |v| v) / (end - start)
}

/// Cumulative elapsed time at each sample, starting at zero.
pub fn cumulative_time(distance: &[f64], speed_kmh: &[f64], min_speed_kmh: f64) -> Vec<f64> {
    let mut elapsed = 0.;
    std::iter::once(0.)
        .chain((0..distance.len().saturating_sub(1)).map(|i| {
            elapsed += interval_time(distance, speed_kmh, i, min_speed_kmh);
            elapsed
        }))
        .take(distance.len())
        .collect()
}

/// Centered moving average over `SMOOTHING_WINDOW` samples. The series is padded with its
/// edge values so the ends are not pulled towards the interior.
pub fn smooth(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let half = SMOOTHING_WINDOW / 2;
    let padded = std::iter::repeat_n(values[0], half)
        .chain(values.iter().copied())
        .chain(std::iter::repeat_n(values[n - 1], half));

    let mut sma = SumTreeSMA::<f64, f64, SMOOTHING_WINDOW>::new();
    padded
        .map(|v| {
            sma.add_sample(v);
            sma.get_average()
        })
        .skip(2 * half)
        .collect()
}

/// Longitudinal acceleration in m/s^2 derived from speed over distance, `a = dv^2 / 2ds`,
/// smoothed with a centered moving average.
pub fn derive_long_accel(distance: &[f64], speed_kmh: &[f64]) -> Vec<f64> {
    let n = distance.len();
    if n < 2 {
        return vec![0.; n];
    }
    let mut raw = distance
        .iter()
        .zip(speed_kmh)
        .tuple_windows()
        .map(|((d0, v0), (d1, v1))| {
            let (v0, v1) = (kmh_to_mps(*v0), kmh_to_mps(*v1));
            let ds = d1 - d0;
            if ds > 0. { (v1 * v1 - v0 * v0) / (2. * ds) } else { 0. }
        })
        .collect_vec();
    raw.push(raw[n - 2]);
    smooth(&raw)
}

/// Direction of travel in radians from track position, using central differences.
///
/// The result is unwrapped (continuous across +/-pi) and smoothed, so differences between
/// any two samples are real turning rather than position noise.
pub fn heading(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return vec![0.; n];
    }
    let raw = (0..n)
        .map(|i| {
            let (lo, hi) = (i.saturating_sub(1), (i + 1).min(n - 1));
            (y[hi] - y[lo]).atan2(x[hi] - x[lo])
        })
        .collect_vec();
    let mut unwrapped = Vec::with_capacity(n);
    unwrapped.push(raw[0]);
    for (previous, current) in raw.iter().tuple_windows() {
        let last = unwrapped[unwrapped.len() - 1];
        unwrapped.push(last + wrap_angle(current - previous));
    }
    smooth(&unwrapped)
}

/// Spread of an unwrapped `heading` between samples `from` and `to` inclusive, in degrees.
pub fn heading_change(heading: &[f64], from: usize, to: usize) -> f64 {
    if to <= from || to >= heading.len() {
        return 0.;
    }
    match heading[from..=to].iter().copied().minmax().into_option() {
        Some((low, high)) => (high - low).to_degrees(),
        None => 0.,
    }
}

/// Track curvature in 1/m, `dθ/ds` of an unwrapped heading, smoothed.
pub fn curvature(distance: &[f64], heading: &[f64]) -> Vec<f64> {
    let n = distance.len().min(heading.len());
    if n < 2 {
        return vec![0.; n];
    }
    let raw = (0..n)
        .map(|i| {
            let (lo, hi) = (i.saturating_sub(1), (i + 1).min(n - 1));
            let ds = (distance[hi] - distance[lo]).max(MIN_CURVATURE_STEP);
            (heading[hi] - heading[lo]) / ds
        })
        .collect_vec();
    smooth(&raw)
}

/// Lateral acceleration in m/s^2 from track position, `a = v^2 * κ`, positive in left turns.
/// Bounded to `max_lateral_g`.
pub fn derive_lat_accel(distance: &[f64], speed_kmh: &[f64], x: &[f64], y: &[f64], max_lateral_g: f64) -> Vec<f64> {
    let limit = max_lateral_g * GRAVITY;
    let kappa = curvature(distance, &heading(x, y));
    speed_kmh
        .iter()
        .zip(kappa)
        .map(|(v, k)| (kmh_to_mps(*v).powi(2) * k).clamp(-limit, limit))
        .collect_vec()
}

fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmh_to_mps() {
        assert!((kmh_to_mps(36.) - 10.).abs() < 1e-9);
    }

    #[test]
    fn test_elapsed_time_constant_speed() {
        let distance = vec![0., 50., 100.];
        let speed = vec![36., 36., 36.];
        assert!((elapsed_time(&distance, &speed, 0., 100., 0.1) - 10.).abs() < 1e-9);
        // partial window inside one interval
        assert!((elapsed_time(&distance, &speed, 10., 30., 0.1) - 2.).abs() < 1e-9);
    }

    #[test]
    fn test_elapsed_time_clamps_standing_samples() {
        let distance = vec![0., 10.];
        let speed = vec![0., 0.];
        let t = elapsed_time(&distance, &speed, 0., 10., 0.1);
        assert!(t.is_finite());
        assert!((t - 10. / kmh_to_mps(0.1)).abs() < 1e-6);
    }

    #[test]
    fn test_cumulative_time_matches_elapsed() {
        let distance = vec![0., 5., 10., 15.];
        let speed = vec![100., 120., 90., 150.];
        let cumulative = cumulative_time(&distance, &speed, 0.1);
        assert_eq!(cumulative.len(), 4);
        assert_eq!(cumulative[0], 0.);
        let total = elapsed_time(&distance, &speed, 0., 15., 0.1);
        assert!((cumulative[3] - total).abs() < 1e-12);
    }

    #[test]
    fn test_mean_over_linear_ramp() {
        let distance = vec![0., 100.];
        let values = vec![0., 100.];
        assert!((mean_over(&distance, &values, 0., 100.) - 50.).abs() < 1e-9);
        assert!((mean_over(&distance, &values, 20., 40.) - 30.).abs() < 1e-9);
    }

    #[test]
    fn test_derive_long_accel_braking_is_negative() {
        let distance = (0..20).map(|i| i as f64 * 5.).collect_vec();
        let speed = (0..20).map(|i| 300. - i as f64 * 10.).collect_vec();
        let accel = derive_long_accel(&distance, &speed);
        assert_eq!(accel.len(), 20);
        assert!(accel.iter().all(|a| *a < 0.));
    }

    #[test]
    fn test_heading_change_quarter_circle() {
        let points = (0..=90)
            .map(|deg| {
                let rad = (deg as f64).to_radians();
                (100. * rad.cos(), 100. * rad.sin())
            })
            .collect_vec();
        let x = points.iter().map(|p| p.0).collect_vec();
        let y = points.iter().map(|p| p.1).collect_vec();
        let change = heading_change(&heading(&x, &y), 0, 90);
        assert!((change - 90.).abs() < 3., "change was {}", change);
    }

    #[test]
    fn test_heading_is_continuous_across_pi() {
        // counter-clockwise half circle, direction of travel starts at pi
        let points = (0..=180)
            .map(|deg| {
                let rad = (90. + deg as f64).to_radians();
                (50. * rad.cos(), 50. * rad.sin())
            })
            .collect_vec();
        let x = points.iter().map(|p| p.0).collect_vec();
        let y = points.iter().map(|p| p.1).collect_vec();
        let headings = heading(&x, &y);
        assert!(headings.iter().tuple_windows().all(|(a, b)| (b - a).abs() < 0.1));
        let change = heading_change(&headings, 0, 180);
        assert!((change - 180.).abs() < 3., "change was {}", change);
    }

    #[test]
    fn test_heading_noise_does_not_accumulate() {
        let x = (0..200).map(|i| i as f64 * 5.).collect_vec();
        let y = (0..200).map(|i| 0.3 * (1.7 * i as f64).sin()).collect_vec();
        let change = heading_change(&heading(&x, &y), 50, 100);
        assert!(change < 10., "change was {}", change);
    }

    #[test]
    fn test_elapsed_time_is_additive_at_any_split() {
        let distance = vec![0., 10., 20., 30.];
        let speed = vec![20., 300., 20., 300.];
        let total = elapsed_time(&distance, &speed, 0., 30., 0.1);
        for split in [0., 3.3, 10., 15., 21.7, 30.] {
            let parts = elapsed_time(&distance, &speed, 0., split, 0.1) + elapsed_time(&distance, &speed, split, 30., 0.1);
            assert!((parts - total).abs() < 1e-9, "split at {}: {} vs {}", split, parts, total);
        }
    }

    #[test]
    fn test_smooth_keeps_constant_series() {
        let smoothed = smooth(&[4., 4., 4., 4., 4., 4., 4.]);
        assert_eq!(smoothed.len(), 7);
        assert!(smoothed.iter().all(|v| (v - 4.).abs() < 1e-12));
        assert!(smooth(&[]).is_empty());
    }

    #[test]
    fn test_derive_lat_accel_constant_radius() {
        // 100 m radius at 36 km/h: v^2 / r = 1 m/s^2, left turn
        let points = (0..=90)
            .map(|deg| {
                let rad = (deg as f64).to_radians();
                (100. * rad.cos(), 100. * rad.sin())
            })
            .collect_vec();
        let x = points.iter().map(|p| p.0).collect_vec();
        let y = points.iter().map(|p| p.1).collect_vec();
        let distance = (0..=90).map(|deg| 100. * (deg as f64).to_radians()).collect_vec();
        let speed = vec![36.; 91];
        let lateral = derive_lat_accel(&distance, &speed, &x, &y, 6.);
        assert!((lateral[45] - 1.).abs() < 0.05, "lateral was {}", lateral[45]);

        let fast = vec![400.; 91];
        let bounded = derive_lat_accel(&distance, &fast, &x, &y, 6.);
        assert!(bounded.iter().all(|a| *a <= 6. * GRAVITY + 1e-9));
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(1.5 * TAU) - PI).abs() < 1e-9 || (wrap_angle(1.5 * TAU) + PI).abs() < 1e-9);
        assert!((wrap_angle(0.1) - 0.1).abs() < 1e-12);
        assert!((wrap_angle(-TAU + 0.1) - 0.1).abs() < 1e-9);
    }
}
