use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

use super::{TraceAnalyzer, long_accel};
use crate::LapDeltaError;
use crate::alignment::validate_distance;
use crate::config::CornerConfig;
use crate::table::{Table, TabularReport};
use crate::telemetry::physics::{heading, heading_change};
use crate::telemetry::{Channel, TelemetryTrace};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CornerSpeedClass {
    Slow,
    Medium,
    Fast,
}

impl CornerSpeedClass {
    fn from_apex_speed(speed: f64, config: &CornerConfig) -> Self {
        if speed < config.slow_corner_speed {
            CornerSpeedClass::Slow
        } else if speed < config.medium_corner_speed {
            CornerSpeedClass::Medium
        } else {
            CornerSpeedClass::Fast
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CornerSpeedClass::Slow => "slow",
            CornerSpeedClass::Medium => "medium",
            CornerSpeedClass::Fast => "fast",
        }
    }
}

/// A corner as seen in one driver's lap.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Corner {
    /// Sequential number in ascending distance order, starting at 1
    pub id: u32,
    /// Brake start, or the start of the speed drop when the driver never braked
    pub entry_distance: f64,
    pub apex_distance: f64,
    /// Throttle reapplication, or the end of the acceleration out of the corner
    pub exit_distance: f64,
    pub entry_speed: f64,
    pub min_speed: f64,
    pub exit_speed: f64,
    pub brake_start_distance: Option<f64>,
    pub throttle_on_distance: Option<f64>,
    /// Most negative longitudinal acceleration from entry to apex, m/s^2
    pub peak_decel: f64,
    pub speed_class: CornerSpeedClass,
}

impl Corner {
    /// Distance from the brake point to the apex.
    pub fn braking_distance(&self) -> Option<f64> {
        self.brake_start_distance.map(|d| self.apex_distance - d)
    }

    /// Distance from the apex to full throttle.
    pub fn throttle_reapply_distance(&self) -> Option<f64> {
        self.throttle_on_distance.map(|d| d - self.apex_distance)
    }
}

/// Whether the heading check took part in accepting corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HeadingFilter {
    Applied,
    Disabled,
    /// Requested but the trace has no x/y position
    Unavailable,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CornerDetection {
    pub corners: Vec<Corner>,
    pub heading_filter: HeadingFilter,
    pub rejected_candidates: usize,
}

impl TabularReport for CornerDetection {
    fn to_table(&self) -> Table {
        let c = &self.corners;
        Table::new()
            .with_column("id", c.iter().map(|c| c.id))
            .with_column("entry_distance", c.iter().map(|c| c.entry_distance))
            .with_column("apex_distance", c.iter().map(|c| c.apex_distance))
            .with_column("exit_distance", c.iter().map(|c| c.exit_distance))
            .with_column("entry_speed", c.iter().map(|c| c.entry_speed))
            .with_column("min_speed", c.iter().map(|c| c.min_speed))
            .with_column("exit_speed", c.iter().map(|c| c.exit_speed))
            .with_column("brake_start_distance", c.iter().map(|c| c.brake_start_distance))
            .with_column("braking_distance", c.iter().map(|c| c.braking_distance()))
            .with_column(
                "throttle_reapply_distance",
                c.iter().map(|c| c.throttle_reapply_distance()),
            )
            .with_column("peak_decel", c.iter().map(|c| c.peak_decel))
            .with_column("speed_class", c.iter().map(|c| c.speed_class.label()))
    }
}

/// A speed valley found by the peak/valley scan, as sample indices.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    /// Last sample at the preceding peak
    onset: usize,
    apex: usize,
    /// First sample back above `min + min_speed_drop`
    recovery: usize,
    /// Where speed stops climbing after the valley
    rise_end: usize,
}

/// Hysteresis scan for speed valleys. A valley opens once speed has dropped `min_drop` below
/// the running peak and closes once it has climbed `min_drop` above the valley minimum. A
/// valley still open at the end of the trace is discarded.
fn find_valleys(speed: &[f64], min_drop: f64) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut peak = 0;
    let mut valley: Option<(usize, usize)> = None;
    for i in 1..speed.len() {
        match valley {
            None => {
                if speed[i] >= speed[peak] {
                    peak = i;
                } else if speed[peak] - speed[i] >= min_drop {
                    valley = Some((peak, i));
                }
            }
            Some((onset, apex)) => {
                if speed[i] < speed[apex] {
                    valley = Some((onset, i));
                } else if speed[i] - speed[apex] >= min_drop {
                    candidates.push(Candidate {
                        onset,
                        apex,
                        recovery: i,
                        rise_end: i,
                    });
                    valley = None;
                    peak = i;
                }
            }
        }
    }
    if let Some((_, apex)) = valley {
        debug!("Ignoring speed valley at sample {} that never recovers", apex);
    }

    // the climb out of a valley ends at the next local maximum, never past the next onset
    let onsets = candidates.iter().skip(1).map(|c| c.onset).collect_vec();
    for (candidate, limit) in candidates
        .iter_mut()
        .zip(onsets.into_iter().chain(std::iter::once(speed.len() - 1)))
    {
        let mut i = candidate.recovery;
        while i < limit && speed[i + 1] > speed[i] {
            i += 1;
        }
        candidate.rise_end = i;
    }
    candidates
}

/// First sample of the brake application leading into `apex`, searching no further back than
/// `floor`. Released-brake samples right before the apex are skipped.
fn brake_start(brake: &[f64], apex: usize, floor: usize, threshold: f64) -> Option<usize> {
    let mut i = apex;
    while i > floor && brake[i] <= threshold {
        i -= 1;
    }
    if brake[i] <= threshold {
        return None;
    }
    while i > floor && brake[i - 1] > threshold {
        i -= 1;
    }
    Some(i)
}

pub struct CornerDetector {
    config: CornerConfig,
}

impl CornerDetector {
    pub fn new(config: CornerConfig) -> Self {
        Self { config }
    }
}

impl TraceAnalyzer for CornerDetector {
    type Output = CornerDetection;

    fn analyze(&self, trace: &TelemetryTrace) -> Result<CornerDetection, LapDeltaError> {
        detect_corners(trace, &self.config)
    }
}

/// Finds corners in one driver's lap from its speed trace.
pub fn detect_corners(trace: &TelemetryTrace, config: &CornerConfig) -> Result<CornerDetection, LapDeltaError> {
    validate_distance(trace.distance())?;
    let distance = trace.distance();
    let speed = trace.speed();

    let headings = match (trace.channel(Channel::X), trace.channel(Channel::Y)) {
        (Some(x), Some(y)) => Some(heading(x, y)),
        _ => None,
    };
    let heading_filter = match (config.min_heading_change_deg, &headings) {
        (None, _) => HeadingFilter::Disabled,
        (Some(_), None) => HeadingFilter::Unavailable,
        (Some(_), Some(_)) => HeadingFilter::Applied,
    };

    let candidates = find_valleys(speed, config.min_speed_drop);
    let accepted = candidates
        .iter()
        .filter(|c| {
            let span = distance[c.recovery] - distance[c.onset];
            if span < config.min_corner_length {
                debug!("Rejected valley at {:.1} m: spans {:.1} m", distance[c.apex], span);
                return false;
            }
            if speed[c.apex] > config.max_apex_speed {
                debug!(
                    "Rejected valley at {:.1} m: apex speed {:.1} km/h",
                    distance[c.apex], speed[c.apex]
                );
                return false;
            }
            if let (Some(min_change), Some(headings)) = (config.min_heading_change_deg, &headings) {
                let change = heading_change(headings, c.onset, c.rise_end);
                if change < min_change {
                    debug!(
                        "Rejected valley at {:.1} m: heading changes {:.1} deg",
                        distance[c.apex], change
                    );
                    return false;
                }
            }
            true
        })
        .copied()
        .collect_vec();

    let brake = trace.brake_pct();
    let throttle = trace.throttle();
    let (accel, _) = long_accel(trace);

    let corners = accepted
        .iter()
        .enumerate()
        .map(|(n, c)| {
            let floor = if n == 0 { 0 } else { accepted[n - 1].recovery };
            let brake_index = brake
                .as_deref()
                .and_then(|b| brake_start(b, c.apex, floor, config.brake_threshold));
            let entry = brake_index.unwrap_or(c.onset);

            let limit = accepted.get(n + 1).map_or(speed.len(), |next| next.apex);
            let throttle_index = throttle.and_then(|t| {
                (c.apex + 1..limit).find(|i| t[*i] >= config.throttle_reapply_threshold)
            });
            let exit = throttle_index.unwrap_or(c.rise_end);

            let peak_decel = accel[entry..=c.apex].iter().copied().fold(f64::INFINITY, f64::min);
            Corner {
                id: n as u32 + 1,
                entry_distance: distance[entry],
                apex_distance: distance[c.apex],
                exit_distance: distance[exit],
                entry_speed: speed[entry],
                min_speed: speed[c.apex],
                exit_speed: speed[exit],
                brake_start_distance: brake_index.map(|i| distance[i]),
                throttle_on_distance: throttle_index.map(|i| distance[i]),
                peak_decel,
                speed_class: CornerSpeedClass::from_apex_speed(speed[c.apex], config),
            }
        })
        .collect_vec();

    info!(
        "Detected {} corners from {} speed valleys (heading filter {:?})",
        corners.len(),
        candidates.len(),
        heading_filter
    );
    Ok(CornerDetection {
        rejected_candidates: candidates.len() - corners.len(),
        corners,
        heading_filter,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// 300 km/h, down to 80 km/h at `apex` over 100 m, back up to 300 km/h over 100 m.
    pub(crate) fn dip_speed(d: f64, apex: f64, min: f64) -> f64 {
        let offset = (d - apex).abs();
        if offset >= 100. {
            300.
        } else {
            min + (300. - min) * offset / 100.
        }
    }

    fn dip_trace(step: f64, length: f64) -> TelemetryTrace {
        let distance = (0..=(length / step).round() as usize)
            .map(|i| i as f64 * step)
            .collect_vec();
        let speed = distance.iter().map(|d| dip_speed(*d, 600., 80.)).collect_vec();
        TelemetryTrace::new(distance, speed).unwrap()
    }

    #[test]
    fn test_single_dip_independent_of_sample_rate() {
        // 10 and 50 samples across the 200 m dip
        for step in [20., 4.] {
            let detection = detect_corners(&dip_trace(step, 1200.), &CornerConfig::default()).unwrap();
            assert_eq!(detection.corners.len(), 1, "step {}", step);
            let corner = &detection.corners[0];
            assert_eq!(corner.id, 1);
            assert!((corner.min_speed - 80.).abs() < 1e-9);
            assert!((corner.apex_distance - 600.).abs() < 1e-9);
            assert_eq!(corner.speed_class, CornerSpeedClass::Medium);
            assert_eq!(detection.heading_filter, HeadingFilter::Unavailable);
            // no pedals recorded: entry at the start of the drop, exit at the top of the climb
            assert!((corner.entry_distance - 500.).abs() < 1e-9);
            assert!((corner.exit_distance - 700.).abs() < 1e-9);
            assert_eq!(corner.brake_start_distance, None);
        }
    }

    #[test]
    fn test_pedal_metrics() {
        let trace = dip_trace(4., 1200.);
        let brake = trace
            .distance()
            .iter()
            .map(|d| if (500. ..590.).contains(d) { 100. } else { 0. })
            .collect_vec();
        let throttle = trace
            .distance()
            .iter()
            .map(|d| if (500. ..640.).contains(d) { 0. } else { 100. })
            .collect_vec();
        let trace = trace
            .with_channel(Channel::Brake, brake)
            .unwrap()
            .with_channel(Channel::Throttle, throttle)
            .unwrap();

        let detection = detect_corners(&trace, &CornerConfig::default()).unwrap();
        assert_eq!(detection.corners.len(), 1);
        let corner = &detection.corners[0];
        assert_eq!(corner.brake_start_distance, Some(500.));
        assert_eq!(corner.entry_speed, 300.);
        assert_eq!(corner.throttle_on_distance, Some(640.));
        assert!((corner.exit_speed - 168.).abs() < 1e-9);
        assert!((corner.braking_distance().unwrap() - 100.).abs() < 1e-9);
        assert!((corner.throttle_reapply_distance().unwrap() - 40.).abs() < 1e-9);
        assert!(corner.peak_decel < 0.);
    }

    #[test]
    fn test_corners_numbered_by_distance_and_fast_dips_rejected() {
        let distance = (0..=1000).map(|i| i as f64 * 3.).collect_vec();
        let speed = distance
            .iter()
            .map(|d| {
                dip_speed(*d, 600., 80.)
                    .min(dip_speed(*d, 1500., 260.))
                    .min(dip_speed(*d, 2400., 120.))
            })
            .collect_vec();
        let trace = TelemetryTrace::new(distance, speed).unwrap();
        let detection = detect_corners(&trace, &CornerConfig::default()).unwrap();

        let apexes = detection.corners.iter().map(|c| c.apex_distance).collect_vec();
        assert_eq!(apexes, vec![600., 2400.]);
        assert_eq!(detection.corners.iter().map(|c| c.id).collect_vec(), vec![1, 2]);
        assert_eq!(detection.rejected_candidates, 1);
    }

    #[test]
    fn test_short_noise_dip_rejected() {
        let distance = (0..=100).map(|i| i as f64 * 2.).collect_vec();
        let speed = distance
            .iter()
            .map(|d| if (100. ..108.).contains(d) { 285. } else { 300. })
            .collect_vec();
        let trace = TelemetryTrace::new(distance, speed).unwrap();
        let detection = detect_corners(&trace, &CornerConfig::default()).unwrap();
        assert!(detection.corners.is_empty());
        assert_eq!(detection.rejected_candidates, 1);
    }

    #[test]
    fn test_unrecovered_valley_at_end_is_ignored() {
        let trace = dip_trace(5., 600.);
        let detection = detect_corners(&trace, &CornerConfig::default()).unwrap();
        assert!(detection.corners.is_empty());
        assert_eq!(detection.rejected_candidates, 0);
    }

    #[test]
    fn test_heading_filter_rejects_straight_line_dip() {
        let trace = dip_trace(5., 1200.);
        let x = trace.distance().to_vec();
        let y = vec![0.; trace.len()];
        let trace = trace
            .with_channel(Channel::X, x)
            .unwrap()
            .with_channel(Channel::Y, y)
            .unwrap();

        let detection = detect_corners(&trace, &CornerConfig::default()).unwrap();
        assert_eq!(detection.heading_filter, HeadingFilter::Applied);
        assert!(detection.corners.is_empty());

        let config = CornerConfig {
            min_heading_change_deg: None,
            ..CornerConfig::default()
        };
        let detection = detect_corners(&trace, &config).unwrap();
        assert_eq!(detection.heading_filter, HeadingFilter::Disabled);
        assert_eq!(detection.corners.len(), 1);
    }

    #[test]
    fn test_heading_filter_ignores_position_jitter_on_straight() {
        let trace = dip_trace(5., 1200.);
        let x = trace.distance().to_vec();
        let y = (0..trace.len()).map(|i| 0.3 * (1.7 * i as f64).sin()).collect_vec();
        let trace = trace
            .with_channel(Channel::X, x)
            .unwrap()
            .with_channel(Channel::Y, y)
            .unwrap();

        let detection = detect_corners(&trace, &CornerConfig::default()).unwrap();
        assert_eq!(detection.heading_filter, HeadingFilter::Applied);
        assert!(detection.corners.is_empty());
        assert_eq!(detection.rejected_candidates, 1);
    }

    #[test]
    fn test_heading_filter_keeps_real_turn() {
        // straight along x, a 90 degree arc of radius 100 m through the dip, then straight along y
        let trace = dip_trace(5., 1200.);
        let (x, y): (Vec<f64>, Vec<f64>) = trace
            .distance()
            .iter()
            .map(|d| {
                let arc_start = 600. - 78.5;
                if *d < arc_start {
                    (*d, 0.)
                } else if *d < arc_start + 157. {
                    let angle = (d - arc_start) / 100.;
                    (arc_start + 100. * angle.sin(), 100. - 100. * angle.cos())
                } else {
                    (arc_start + 100., 100. + (d - arc_start - 157.))
                }
            })
            .unzip();
        let trace = trace
            .with_channel(Channel::X, x)
            .unwrap()
            .with_channel(Channel::Y, y)
            .unwrap();
        let detection = detect_corners(&trace, &CornerConfig::default()).unwrap();
        assert_eq!(detection.heading_filter, HeadingFilter::Applied);
        assert_eq!(detection.corners.len(), 1);
    }

    #[test]
    fn test_analyzer_trait() {
        let detector = CornerDetector::new(CornerConfig::default());
        let detection = detector.analyze(&dip_trace(5., 1200.)).unwrap();
        assert_eq!(detection.corners.len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_single_dip_found_at_any_sample_rate(step in 0.5f64..20.) {
            let length = 1200.;
            let distance = (0..=(length / step) as usize).map(|i| i as f64 * step).collect_vec();
            let speed = distance.iter().map(|d| dip_speed(*d, 600., 80.)).collect_vec();
            let trace = TelemetryTrace::new(distance, speed).unwrap();
            let detection = detect_corners(&trace, &CornerConfig::default()).unwrap();

            prop_assert_eq!(detection.corners.len(), 1);
            let corner = &detection.corners[0];
            prop_assert!((corner.apex_distance - 600.).abs() <= step / 2. + 1e-9);
            prop_assert!(corner.min_speed <= 80. + 2.2 * step / 2. + 1e-9);
        }
    }
}
