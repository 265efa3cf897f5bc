// End-to-end comparisons of synthetic laps through the public API

use lapdelta::analysis::{CornerPhase, SegmentWinner};
use lapdelta::{AnalysisConfig, BrakingZoneOutcome, Channel, LapDeltaError, TelemetryTrace, compare_laps};

const STRAIGHT_SPEED: f64 = 300.;

fn constant_lap(length: f64, speed: f64) -> TelemetryTrace {
    let distance = (0..=length as usize).map(|d| d as f64).collect::<Vec<_>>();
    let speed = vec![speed; distance.len()];
    TelemetryTrace::new(distance, speed).unwrap()
}

/// A 3 km lap with two 200 m speed valleys, braked into and powered out of.
fn two_corner_lap(apex_speed: f64) -> TelemetryTrace {
    let apexes = [800., 2000.];
    let distance = (0..=1500).map(|i| i as f64 * 2.).collect::<Vec<_>>();
    let speed = distance
        .iter()
        .map(|d| {
            apexes
                .iter()
                .map(|apex| {
                    let offset = (d - apex).abs();
                    if offset < 100. {
                        apex_speed + (STRAIGHT_SPEED - apex_speed) * offset / 100.
                    } else {
                        STRAIGHT_SPEED
                    }
                })
                .fold(STRAIGHT_SPEED, f64::min)
        })
        .collect::<Vec<_>>();
    let brake = distance
        .iter()
        .map(|d| {
            if apexes.iter().any(|apex| ((apex - 100.)..*apex).contains(d)) {
                80.
            } else {
                0.
            }
        })
        .collect::<Vec<_>>();
    let throttle = distance
        .iter()
        .map(|d| {
            if apexes.iter().any(|apex| ((apex - 100.)..(apex + 60.)).contains(d)) {
                0.
            } else {
                100.
            }
        })
        .collect::<Vec<_>>();
    TelemetryTrace::new(distance, speed)
        .and_then(|t| t.with_channel(Channel::Brake, brake))
        .and_then(|t| t.with_channel(Channel::Throttle, throttle))
        .unwrap()
}

#[test]
fn test_constant_speed_offset_end_to_end() {
    let lap_a = constant_lap(1000., 200.5);
    let lap_b = constant_lap(1000., 200.);
    let comparison = compare_laps(&lap_a, &lap_b, &AnalysisConfig::default()).unwrap();

    let expected: f64 = 3.6 * 1000. * (1. / 200. - 1. / 200.5);
    assert!((expected - 0.044888).abs() < 1e-5);
    assert!((comparison.final_delta - expected).abs() < 1e-6);
    assert!(comparison.final_delta > 0.);
    assert_eq!(comparison.grid_points, 201);
    assert_eq!(comparison.total_length, 1000.);

    let segments = &comparison.segments;
    assert_eq!(segments.segments.len(), 10);
    assert!((segments.segment_delta_sum() - comparison.final_delta).abs() < 1e-9);
    assert!(segments.segments.iter().all(|s| s.winner == SegmentWinner::Tie));

    assert!(comparison.corners_a.corners.is_empty());
    assert!(comparison.decomposition.decompositions.is_empty());
    match comparison.braking_zones {
        BrakingZoneOutcome::Skipped { reason } => assert!(reason.contains("laps A and B"), "reason was {}", reason),
        other => panic!("Expected Skipped, got {:?}", other),
    }
}

#[test]
fn test_comparison_is_idempotent() {
    let lap_a = two_corner_lap(90.);
    let lap_b = two_corner_lap(85.);
    let config = AnalysisConfig::default();

    let first = compare_laps(&lap_a, &lap_b, &config).unwrap();
    let second = compare_laps(&lap_a, &lap_b, &config).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_slower_apexes_explained_by_corners() {
    let lap_a = two_corner_lap(90.);
    let lap_b = two_corner_lap(85.);
    let comparison = compare_laps(&lap_a, &lap_b, &AnalysisConfig::default()).unwrap();

    assert!(comparison.final_delta > 0.);
    assert!((comparison.segments.segment_delta_sum() - comparison.final_delta).abs() < 1e-3);
    assert_eq!(comparison.corners_a.corners.len(), 2);
    assert_eq!(comparison.corners_b.corners.len(), 2);

    let decomposition = &comparison.decomposition;
    assert_eq!(decomposition.decompositions.len(), 2);
    assert!(decomposition.unmatched_a.is_empty());
    for corner in &decomposition.decompositions {
        assert!(corner.net_delta > 0.);
        assert!((corner.apex_distance - 800.).abs() < 10. || (corner.apex_distance - 2000.).abs() < 10.);
        assert_ne!(corner.dominant_phase, CornerPhase::Traction);
        let explained = corner.component_sum() + corner.unattributed_delta;
        assert!((explained - corner.net_delta).abs() < 1e-9);
    }

    match &comparison.braking_zones {
        BrakingZoneOutcome::Compared {
            zones_a,
            zones_b,
            report,
            summary,
        } => {
            assert_eq!(zones_a.len(), 2);
            assert_eq!(zones_b.len(), 2);
            assert_eq!(report.comparisons.len(), 2);
            assert!(report.unmatched_a.is_empty() && report.unmatched_b.is_empty());
            assert_eq!(summary.zone_count_a, 2);
            for zone in &report.comparisons {
                assert!(zone.brake_start_delta.abs() < 5.);
                assert!(zone.min_speed_delta > 0.);
            }
        }
        BrakingZoneOutcome::Skipped { reason } => panic!("braking zones skipped: {}", reason),
    }
}

#[test]
fn test_braking_zones_skipped_when_only_one_lap_has_brake() {
    let lap_a = two_corner_lap(90.);
    let braked = two_corner_lap(85.);
    let lap_b = TelemetryTrace::new(braked.distance().to_vec(), braked.speed().to_vec())
        .and_then(|t| t.with_channel(Channel::Throttle, braked.throttle().unwrap().to_vec()))
        .unwrap();

    let comparison = compare_laps(&lap_a, &lap_b, &AnalysisConfig::default()).unwrap();
    match &comparison.braking_zones {
        BrakingZoneOutcome::Skipped { reason } => {
            assert!(reason.contains("lap B"), "reason was {}", reason);
            assert!(!reason.contains("A"), "reason was {}", reason);
        }
        other => panic!("Expected Skipped, got {:?}", other),
    }
    // the rest of the comparison still runs
    assert_eq!(comparison.corners_a.corners.len(), 2);

    let swapped = compare_laps(&lap_b, &lap_a, &AnalysisConfig::default()).unwrap();
    match swapped.braking_zones {
        BrakingZoneOutcome::Skipped { reason } => assert!(reason.contains("lap A"), "reason was {}", reason),
        other => panic!("Expected Skipped, got {:?}", other),
    }
}

#[test]
fn test_disjoint_laps_are_rejected() {
    let lap_a = constant_lap(500., 200.);
    let distance = (1000..=1500).map(|d| d as f64).collect::<Vec<_>>();
    let lap_b = TelemetryTrace::new(distance.clone(), vec![200.; distance.len()]).unwrap();
    assert!(matches!(
        compare_laps(&lap_a, &lap_b, &AnalysisConfig::default()),
        Err(LapDeltaError::InsufficientOverlap { .. })
    ));
}

#[test]
fn test_invalid_config_is_rejected_before_analysis() {
    let mut config = AnalysisConfig::default();
    config.alignment.resolution = 0.;
    assert!(matches!(
        compare_laps(&constant_lap(1000., 200.), &constant_lap(1000., 200.), &config),
        Err(LapDeltaError::InvalidConfig { .. })
    ));
}
