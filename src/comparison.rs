use log::{info, warn};
use serde::Serialize;

use crate::LapDeltaError;
use crate::alignment::align_traces;
use crate::analysis::{
    BrakingZone, BrakingZoneDetector, BrakingZoneReport, BrakingZoneSummary, CornerDetection, DecompositionReport,
    SegmentAnalysis, TraceAnalyzer, analyze_segments, compare_braking_zones, decompose_corners, delta_time_curve,
    detect_corners, summarize_braking_zones,
};
use crate::config::AnalysisConfig;
use crate::telemetry::{Channel, TelemetryTrace};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum BrakingZoneOutcome {
    Compared {
        zones_a: Vec<BrakingZone>,
        zones_b: Vec<BrakingZone>,
        report: BrakingZoneReport,
        summary: BrakingZoneSummary,
    },
    /// One or both laps had no brake channel; `reason` names them
    Skipped { reason: String },
}

/// Everything known about how lap A compares with lap B.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LapComparison {
    pub grid_points: usize,
    pub resolution: f64,
    pub start_distance: f64,
    pub total_length: f64,
    /// `time_b - time_a` at the end of the aligned range
    pub final_delta: f64,
    pub delta_curve: Vec<f64>,
    pub segments: SegmentAnalysis,
    pub corners_a: CornerDetection,
    pub corners_b: CornerDetection,
    pub decomposition: DecompositionReport,
    pub braking_zones: BrakingZoneOutcome,
}

/// Aligns two laps and runs every pairwise analysis on them.
pub fn compare_laps(
    trace_a: &TelemetryTrace,
    trace_b: &TelemetryTrace,
    config: &AnalysisConfig,
) -> Result<LapComparison, LapDeltaError> {
    config.validate()?;
    let pair = align_traces(trace_a, trace_b, &config.alignment)?;

    let segments = analyze_segments(&pair, &config.segments, &config.integration)?;
    let delta_curve = delta_time_curve(&pair, &config.integration);
    let corners_a = detect_corners(pair.a(), &config.corners)?;
    let corners_b = detect_corners(pair.b(), &config.corners)?;
    let decomposition = decompose_corners(
        &pair,
        &corners_a.corners,
        &corners_b.corners,
        &config.decomposition,
        &config.integration,
    );

    // alignment drops a channel from both laps when either lacks it, so name the lap from the
    // recorded traces
    let unbraked = [("A", trace_a), ("B", trace_b)]
        .into_iter()
        .filter(|(_, trace)| !trace.has(Channel::Brake))
        .map(|(label, _)| label)
        .collect::<Vec<_>>();
    let braking_zones = if unbraked.is_empty() {
        let detect_zones = |label: &str, trace: &TelemetryTrace| {
            BrakingZoneDetector::new(config.braking_zones.clone(), config.integration.clone())
                .with_label(label)
                .analyze(trace)
        };
        let zones_a = detect_zones("A", pair.a())?;
        let zones_b = detect_zones("B", pair.b())?;
        let report = compare_braking_zones(&pair, &zones_a, &zones_b, &config.braking_zones, &config.integration);
        let summary = summarize_braking_zones(&zones_a, &zones_b);
        BrakingZoneOutcome::Compared {
            zones_a,
            zones_b,
            report,
            summary,
        }
    } else {
        let reason = match unbraked.as_slice() {
            [lap] => format!("brake channel not recorded in lap {}", lap),
            _ => "brake channel not recorded in laps A and B".to_string(),
        };
        warn!("Skipping braking zone comparison: {}", reason);
        BrakingZoneOutcome::Skipped { reason }
    };

    let final_delta = delta_curve.last().copied().unwrap_or(0.);
    info!(
        "Compared laps over {:.1} m: B - A = {:.3}s",
        pair.total_length(),
        final_delta
    );
    Ok(LapComparison {
        grid_points: pair.len(),
        resolution: pair.resolution(),
        start_distance: pair.start_distance(),
        total_length: pair.total_length(),
        final_delta,
        delta_curve,
        segments,
        corners_a,
        corners_b,
        decomposition,
        braking_zones,
    })
}
