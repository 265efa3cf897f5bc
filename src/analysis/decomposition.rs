// Attribution of each corner's time delta to braking, mid-corner and traction phases.

use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;

use super::corners::Corner;
use super::matching::match_by_distance;
use crate::alignment::AlignedPair;
use crate::config::{DecompositionConfig, IntegrationConfig};
use crate::table::{Table, TabularReport};
use crate::telemetry::physics::elapsed_time;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CornerPhase {
    Braking,
    MidCorner,
    Traction,
}

impl CornerPhase {
    fn label(&self) -> &'static str {
        match self {
            CornerPhase::Braking => "braking",
            CornerPhase::MidCorner => "mid_corner",
            CornerPhase::Traction => "traction",
        }
    }
}

/// How A's braking compares with B's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BrakingAssessment {
    EarlierBraking,
    LaterBraking,
    HigherEntry,
    LowerEntry,
    Similar,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MidCornerAssessment {
    FasterApex,
    SlowerApex,
    Similar,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TractionAssessment {
    BetterExit,
    WorseExit,
    EarlierThrottle,
    LaterThrottle,
    Similar,
}

/// Net delta through one corner driven by both laps, split by phase.
///
/// Deltas are `time_b - time_a`, positive when A was quicker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CornerDeltaDecomposition {
    pub corner_id_a: u32,
    pub corner_id_b: u32,
    /// Midpoint of the two apexes
    pub apex_distance: f64,
    pub braking_delta: f64,
    pub mid_corner_delta: f64,
    pub traction_delta: f64,
    pub dominant_phase: CornerPhase,
    /// Delta over the whole corner, from the earlier entry to the end of traction
    pub net_delta: f64,
    /// `net_delta` minus the three phases
    pub unattributed_delta: f64,
    /// Set when `unattributed_delta` is larger than the configured threshold
    pub discrepancy: bool,
    pub start_distance: f64,
    pub end_distance: f64,
    pub braking_assessment: BrakingAssessment,
    pub mid_corner_assessment: MidCornerAssessment,
    pub traction_assessment: TractionAssessment,
}

impl CornerDeltaDecomposition {
    pub fn component_sum(&self) -> f64 {
        self.braking_delta + self.mid_corner_delta + self.traction_delta
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PhaseTotals {
    pub braking: f64,
    pub mid_corner: f64,
    pub traction: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DecompositionReport {
    pub decompositions: Vec<CornerDeltaDecomposition>,
    /// Ids of A's corners with no counterpart in B, and the reverse
    pub unmatched_a: Vec<u32>,
    pub unmatched_b: Vec<u32>,
}

impl DecompositionReport {
    pub fn phase_totals(&self) -> PhaseTotals {
        self.decompositions
            .iter()
            .fold(PhaseTotals::default(), |totals, d| PhaseTotals {
                braking: totals.braking + d.braking_delta,
                mid_corner: totals.mid_corner + d.mid_corner_delta,
                traction: totals.traction + d.traction_delta,
            })
    }
}

impl TabularReport for DecompositionReport {
    fn to_table(&self) -> Table {
        let d = &self.decompositions;
        Table::new()
            .with_column("corner_a", d.iter().map(|d| d.corner_id_a))
            .with_column("corner_b", d.iter().map(|d| d.corner_id_b))
            .with_column("apex_distance", d.iter().map(|d| d.apex_distance))
            .with_column("net_delta", d.iter().map(|d| d.net_delta))
            .with_column("braking_delta", d.iter().map(|d| d.braking_delta))
            .with_column("mid_corner_delta", d.iter().map(|d| d.mid_corner_delta))
            .with_column("traction_delta", d.iter().map(|d| d.traction_delta))
            .with_column("unattributed_delta", d.iter().map(|d| d.unattributed_delta))
            .with_column("discrepancy", d.iter().map(|d| d.discrepancy))
            .with_column("dominant_phase", d.iter().map(|d| d.dominant_phase.label()))
            .with_column(
                "braking_assessment",
                d.iter().map(|d| format!("{:?}", d.braking_assessment)),
            )
            .with_column(
                "mid_corner_assessment",
                d.iter().map(|d| format!("{:?}", d.mid_corner_assessment)),
            )
            .with_column(
                "traction_assessment",
                d.iter().map(|d| format!("{:?}", d.traction_assessment)),
            )
    }
}

/// Phase with the largest absolute delta. Exact ties resolve braking first, then mid-corner.
pub fn dominant_phase(braking: f64, mid_corner: f64, traction: f64) -> CornerPhase {
    let (b, m, t) = (braking.abs(), mid_corner.abs(), traction.abs());
    if b >= m && b >= t {
        CornerPhase::Braking
    } else if m >= t {
        CornerPhase::MidCorner
    } else {
        CornerPhase::Traction
    }
}

fn assess_braking(a: &Corner, b: &Corner, config: &DecompositionConfig) -> BrakingAssessment {
    let brake_point_diff = a.entry_distance - b.entry_distance;
    let entry_speed_diff = a.entry_speed - b.entry_speed;
    if brake_point_diff < -config.brake_point_similarity {
        BrakingAssessment::EarlierBraking
    } else if brake_point_diff > config.brake_point_similarity {
        BrakingAssessment::LaterBraking
    } else if entry_speed_diff > config.entry_speed_similarity {
        BrakingAssessment::HigherEntry
    } else if entry_speed_diff < -config.entry_speed_similarity {
        BrakingAssessment::LowerEntry
    } else {
        BrakingAssessment::Similar
    }
}

fn assess_mid_corner(a: &Corner, b: &Corner, config: &DecompositionConfig) -> MidCornerAssessment {
    let diff = a.min_speed - b.min_speed;
    if diff > config.apex_speed_similarity {
        MidCornerAssessment::FasterApex
    } else if diff < -config.apex_speed_similarity {
        MidCornerAssessment::SlowerApex
    } else {
        MidCornerAssessment::Similar
    }
}

fn assess_traction(a: &Corner, b: &Corner, config: &DecompositionConfig) -> TractionAssessment {
    let exit_speed_diff = a.exit_speed - b.exit_speed;
    let throttle_diff = a
        .throttle_reapply_distance()
        .zip(b.throttle_reapply_distance())
        .map(|(a, b)| a - b);
    if exit_speed_diff > config.exit_speed_similarity {
        return TractionAssessment::BetterExit;
    }
    if exit_speed_diff < -config.exit_speed_similarity {
        return TractionAssessment::WorseExit;
    }
    match throttle_diff {
        Some(diff) if diff < -config.throttle_point_similarity => TractionAssessment::EarlierThrottle,
        Some(diff) if diff > config.throttle_point_similarity => TractionAssessment::LaterThrottle,
        _ => TractionAssessment::Similar,
    }
}

fn decompose_pair(
    pair: &AlignedPair,
    a: &Corner,
    b: &Corner,
    config: &DecompositionConfig,
    integration: &IntegrationConfig,
) -> CornerDeltaDecomposition {
    let distance = pair.distance();
    let (speed_a, speed_b) = (pair.a().speed(), pair.b().speed());
    let delta_over = |lo: f64, hi: f64| {
        elapsed_time(distance, speed_b, lo, hi, integration.min_speed_kmh)
            - elapsed_time(distance, speed_a, lo, hi, integration.min_speed_kmh)
    };

    let apex = (a.apex_distance + b.apex_distance) / 2.;
    let mid_start = apex - config.mid_corner_half_window;
    let mid_end = apex + config.mid_corner_half_window;

    // braking runs from the later of the two brake points to the mid-corner window
    let braking_start = a.entry_distance.max(b.entry_distance).min(mid_start);

    // traction runs until both drivers are back to the slower of the two exit speeds
    let recovery_speed = a.exit_speed.min(b.exit_speed);
    let traction_limit = a.exit_distance.max(b.exit_distance).max(mid_end);
    let first = distance.partition_point(|d| *d <= mid_end);
    let traction_end = (first..distance.len())
        .take_while(|i| distance[*i] <= traction_limit)
        .find(|i| speed_a[*i] >= recovery_speed && speed_b[*i] >= recovery_speed)
        .map_or(traction_limit, |i| distance[i]);

    let braking_delta = delta_over(braking_start, mid_start);
    let mid_corner_delta = delta_over(mid_start, mid_end);
    let traction_delta = delta_over(mid_end, traction_end);

    let start_distance = a.entry_distance.min(b.entry_distance).min(mid_start);
    let net_delta = delta_over(start_distance, traction_end);
    let unattributed_delta = net_delta - (braking_delta + mid_corner_delta + traction_delta);
    let discrepancy = unattributed_delta.abs() > config.discrepancy_threshold_s;
    if discrepancy {
        warn!(
            "Corner {}/{}: {:.3}s of the {:.3}s net delta is outside the phase windows",
            a.id, b.id, unattributed_delta, net_delta
        );
    }

    CornerDeltaDecomposition {
        corner_id_a: a.id,
        corner_id_b: b.id,
        apex_distance: apex,
        braking_delta,
        mid_corner_delta,
        traction_delta,
        dominant_phase: dominant_phase(braking_delta, mid_corner_delta, traction_delta),
        net_delta,
        unattributed_delta,
        discrepancy,
        start_distance,
        end_distance: traction_end,
        braking_assessment: assess_braking(a, b, config),
        mid_corner_assessment: assess_mid_corner(a, b, config),
        traction_assessment: assess_traction(a, b, config),
    }
}

/// Pairs the corners found in each lap by apex distance and decomposes every pair.
///
/// Corners without a counterpart within `apex_tolerance` are listed in the report instead of
/// being decomposed.
pub fn decompose_corners(
    pair: &AlignedPair,
    corners_a: &[Corner],
    corners_b: &[Corner],
    config: &DecompositionConfig,
    integration: &IntegrationConfig,
) -> DecompositionReport {
    let apexes_a = corners_a.iter().map(|c| c.apex_distance).collect_vec();
    let apexes_b = corners_b.iter().map(|c| c.apex_distance).collect_vec();
    let matching = match_by_distance(&apexes_a, &apexes_b, config.apex_tolerance);

    let decompositions = matching
        .pairs
        .iter()
        .map(|(i, j)| {
            let decomposition = decompose_pair(pair, &corners_a[*i], &corners_b[*j], config, integration);
            debug!(
                "Corner {}/{} at {:.1} m: net {:.3}s, dominant {:?}",
                decomposition.corner_id_a,
                decomposition.corner_id_b,
                decomposition.apex_distance,
                decomposition.net_delta,
                decomposition.dominant_phase
            );
            decomposition
        })
        .collect_vec();
    let report = DecompositionReport {
        decompositions,
        unmatched_a: matching.unmatched_a.iter().map(|i| corners_a[*i].id).collect(),
        unmatched_b: matching.unmatched_b.iter().map(|j| corners_b[*j].id).collect(),
    };

    if !report.unmatched_a.is_empty() || !report.unmatched_b.is_empty() {
        warn!(
            "Corners without a counterpart within {} m: A {:?}, B {:?}",
            config.apex_tolerance, report.unmatched_a, report.unmatched_b
        );
    }
    info!("Decomposed {} matched corners", report.decompositions.len());
    report
}
