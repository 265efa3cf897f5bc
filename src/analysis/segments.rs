// Minisector analysis: where on the lap time is gained or lost.

use itertools::Itertools;
use log::info;
use serde::Serialize;

use super::{mean, population_std};
use crate::LapDeltaError;
use crate::alignment::AlignedPair;
use crate::config::{IntegrationConfig, MinisectorLayout, SegmentConfig};
use crate::table::{Table, TabularReport};
use crate::telemetry::physics::{cumulative_time, interpolate_at, mean_over};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SegmentWinner {
    A,
    B,
    Tie,
}

impl SegmentWinner {
    fn from_delta(delta: f64, tie_threshold: f64) -> Self {
        if delta > tie_threshold {
            SegmentWinner::A
        } else if delta < -tie_threshold {
            SegmentWinner::B
        } else {
            SegmentWinner::Tie
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SegmentWinner::A => "A",
            SegmentWinner::B => "B",
            SegmentWinner::Tie => "Tie",
        }
    }
}

/// One minisector of the aligned lap.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Segment {
    pub index: usize,
    pub start_distance: f64,
    pub end_distance: f64,
    pub time_a: f64,
    pub time_b: f64,
    /// `time_b - time_a`, positive when A was quicker through the segment
    pub delta: f64,
    /// km/h
    pub avg_speed_a: f64,
    pub avg_speed_b: f64,
    pub avg_throttle_a: Option<f64>,
    pub avg_throttle_b: Option<f64>,
    pub winner: SegmentWinner,
}

impl Segment {
    pub fn center_distance(&self) -> f64 {
        (self.start_distance + self.end_distance) / 2.
    }

    pub fn length(&self) -> f64 {
        self.end_distance - self.start_distance
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentAnalysis {
    pub segments: Vec<Segment>,
    pub total_time_a: f64,
    pub total_time_b: f64,
    /// `total_time_b - total_time_a` over the whole aligned range
    pub total_delta: f64,
}

impl SegmentAnalysis {
    pub fn segment_delta_sum(&self) -> f64 {
        self.segments.iter().map(|s| s.delta).sum()
    }

    /// The `n` segments where A gained the most time, biggest gain first.
    pub fn top_gains(&self, n: usize) -> Vec<&Segment> {
        self.segments
            .iter()
            .filter(|s| s.delta > 0.)
            .sorted_by(|x, y| y.delta.total_cmp(&x.delta))
            .take(n)
            .collect()
    }

    /// The `n` segments where A lost the most time, biggest loss first.
    pub fn top_losses(&self, n: usize) -> Vec<&Segment> {
        self.segments
            .iter()
            .filter(|s| s.delta < 0.)
            .sorted_by(|x, y| x.delta.total_cmp(&y.delta))
            .take(n)
            .collect()
    }
}

impl TabularReport for SegmentAnalysis {
    fn to_table(&self) -> Table {
        let s = &self.segments;
        Table::new()
            .with_column("index", s.iter().map(|s| s.index))
            .with_column("start_distance", s.iter().map(|s| s.start_distance))
            .with_column("end_distance", s.iter().map(|s| s.end_distance))
            .with_column("time_a", s.iter().map(|s| s.time_a))
            .with_column("time_b", s.iter().map(|s| s.time_b))
            .with_column("delta", s.iter().map(|s| s.delta))
            .with_column("avg_speed_a", s.iter().map(|s| s.avg_speed_a))
            .with_column("avg_speed_b", s.iter().map(|s| s.avg_speed_b))
            .with_column("avg_throttle_a", s.iter().map(|s| s.avg_throttle_a))
            .with_column("avg_throttle_b", s.iter().map(|s| s.avg_throttle_b))
            .with_column("winner", s.iter().map(|s| s.winner.label()))
    }
}

/// Boundaries of equal-length segments covering `[start, end]`, `n + 1` values with the
/// last one exactly `end`.
pub fn segment_boundaries(start: f64, end: f64, layout: MinisectorLayout) -> Result<Vec<f64>, LapDeltaError> {
    let span = end - start;
    let count = match layout {
        MinisectorLayout::Count(n) => n,
        MinisectorLayout::Length(length) if length > 0. => ((span / length).round() as usize).max(1),
        MinisectorLayout::Length(_) => 0,
    };
    if count == 0 {
        return Err(LapDeltaError::InvalidConfig {
            field: "segments.layout".to_string(),
            reason: "must describe at least one segment".to_string(),
        });
    }
    Ok((0..=count)
        .map(|i| {
            if i == count {
                end
            } else {
                start + span * i as f64 / count as f64
            }
        })
        .collect())
}

/// Splits the aligned lap into minisectors and integrates each driver's time through them.
pub fn analyze_segments(
    pair: &AlignedPair,
    config: &SegmentConfig,
    integration: &IntegrationConfig,
) -> Result<SegmentAnalysis, LapDeltaError> {
    let distance = pair.distance();
    let (speed_a, speed_b) = (pair.a().speed(), pair.b().speed());
    let throttle = pair.a().throttle().zip(pair.b().throttle());
    // every window is read off one elapsed-time curve per lap so that windows add up
    let elapsed_a = cumulative_time(distance, speed_a, integration.min_speed_kmh);
    let elapsed_b = cumulative_time(distance, speed_b, integration.min_speed_kmh);
    let time = |elapsed: &[f64], lo: f64, hi: f64| interpolate_at(distance, elapsed, hi) - interpolate_at(distance, elapsed, lo);

    let boundaries = segment_boundaries(pair.start_distance(), pair.end_distance(), config.layout)?;
    let segments = boundaries
        .iter()
        .tuple_windows()
        .enumerate()
        .map(|(index, (lo, hi))| {
            let (lo, hi) = (*lo, *hi);
            let time_a = time(&elapsed_a, lo, hi);
            let time_b = time(&elapsed_b, lo, hi);
            let delta = time_b - time_a;
            Segment {
                index,
                start_distance: lo,
                end_distance: hi,
                time_a,
                time_b,
                delta,
                avg_speed_a: mean_over(distance, speed_a, lo, hi),
                avg_speed_b: mean_over(distance, speed_b, lo, hi),
                avg_throttle_a: throttle.map(|(a, _)| mean_over(distance, a, lo, hi)),
                avg_throttle_b: throttle.map(|(_, b)| mean_over(distance, b, lo, hi)),
                winner: SegmentWinner::from_delta(delta, config.tie_threshold_s),
            }
        })
        .collect_vec();

    let total_time_a = time(&elapsed_a, pair.start_distance(), pair.end_distance());
    let total_time_b = time(&elapsed_b, pair.start_distance(), pair.end_distance());
    let analysis = SegmentAnalysis {
        segments,
        total_time_a,
        total_time_b,
        total_delta: total_time_b - total_time_a,
    };
    info!(
        "Computed {} minisectors, total delta {:.3}s",
        analysis.segments.len(),
        analysis.total_delta
    );
    Ok(analysis)
}

/// Running `time_b - time_a` at every grid point, starting from zero.
pub fn delta_time_curve(pair: &AlignedPair, integration: &IntegrationConfig) -> Vec<f64> {
    let elapsed_a = cumulative_time(pair.distance(), pair.a().speed(), integration.min_speed_kmh);
    let elapsed_b = cumulative_time(pair.distance(), pair.b().speed(), integration.min_speed_kmh);
    elapsed_b.iter().zip(&elapsed_a).map(|(b, a)| b - a).collect()
}

/// Spread of minisector deltas across several laps compared with the same reference lap.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MinisectorVariance {
    pub start_distance: Vec<f64>,
    pub end_distance: Vec<f64>,
    pub mean_delta: Vec<f64>,
    /// Population standard deviation of the delta per segment
    pub std_delta: Vec<f64>,
    /// Segments whose spread exceeds the configured threshold
    pub mistake_zones: Vec<usize>,
}

impl TabularReport for MinisectorVariance {
    fn to_table(&self) -> Table {
        Table::new()
            .with_column("index", 0..self.mean_delta.len())
            .with_column("start_distance", self.start_distance.iter().copied())
            .with_column("end_distance", self.end_distance.iter().copied())
            .with_column("mean_delta", self.mean_delta.iter().copied())
            .with_column("std_delta", self.std_delta.iter().copied())
            .with_column(
                "mistake_zone",
                (0..self.mean_delta.len()).map(|i| self.mistake_zones.contains(&i)),
            )
    }
}

pub fn minisector_variance(
    analyses: &[SegmentAnalysis],
    config: &SegmentConfig,
) -> Result<MinisectorVariance, LapDeltaError> {
    let Some(first) = analyses.first() else {
        return Err(LapDeltaError::NotAligned {
            reason: "no segment analyses to compare".to_string(),
        });
    };
    let layout_matches = |analysis: &SegmentAnalysis| {
        analysis.segments.len() == first.segments.len()
            && analysis
                .segments
                .iter()
                .zip(&first.segments)
                .all(|(s, f)| s.start_distance == f.start_distance && s.end_distance == f.end_distance)
    };
    if !analyses.iter().all(layout_matches) {
        return Err(LapDeltaError::NotAligned {
            reason: "segment layouts differ between laps".to_string(),
        });
    }

    let mut variance = MinisectorVariance {
        start_distance: first.segments.iter().map(|s| s.start_distance).collect(),
        end_distance: first.segments.iter().map(|s| s.end_distance).collect(),
        mean_delta: Vec::with_capacity(first.segments.len()),
        std_delta: Vec::with_capacity(first.segments.len()),
        mistake_zones: Vec::new(),
    };
    for index in 0..first.segments.len() {
        let deltas = analyses.iter().map(|a| a.segments[index].delta).collect_vec();
        let std = population_std(&deltas).unwrap_or(0.);
        variance.mean_delta.push(mean(&deltas).unwrap_or(0.));
        variance.std_delta.push(std);
        if std > config.variance_threshold_s {
            variance.mistake_zones.push(index);
        }
    }
    info!(
        "Minisector variance over {} laps, {} mistake zones",
        analyses.len(),
        variance.mistake_zones.len()
    );
    Ok(variance)
}
