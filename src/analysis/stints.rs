use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use super::{mean, median, population_std};
use crate::config::StintConfig;
use crate::table::{Table, TabularReport};
use crate::telemetry::LapRecord;

/// Why a lap does not count towards a stint's pace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LapExclusion {
    Invalid,
    MissingTime,
    /// Slower than the outlier multiple of the stint median
    Outlier,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StintLap {
    pub lap_number: u32,
    pub lap_time_s: Option<f64>,
    pub excluded: Option<LapExclusion>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaceStats {
    pub included_laps: usize,
    pub median_lap_time: f64,
    pub best_lap_time: f64,
    pub mean_lap_time: f64,
    /// Population standard deviation of the included lap times
    pub consistency: f64,
    /// Mean of the last laps minus mean of the first laps, positive when slowing down.
    /// Absent when the stint is too short for two separate windows.
    pub pace_drop: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum StintPace {
    Available(PaceStats),
    /// Fewer than two laps counted towards pace
    Unavailable { included_laps: usize },
}

impl StintPace {
    pub fn stats(&self) -> Option<&PaceStats> {
        match self {
            StintPace::Available(stats) => Some(stats),
            StintPace::Unavailable { .. } => None,
        }
    }
}

/// A run of laps on one set of tires.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stint {
    pub stint_number: u32,
    pub first_lap: u32,
    pub last_lap: u32,
    pub compound: Option<String>,
    /// Every lap of the stint, excluded ones included
    pub laps: Vec<StintLap>,
    pub pace: StintPace,
}

impl Stint {
    /// Lap times counted towards pace, in lap order.
    pub fn lap_times(&self) -> Vec<f64> {
        self.laps
            .iter()
            .filter(|lap| lap.excluded.is_none())
            .filter_map(|lap| lap.lap_time_s)
            .collect()
    }

    pub fn lap_count(&self) -> usize {
        self.laps.len()
    }
}

impl TabularReport for [Stint] {
    fn to_table(&self) -> Table {
        let stats = self.iter().map(|s| s.pace.stats()).collect_vec();
        Table::new()
            .with_column("stint", self.iter().map(|s| s.stint_number))
            .with_column("first_lap", self.iter().map(|s| s.first_lap))
            .with_column("last_lap", self.iter().map(|s| s.last_lap))
            .with_column("compound", self.iter().map(|s| s.compound.clone()))
            .with_column("laps", self.iter().map(|s| s.lap_count()))
            .with_column("included_laps", self.iter().map(|s| s.lap_times().len()))
            .with_column("median_lap_time", stats.iter().map(|s| s.map(|s| s.median_lap_time)))
            .with_column("best_lap_time", stats.iter().map(|s| s.map(|s| s.best_lap_time)))
            .with_column("consistency", stats.iter().map(|s| s.map(|s| s.consistency)))
            .with_column("pace_drop", stats.iter().map(|s| s.and_then(|s| s.pace_drop)))
    }
}

fn starts_new_stint(lap: &LapRecord, previous_compound: Option<&str>, is_first: bool) -> bool {
    if is_first {
        return false;
    }
    if lap.pit_out_time_s.is_some() {
        return true;
    }
    matches!((lap.compound.as_deref(), previous_compound), (Some(current), Some(previous)) if current != previous)
}

fn build_stint(stint_number: u32, laps: &[&LapRecord], config: &StintConfig) -> Stint {
    let reference = laps
        .iter()
        .filter(|lap| lap.is_valid)
        .filter_map(|lap| lap.lap_time_s)
        .collect_vec();
    let outlier_limit = median(&reference).map(|m| m * config.outlier_multiplier);

    let stint_laps = laps
        .iter()
        .map(|lap| {
            let excluded = match (lap.is_valid, lap.lap_time_s, outlier_limit) {
                (false, _, _) => Some(LapExclusion::Invalid),
                (true, None, _) => Some(LapExclusion::MissingTime),
                (true, Some(time), Some(limit)) if time > limit => Some(LapExclusion::Outlier),
                _ => None,
            };
            StintLap {
                lap_number: lap.lap_number,
                lap_time_s: lap.lap_time_s,
                excluded,
            }
        })
        .collect_vec();

    let mut stint = Stint {
        stint_number,
        first_lap: laps.first().map_or(0, |lap| lap.lap_number),
        last_lap: laps.last().map_or(0, |lap| lap.lap_number),
        compound: laps.iter().find_map(|lap| lap.compound.clone()),
        laps: stint_laps,
        pace: StintPace::Unavailable { included_laps: 0 },
    };
    stint.pace = pace_stats(&stint.lap_times(), config.pace_window_laps);
    stint
}

fn pace_stats(times: &[f64], window: usize) -> StintPace {
    let unavailable = StintPace::Unavailable {
        included_laps: times.len(),
    };
    if times.len() < 2 {
        return unavailable;
    }
    let (Some(median_lap_time), Some(mean_lap_time), Some(consistency)) =
        (median(times), mean(times), population_std(times))
    else {
        return unavailable;
    };
    let pace_drop = if window > 0 && times.len() >= 2 * window {
        mean(&times[times.len() - window..])
            .zip(mean(&times[..window]))
            .map(|(last, first)| last - first)
    } else {
        None
    };
    StintPace::Available(PaceStats {
        included_laps: times.len(),
        median_lap_time,
        best_lap_time: times.iter().copied().fold(f64::INFINITY, f64::min),
        mean_lap_time,
        consistency,
        pace_drop,
    })
}

/// Splits one driver's race into stints at pit exits and tire compound changes.
///
/// Laps are processed in lap number order regardless of input order.
pub fn segment_stints(laps: &[LapRecord], config: &StintConfig) -> Vec<Stint> {
    if !laps.iter().tuple_windows().all(|(a, b)| a.lap_number <= b.lap_number) {
        warn!("Lap records are not in lap order, sorting by lap number");
    }
    let ordered = laps.iter().sorted_by_key(|lap| lap.lap_number).collect_vec();

    let mut boundaries = Vec::new();
    let mut previous_compound: Option<&str> = None;
    for (i, lap) in ordered.iter().enumerate() {
        if starts_new_stint(lap, previous_compound, i == 0) {
            boundaries.push(i);
        }
        if let Some(compound) = lap.compound.as_deref() {
            previous_compound = Some(compound);
        }
    }

    let starts = std::iter::once(0).chain(boundaries.iter().copied());
    let ends = boundaries.iter().copied().chain(std::iter::once(ordered.len()));
    let stints = starts
        .zip(ends)
        .filter(|(start, end)| end > start)
        .enumerate()
        .map(|(n, (start, end))| build_stint(n as u32 + 1, &ordered[start..end], config))
        .collect_vec();

    info!("Detected {} stints over {} laps", stints.len(), ordered.len());
    stints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lap(lap_number: u32, time: f64, compound: &str) -> LapRecord {
        LapRecord {
            lap_number,
            lap_time_s: Some(time),
            is_valid: true,
            compound: Some(compound.to_string()),
            ..LapRecord::default()
        }
    }

    fn race() -> Vec<LapRecord> {
        (1..=20)
            .map(|n| {
                if n <= 10 {
                    lap(n, 90. + n as f64 * 0.1, "MEDIUM")
                } else {
                    let mut record = lap(n, 89. + (n - 10) as f64 * 0.05, "HARD");
                    if n == 11 {
                        record.pit_out_time_s = Some(1234.5);
                    }
                    record
                }
            })
            .collect()
    }

    #[test]
    fn test_pit_stop_and_compound_change_split_race() {
        let stints = segment_stints(&race(), &StintConfig::default());
        assert_eq!(stints.len(), 2);
        assert_eq!((stints[0].first_lap, stints[0].last_lap), (1, 10));
        assert_eq!((stints[1].first_lap, stints[1].last_lap), (11, 20));
        assert_eq!(stints[0].compound.as_deref(), Some("MEDIUM"));
        assert_eq!(stints[1].compound.as_deref(), Some("HARD"));
        assert_eq!(stints[1].stint_number, 2);
    }

    #[test]
    fn test_consistency_is_population_std() {
        let stints = segment_stints(&race(), &StintConfig::default());
        let times = (1..=10).map(|n| 90. + n as f64 * 0.1).collect_vec();
        let mean = times.iter().sum::<f64>() / 10.;
        let expected = (times.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / 10.).sqrt();
        let stats = stints[0].pace.stats().unwrap();
        assert!((stats.consistency - expected).abs() < 1e-12);
        assert!((stats.best_lap_time - 90.1).abs() < 1e-9);
        // last three average 90.9, first three 90.2
        assert!((stats.pace_drop.unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_compound_change_alone_splits() {
        let laps = vec![lap(1, 90., "SOFT"), lap(2, 90., "SOFT"), lap(3, 91., "MEDIUM")];
        let stints = segment_stints(&laps, &StintConfig::default());
        assert_eq!(stints.len(), 2);
        assert_eq!(stints[1].first_lap, 3);
        assert_eq!(
            stints[1].pace,
            StintPace::Unavailable { included_laps: 1 }
        );
    }

    #[test]
    fn test_missing_compound_does_not_split() {
        let mut laps = vec![lap(1, 90., "SOFT"), lap(2, 90., "SOFT"), lap(3, 90., "SOFT")];
        laps[1].compound = None;
        assert_eq!(segment_stints(&laps, &StintConfig::default()).len(), 1);
    }

    #[test]
    fn test_outliers_and_invalid_laps_kept_but_excluded() {
        let mut laps = (1..=8).map(|n| lap(n, 90., "SOFT")).collect_vec();
        laps[2].lap_time_s = Some(130.);
        laps[4].is_valid = false;
        laps[5].lap_time_s = None;
        let stints = segment_stints(&laps, &StintConfig::default());
        assert_eq!(stints.len(), 1);
        let stint = &stints[0];
        assert_eq!(stint.lap_count(), 8);
        assert_eq!(stint.laps[2].excluded, Some(LapExclusion::Outlier));
        assert_eq!(stint.laps[4].excluded, Some(LapExclusion::Invalid));
        assert_eq!(stint.laps[5].excluded, Some(LapExclusion::MissingTime));
        let stats = stint.pace.stats().unwrap();
        assert_eq!(stats.included_laps, 5);
        assert_eq!(stats.consistency, 0.);
        // five included laps cannot fill two windows of three
        assert_eq!(stats.pace_drop, None);
    }

    #[test]
    fn test_unordered_laps_are_sorted() {
        let mut laps = race();
        laps.reverse();
        let stints = segment_stints(&laps, &StintConfig::default());
        assert_eq!(stints.len(), 2);
        assert_eq!(stints[0].first_lap, 1);
        assert_eq!(stints[0].laps.iter().map(|l| l.lap_number).collect_vec(), (1..=10).collect_vec());
    }

    #[test]
    fn test_empty_race() {
        assert!(segment_stints(&[], &StintConfig::default()).is_empty());
    }

    #[test]
    fn test_first_lap_pit_exit_is_not_a_boundary() {
        let mut laps = vec![lap(1, 95., "SOFT"), lap(2, 90., "SOFT")];
        laps[0].pit_out_time_s = Some(10.);
        let stints = segment_stints(&laps, &StintConfig::default());
        assert_eq!(stints.len(), 1);
        assert_eq!(stints.to_table().row_count(), 1);
    }
}
