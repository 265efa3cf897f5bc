// Driving style statistics for one driver over any number of laps.
//
// Each lap is reduced to its own statistics first, then laps are averaged with equal weight.
// A short lap counts as much as a long one; this is not a sample-weighted aggregate.

use itertools::Itertools;
use log::info;
use serde::Serialize;

use super::{TraceAnalyzer, lat_accel, long_accel, mean, population_std};
use crate::LapDeltaError;
use crate::config::StyleConfig;
use crate::table::{Table, TabularReport, TableValue};
use crate::telemetry::{Channel, TelemetryTrace};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpeedStats {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub std: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThrottleStats {
    pub mean: f64,
    pub full_throttle_pct: f64,
    pub partial_throttle_pct: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BrakeStats {
    /// Mean brake input in percent
    pub mean: f64,
    pub braking_pct: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GearStats {
    pub most_common: i32,
    pub mean: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LongitudinalStats {
    pub mean: f64,
    pub max_accel: f64,
    /// Most negative acceleration
    pub max_decel: f64,
    pub accelerating_pct: f64,
    pub decelerating_pct: f64,
    /// Derived from speed because no acceleration channel was recorded
    pub derived: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LateralStats {
    pub mean_abs: f64,
    pub max_abs: f64,
    /// Derived from the curvature of the X/Y path because no lateral channel was recorded
    pub derived: bool,
}

/// Statistics of a single lap.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LapStyleStats {
    pub samples: usize,
    pub speed: SpeedStats,
    pub throttle: Option<ThrottleStats>,
    pub brake: Option<BrakeStats>,
    pub gear: Option<GearStats>,
    pub longitudinal: LongitudinalStats,
    pub lateral: Option<LateralStats>,
}

fn pct(values: &[f64], predicate: impl Fn(f64) -> bool) -> f64 {
    values.iter().filter(|v| predicate(**v)).count() as f64 / values.len() as f64 * 100.
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Most frequent value, the lowest one on ties.
fn mode(values: impl IntoIterator<Item = i32>) -> Option<i32> {
    values
        .into_iter()
        .counts()
        .into_iter()
        .max_by(|(gear_a, count_a), (gear_b, count_b)| count_a.cmp(count_b).then(gear_b.cmp(gear_a)))
        .map(|(gear, _)| gear)
}

pub struct LapStyleAnalyzer {
    config: StyleConfig,
}

impl LapStyleAnalyzer {
    pub fn new(config: StyleConfig) -> Self {
        Self { config }
    }
}

impl TraceAnalyzer for LapStyleAnalyzer {
    type Output = LapStyleStats;

    fn analyze(&self, trace: &TelemetryTrace) -> Result<LapStyleStats, LapDeltaError> {
        if trace.len() < 2 {
            return Err(LapDeltaError::TooFewSamples {
                count: trace.len(),
                required: 2,
            });
        }
        let config = &self.config;
        let speed = trace.speed();

        let throttle = trace.throttle().map(|t| ThrottleStats {
            mean: mean(t).unwrap_or(0.),
            full_throttle_pct: pct(t, |v| v >= config.full_throttle_threshold),
            partial_throttle_pct: pct(t, |v| {
                v > config.partial_throttle_floor && v < config.full_throttle_threshold
            }),
        });
        let brake = trace.brake_pct().map(|b| BrakeStats {
            mean: mean(&b).unwrap_or(0.),
            braking_pct: pct(&b, |v| v > config.brake_threshold),
        });
        let gear = trace.channel(Channel::Gear).and_then(|g| {
            let gears = (0..g.len()).filter_map(|i| trace.gear_at(i)).collect_vec();
            Some(GearStats {
                most_common: mode(gears.iter().copied())?,
                mean: mean(g)?,
            })
        });

        let (accel, derived) = long_accel(trace);
        let longitudinal = LongitudinalStats {
            mean: mean(&accel).unwrap_or(0.),
            max_accel: max(&accel),
            max_decel: min(&accel),
            accelerating_pct: pct(&accel, |a| a > config.accel_deadband),
            decelerating_pct: pct(&accel, |a| a < -config.accel_deadband),
            derived,
        };
        let lateral = lat_accel(trace).map(|(lat, derived)| {
            let abs = lat.iter().map(|a| a.abs()).collect_vec();
            LateralStats {
                mean_abs: mean(&abs).unwrap_or(0.),
                max_abs: max(&abs),
                derived,
            }
        });

        Ok(LapStyleStats {
            samples: trace.len(),
            speed: SpeedStats {
                mean: mean(speed).unwrap_or(0.),
                max: max(speed),
                min: min(speed),
                std: population_std(speed).unwrap_or(0.),
            },
            throttle,
            brake,
            gear,
            longitudinal,
            lateral,
        })
    }
}

/// A driver's style over a set of laps. Every figure is the unweighted mean of the per-lap
/// figures; optional groups average over the laps that recorded them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriverStyleProfile {
    pub driver: String,
    pub lap_count: usize,
    pub speed: SpeedStats,
    pub throttle: Option<ThrottleStats>,
    pub brake: Option<BrakeStats>,
    /// `most_common` is the most common per-lap mode
    pub gear: Option<GearStats>,
    pub longitudinal: LongitudinalStats,
    pub lateral: Option<LateralStats>,
    pub laps: Vec<LapStyleStats>,
}

/// Unweighted mean of `f` over per-lap groups.
fn lap_mean<T>(groups: &[&T], f: impl Fn(&T) -> f64) -> f64 {
    mean(&groups.iter().copied().map(f).collect_vec()).unwrap_or(0.)
}

fn present<'a, T>(
    laps: &'a [LapStyleStats],
    group: impl Fn(&'a LapStyleStats) -> Option<&'a T>,
) -> Option<Vec<&'a T>> {
    let groups = laps.iter().filter_map(group).collect_vec();
    if groups.is_empty() { None } else { Some(groups) }
}

pub fn aggregate_style(
    driver: &str,
    traces: &[TelemetryTrace],
    config: &StyleConfig,
) -> Result<DriverStyleProfile, LapDeltaError> {
    if traces.is_empty() {
        return Err(LapDeltaError::TooFewSamples {
            count: 0,
            required: 1,
        });
    }
    let analyzer = LapStyleAnalyzer::new(config.clone());
    let laps = traces
        .iter()
        .map(|trace| analyzer.analyze(trace))
        .collect::<Result<Vec<_>, _>>()?;

    let speeds = laps.iter().map(|l| &l.speed).collect_vec();
    let longitudinal = laps.iter().map(|l| &l.longitudinal).collect_vec();
    let profile = DriverStyleProfile {
        driver: driver.to_string(),
        lap_count: laps.len(),
        speed: SpeedStats {
            mean: lap_mean(&speeds, |s| s.mean),
            max: lap_mean(&speeds, |s| s.max),
            min: lap_mean(&speeds, |s| s.min),
            std: lap_mean(&speeds, |s| s.std),
        },
        throttle: present(&laps, |l| l.throttle.as_ref()).map(|t| ThrottleStats {
            mean: lap_mean(&t, |t| t.mean),
            full_throttle_pct: lap_mean(&t, |t| t.full_throttle_pct),
            partial_throttle_pct: lap_mean(&t, |t| t.partial_throttle_pct),
        }),
        brake: present(&laps, |l| l.brake.as_ref()).map(|b| BrakeStats {
            mean: lap_mean(&b, |b| b.mean),
            braking_pct: lap_mean(&b, |b| b.braking_pct),
        }),
        gear: present(&laps, |l| l.gear.as_ref()).and_then(|g| {
            Some(GearStats {
                most_common: mode(g.iter().map(|g| g.most_common))?,
                mean: lap_mean(&g, |g| g.mean),
            })
        }),
        longitudinal: LongitudinalStats {
            mean: lap_mean(&longitudinal, |l| l.mean),
            max_accel: lap_mean(&longitudinal, |l| l.max_accel),
            max_decel: lap_mean(&longitudinal, |l| l.max_decel),
            accelerating_pct: lap_mean(&longitudinal, |l| l.accelerating_pct),
            decelerating_pct: lap_mean(&longitudinal, |l| l.decelerating_pct),
            derived: longitudinal.iter().any(|l| l.derived),
        },
        lateral: present(&laps, |l| l.lateral.as_ref()).map(|l| LateralStats {
            mean_abs: lap_mean(&l, |l| l.mean_abs),
            max_abs: lap_mean(&l, |l| l.max_abs),
            derived: l.iter().any(|l| l.derived),
        }),
        laps,
    };
    info!("Style profile for {} over {} laps", driver, profile.lap_count);
    Ok(profile)
}

impl DriverStyleProfile {
    /// Numeric statistics by name, `None` where the laps did not record the channel.
    pub fn statistics(&self) -> Vec<(&'static str, Option<f64>)> {
        let throttle = self.throttle.as_ref();
        let brake = self.brake.as_ref();
        let gear = self.gear.as_ref();
        let lateral = self.lateral.as_ref();
        vec![
            ("avg_speed", Some(self.speed.mean)),
            ("max_speed", Some(self.speed.max)),
            ("min_speed", Some(self.speed.min)),
            ("speed_std", Some(self.speed.std)),
            ("avg_throttle", throttle.map(|t| t.mean)),
            ("percent_full_throttle", throttle.map(|t| t.full_throttle_pct)),
            ("percent_partial_throttle", throttle.map(|t| t.partial_throttle_pct)),
            ("avg_brake", brake.map(|b| b.mean)),
            ("percent_braking", brake.map(|b| b.braking_pct)),
            ("avg_gear", gear.map(|g| g.mean)),
            ("avg_long_accel", Some(self.longitudinal.mean)),
            ("max_accel", Some(self.longitudinal.max_accel)),
            ("max_decel", Some(self.longitudinal.max_decel)),
            ("percent_accelerating", Some(self.longitudinal.accelerating_pct)),
            ("percent_decelerating", Some(self.longitudinal.decelerating_pct)),
            ("avg_lat_accel", lateral.map(|l| l.mean_abs)),
            ("max_lat_accel", lateral.map(|l| l.max_abs)),
        ]
    }
}

impl TabularReport for DriverStyleProfile {
    fn to_table(&self) -> Table {
        let head: Vec<(&str, TableValue)> = vec![
            ("driver", self.driver.clone().into()),
            ("lap_count", self.lap_count.into()),
            ("most_common_gear", self.gear.as_ref().map(|g| g.most_common).into()),
        ];
        let (names, values): (Vec<&str>, Vec<TableValue>) = head
            .into_iter()
            .chain(self.statistics().into_iter().map(|(name, value)| (name, value.into())))
            .unzip();
        Table::new()
            .with_column("statistic", names)
            .with_column("value", values)
    }
}

/// One statistic of two drivers side by side.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StyleComparisonRow {
    pub statistic: &'static str,
    pub value_a: f64,
    pub value_b: f64,
    /// `value_a - value_b`
    pub delta: f64,
}

/// Two style profiles compared statistic by statistic.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StyleComparison {
    pub driver_a: String,
    pub driver_b: String,
    /// Only statistics both profiles carry
    pub rows: Vec<StyleComparisonRow>,
}

pub fn compare_styles(a: &DriverStyleProfile, b: &DriverStyleProfile) -> StyleComparison {
    let rows = a
        .statistics()
        .into_iter()
        .zip(b.statistics())
        .filter_map(|((statistic, value_a), (_, value_b))| {
            let (value_a, value_b) = (value_a?, value_b?);
            Some(StyleComparisonRow {
                statistic,
                value_a,
                value_b,
                delta: value_a - value_b,
            })
        })
        .collect_vec();
    info!(
        "Compared styles of {} and {} over {} statistics",
        a.driver,
        b.driver,
        rows.len()
    );
    StyleComparison {
        driver_a: a.driver.clone(),
        driver_b: b.driver.clone(),
        rows,
    }
}

impl TabularReport for StyleComparison {
    fn to_table(&self) -> Table {
        let (name_a, name_b) = if self.driver_a == self.driver_b {
            (format!("{}_a", self.driver_a), format!("{}_b", self.driver_b))
        } else {
            (self.driver_a.clone(), self.driver_b.clone())
        };
        let r = &self.rows;
        Table::new()
            .with_column("statistic", r.iter().map(|r| r.statistic))
            .with_column(&name_a, r.iter().map(|r| r.value_a))
            .with_column(&name_b, r.iter().map(|r| r.value_b))
            .with_column("delta", r.iter().map(|r| r.delta))
    }
}
