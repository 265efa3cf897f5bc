pub mod loader;
pub mod physics;

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::LapDeltaError;

/// With [`BrakeScale::Auto`], brake values at or below this across the whole trace are
/// treated as a 0/1 flag or a 0..1 fraction and scaled to percent.
const FRACTIONAL_BRAKE_MAX: f64 = 1.0;

/// How the recorded brake channel maps onto 0..100 percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrakeScale {
    /// Fraction when no sample exceeds 1, percent otherwise
    #[default]
    Auto,
    /// 0/1 flag or 0..1 fraction
    Fraction,
    /// 0..100 pedal percentage
    Percent,
}

impl BrakeScale {
    fn to_percent(self, brake: &[f64]) -> Vec<f64> {
        let fractional = match self {
            BrakeScale::Auto => brake.iter().all(|b| *b <= FRACTIONAL_BRAKE_MAX),
            BrakeScale::Fraction => true,
            BrakeScale::Percent => false,
        };
        if fractional {
            brake.iter().map(|b| b * 100.).collect()
        } else {
            brake.to_vec()
        }
    }
}

/// Telemetry channels a trace can carry besides distance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    Time,
    Speed,
    Throttle,
    Brake,
    Gear,
    X,
    Y,
    LongAccel,
    LatAccel,
}

impl Channel {
    /// Channels that may be absent from a recorded trace.
    pub const OPTIONAL: [Channel; 8] = [
        Channel::Time,
        Channel::Throttle,
        Channel::Brake,
        Channel::Gear,
        Channel::X,
        Channel::Y,
        Channel::LongAccel,
        Channel::LatAccel,
    ];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Time => write!(f, "time"),
            Channel::Speed => write!(f, "speed"),
            Channel::Throttle => write!(f, "throttle"),
            Channel::Brake => write!(f, "brake"),
            Channel::Gear => write!(f, "gear"),
            Channel::X => write!(f, "x"),
            Channel::Y => write!(f, "y"),
            Channel::LongAccel => write!(f, "long_accel"),
            Channel::LatAccel => write!(f, "lat_accel"),
        }
    }
}

/// One recorded telemetry sample, as read from a JSON Lines file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySample {
    /// Meters traveled from the start line
    pub distance: f64,
    /// Speed in km/h
    pub speed: f64,
    /// Session or lap time in seconds
    #[serde(default)]
    pub time: Option<f64>,
    /// Throttle use, 0=off to 100=full throttle
    #[serde(default)]
    pub throttle: Option<f64>,
    /// Brake use, either a 0/1 flag or 0..100 pedal percentage
    #[serde(default)]
    pub brake: Option<f64>,
    /// Current gear
    #[serde(default)]
    pub gear: Option<i32>,
    /// Track position, meters
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    /// Longitudinal acceleration, m/s^2
    #[serde(default)]
    pub long_accel: Option<f64>,
    /// Lateral acceleration, m/s^2
    #[serde(default)]
    pub lat_accel: Option<f64>,
}

impl TelemetrySample {
    pub fn channel(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Time => self.time,
            Channel::Speed => Some(self.speed),
            Channel::Throttle => self.throttle,
            Channel::Brake => self.brake,
            Channel::Gear => self.gear.map(f64::from),
            Channel::X => self.x,
            Channel::Y => self.y,
            Channel::LongAccel => self.long_accel,
            Channel::LatAccel => self.lat_accel,
        }
    }
}

/// Lap-level record used for stint segmentation.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LapRecord {
    pub lap_number: u32,
    /// Lap time in seconds, absent for laps without a timing line crossing
    #[serde(default)]
    pub lap_time_s: Option<f64>,
    #[serde(default = "default_valid")]
    pub is_valid: bool,
    #[serde(default)]
    pub compound: Option<String>,
    /// Session time of the pit lane entry, seconds
    #[serde(default)]
    pub pit_in_time_s: Option<f64>,
    /// Session time of the pit lane exit, seconds
    #[serde(default)]
    pub pit_out_time_s: Option<f64>,
}

fn default_valid() -> bool {
    true
}

/// Columnar telemetry trace indexed by distance.
///
/// Distance and speed are always present, every other channel is optional. Traces are
/// immutable once built: every transformation returns a new trace.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryTrace {
    distance: Vec<f64>,
    speed: Vec<f64>,
    channels: BTreeMap<Channel, Vec<f64>>,
    brake_scale: BrakeScale,
}

impl TelemetryTrace {
    pub fn new(distance: Vec<f64>, speed: Vec<f64>) -> Result<Self, LapDeltaError> {
        if speed.len() != distance.len() {
            return Err(LapDeltaError::ChannelLengthMismatch {
                values: speed.len(),
                distances: distance.len(),
            });
        }
        Ok(Self {
            distance,
            speed,
            channels: BTreeMap::new(),
            brake_scale: BrakeScale::default(),
        })
    }

    /// Returns this trace with its brake channel read in `scale`.
    pub fn with_brake_scale(mut self, scale: BrakeScale) -> Self {
        self.brake_scale = scale;
        self
    }

    pub fn brake_scale(&self) -> BrakeScale {
        self.brake_scale
    }

    /// Returns a copy of this trace carrying `values` for `channel`.
    pub fn with_channel(mut self, channel: Channel, values: Vec<f64>) -> Result<Self, LapDeltaError> {
        if values.len() != self.distance.len() {
            return Err(LapDeltaError::ChannelLengthMismatch {
                values: values.len(),
                distances: self.distance.len(),
            });
        }
        if channel == Channel::Speed {
            self.speed = values;
        } else {
            self.channels.insert(channel, values);
        }
        Ok(self)
    }

    /// Builds a trace from row samples. A channel is kept when at least one sample carries
    /// it; gaps are forward filled, then back filled.
    pub fn from_samples(samples: &[TelemetrySample]) -> Result<Self, LapDeltaError> {
        if samples.len() < 2 {
            return Err(LapDeltaError::TooFewSamples {
                count: samples.len(),
                required: 2,
            });
        }
        let mut trace = Self::new(
            samples.iter().map(|s| s.distance).collect(),
            samples.iter().map(|s| s.speed).collect(),
        )?;
        for channel in Channel::OPTIONAL {
            let column = samples.iter().map(|s| s.channel(channel)).collect_vec();
            if let Some(filled) = fill_gaps(&column) {
                trace.channels.insert(channel, filled);
            }
        }
        Ok(trace)
    }

    pub fn len(&self) -> usize {
        self.distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }

    pub fn distance(&self) -> &[f64] {
        &self.distance
    }

    pub fn speed(&self) -> &[f64] {
        &self.speed
    }

    pub fn min_distance(&self) -> Option<f64> {
        self.distance.iter().copied().reduce(f64::min)
    }

    pub fn max_distance(&self) -> Option<f64> {
        self.distance.iter().copied().reduce(f64::max)
    }

    pub fn channel(&self, channel: Channel) -> Option<&[f64]> {
        match channel {
            Channel::Speed => Some(&self.speed),
            other => self.channels.get(&other).map(Vec::as_slice),
        }
    }

    pub fn has(&self, channel: Channel) -> bool {
        self.channel(channel).is_some()
    }

    /// Like [`channel`](Self::channel) but fails with `MissingChannel`, naming `trace`.
    pub fn require(&self, channel: Channel, trace: &str) -> Result<&[f64], LapDeltaError> {
        self.channel(channel)
            .ok_or_else(|| LapDeltaError::MissingChannel {
                channel,
                trace: trace.to_string(),
            })
    }

    /// Optional channels present in this trace, in a stable order.
    pub fn optional_channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.channels.keys().copied()
    }

    pub fn throttle(&self) -> Option<&[f64]> {
        self.channel(Channel::Throttle)
    }

    /// Brake input in percent, converted according to the trace's [`BrakeScale`].
    pub fn brake_pct(&self) -> Option<Vec<f64>> {
        self.channel(Channel::Brake)
            .map(|brake| self.brake_scale.to_percent(brake))
    }

    /// Gear at sample `index`, rounded to the nearest integer after resampling.
    pub fn gear_at(&self, index: usize) -> Option<i32> {
        self.channel(Channel::Gear)
            .and_then(|gear| gear.get(index))
            .map(|g| g.round() as i32)
    }

    /// Returns a new trace sorted by distance with duplicate distances collapsed to their
    /// first sample.
    pub fn collapse_duplicate_distances(&self) -> Self {
        let order = (0..self.len())
            .sorted_by(|a, b| self.distance[*a].total_cmp(&self.distance[*b]))
            .dedup_by(|a, b| self.distance[*a] == self.distance[*b])
            .collect_vec();
        let pick = |values: &[f64]| order.iter().map(|i| values[*i]).collect_vec();
        Self {
            distance: pick(&self.distance),
            speed: pick(&self.speed),
            channels: self
                .channels
                .iter()
                .map(|(channel, values)| (*channel, pick(values)))
                .collect(),
            brake_scale: self.brake_scale,
        }
    }

    pub fn sample(&self, index: usize) -> Option<TelemetrySample> {
        let distance = *self.distance.get(index)?;
        let value = |channel: Channel| self.channel(channel).map(|v| v[index]);
        Some(TelemetrySample {
            distance,
            speed: self.speed[index],
            time: value(Channel::Time),
            throttle: value(Channel::Throttle),
            brake: value(Channel::Brake),
            gear: self.gear_at(index),
            x: value(Channel::X),
            y: value(Channel::Y),
            long_accel: value(Channel::LongAccel),
            lat_accel: value(Channel::LatAccel),
        })
    }
}

fn fill_gaps(column: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = column.iter().flatten().next().copied()?;
    let mut last = first;
    Some(
        column
            .iter()
            .map(|value| {
                if let Some(v) = value {
                    last = *v;
                }
                last
            })
            .collect(),
    )
}
