use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::LapDeltaError;
use crate::telemetry::BrakeScale;

const CONFIG_DIR_NAME: &str = "lapdelta";
const CONFIG_FILE_NAME: &str = "config.json";

/// Tunable thresholds for every analysis. Missing sections and fields in a config file fall
/// back to their defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub telemetry: TelemetryConfig,
    pub alignment: AlignmentConfig,
    pub integration: IntegrationConfig,
    pub segments: SegmentConfig,
    pub corners: CornerConfig,
    pub decomposition: DecompositionConfig,
    pub braking_zones: BrakingZoneConfig,
    pub stints: StintConfig,
    pub style: StyleConfig,
    pub grip: GripConfig,
    pub consistency: ConsistencyConfig,
}

/// How recorded channels are read.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub brake_scale: BrakeScale,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Grid spacing in meters
    pub resolution: f64,
    /// Fewest grid steps the overlap must span
    pub min_overlap_steps: usize,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            resolution: 5.0,
            min_overlap_steps: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Speeds are clamped to this floor when integrating time, km/h
    pub min_speed_kmh: f64,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self { min_speed_kmh: 0.1 }
    }
}

/// How the aligned lap is split into minisectors.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MinisectorLayout {
    /// Fixed number of equal-length segments
    Count(usize),
    /// Segments of roughly this length in meters
    Length(f64),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SegmentConfig {
    pub layout: MinisectorLayout,
    /// Segment deltas within this many seconds are a tie
    pub tie_threshold_s: f64,
    /// Minisectors whose lap-to-lap spread exceeds this are flagged as mistake zones
    pub variance_threshold_s: f64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            layout: MinisectorLayout::Length(100.0),
            tie_threshold_s: 0.01,
            variance_threshold_s: 0.05,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CornerConfig {
    /// Speed drop from the preceding peak that marks a corner, km/h
    pub min_speed_drop: f64,
    /// Shortest onset-to-recovery span accepted as a corner, meters
    pub min_corner_length: f64,
    /// Dips with a higher minimum are lifts on a straight, km/h
    pub max_apex_speed: f64,
    /// Brake percent counted as braking
    pub brake_threshold: f64,
    /// Throttle percent that marks the exit
    pub throttle_reapply_threshold: f64,
    /// Minimum heading change across a corner, degrees. `None` disables the check.
    pub min_heading_change_deg: Option<f64>,
    /// Apex speeds below this are slow corners, km/h
    pub slow_corner_speed: f64,
    /// Apex speeds below this (and not slow) are medium corners, km/h
    pub medium_corner_speed: f64,
}

impl Default for CornerConfig {
    fn default() -> Self {
        Self {
            min_speed_drop: 10.0,
            min_corner_length: 20.0,
            max_apex_speed: 250.0,
            brake_threshold: 10.0,
            throttle_reapply_threshold: 95.0,
            min_heading_change_deg: Some(10.0),
            slow_corner_speed: 80.0,
            medium_corner_speed: 150.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Largest apex gap at which corners of the two laps are paired, meters
    pub apex_tolerance: f64,
    /// Half width of the mid-corner window around the apex, meters
    pub mid_corner_half_window: f64,
    /// Phase sums further than this from the net delta are flagged, seconds
    pub discrepancy_threshold_s: f64,
    pub brake_point_similarity: f64,
    pub entry_speed_similarity: f64,
    pub apex_speed_similarity: f64,
    pub exit_speed_similarity: f64,
    pub throttle_point_similarity: f64,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            apex_tolerance: 30.0,
            mid_corner_half_window: 10.0,
            discrepancy_threshold_s: 0.05,
            brake_point_similarity: 5.0,
            entry_speed_similarity: 3.0,
            apex_speed_similarity: 2.0,
            exit_speed_similarity: 3.0,
            throttle_point_similarity: 5.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BrakingZoneConfig {
    /// Brake percent that opens a zone
    pub brake_threshold: f64,
    /// Zones shorter than this are discarded, meters
    pub min_zone_length: f64,
    /// Zones losing less speed than this are discarded, km/h
    pub min_speed_drop: f64,
    /// Largest start distance gap at which zones of the two laps are paired, meters
    pub match_tolerance: f64,
}

impl Default for BrakingZoneConfig {
    fn default() -> Self {
        Self {
            brake_threshold: 10.0,
            min_zone_length: 20.0,
            min_speed_drop: 20.0,
            match_tolerance: 50.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StintConfig {
    /// Laps slower than this multiple of the median are excluded from pace
    pub outlier_multiplier: f64,
    /// Laps averaged at each end of a stint for the pace drop
    pub pace_window_laps: usize,
}

impl Default for StintConfig {
    fn default() -> Self {
        Self {
            outlier_multiplier: 1.3,
            pace_window_laps: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StyleConfig {
    pub full_throttle_threshold: f64,
    /// Throttle strictly above this and below full counts as partial
    pub partial_throttle_floor: f64,
    pub brake_threshold: f64,
    /// Longitudinal acceleration inside +/- this band is neither accelerating nor braking
    pub accel_deadband: f64,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            full_throttle_threshold: 98.0,
            partial_throttle_floor: 0.0,
            brake_threshold: 10.0,
            accel_deadband: 0.5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GripConfig {
    /// Deceleration beyond this counts as braking, g
    pub braking_g: f64,
    /// Acceleration beyond this counts as traction limited, g
    pub traction_g: f64,
    /// Lateral acceleration beyond this counts as cornering, g
    pub cornering_g: f64,
}

impl Default for GripConfig {
    fn default() -> Self {
        Self {
            braking_g: 1.0,
            traction_g: 0.5,
            cornering_g: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Laps further than this many standard deviations from the mean are outliers
    pub outlier_sigma: f64,
    /// Coefficient of variation is multiplied by this before scoring
    pub cv_scale: f64,
    /// Mean minisector spread in seconds is multiplied by this before scoring
    pub variance_scale: f64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            outlier_sigma: 2.0,
            cv_scale: 10.0,
            variance_scale: 20.0,
        }
    }
}

fn require(condition: bool, field: &str, reason: &str) -> Result<(), LapDeltaError> {
    if condition {
        Ok(())
    } else {
        Err(LapDeltaError::InvalidConfig {
            field: field.to_string(),
            reason: reason.to_string(),
        })
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), LapDeltaError> {
        require(
            self.alignment.resolution.is_finite() && self.alignment.resolution > 0.,
            "alignment.resolution",
            "must be a positive number of meters",
        )?;
        require(
            self.alignment.min_overlap_steps >= 1,
            "alignment.min_overlap_steps",
            "must be at least 1",
        )?;
        require(
            self.integration.min_speed_kmh > 0.,
            "integration.min_speed_kmh",
            "must be positive",
        )?;
        match self.segments.layout {
            MinisectorLayout::Count(n) => {
                require(n >= 1, "segments.layout", "count must be at least 1")?
            }
            MinisectorLayout::Length(l) => require(
                l.is_finite() && l > 0.,
                "segments.layout",
                "length must be positive",
            )?,
        }
        require(
            self.segments.tie_threshold_s >= 0.,
            "segments.tie_threshold_s",
            "must not be negative",
        )?;
        require(
            self.corners.min_speed_drop > 0.,
            "corners.min_speed_drop",
            "must be positive",
        )?;
        require(
            self.corners.min_corner_length >= 0.,
            "corners.min_corner_length",
            "must not be negative",
        )?;
        require(
            self.corners.slow_corner_speed <= self.corners.medium_corner_speed,
            "corners.slow_corner_speed",
            "must not exceed medium_corner_speed",
        )?;
        require(
            self.decomposition.apex_tolerance >= 0.,
            "decomposition.apex_tolerance",
            "must not be negative",
        )?;
        require(
            self.decomposition.mid_corner_half_window > 0.,
            "decomposition.mid_corner_half_window",
            "must be positive",
        )?;
        require(
            self.braking_zones.match_tolerance >= 0.,
            "braking_zones.match_tolerance",
            "must not be negative",
        )?;
        require(
            self.stints.outlier_multiplier > 1.,
            "stints.outlier_multiplier",
            "must be greater than 1",
        )?;
        require(
            self.stints.pace_window_laps >= 1,
            "stints.pace_window_laps",
            "must be at least 1",
        )?;
        require(
            self.style.partial_throttle_floor < self.style.full_throttle_threshold,
            "style.partial_throttle_floor",
            "must be below full_throttle_threshold",
        )?;
        require(
            self.style.accel_deadband >= 0.,
            "style.accel_deadband",
            "must not be negative",
        )?;
        require(
            self.grip.braking_g > 0. && self.grip.traction_g > 0. && self.grip.cornering_g > 0.,
            "grip",
            "thresholds must be positive",
        )?;
        require(
            self.consistency.outlier_sigma > 0.,
            "consistency.outlier_sigma",
            "must be positive",
        )?;
        require(
            self.consistency.cv_scale > 0. && self.consistency.variance_scale > 0.,
            "consistency",
            "scales must be positive",
        )
    }

    pub fn from_file(path: &Path) -> Result<Self, LapDeltaError> {
        let file = std::fs::File::open(path).map_err(|e| LapDeltaError::ConfigIOError { source: e })?;
        let config: Self =
            serde_json::from_reader(file).map_err(|e| LapDeltaError::ConfigSerializeError { source: e })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the user's saved config, if there is one.
    pub fn from_local_file() -> Result<Option<Self>, LapDeltaError> {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(None);
        };
        let config_path = config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::from_file(&config_path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn save(&self) -> Result<(), LapDeltaError> {
        let config_path = dirs::config_dir()
            .ok_or(LapDeltaError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME);
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), LapDeltaError> {
        if let Some(parent) = config_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| LapDeltaError::ConfigIOError { source: e })?;
            }
        }
        let file =
            std::fs::File::create(config_path).map_err(|e| LapDeltaError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self).map_err(|e| LapDeltaError::ConfigSerializeError { source: e })
    }
}
