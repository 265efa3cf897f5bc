// Library interface for lapdelta
// The binary and the integration tests both go through these modules

pub mod alignment;
pub mod analysis;
pub mod comparison;
pub mod config;
pub mod errors;
pub mod table;
pub mod telemetry;
pub mod writer;

// Re-export commonly used types
pub use alignment::{AlignedPair, align_traces};
pub use comparison::{BrakingZoneOutcome, LapComparison, compare_laps};
pub use config::AnalysisConfig;
pub use errors::LapDeltaError;
pub use table::{Table, TableValue, TabularReport};
pub use telemetry::{BrakeScale, Channel, LapRecord, TelemetrySample, TelemetryTrace};
