// Error types for lapdelta

use snafu::Snafu;
use std::io;

use crate::telemetry::Channel;

#[derive(Debug, Snafu)]
pub enum LapDeltaError {
    // Errors on raw trace shape, raised before or during resampling
    #[snafu(display(
        "Distance is not strictly increasing at sample {index} ({previous} -> {current}), collapse duplicate samples first"
    ))]
    DataGap {
        index: usize,
        previous: f64,
        current: f64,
    },
    #[snafu(display("Trace has {count} samples, at least {required} are needed"))]
    TooFewSamples { count: usize, required: usize },
    #[snafu(display("Channel has {values} values for {distances} distance samples"))]
    ChannelLengthMismatch { values: usize, distances: usize },
    #[snafu(display("Grid distance {distance} is outside the native range [{min}, {max}]"))]
    GridOutOfRange { distance: f64, min: f64, max: f64 },

    // Alignment errors
    #[snafu(display(
        "Traces overlap over {overlap} m, at least {required} m are needed for a comparison"
    ))]
    InsufficientOverlap { overlap: f64, required: f64 },
    #[snafu(display("Channel {channel} is missing from the {trace} trace"))]
    MissingChannel { channel: Channel, trace: String },
    #[snafu(display("Traces are not aligned: {reason}"))]
    NotAligned { reason: String },

    // Config management errors
    #[snafu(display("Invalid configuration: {field} - {reason}"))]
    InvalidConfig { field: String, reason: String },
    #[snafu(display("Could not find application config directory"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Input files
    #[snafu(display("Invalid telemetry file: {path}"))]
    InvalidTraceFile { path: String },
    #[snafu(display("Error loading telemetry file"))]
    TraceLoaderError { source: io::Error },
    #[snafu(display("Telemetry file {path} contains no samples"))]
    EmptyTrace { path: String },

    // Report output
    #[snafu(display("Error writing report"))]
    WriterError { source: io::Error },
    #[snafu(display("Error serializing report"))]
    ReportSerializeError { source: serde_json::Error },
}
