use std::path::Path;

use log::{debug, info};

use super::{LapRecord, TelemetrySample, TelemetryTrace};
use crate::LapDeltaError;

/// Loads one lap trace from a JSON Lines file, one [`TelemetrySample`] per line.
pub fn load_trace_jsonl(source_file: &Path) -> Result<TelemetryTrace, LapDeltaError> {
    if !source_file.is_file() {
        return Err(LapDeltaError::InvalidTraceFile {
            path: source_file.display().to_string(),
        });
    }

    let samples = serde_jsonlines::json_lines(source_file)
        .map_err(|e| LapDeltaError::TraceLoaderError { source: e })?
        .collect::<Result<Vec<TelemetrySample>, std::io::Error>>()
        .map_err(|e| LapDeltaError::TraceLoaderError { source: e })?;

    if samples.is_empty() {
        return Err(LapDeltaError::EmptyTrace {
            path: source_file.display().to_string(),
        });
    }

    let trace = TelemetryTrace::from_samples(&samples)?;
    info!(
        "Loaded {:?}, {} samples over {:.1} m",
        source_file,
        trace.len(),
        trace.max_distance().unwrap_or(0.) - trace.min_distance().unwrap_or(0.)
    );
    debug!(
        "Channels in {:?}: {:?}",
        source_file,
        trace.optional_channels().collect::<Vec<_>>()
    );
    Ok(trace)
}

/// Loads lap records from a JSON Lines file, one [`LapRecord`] per line.
pub fn load_laps_jsonl(source_file: &Path) -> Result<Vec<LapRecord>, LapDeltaError> {
    if !source_file.is_file() {
        return Err(LapDeltaError::InvalidTraceFile {
            path: source_file.display().to_string(),
        });
    }

    let laps = serde_jsonlines::json_lines(source_file)
        .map_err(|e| LapDeltaError::TraceLoaderError { source: e })?
        .collect::<Result<Vec<LapRecord>, std::io::Error>>()
        .map_err(|e| LapDeltaError::TraceLoaderError { source: e })?;
    info!("Loaded {:?}, found {} laps", source_file, laps.len());
    Ok(laps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Channel;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_trace_with_optional_channels() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"distance":0.0,"speed":120.0,"throttle":100.0,"gear":4}}"#).unwrap();
        writeln!(file, r#"{{"distance":5.0,"speed":121.0,"throttle":100.0,"gear":4}}"#).unwrap();
        writeln!(file, r#"{{"distance":10.0,"speed":122.5,"gear":5}}"#).unwrap();
        file.flush().unwrap();

        let trace = load_trace_jsonl(file.path()).unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.throttle().unwrap(), &[100., 100., 100.]);
        assert_eq!(trace.gear_at(2), Some(5));
        assert!(!trace.has(Channel::Brake));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_trace_jsonl(Path::new("/definitely/not/here.jsonl"));
        assert!(matches!(
            result,
            Err(LapDeltaError::InvalidTraceFile { .. })
        ));
    }

    #[test]
    fn test_load_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let result = load_trace_jsonl(file.path());
        assert!(matches!(result, Err(LapDeltaError::EmptyTrace { .. })));
    }

    #[test]
    fn test_load_malformed_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"distance":0.0,"speed":120.0}}"#).unwrap();
        writeln!(file, r#"{{"distance":"far"}}"#).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            load_trace_jsonl(file.path()),
            Err(LapDeltaError::TraceLoaderError { .. })
        ));
    }

    #[test]
    fn test_load_laps_defaults_validity() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"lap_number":1,"lap_time_s":92.4,"compound":"SOFT"}}"#).unwrap();
        writeln!(file, r#"{{"lap_number":2,"is_valid":false}}"#).unwrap();
        file.flush().unwrap();

        let laps = load_laps_jsonl(file.path()).unwrap();
        assert_eq!(laps.len(), 2);
        assert!(laps[0].is_valid);
        assert_eq!(laps[0].compound.as_deref(), Some("SOFT"));
        assert!(!laps[1].is_valid);
        assert_eq!(laps[1].lap_time_s, None);
    }
}
