use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use log::info;
use serde::Serialize;

use crate::LapDeltaError;

/// Writes a report as pretty-printed JSON to `output`, or to stdout when no path is given.
pub fn write_report<T: Serialize>(report: &T, output: Option<&Path>) -> Result<(), LapDeltaError> {
    match output {
        Some(path) => {
            let report_file = File::create(path).map_err(|e| LapDeltaError::WriterError { source: e })?;
            write_to(report, BufWriter::new(report_file))?;
            info!("Report written to {:?}", path);
            Ok(())
        }
        None => write_to(report, BufWriter::new(io::stdout().lock())),
    }
}

fn write_to<T: Serialize, W: Write>(report: &T, mut writer: W) -> Result<(), LapDeltaError> {
    serde_json::to_writer_pretty(&mut writer, report)
        .map_err(|e| LapDeltaError::ReportSerializeError { source: e })?;
    writeln!(writer).map_err(|e| LapDeltaError::WriterError { source: e })?;
    writer
        .flush()
        .map_err(|e| LapDeltaError::WriterError { source: e })
}
