//! Trace readers. Format-specific parsing stays here; everything downstream
//! sees a validated [`BeliefTrace`].

pub mod json;
pub mod run_dir;

use std::path::Path;

use crate::error::TraceError;
use crate::trace::BeliefTrace;

pub use json::{parse_json_trace, read_json_trace_file};
pub use run_dir::read_run_directory;

/// Load a trace from a JSON file or from a directory of run logs.
pub fn load_trace(path: &Path) -> Result<BeliefTrace, TraceError> {
    let metadata = std::fs::metadata(path).map_err(|e| TraceError::io(path, e))?;
    let trace = if metadata.is_dir() {
        read_run_directory(path)?
    } else {
        read_json_trace_file(path)?
    };
    tracing::info!(
        path = %path.display(),
        runs = trace.runs().len(),
        steps = trace.len(),
        "loaded trace"
    );
    Ok(trace)
}
