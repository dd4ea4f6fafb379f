//! JSON-lines episode traces.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::runner::{io_at, RunError};
use crate::sim::engine::{TraceRecord, TraceSink};
use crate::sim::error::SimError;

/// First line of a trace file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMeta {
    #[serde(rename = "type")]
    pub kind: String,
    pub model: String,
    /// Display name for plots; starts equal to `model`.
    pub model_short: String,
    pub provider: String,
    pub reasoning_effort: Option<String>,
    pub date: String,
    pub seed: u64,
}

impl TraceMeta {
    pub fn new(
        model: impl Into<String>,
        provider: impl Into<String>,
        reasoning_effort: Option<String>,
        run_id: impl Into<String>,
        seed: u64,
    ) -> Self {
        let model = model.into();
        Self {
            kind: "meta".to_string(),
            model_short: model.clone(),
            model,
            provider: provider.into(),
            reasoning_effort,
            date: run_id.into(),
            seed,
        }
    }
}

/// Writes one JSON object per line and flushes after each, so a crashed
/// run still leaves every finished turn on disk.
pub struct JsonlTraceWriter<W: Write> {
    writer: W,
    lines: usize,
}

impl<W: Write> JsonlTraceWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub fn with_meta(writer: W, meta: &TraceMeta) -> Result<Self, SimError> {
        let mut out = Self::new(writer);
        out.write_line(meta)?;
        Ok(out)
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line<T: Serialize>(&mut self, value: &T) -> Result<(), SimError> {
        serde_json::to_writer(&mut self.writer, value)
            .map_err(|e| SimError::Trace(e.to_string()))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.lines += 1;
        Ok(())
    }
}

impl JsonlTraceWriter<BufWriter<File>> {
    pub fn create(path: &Path, meta: &TraceMeta) -> Result<Self, RunError> {
        let file = File::create(path).map_err(io_at(path))?;
        Ok(Self::with_meta(BufWriter::new(file), meta)?)
    }
}

impl<W: Write> TraceSink for JsonlTraceWriter<W> {
    fn append(&mut self, record: &TraceRecord) -> Result<(), SimError> {
        self.write_line(record)
    }
}
