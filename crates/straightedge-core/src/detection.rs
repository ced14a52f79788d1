//! Detected alignments and where they are sent.

use std::io::Write;

use serde::Serialize;

use crate::model::{ChangesetId, Coord, LineId, Owner};

/// A line found to have been aligned abusively.
///
/// `old_points` and `new_points` are the line's shape before and after the
/// changeset, point for point; renderers draw them over each other.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub line_id: LineId,
    pub changeset_id: ChangesetId,
    pub owner_user: String,
    pub owner_id: u64,
    /// Old residual sum over new residual sum.
    #[serde(serialize_with = "serialize_rate")]
    pub alignment_rate: f64,
    /// Old worst squared residual over new worst squared residual.
    #[serde(serialize_with = "serialize_rate")]
    pub max_rate: f64,
    pub old_points: Vec<Coord>,
    pub new_points: Vec<Coord>,
    /// Mean of the new shape, for centring a map view.
    pub center: Coord,
}

impl Detection {
    #[must_use]
    pub fn owner(&self) -> Owner {
        Owner::new(self.owner_user.clone(), self.owner_id)
    }
}

// JSON has no infinity; a zero new residual is reported as `"inf"`.
#[allow(clippy::trivially_copy_pass_by_ref)] // serde's serialize_with requires &T
fn serialize_rate<S: serde::Serializer>(rate: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if rate.is_infinite() {
        serializer.serialize_str("inf")
    } else {
        serializer.serialize_f64(*rate)
    }
}

/// Failure to hand a detection to its destination.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to write detection: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode detection: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for detections.
pub trait DetectionSink {
    /// Accept one detection.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the detection could not be recorded.
    fn emit(&mut self, detection: &Detection) -> Result<(), SinkError>;
}

impl DetectionSink for Vec<Detection> {
    fn emit(&mut self, detection: &Detection) -> Result<(), SinkError> {
        self.push(detection.clone());
        Ok(())
    }
}

/// Writes each detection as one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of detections written so far.
    pub const fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DetectionSink for JsonLinesSink<W> {
    fn emit(&mut self, detection: &Detection) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, detection)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(rate: f64) -> Detection {
        Detection {
            line_id: 5,
            changeset_id: 77,
            owner_user: "mapper".into(),
            owner_id: 3,
            alignment_rate: rate,
            max_rate: 250.0,
            old_points: vec![Coord::new(0.0, 0.0), Coord::new(1.0, 1.0)],
            new_points: vec![Coord::new(0.0, 0.0), Coord::new(1.0, 0.0)],
            center: Coord::new(0.5, 0.0),
        }
    }

    #[test]
    fn json_lines_sink_writes_one_object_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.emit(&sample(120.0)).expect("emit");
        sink.emit(&sample(f64::INFINITY)).expect("emit");
        assert_eq!(sink.written(), 2);

        let out = String::from_utf8(sink.into_inner()).expect("utf8");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["line_id"], 5);
        assert_eq!(first["changeset_id"], 77);
        assert_eq!(first["alignment_rate"], 120.0);
        assert_eq!(first["old_points"][1]["lat"], 1.0);

        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(second["alignment_rate"], "inf");
    }

    #[test]
    fn vec_sink_collects() {
        let mut sink: Vec<Detection> = Vec::new();
        sink.emit(&sample(101.0)).expect("emit");
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].owner(), Owner::new("mapper", 3));
    }
}
