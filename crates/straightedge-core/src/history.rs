//! Access to the edit history of points and to current line membership.
//!
//! The engine only consumes the [`HistoryProvider`] trait. This module also
//! ships [`MemoryHistory`], a provider backed by a JSON fixture, and
//! [`CountingHistory`], a decorator that tallies calls so the closing pass
//! can report how many lookups it needed.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Coord, LineId, PointId};

/// I/O-level failure of a history provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The backing service could not answer.
    #[error("{0}")]
    Unavailable(String),
}

/// A line as currently known to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRef {
    pub id: LineId,
    pub nodes: Vec<PointId>,
}

/// Source of prior point versions and current point-to-line membership.
///
/// `Ok(None)` means the data is not available; it is never read as a zero
/// coordinate.
pub trait HistoryProvider {
    /// Coordinates of `point` at `version`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the provider cannot be queried.
    fn point_version(&self, point: PointId, version: u32) -> Result<Option<Coord>, ProviderError>;

    /// Latest known coordinates of `point`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the provider cannot be queried.
    fn latest_point(&self, point: PointId) -> Result<Option<Coord>, ProviderError>;

    /// Every line currently going through `point`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the provider cannot be queried.
    fn lines_referencing(&self, point: PointId) -> Result<Vec<LineRef>, ProviderError>;
}

impl<P: HistoryProvider + ?Sized> HistoryProvider for &P {
    fn point_version(&self, point: PointId, version: u32) -> Result<Option<Coord>, ProviderError> {
        (**self).point_version(point, version)
    }

    fn latest_point(&self, point: PointId) -> Result<Option<Coord>, ProviderError> {
        (**self).latest_point(point)
    }

    fn lines_referencing(&self, point: PointId) -> Result<Vec<LineRef>, ProviderError> {
        (**self).lines_referencing(point)
    }
}

// ---------------------------------------------------------------------------
// Fixture-backed provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PointVersionRecord {
    version: u32,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PointRecord {
    id: PointId,
    #[serde(default)]
    versions: Vec<PointVersionRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryFixture {
    #[serde(default)]
    points: Vec<PointRecord>,
    #[serde(default)]
    lines: Vec<LineRef>,
}

/// In-memory history, typically loaded from a JSON fixture:
///
/// ```json
/// {
///   "points": [{ "id": 1, "versions": [{ "version": 1, "lat": 0.0, "lon": 0.0 }] }],
///   "lines":  [{ "id": 10, "nodes": [1, 2, 3] }]
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    versions: BTreeMap<PointId, BTreeMap<u32, Coord>>,
    lines: BTreeMap<LineId, Vec<PointId>>,
    lines_by_point: BTreeMap<PointId, BTreeSet<LineId>>,
}

impl MemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `coord` as `version` of `point`, replacing any earlier record.
    pub fn insert_point_version(&mut self, point: PointId, version: u32, coord: Coord) {
        self.versions
            .entry(point)
            .or_default()
            .insert(version, coord);
    }

    /// Record the current shape of a line, replacing any earlier shape.
    pub fn insert_line(&mut self, id: LineId, nodes: Vec<PointId>) {
        if let Some(previous) = self.lines.remove(&id) {
            for point in previous {
                if let Some(ids) = self.lines_by_point.get_mut(&point) {
                    ids.remove(&id);
                }
            }
        }
        for &point in &nodes {
            self.lines_by_point.entry(point).or_default().insert(id);
        }
        self.lines.insert(id, nodes);
    }

    /// Builder-style [`insert_point_version`](Self::insert_point_version).
    #[must_use]
    pub fn with_point(mut self, point: PointId, version: u32, lat: f64, lon: f64) -> Self {
        self.insert_point_version(point, version, Coord::new(lat, lon));
        self
    }

    /// Builder-style [`insert_line`](Self::insert_line).
    #[must_use]
    pub fn with_line(mut self, id: LineId, nodes: Vec<PointId>) -> Self {
        self.insert_line(id, nodes);
        self
    }

    /// Parse a JSON fixture.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` does not match the fixture layout.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let fixture: HistoryFixture =
            serde_json::from_str(json).context("Failed to parse history fixture")?;
        Ok(Self::from_fixture(fixture))
    }

    /// Load a JSON fixture from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let fixture: HistoryFixture = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Self::from_fixture(fixture))
    }

    fn from_fixture(fixture: HistoryFixture) -> Self {
        let mut history = Self::new();
        for point in fixture.points {
            for v in point.versions {
                history.insert_point_version(point.id, v.version, Coord::new(v.lat, v.lon));
            }
        }
        for line in fixture.lines {
            history.insert_line(line.id, line.nodes);
        }
        history
    }

    /// Number of points with at least one recorded version.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.versions.len()
    }

    /// Number of known lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

impl HistoryProvider for MemoryHistory {
    fn point_version(&self, point: PointId, version: u32) -> Result<Option<Coord>, ProviderError> {
        Ok(self
            .versions
            .get(&point)
            .and_then(|versions| versions.get(&version))
            .copied())
    }

    fn latest_point(&self, point: PointId) -> Result<Option<Coord>, ProviderError> {
        Ok(self
            .versions
            .get(&point)
            .and_then(|versions| versions.values().next_back())
            .copied())
    }

    fn lines_referencing(&self, point: PointId) -> Result<Vec<LineRef>, ProviderError> {
        let Some(ids) = self.lines_by_point.get(&point) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.lines.get(id).map(|nodes| LineRef {
                    id: *id,
                    nodes: nodes.clone(),
                })
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Call accounting
// ---------------------------------------------------------------------------

/// Provider calls made during one closing pass, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderCalls {
    pub point_version: u64,
    pub latest_point: u64,
    pub lines_referencing: u64,
}

impl ProviderCalls {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.point_version + self.latest_point + self.lines_referencing
    }

    pub const fn add(&mut self, other: Self) {
        self.point_version += other.point_version;
        self.latest_point += other.latest_point;
        self.lines_referencing += other.lines_referencing;
    }
}

/// Wraps a provider and counts every call forwarded to it.
#[derive(Debug)]
pub struct CountingHistory<P> {
    inner: P,
    point_version: Cell<u64>,
    latest_point: Cell<u64>,
    lines_referencing: Cell<u64>,
}

impl<P: HistoryProvider> CountingHistory<P> {
    pub const fn new(inner: P) -> Self {
        Self {
            inner,
            point_version: Cell::new(0),
            latest_point: Cell::new(0),
            lines_referencing: Cell::new(0),
        }
    }

    /// Calls forwarded so far.
    pub fn calls(&self) -> ProviderCalls {
        ProviderCalls {
            point_version: self.point_version.get(),
            latest_point: self.latest_point.get(),
            lines_referencing: self.lines_referencing.get(),
        }
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: HistoryProvider> HistoryProvider for CountingHistory<P> {
    fn point_version(&self, point: PointId, version: u32) -> Result<Option<Coord>, ProviderError> {
        self.point_version.set(self.point_version.get() + 1);
        self.inner.point_version(point, version)
    }

    fn latest_point(&self, point: PointId) -> Result<Option<Coord>, ProviderError> {
        self.latest_point.set(self.latest_point.get() + 1);
        self.inner.latest_point(point)
    }

    fn lines_referencing(&self, point: PointId) -> Result<Vec<LineRef>, ProviderError> {
        self.lines_referencing.set(self.lines_referencing.get() + 1);
        self.inner.lines_referencing(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_json_builds_reverse_index() {
        let history = MemoryHistory::from_json_str(
            r#"{
                "points": [
                    { "id": 1, "versions": [
                        { "version": 1, "lat": 10.0, "lon": 20.0 },
                        { "version": 2, "lat": 11.0, "lon": 21.0 }
                    ] }
                ],
                "lines": [
                    { "id": 100, "nodes": [1, 2, 3] },
                    { "id": 101, "nodes": [3, 1] }
                ]
            }"#,
        )
        .expect("fixture should parse");

        assert_eq!(history.point_count(), 1);
        assert_eq!(history.line_count(), 2);
        assert_eq!(
            history.point_version(1, 1).expect("lookup"),
            Some(Coord::new(10.0, 20.0))
        );
        assert_eq!(history.point_version(1, 3).expect("lookup"), None);
        assert_eq!(
            history.latest_point(1).expect("lookup"),
            Some(Coord::new(11.0, 21.0))
        );

        let lines = history.lines_referencing(1).expect("lookup");
        let ids: Vec<LineId> = lines.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![100, 101]);
        assert!(history.lines_referencing(42).expect("lookup").is_empty());
    }

    #[test]
    fn replacing_a_line_updates_membership() {
        let history = MemoryHistory::new()
            .with_line(7, vec![1, 2, 3])
            .with_line(7, vec![3, 4]);

        assert!(history.lines_referencing(1).expect("lookup").is_empty());
        let through_four = history.lines_referencing(4).expect("lookup");
        assert_eq!(through_four.len(), 1);
        assert_eq!(through_four[0].nodes, vec![3, 4]);
    }

    #[test]
    fn malformed_fixture_is_an_error() {
        let err = MemoryHistory::from_json_str("{ \"points\": 3 }").unwrap_err();
        assert!(err.to_string().contains("history fixture"));
    }

    #[test]
    fn counting_history_tallies_each_kind() {
        let history = CountingHistory::new(MemoryHistory::new().with_point(1, 1, 0.0, 0.0));
        let _ = history.point_version(1, 1);
        let _ = history.point_version(1, 2);
        let _ = history.latest_point(1);
        let _ = history.lines_referencing(1);

        let calls = history.calls();
        assert_eq!(calls.point_version, 2);
        assert_eq!(calls.latest_point, 1);
        assert_eq!(calls.lines_referencing, 1);
        assert_eq!(calls.total(), 4);
    }
}
