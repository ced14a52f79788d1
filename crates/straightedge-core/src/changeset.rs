//! Per-changeset aggregation and the closing pass.
//!
//! A [`Changeset`] collects the snapshots of every point and line modified
//! under one changeset ID. When the engine decides the changeset is closed,
//! [`Changeset::close`] runs the alignment heuristic:
//!
//! 1. on every line the changeset touched directly, which covers edits that
//!    reshape a line without moving any of its named points and, when a line
//!    is aligned, retires its points before any expensive lookup;
//! 2. then, for each point still pending, on every line the history provider
//!    says goes through it. This reaches lines the changeset never touched as
//!    a whole. Each line is evaluated at most once, so shared points do not
//!    multiply provider calls.
//!
//! A point leaves the pending set once it is part of a detected alignment or
//! once every line through it has been checked clean.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::alignment::{self, Evaluation};
use crate::config::DetectorConfig;
use crate::detection::Detection;
use crate::error::EngineError;
use crate::history::{CountingHistory, HistoryProvider, ProviderCalls};
use crate::model::{ChangesetId, LineId, LineSnapshot, Owner, PointId, PointSnapshot};

/// Counters describing one closing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CloseStats {
    /// Lines the heuristic ran on.
    pub lines_evaluated: u64,
    /// Lines reached again through another point and skipped.
    pub lines_skipped: u64,
    /// Pending points cleared because no line through them was aligned.
    pub points_cleared: u64,
    /// Points retired as part of a detected alignment.
    pub points_resolved: u64,
    /// History provider calls by kind.
    pub provider_calls: ProviderCalls,
}

impl CloseStats {
    pub const fn add(&mut self, other: &Self) {
        self.lines_evaluated += other.lines_evaluated;
        self.lines_skipped += other.lines_skipped;
        self.points_cleared += other.points_cleared;
        self.points_resolved += other.points_resolved;
        self.provider_calls.add(other.provider_calls);
    }
}

/// Result of closing a changeset.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedChangeset {
    pub id: ChangesetId,
    pub owner: Owner,
    pub detections: Vec<Detection>,
    pub stats: CloseStats,
}

/// Everything one changeset modified, plus the closing-pass bookkeeping.
#[derive(Debug, Clone)]
pub struct Changeset {
    id: ChangesetId,
    owner: Owner,
    points: BTreeMap<PointId, PointSnapshot>,
    lines: BTreeMap<LineId, LineSnapshot>,
    pending: BTreeSet<PointId>,
    checked_lines: BTreeSet<LineId>,
    stats: CloseStats,
}

impl Changeset {
    #[must_use]
    pub const fn new(id: ChangesetId, owner: Owner) -> Self {
        Self {
            id,
            owner,
            points: BTreeMap::new(),
            lines: BTreeMap::new(),
            pending: BTreeSet::new(),
            checked_lines: BTreeSet::new(),
            stats: CloseStats {
                lines_evaluated: 0,
                lines_skipped: 0,
                points_cleared: 0,
                points_resolved: 0,
                provider_calls: ProviderCalls {
                    point_version: 0,
                    latest_point: 0,
                    lines_referencing: 0,
                },
            },
        }
    }

    #[must_use]
    pub const fn id(&self) -> ChangesetId {
        self.id
    }

    #[must_use]
    pub const fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Record a modified point. A later snapshot of the same point replaces
    /// the earlier one.
    pub fn add_point(&mut self, snapshot: PointSnapshot) {
        let id = snapshot.id();
        if self.points.insert(id, snapshot).is_some() {
            debug!(changeset = self.id, point_id = id, "point snapshot replaced");
        }
        self.pending.insert(id);
    }

    /// Record a modified line. A later snapshot of the same line replaces
    /// the earlier one.
    pub fn add_line(&mut self, snapshot: LineSnapshot) {
        let id = snapshot.id();
        if self.lines.insert(id, snapshot).is_some() {
            debug!(changeset = self.id, line_id = id, "line snapshot replaced");
        }
    }

    #[must_use]
    pub fn point(&self, id: PointId) -> Option<&PointSnapshot> {
        self.points.get(&id)
    }

    #[must_use]
    pub fn line(&self, id: LineId) -> Option<&LineSnapshot> {
        self.lines.get(&id)
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Points not yet ruled clean or resolved.
    #[must_use]
    pub const fn pending_points(&self) -> &BTreeSet<PointId> {
        &self.pending
    }

    /// Lines the heuristic already ran on.
    #[must_use]
    pub const fn checked_lines(&self) -> &BTreeSet<LineId> {
        &self.checked_lines
    }

    /// Run the heuristic on a line unless it was already checked.
    ///
    /// Returns `Ok(None)` both for a clean line and for a line checked
    /// earlier in this changeset's lifetime; the geometric test never runs
    /// twice for the same line. On detection, the line's modified points
    /// leave the pending set.
    ///
    /// # Errors
    ///
    /// Propagates [`EngineError`] from the heuristic.
    pub fn check_line<H: HistoryProvider + ?Sized>(
        &mut self,
        line_id: LineId,
        node_refs: &[PointId],
        history: &H,
        config: &DetectorConfig,
    ) -> Result<Option<Detection>, EngineError> {
        if !self.checked_lines.insert(line_id) {
            self.stats.lines_skipped += 1;
            return Ok(None);
        }
        if let Some(line) = self.lines.get_mut(&line_id) {
            line.set_checked();
        }
        self.stats.lines_evaluated += 1;

        let evaluation = alignment::evaluate(line_id, node_refs, &self.points, history, config)?;
        let alignment = match evaluation {
            Evaluation::Aligned(alignment) => alignment,
            Evaluation::Rejected(reason) => {
                debug!(changeset = self.id, line_id, ?reason, "line not aligned");
                return Ok(None);
            }
        };

        for point in &alignment.modified {
            if self.pending.remove(point) {
                self.stats.points_resolved += 1;
            }
        }

        info!(
            changeset = self.id,
            line_id,
            user = %self.owner.user,
            alignment_rate = alignment.alignment_rate,
            max_rate = alignment.max_rate,
            "line aligned"
        );

        Ok(Some(Detection {
            line_id,
            changeset_id: self.id,
            owner_user: self.owner.user.clone(),
            owner_id: self.owner.user_id,
            alignment_rate: alignment.alignment_rate,
            max_rate: alignment.max_rate,
            old_points: alignment.old_points,
            new_points: alignment.new_points,
            center: alignment.center,
        }))
    }

    /// Search every aligned line and drain the pending set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the history is inconsistent or the provider
    /// fails; the changeset is then abandoned.
    #[instrument(skip_all, fields(changeset = self.id))]
    pub fn close<H: HistoryProvider + ?Sized>(
        mut self,
        history: &H,
        config: &DetectorConfig,
    ) -> Result<ClosedChangeset, EngineError> {
        let counting = CountingHistory::new(history);
        let mut detections = Vec::new();

        let touched: Vec<(LineId, Vec<PointId>)> = self
            .lines
            .values()
            .filter(|line| !line.is_checked())
            .map(|line| (line.id(), line.node_refs().to_vec()))
            .collect();
        for (line_id, node_refs) in touched {
            if let Some(detection) = self.check_line(line_id, &node_refs, &counting, config)? {
                detections.push(detection);
            }
        }

        while let Some(point) = self.pending.first().copied() {
            let mut aligned = false;
            for line in counting.lines_referencing(point)? {
                if self.checked_lines.contains(&line.id) {
                    self.stats.lines_skipped += 1;
                    continue;
                }
                if let Some(detection) = self.check_line(line.id, &line.nodes, &counting, config)? {
                    detections.push(detection);
                    aligned = true;
                    break;
                }
            }
            // A provider that lists a line not containing `point` must not stall the pass.
            if self.pending.remove(&point) && !aligned {
                self.stats.points_cleared += 1;
            }
        }

        self.stats.provider_calls = counting.calls();
        debug!(
            changeset = self.id,
            detections = detections.len(),
            stats = ?self.stats,
            "changeset closed"
        );

        Ok(ClosedChangeset {
            id: self.id,
            owner: self.owner,
            detections,
            stats: self.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coord;

    fn owner() -> Owner {
        Owner::new("mapper", 42)
    }

    fn point(id: PointId, version: u32, lat: f64, lon: f64) -> PointSnapshot {
        PointSnapshot::new(id, owner(), version, Coord::new(lat, lon))
    }

    #[test]
    fn last_write_wins() {
        let mut cs = Changeset::new(1, owner());
        cs.add_point(point(5, 2, 0.0, 0.0));
        cs.add_point(point(5, 3, 1.0, 1.0));
        cs.add_line(LineSnapshot::new(9, owner(), 2, vec![5, 6]));
        cs.add_line(LineSnapshot::new(9, owner(), 3, vec![5, 6, 7]));

        assert_eq!(cs.point_count(), 1);
        assert_eq!(cs.point(5).map(PointSnapshot::version), Some(3));
        assert_eq!(cs.line_count(), 1);
        assert_eq!(cs.line(9).map(|l| l.node_refs().len()), Some(3));
        assert_eq!(cs.pending_points().len(), 1);
    }

    #[test]
    fn touched_line_checked_before_close_is_not_revisited() {
        let mut cs = Changeset::new(1, owner());
        cs.add_line(LineSnapshot::new(9, owner(), 2, vec![1, 2, 3]));
        let history = crate::history::MemoryHistory::new();
        let config = DetectorConfig::default();

        let verdict = cs
            .check_line(9, &[1, 2, 3], &history, &config)
            .expect("check");
        assert!(verdict.is_none());
        assert!(cs.line(9).is_some_and(LineSnapshot::is_checked));

        let closed = cs.close(&history, &config).expect("close");
        assert_eq!(closed.stats.lines_evaluated, 1);
        assert_eq!(closed.stats.lines_skipped, 0);
    }

    #[test]
    fn close_drains_pending_points() {
        let mut cs = Changeset::new(1, owner());
        cs.add_point(point(1, 2, 0.0, 0.0));
        cs.add_point(point(2, 2, 1.0, 1.0));
        // Point 1 kept its coordinates, so line 50 stops after one lookup.
        let history = crate::history::MemoryHistory::new()
            .with_point(1, 1, 0.0, 0.0)
            .with_line(50, vec![1, 2, 3, 4])
            .with_line(51, vec![2, 8]);

        let closed = cs.close(&history, &DetectorConfig::default()).expect("close");
        assert!(closed.detections.is_empty());
        assert_eq!(closed.stats.points_cleared, 2);
        // Line 50 reached from point 1, skipped when reached again from 2.
        assert_eq!(closed.stats.lines_evaluated, 2);
        assert_eq!(closed.stats.lines_skipped, 1);
        assert_eq!(closed.stats.provider_calls.lines_referencing, 2);
        assert_eq!(closed.stats.provider_calls.point_version, 1);
    }
}
