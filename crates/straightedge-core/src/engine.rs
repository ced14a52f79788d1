//! Top-level driver: routes changes to changesets and closes them.
//!
//! A changeset is considered open while it keeps appearing in successive
//! diff batches. At each batch boundary, every known changeset that did not
//! appear in the batch just ingested is closed, evaluated and dropped.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::changeset::{Changeset, CloseStats, ClosedChangeset};
use crate::config::DetectorConfig;
use crate::detection::{Detection, DetectionSink, SinkError};
use crate::error::EngineError;
use crate::event::{ChangeKind, ChangeRecord, DiffBatch, Element};
use crate::history::HistoryProvider;
use crate::model::{ChangesetId, Owner};

/// What [`Engine::ingest`] did with a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The change was stored in its changeset.
    Forwarded,
    /// Creations and deletions are not alignment candidates.
    IgnoredChange(ChangeKind),
    /// Relations carry no geometry of their own.
    IgnoredRelation,
}

/// A changeset whose closing pass failed.
#[derive(Debug)]
pub struct CloseFailure {
    pub changeset_id: ChangesetId,
    pub owner: Owner,
    pub error: EngineError,
}

/// Everything that happened at one batch boundary.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub closed: Vec<ClosedChangeset>,
    pub failures: Vec<CloseFailure>,
}

impl BatchReport {
    /// Detections of every successfully closed changeset, in closing order.
    pub fn detections(&self) -> impl Iterator<Item = &Detection> {
        self.closed.iter().flat_map(|c| c.detections.iter())
    }

    /// Closing-pass counters summed over the closed changesets.
    #[must_use]
    pub fn stats(&self) -> CloseStats {
        let mut total = CloseStats::default();
        for closed in &self.closed {
            total.add(&closed.stats);
        }
        total
    }

    /// Hand every detection to `sink`.
    ///
    /// # Errors
    ///
    /// Returns the first [`SinkError`].
    pub fn emit_to(&self, sink: &mut dyn DetectionSink) -> Result<usize, SinkError> {
        let mut count = 0;
        for detection in self.detections() {
            sink.emit(detection)?;
            count += 1;
        }
        Ok(count)
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.closed.extend(other.closed);
        self.failures.extend(other.failures);
    }
}

/// Changeset aggregation over a stream of diff batches.
#[derive(Debug)]
pub struct Engine {
    config: DetectorConfig,
    changesets: BTreeMap<ChangesetId, Changeset>,
    seen: BTreeSet<ChangesetId>,
}

impl Engine {
    #[must_use]
    pub const fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            changesets: BTreeMap::new(),
            seen: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// IDs of changesets still open.
    pub fn open_changesets(&self) -> impl Iterator<Item = ChangesetId> + '_ {
        self.changesets.keys().copied()
    }

    #[must_use]
    pub fn changeset(&self, id: ChangesetId) -> Option<&Changeset> {
        self.changesets.get(&id)
    }

    /// Route one change to its changeset.
    pub fn ingest(&mut self, record: &ChangeRecord) -> Disposition {
        if record.change != ChangeKind::Modify {
            return Disposition::IgnoredChange(record.change);
        }

        let meta = record.element.meta();
        if let Element::Relation(_) = record.element {
            debug!(relation_id = meta.id, changeset = meta.changeset, "relation ignored");
            return Disposition::IgnoredRelation;
        }

        let changeset_id = meta.changeset;
        self.seen.insert(changeset_id);
        let changeset = self.changesets.entry(changeset_id).or_insert_with(|| {
            info!(changeset = changeset_id, user = %meta.user, "changeset opened");
            Changeset::new(changeset_id, meta.owner())
        });

        match &record.element {
            Element::Point(point) => changeset.add_point(point.snapshot()),
            Element::Line(line) => changeset.add_line(line.snapshot()),
            Element::Relation(_) => {}
        }
        Disposition::Forwarded
    }

    /// Close every changeset absent from the batch just ingested.
    ///
    /// A changeset whose closing pass fails is reported in
    /// [`BatchReport::failures`] and dropped; the others are still closed.
    pub fn end_batch<H: HistoryProvider + ?Sized>(&mut self, history: &H) -> BatchReport {
        let absent: Vec<ChangesetId> = self
            .changesets
            .keys()
            .filter(|id| !self.seen.contains(id))
            .copied()
            .collect();

        let mut report = BatchReport::default();
        for id in absent {
            let Some(changeset) = self.changesets.remove(&id) else {
                continue;
            };
            let owner = changeset.owner().clone();
            match changeset.close(history, &self.config) {
                Ok(closed) => {
                    debug!(
                        changeset = id,
                        detections = closed.detections.len(),
                        "changeset evaluated"
                    );
                    report.closed.push(closed);
                }
                Err(error) => {
                    warn!(
                        changeset = id,
                        code = error.code().code(),
                        "changeset evaluation failed: {error}"
                    );
                    report.failures.push(CloseFailure {
                        changeset_id: id,
                        owner,
                        error,
                    });
                }
            }
        }

        self.seen.clear();
        report
    }

    /// Ingest a whole batch, then close what it left out.
    pub fn ingest_batch<H: HistoryProvider + ?Sized>(
        &mut self,
        batch: &DiffBatch,
        history: &H,
    ) -> BatchReport {
        debug!(
            sequence = batch.sequence,
            changes = batch.changes.len(),
            "ingesting batch"
        );
        for record in &batch.changes {
            self.ingest(record);
        }
        self.end_batch(history)
    }

    /// Close every changeset still open.
    pub fn finish<H: HistoryProvider + ?Sized>(&mut self, history: &H) -> BatchReport {
        self.seen.clear();
        self.end_batch(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ElementMeta, LineElement, PointElement, RelationElement};
    use crate::history::MemoryHistory;

    fn meta(id: u64, changeset: ChangesetId) -> ElementMeta {
        ElementMeta {
            id,
            version: 2,
            changeset,
            user: "mapper".into(),
            uid: 4,
        }
    }

    fn point_change(change: ChangeKind, id: u64, changeset: ChangesetId) -> ChangeRecord {
        ChangeRecord {
            change,
            element: Element::Point(PointElement {
                meta: meta(id, changeset),
                lat: 1.0,
                lon: 1.0,
            }),
        }
    }

    #[test]
    fn only_modifications_of_points_and_lines_are_forwarded() {
        let mut engine = Engine::new(DetectorConfig::default());

        assert_eq!(
            engine.ingest(&point_change(ChangeKind::Create, 1, 10)),
            Disposition::IgnoredChange(ChangeKind::Create)
        );
        assert_eq!(
            engine.ingest(&point_change(ChangeKind::Delete, 1, 10)),
            Disposition::IgnoredChange(ChangeKind::Delete)
        );
        let relation = ChangeRecord {
            change: ChangeKind::Modify,
            element: Element::Relation(RelationElement {
                meta: meta(3, 10),
                members: vec![],
            }),
        };
        assert_eq!(engine.ingest(&relation), Disposition::IgnoredRelation);
        assert_eq!(engine.open_changesets().count(), 0);

        assert_eq!(
            engine.ingest(&point_change(ChangeKind::Modify, 1, 10)),
            Disposition::Forwarded
        );
        let line = ChangeRecord {
            change: ChangeKind::Modify,
            element: Element::Line(LineElement {
                meta: meta(7, 11),
                nodes: vec![1, 2],
            }),
        };
        assert_eq!(engine.ingest(&line), Disposition::Forwarded);

        let ids: Vec<ChangesetId> = engine.open_changesets().collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(engine.changeset(10).map(Changeset::point_count), Some(1));
        assert_eq!(engine.changeset(11).map(Changeset::line_count), Some(1));
    }

    #[test]
    fn changesets_close_when_absent_from_a_batch() {
        let mut engine = Engine::new(DetectorConfig::default());
        let history = MemoryHistory::new();

        engine.ingest(&point_change(ChangeKind::Modify, 1, 10));
        engine.ingest(&point_change(ChangeKind::Modify, 2, 11));
        let report = engine.end_batch(&history);
        assert!(report.closed.is_empty());

        engine.ingest(&point_change(ChangeKind::Modify, 3, 11));
        let report = engine.end_batch(&history);
        let closed: Vec<ChangesetId> = report.closed.iter().map(|c| c.id).collect();
        assert_eq!(closed, vec![10]);
        assert_eq!(engine.open_changesets().collect::<Vec<_>>(), vec![11]);

        let report = engine.finish(&history);
        assert_eq!(report.closed.len(), 1);
        assert_eq!(engine.open_changesets().count(), 0);
    }
}
