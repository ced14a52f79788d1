//! Decide whether a line was straightened abusively.
//!
//! # Overview
//!
//! An "align nodes" abuse moves almost every point of a line onto one
//! straight segment. The heuristic looks for that signature in three
//! stages, each more expensive than the last:
//!
//! 1. **Shape gate**: the line must have more than `min_line_node_count`
//!    points, and almost all of them must have been touched by the changeset
//!    (`modified > modif_rate_min_level · total`, or every point except two,
//!    which lets a closed ring keep its anchored first/last point).
//! 2. **Movement gate**: each touched point is compared with its previous
//!    version. Points that did not actually move are discounted. The scan
//!    stops as soon as the remaining points can no longer reach the gate, so
//!    a clean line costs as few provider calls as possible.
//! 3. **Straightness test**: the whole line is fitted by least squares before
//!    and after the edit. The edit is an alignment when both the summed and
//!    the worst squared residual shrink by more than
//!    `min_alignment_modification_rate`.
//!
//! Stage 2 stops early only when both gate conditions fail.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::DetectorConfig;
use crate::error::EngineError;
use crate::history::HistoryProvider;
use crate::model::{Coord, LineId, PointId, PointSnapshot};
use crate::regression;

/// A line whose edit passed every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub line_id: LineId,
    /// Points of the line touched by the changeset, in line order.
    pub modified: Vec<PointId>,
    pub old_points: Vec<Coord>,
    pub new_points: Vec<Coord>,
    pub alignment_rate: f64,
    pub max_rate: f64,
    /// Mean of the new shape.
    pub center: Coord,
}

/// Why a line was not flagged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// The line has `min_line_node_count` points or fewer.
    TooShort { points: usize },
    /// Too few of the line's points were touched by the changeset.
    TooFewModified { modified: usize, total: usize },
    /// Too many touched points kept their previous coordinates.
    TooFewMoved { moved: usize, total: usize },
    /// No coordinates could be resolved for any point of the line.
    NoCoordinates,
    /// The edit did not make the line straight enough.
    NotStraighter { alignment_rate: f64, max_rate: f64 },
}

/// Outcome of evaluating one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Aligned(Alignment),
    Rejected(Rejection),
}

impl Evaluation {
    #[must_use]
    pub const fn is_aligned(&self) -> bool {
        matches!(self, Self::Aligned(_))
    }

    #[must_use]
    pub fn into_alignment(self) -> Option<Alignment> {
        match self {
            Self::Aligned(alignment) => Some(alignment),
            Self::Rejected(_) => None,
        }
    }
}

/// Run the alignment heuristic on one line.
///
/// `points` holds the snapshots of every point touched by the changeset;
/// `node_refs` is the line's current shape. Nothing is mutated: the caller
/// resolves [`Alignment::modified`] on a positive verdict.
///
/// # Errors
///
/// - [`EngineError::InconsistentHistory`] if a touched point has no prior
///   version in `history`.
/// - [`EngineError::ProviderUnavailable`] if `history` fails.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate<H: HistoryProvider + ?Sized>(
    line_id: LineId,
    node_refs: &[PointId],
    points: &BTreeMap<PointId, PointSnapshot>,
    history: &H,
    config: &DetectorConfig,
) -> Result<Evaluation, EngineError> {
    let total = node_refs.len();
    if total <= config.min_line_node_count as usize {
        return Ok(Evaluation::Rejected(Rejection::TooShort { points: total }));
    }

    let modified: Vec<&PointSnapshot> = node_refs.iter().filter_map(|id| points.get(id)).collect();
    let all_but_two = total.checked_sub(2);
    let threshold = config.modif_rate_min_level;

    let mut modif_rate = modified.len() as f64 / total as f64;
    if !(Some(modified.len()) == all_but_two || modif_rate > threshold) {
        return Ok(Evaluation::Rejected(Rejection::TooFewModified {
            modified: modified.len(),
            total,
        }));
    }

    // Either gate keeps the scan going; both must fail for it to stop early.
    let still_possible =
        |rate: f64, moved: usize| rate > threshold || all_but_two.is_some_and(|n| moved >= n);

    let mut moved = modified.len();
    let mut prior: BTreeMap<PointId, Coord> = BTreeMap::new();
    for snapshot in &modified {
        if !still_possible(modif_rate, moved) {
            break;
        }
        let previous = previous_coord(snapshot, history)?;
        if previous == snapshot.coord() {
            moved -= 1;
            modif_rate = moved as f64 / total as f64;
        } else {
            prior.insert(snapshot.id(), previous);
        }
    }

    if !still_possible(modif_rate, moved) {
        return Ok(Evaluation::Rejected(Rejection::TooFewMoved { moved, total }));
    }

    let mut old_points = Vec::with_capacity(total);
    let mut new_points = Vec::with_capacity(total);
    for id in node_refs {
        let current = match points.get(id) {
            Some(snapshot) => Some(snapshot.coord()),
            None => history.latest_point(*id)?,
        };
        let Some(current) = current else {
            debug!(line_id, point_id = id, "no coordinates for point; skipped");
            continue;
        };
        new_points.push(current);
        old_points.push(prior.get(id).copied().unwrap_or(current));
    }

    if new_points.is_empty() {
        return Ok(Evaluation::Rejected(Rejection::NoCoordinates));
    }

    let old_fit = regression::fit(&pairs(&old_points))?;
    let new_fit = regression::fit(&pairs(&new_points))?;

    let alignment_rate = ratio(old_fit.sum_squared_residual, new_fit.sum_squared_residual);
    let max_rate = ratio(old_fit.max_squared_residual, new_fit.max_squared_residual);
    let min_rate = config.min_alignment_modification_rate;

    if !(alignment_rate > min_rate && max_rate > min_rate) {
        return Ok(Evaluation::Rejected(Rejection::NotStraighter {
            alignment_rate,
            max_rate,
        }));
    }

    Ok(Evaluation::Aligned(Alignment {
        line_id,
        modified: modified.iter().map(|snapshot| snapshot.id()).collect(),
        old_points,
        new_points,
        alignment_rate,
        max_rate,
        center: Coord::new(new_fit.mean_x, new_fit.mean_y),
    }))
}

fn previous_coord<H: HistoryProvider + ?Sized>(
    snapshot: &PointSnapshot,
    history: &H,
) -> Result<Coord, EngineError> {
    let missing = || EngineError::InconsistentHistory {
        point_id: snapshot.id(),
        version: snapshot.version().saturating_sub(1),
    };
    let version = snapshot.prior_version().ok_or_else(missing)?;
    history.point_version(snapshot.id(), version)?.ok_or_else(missing)
}

fn pairs(coords: &[Coord]) -> Vec<(f64, f64)> {
    coords.iter().map(|c| c.as_pair()).collect()
}

fn ratio(old: f64, new: f64) -> f64 {
    if new == 0.0 { f64::INFINITY } else { old / new }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::model::Owner;

    fn snapshot(id: PointId, version: u32, lat: f64, lon: f64) -> PointSnapshot {
        PointSnapshot::new(id, Owner::new("mapper", 1), version, Coord::new(lat, lon))
    }

    fn touched(snapshots: Vec<PointSnapshot>) -> BTreeMap<PointId, PointSnapshot> {
        snapshots.into_iter().map(|s| (s.id(), s)).collect()
    }

    #[test]
    fn ratio_of_zero_is_infinite() {
        assert!(ratio(3.0, 0.0).is_infinite());
        assert!((ratio(3.0, 1.5) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn two_point_line_is_too_short() {
        let points = touched(vec![snapshot(1, 2, 0.0, 0.0), snapshot(2, 2, 1.0, 1.0)]);
        let history = MemoryHistory::new();
        let eval = evaluate(9, &[1, 2], &points, &history, &DetectorConfig::default())
            .expect("evaluate");
        assert_eq!(eval, Evaluation::Rejected(Rejection::TooShort { points: 2 }));
    }

    #[test]
    fn missing_prior_version_is_inconsistent() {
        let points = touched(vec![
            snapshot(1, 2, 0.0, 0.0),
            snapshot(2, 2, 1.0, 0.0),
            snapshot(3, 2, 2.0, 0.0),
        ]);
        let history = MemoryHistory::new()
            .with_point(1, 1, 0.0, 1.0)
            .with_point(2, 1, 1.0, 1.0);

        let err = evaluate(9, &[1, 2, 3], &points, &history, &DetectorConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InconsistentHistory {
                point_id: 3,
                version: 1
            }
        ));
    }

    #[test]
    fn first_version_point_has_no_prior() {
        let points = touched(vec![
            snapshot(1, 1, 0.0, 0.0),
            snapshot(2, 2, 1.0, 0.0),
            snapshot(3, 2, 2.0, 0.0),
        ]);
        let err = evaluate(
            9,
            &[1, 2, 3],
            &points,
            &MemoryHistory::new(),
            &DetectorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InconsistentHistory {
                point_id: 1,
                version: 0
            }
        ));
    }

    #[test]
    fn untouched_points_come_from_latest_history() {
        // Points 1 and 5 untouched (5 points, 3 modified = total - 2).
        let points = touched(vec![
            snapshot(2, 2, 1.0, 0.0),
            snapshot(3, 2, 2.0, 0.0),
            snapshot(4, 2, 3.0, 0.0),
        ]);
        let history = MemoryHistory::new()
            .with_point(1, 1, 0.0, 0.0)
            .with_point(5, 4, 4.0, 0.0)
            .with_point(2, 1, 1.0, 1.0)
            .with_point(3, 1, 2.0, -1.0)
            .with_point(4, 1, 3.0, 1.0);

        let eval = evaluate(
            9,
            &[1, 2, 3, 4, 5],
            &points,
            &history,
            &DetectorConfig::default(),
        )
        .expect("evaluate");
        let Evaluation::Aligned(alignment) = eval else {
            panic!("expected alignment, got {eval:?}");
        };
        assert_eq!(alignment.modified, vec![2, 3, 4]);
        assert_eq!(alignment.new_points.len(), 5);
        assert_eq!(alignment.old_points[0], Coord::new(0.0, 0.0));
        assert_eq!(alignment.old_points[2], Coord::new(2.0, -1.0));
        assert_eq!(alignment.new_points[4], Coord::new(4.0, 0.0));
        assert!(alignment.alignment_rate.is_infinite());
        assert!((alignment.center.lat - 2.0).abs() < 1e-12);
    }

    #[test]
    fn unresolvable_points_are_skipped_in_both_shapes() {
        let points = touched(vec![
            snapshot(2, 2, 1.0, 0.0),
            snapshot(3, 2, 2.0, 0.0),
            snapshot(4, 2, 3.0, 0.0),
        ]);
        // Point 1 is unknown to the history; point 5 is known.
        let history = MemoryHistory::new()
            .with_point(5, 1, 4.0, 0.0)
            .with_point(2, 1, 1.0, 1.0)
            .with_point(3, 1, 2.0, -1.0)
            .with_point(4, 1, 3.0, 1.0);

        let eval = evaluate(
            9,
            &[1, 2, 3, 4, 5],
            &points,
            &history,
            &DetectorConfig::default(),
        )
        .expect("evaluate");
        let alignment = eval.into_alignment().expect("aligned");
        assert_eq!(alignment.old_points.len(), 4);
        assert_eq!(alignment.new_points.len(), 4);
    }
}
