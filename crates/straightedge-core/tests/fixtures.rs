// Shared builders for the integration tests, included with #[path].
#![allow(dead_code)]

use std::collections::BTreeMap;

use straightedge_core::MemoryHistory;
use straightedge_core::event::{
    ChangeKind, ChangeRecord, Element, ElementMeta, LineElement, PointElement,
};
use straightedge_core::model::{ChangesetId, Coord, LineId, Owner, PointId, PointSnapshot};

pub const USER: &str = "straightener";
pub const UID: u64 = 77;

pub fn owner() -> Owner {
    Owner::new(USER, UID)
}

/// Version 2 of a point, as a changeset would have touched it.
pub fn moved(id: PointId, lat: f64, lon: f64) -> PointSnapshot {
    PointSnapshot::new(id, owner(), 2, Coord::new(lat, lon))
}

pub fn touched(
    snapshots: impl IntoIterator<Item = PointSnapshot>,
) -> BTreeMap<PointId, PointSnapshot> {
    snapshots.into_iter().map(|s| (s.id(), s)).collect()
}

/// History holding version 1 of every listed point.
pub fn first_versions(points: &[(PointId, f64, f64)]) -> MemoryHistory {
    points
        .iter()
        .fold(MemoryHistory::new(), |h, &(id, lat, lon)| h.with_point(id, 1, lat, lon))
}

/// Old shape of the five-point test line: a tent peaking at point 3.
pub const TENT: [(PointId, f64, f64); 5] = [
    (1, 0.0, 0.0),
    (2, 1.0, 2.0),
    (3, 2.0, 4.0),
    (4, 3.0, 2.0),
    (5, 4.0, 0.0),
];

pub const TENT_LINE: LineId = 500;
pub const TENT_NODES: [PointId; 5] = [1, 2, 3, 4, 5];

fn meta(id: u64, version: u32, changeset: ChangesetId) -> ElementMeta {
    ElementMeta {
        id,
        version,
        changeset,
        user: USER.to_string(),
        uid: UID,
    }
}

pub fn modify_point(changeset: ChangesetId, id: PointId, lat: f64, lon: f64) -> ChangeRecord {
    ChangeRecord {
        change: ChangeKind::Modify,
        element: Element::Point(PointElement {
            meta: meta(id, 2, changeset),
            lat,
            lon,
        }),
    }
}

pub fn modify_line(changeset: ChangesetId, id: LineId, nodes: &[PointId]) -> ChangeRecord {
    ChangeRecord {
        change: ChangeKind::Modify,
        element: Element::Line(LineElement {
            meta: meta(id, 2, changeset),
            nodes: nodes.to_vec(),
        }),
    }
}
