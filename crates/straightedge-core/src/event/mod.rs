//! Typed change records delivered by the diff stream.
//!
//! A stream is a sequence of [`DiffBatch`]es; each batch holds the changes of
//! one sequence number. Only modifications of points and lines reach a
//! changeset; everything else is read and dropped by the engine.
//!
//! # Wire format
//!
//! ```json
//! { "change": "modify",
//!   "element": { "type": "node", "id": 1, "version": 3, "changeset": 900,
//!                "user": "mapper", "uid": 12, "lat": 45.1, "lon": 4.8 } }
//! ```
//!
//! Lines use `"type": "way"` and a `"nodes"` list; relations use
//! `"type": "relation"` and an optional `"members"` list.

pub mod parser;
pub mod types;

pub use parser::{BatchReader, ParsedLine, StreamError, parse_line, read_stream};
pub use types::{ChangeKind, ElementKind, UnknownKind};

use serde::{Deserialize, Serialize};

use crate::model::{ChangesetId, Coord, LineId, LineSnapshot, Owner, PointId, PointSnapshot, UserId};

/// Fields shared by every element kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementMeta {
    pub id: u64,
    pub version: u32,
    pub changeset: ChangesetId,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub uid: UserId,
}

impl ElementMeta {
    #[must_use]
    pub fn owner(&self) -> Owner {
        Owner::new(self.user.clone(), self.uid)
    }
}

/// A point element as carried by a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub lat: f64,
    pub lon: f64,
}

/// A line element as carried by a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(default)]
    pub nodes: Vec<PointId>,
}

/// One member of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMember {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub id: u64,
    #[serde(default)]
    pub role: String,
}

/// A relation element as carried by a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(default)]
    pub members: Vec<RelationMember>,
}

/// A map element, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Element {
    #[serde(rename = "node")]
    Point(PointElement),
    #[serde(rename = "way")]
    Line(LineElement),
    #[serde(rename = "relation")]
    Relation(RelationElement),
}

impl Element {
    #[must_use]
    pub const fn meta(&self) -> &ElementMeta {
        match self {
            Self::Point(p) => &p.meta,
            Self::Line(l) => &l.meta,
            Self::Relation(r) => &r.meta,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::Point(_) => ElementKind::Point,
            Self::Line(_) => ElementKind::Line,
            Self::Relation(_) => ElementKind::Relation,
        }
    }
}

impl PointElement {
    #[must_use]
    pub fn snapshot(&self) -> PointSnapshot {
        PointSnapshot::new(
            self.meta.id,
            self.meta.owner(),
            self.meta.version,
            Coord::new(self.lat, self.lon),
        )
    }
}

impl LineElement {
    #[must_use]
    pub fn id(&self) -> LineId {
        self.meta.id
    }

    #[must_use]
    pub fn snapshot(&self) -> LineSnapshot {
        LineSnapshot::new(
            self.meta.id,
            self.meta.owner(),
            self.meta.version,
            self.nodes.clone(),
        )
    }
}

/// One change of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub change: ChangeKind,
    pub element: Element,
}

impl ChangeRecord {
    #[must_use]
    pub const fn changeset_id(&self) -> ChangesetId {
        self.element.meta().changeset
    }
}

/// The changes published under one sequence number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffBatch {
    pub sequence: u64,
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_change_deserializes() {
        let record: ChangeRecord = serde_json::from_str(
            r#"{"change":"modify","element":{"type":"node","id":1,"version":3,
                "changeset":900,"user":"mapper","uid":12,"lat":45.5,"lon":4}}"#,
        )
        .expect("parse");

        assert_eq!(record.change, ChangeKind::Modify);
        assert_eq!(record.changeset_id(), 900);
        assert_eq!(record.element.kind(), ElementKind::Point);
        let Element::Point(point) = &record.element else {
            panic!("expected a point");
        };
        let snapshot = point.snapshot();
        assert_eq!(snapshot.version(), 3);
        assert_eq!(snapshot.coord(), Coord::new(45.5, 4.0));
        assert_eq!(snapshot.owner(), &Owner::new("mapper", 12));
    }

    #[test]
    fn line_and_relation_changes_deserialize() {
        let line: ChangeRecord = serde_json::from_str(
            r#"{"change":"modify","element":{"type":"way","id":7,"version":2,
                "changeset":5,"nodes":[1,2,3]}}"#,
        )
        .expect("parse");
        let Element::Line(way) = &line.element else {
            panic!("expected a line");
        };
        assert_eq!(way.snapshot().node_refs(), &[1, 2, 3]);
        assert_eq!(way.meta.user, "");

        let relation: ChangeRecord = serde_json::from_str(
            r#"{"change":"create","element":{"type":"relation","id":3,"version":1,
                "changeset":5,"members":[{"type":"way","ref":7,"role":"outer"}]}}"#,
        )
        .expect("parse");
        assert_eq!(relation.element.kind(), ElementKind::Relation);
        assert_eq!(relation.change, ChangeKind::Create);
    }

    #[test]
    fn unknown_element_type_is_rejected() {
        let err = serde_json::from_str::<ChangeRecord>(
            r#"{"change":"modify","element":{"type":"area","id":1,"version":1,"changeset":1}}"#,
        );
        assert!(err.is_err());
    }
}
