//! Change and element kinds of the diff stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What happened to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

/// The kind of map element a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// A single coordinate ("node").
    Point,
    /// An ordered list of points ("way").
    Line,
    /// A group of elements ("relation").
    Relation,
}

/// Error returned when parsing an unknown kind string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what} '{raw}': expected one of {expected}")]
pub struct UnknownKind {
    pub what: &'static str,
    pub raw: String,
    pub expected: &'static str,
}

impl ChangeKind {
    pub const ALL: [Self; 3] = [Self::Create, Self::Modify, Self::Delete];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

impl ElementKind {
    pub const ALL: [Self; 3] = [Self::Point, Self::Line, Self::Relation];

    /// Name used on the wire, following OSM vocabulary.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "node",
            Self::Line => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "modify" => Ok(Self::Modify),
            "delete" => Ok(Self::Delete),
            _ => Err(UnknownKind {
                what: "change kind",
                raw: s.to_string(),
                expected: "create, modify, delete",
            }),
        }
    }
}

impl FromStr for ElementKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Self::Point),
            "way" => Ok(Self::Line),
            "relation" => Ok(Self::Relation),
            _ => Err(UnknownKind {
                what: "element kind",
                raw: s.to_string(),
                expected: "node, way, relation",
            }),
        }
    }
}

// Custom serde: serialize as the lowercase wire string.
impl Serialize for ChangeKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChangeKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
