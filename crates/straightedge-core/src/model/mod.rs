//! Changeset-scoped snapshots of edited map elements.
//!
//! Snapshots are owned by exactly one [`Changeset`](crate::changeset::Changeset)
//! and are keyed by ID in flat maps. A point never holds a reference to the
//! lines it belongs to; membership is an ID-to-ID relation resolved through
//! the owning changeset or the history provider.

pub mod line;
pub mod point;

pub use line::LineSnapshot;
pub use point::PointSnapshot;

use serde::{Deserialize, Serialize};

/// Stable identifier of a point ("node").
pub type PointId = u64;

/// Stable identifier of a line ("way").
pub type LineId = u64;

/// Stable identifier of a changeset.
pub type ChangesetId = u64;

/// Stable identifier of a user account.
pub type UserId = u64;

/// A geographic coordinate in WGS84 degrees.
///
/// Equality is exact: a point whose prior coordinates compare equal to its
/// current ones did not move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// The coordinate as an `(x, y)` pair for regression, latitude first.
    #[must_use]
    pub const fn as_pair(self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

/// Who owns an edited element or a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub user: String,
    pub user_id: UserId,
}

impl Owner {
    #[must_use]
    pub fn new(user: impl Into<String>, user_id: UserId) -> Self {
        Self {
            user: user.into(),
            user_id,
        }
    }
}
