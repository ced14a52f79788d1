use super::{Coord, Owner, PointId};

/// A point as it was left by one changeset.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSnapshot {
    id: PointId,
    owner: Owner,
    version: u32,
    coord: Coord,
    in_changeset: bool,
}

impl PointSnapshot {
    /// Snapshot of a point touched by the changeset that will own it.
    #[must_use]
    pub const fn new(id: PointId, owner: Owner, version: u32, coord: Coord) -> Self {
        Self {
            id,
            owner,
            version,
            coord,
            in_changeset: true,
        }
    }

    #[must_use]
    pub const fn id(&self) -> PointId {
        self.id
    }

    #[must_use]
    pub const fn owner(&self) -> &Owner {
        &self.owner
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub const fn coord(&self) -> Coord {
        self.coord
    }

    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.coord.lat
    }

    #[must_use]
    pub const fn lon(&self) -> f64 {
        self.coord.lon
    }

    /// Whether the point was touched by the owning changeset.
    #[must_use]
    pub const fn in_changeset(&self) -> bool {
        self.in_changeset
    }

    /// The version that precedes this snapshot, if one can exist.
    #[must_use]
    pub const fn prior_version(&self) -> Option<u32> {
        match self.version {
            0 | 1 => None,
            v => Some(v - 1),
        }
    }
}
