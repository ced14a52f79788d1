use super::{LineId, Owner, PointId};

/// A line as it was left by one changeset: its ordered point IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSnapshot {
    id: LineId,
    owner: Owner,
    version: u32,
    node_refs: Vec<PointId>,
    checked: bool,
}

impl LineSnapshot {
    #[must_use]
    pub const fn new(id: LineId, owner: Owner, version: u32, node_refs: Vec<PointId>) -> Self {
        Self {
            id,
            owner,
            version,
            node_refs,
            checked: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> LineId {
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

    /// Point IDs in drawing order. Closed rings repeat their first ID last.
    #[must_use]
    pub fn node_refs(&self) -> &[PointId] {
        &self.node_refs
    }

    /// Whether the alignment heuristic already ran on this line.
    #[must_use]
    pub const fn is_checked(&self) -> bool {
        self.checked
    }

    /// Record that the alignment heuristic ran on this line.
    pub const fn set_checked(&mut self) {
        self.checked = true;
    }
}
