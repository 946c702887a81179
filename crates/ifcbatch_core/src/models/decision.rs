//! Export decision value type.

/// Result of the freshness checks for one item.
///
/// Three independent axes: the history journal and the two on-disk
/// artifacts. All three must hold for "no work needed" - history and
/// artifact freshness are orthogonal, an item can be current in the
/// journal and still have a stale artifact (or vice versa).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportDecision {
    /// The journal's recorded timestamp matches the source exactly.
    pub history_current: bool,
    /// The primary artifact exists and is at least as new as the source.
    pub primary_fresh: bool,
    /// The secondary artifact is not required, or exists and is fresh.
    pub secondary_fresh: bool,
}

impl ExportDecision {
    /// Whether anything at all has to happen for this item.
    pub fn needs_any_work(&self) -> bool {
        !(self.history_current && self.primary_fresh && self.secondary_fresh)
    }

    /// The primary channel needs a new export.
    pub fn needs_primary(&self) -> bool {
        !self.primary_fresh
    }

    /// The secondary channel needs a new export.
    pub fn needs_secondary(&self) -> bool {
        !self.secondary_fresh
    }
}
