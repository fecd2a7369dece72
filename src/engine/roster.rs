//! Roster manager: the current set of asset selections.
//!
//! Enforces the two roster invariants: at most [`MAX_ROSTER_SIZE`]
//! selections, and no two selections for the same asset id. All
//! operations are synchronous and total.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Asset, Prediction, Selection, MAX_ROSTER_SIZE};

/// What a toggle did to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToggleOutcome {
    /// New selection appended.
    Added,
    /// Existing selection switched to the other direction, position kept.
    Flipped,
    /// Same direction requested twice; selection cleared.
    Removed,
    /// Roster full and asset not present; nothing changed.
    Ignored,
    /// Roster is locked by a pending or completed submission.
    Locked,
}

impl ToggleOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, ToggleOutcome::Added | ToggleOutcome::Flipped | ToggleOutcome::Removed)
    }
}

/// Ordered, bounded set of selections unique by asset id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterManager {
    selections: Vec<Selection>,
}

impl RosterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted selections, dropping duplicates and overflow.
    pub fn from_selections(selections: Vec<Selection>) -> Self {
        let mut roster = Self::new();
        for s in selections {
            if !roster.is_in_roster(&s.asset) && !roster.is_full() {
                roster.selections.push(s);
            }
        }
        roster
    }

    /// Add, flip or remove a selection in one action.
    ///
    /// - absent, room left: append with `prediction`
    /// - absent, full: no-op
    /// - present, same direction: remove
    /// - present, other direction: flip in place
    pub fn toggle_selection(&mut self, asset: &Asset, prediction: Prediction) -> ToggleOutcome {
        match self.position(asset) {
            Some(idx) if self.selections[idx].prediction == prediction => {
                self.selections.remove(idx);
                debug!(asset_id = %asset.id, %prediction, "Selection removed");
                ToggleOutcome::Removed
            }
            Some(idx) => {
                let flipped = self.selections[idx].prediction.opposite();
                self.selections[idx].prediction = flipped;
                debug!(asset_id = %asset.id, %prediction, "Selection flipped");
                ToggleOutcome::Flipped
            }
            None if self.is_full() => {
                debug!(asset_id = %asset.id, size = self.len(), "Roster full, toggle ignored");
                ToggleOutcome::Ignored
            }
            None => {
                self.selections.push(Selection {
                    asset: asset.clone(),
                    prediction,
                });
                debug!(asset_id = %asset.id, %prediction, size = self.len(), "Selection added");
                ToggleOutcome::Added
            }
        }
    }

    /// Remove any selection for this asset. Returns whether one was removed.
    pub fn remove_asset(&mut self, asset_id: &str) -> bool {
        let before = self.selections.len();
        self.selections.retain(|s| s.asset.id != asset_id);
        before != self.selections.len()
    }

    pub fn is_in_roster(&self, asset: &Asset) -> bool {
        self.position(asset).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.selections.len() >= MAX_ROSTER_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    /// Current prediction for an asset, if selected.
    pub fn prediction_for(&self, asset_id: &str) -> Option<Prediction> {
        self.selections
            .iter()
            .find(|s| s.asset.id == asset_id)
            .map(|s| s.prediction)
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    pub fn clear(&mut self) {
        self.selections.clear();
    }

    fn position(&self, asset: &Asset) -> Option<usize> {
        self.selections.iter().position(|s| s.asset.id == asset.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
