//! Lifecycle of reconcilable items
//!
//! ```text
//! draft ──confirm──▶ confirmed ──fully allocated──▶ reconciled
//!   │                    │
//!   └──────cancel────────┴──────▶ cancelled
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ReconError, ReconResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Draft,
    Confirmed,
    Reconciled,
    Cancelled,
}

/// Events that move an item between states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemEvent {
    Confirm,
    /// Raised by the allocator only, never by callers
    FullyAllocated,
    Cancel,
}

/// Operations whose legality depends on the item's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemAction {
    Edit,
    Confirm,
    Allocate,
    RemoveAllocation,
    Cancel,
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Reconciled | ItemState::Cancelled)
    }

    /// Next state for `event`, or `InvalidStateTransition`
    pub fn transition(self, event: ItemEvent) -> ReconResult<ItemState> {
        match (self, event) {
            (ItemState::Draft, ItemEvent::Confirm) => Ok(ItemState::Confirmed),
            (ItemState::Confirmed, ItemEvent::FullyAllocated) => Ok(ItemState::Reconciled),
            (ItemState::Draft | ItemState::Confirmed, ItemEvent::Cancel) => {
                Ok(ItemState::Cancelled)
            }
            (state, event) => Err(ReconError::InvalidStateTransition(format!(
                "cannot apply '{}' to an item in state '{}'",
                event, state
            ))),
        }
    }

    pub fn permits(&self, action: ItemAction) -> bool {
        matches!(
            (self, action),
            (ItemState::Draft, ItemAction::Edit)
                | (ItemState::Draft, ItemAction::Confirm)
                | (ItemState::Confirmed, ItemAction::Allocate)
                | (ItemState::Confirmed, ItemAction::RemoveAllocation)
                | (ItemState::Draft | ItemState::Confirmed, ItemAction::Cancel)
        )
    }

    pub fn ensure_permits(&self, action: ItemAction) -> ReconResult<()> {
        if self.permits(action) {
            Ok(())
        } else {
            Err(ReconError::InvalidStateTransition(format!(
                "'{}' is not allowed while the item is '{}'",
                action, self
            )))
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemState::Draft => "draft",
            ItemState::Confirmed => "confirmed",
            ItemState::Reconciled => "reconciled",
            ItemState::Cancelled => "cancelled",
        })
    }
}

impl fmt::Display for ItemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemEvent::Confirm => "confirm",
            ItemEvent::FullyAllocated => "fully allocated",
            ItemEvent::Cancel => "cancel",
        })
    }
}

impl fmt::Display for ItemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemAction::Edit => "edit",
            ItemAction::Confirm => "confirm",
            ItemAction::Allocate => "allocate",
            ItemAction::RemoveAllocation => "remove allocation",
            ItemAction::Cancel => "cancel",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [ItemState; 4] = [
        ItemState::Draft,
        ItemState::Confirmed,
        ItemState::Reconciled,
        ItemState::Cancelled,
    ];

    #[test]
    fn test_happy_path() {
        let state = ItemState::Draft.transition(ItemEvent::Confirm).unwrap();
        assert_eq!(state, ItemState::Confirmed);
        let state = state.transition(ItemEvent::FullyAllocated).unwrap();
        assert_eq!(state, ItemState::Reconciled);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_reconciled_only_reachable_from_confirmed() {
        for state in ALL_STATES {
            let result = state.transition(ItemEvent::FullyAllocated);
            if state == ItemState::Confirmed {
                assert_eq!(result, Ok(ItemState::Reconciled));
            } else {
                assert!(matches!(
                    result,
                    Err(ReconError::InvalidStateTransition(_))
                ));
            }
        }
    }

    #[test]
    fn test_cancel_rules() {
        assert_eq!(
            ItemState::Draft.transition(ItemEvent::Cancel),
            Ok(ItemState::Cancelled)
        );
        assert_eq!(
            ItemState::Confirmed.transition(ItemEvent::Cancel),
            Ok(ItemState::Cancelled)
        );
        assert!(ItemState::Reconciled.transition(ItemEvent::Cancel).is_err());
        assert!(ItemState::Cancelled.transition(ItemEvent::Cancel).is_err());
    }

    #[test]
    fn test_cancelled_has_no_transitions() {
        for event in [ItemEvent::Confirm, ItemEvent::FullyAllocated, ItemEvent::Cancel] {
            assert!(ItemState::Cancelled.transition(event).is_err());
        }
    }

    #[test]
    fn test_confirm_only_from_draft() {
        assert!(ItemState::Confirmed.transition(ItemEvent::Confirm).is_err());
        assert!(ItemState::Reconciled.transition(ItemEvent::Confirm).is_err());
    }

    #[test]
    fn test_action_guards() {
        assert!(ItemState::Draft.permits(ItemAction::Edit));
        assert!(!ItemState::Confirmed.permits(ItemAction::Edit));
        assert!(!ItemState::Draft.permits(ItemAction::Allocate));
        assert!(ItemState::Confirmed.permits(ItemAction::Allocate));
        assert!(!ItemState::Reconciled.permits(ItemAction::RemoveAllocation));
        assert!(matches!(
            ItemState::Cancelled.ensure_permits(ItemAction::Allocate),
            Err(ReconError::InvalidStateTransition(_))
        ));
    }
}
