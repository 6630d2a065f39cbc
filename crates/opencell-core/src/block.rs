//! Chip-boundary pin records: block terminals and their physical pins.

use serde::{Deserialize, Serialize};

use crate::cell::PinDirection;
use crate::geom::GeomRecord;
use crate::handle::Handle;
use crate::list::{Linked, ListOrder};

/// Placement state of a block pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlacementStatus {
    #[default]
    Unplaced,
    Suggested,
    Placed,
    Locked,
    Firm,
}

impl PlacementStatus {
    pub fn is_placed(&self) -> bool {
        !matches!(self, PlacementStatus::Unplaced | PlacementStatus::Suggested)
    }
}

/// A logical terminal on the chip boundary. Owns a list of block pins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockTerminal {
    pub name: String,
    pub direction: PinDirection,
    /// Head of the block pin list.
    pub pins: Handle<BlockPin>,
}

/// A physical placement of a block terminal: placement status, rule
/// overrides, and owned rectangle geometry registered in the spatial index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockPin {
    pub terminal: Handle<BlockTerminal>,
    pub status: PlacementStatus,
    /// Effective-width rule override; -1 = none.
    pub effective_width: i32,
    /// Min-spacing rule override; -1 = none.
    pub min_spacing: i32,
    /// Head of the owned geometry list.
    pub boxes: Handle<GeomRecord>,
    pub next: Handle<BlockPin>,
}

impl BlockPin {
    pub fn has_effective_width(&self) -> bool {
        self.effective_width >= 0
    }

    pub fn has_min_spacing(&self) -> bool {
        self.min_spacing >= 0
    }
}

impl Linked for BlockPin {
    const BUILD_ORDER: ListOrder = ListOrder::Reversed;

    fn next(&self) -> Handle<BlockPin> {
        self.next
    }

    fn set_next(&mut self, next: Handle<BlockPin>) {
        self.next = next;
    }
}
