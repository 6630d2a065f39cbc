//! The shared geometry record.
//!
//! One physical table of `GeomRecord` backs the geometry of every parent
//! kind in the store — template obstructions, pin shapes, decomposed polygon
//! tiles, via members, block-pin boxes, instance halos. The owner tag plus
//! handle on each record is the only way back to the logical parent, so the
//! two are stored as one enum value and can never be set independently.

use serde::{Deserialize, Serialize};

use crate::block::BlockPin;
use crate::cell::{CellTemplate, Instance, PinGeometryGroup, Polygon};
use crate::error::StoreError;
use crate::geometry::{BBox, Shape};
use crate::handle::Handle;
use crate::layer::Layer;
use crate::list::{Linked, ListOrder};
use crate::via::ViaDef;

/// Layer handles are packed into 9 bits on disk.
pub const MAX_LAYER_HANDLE: u32 = (1 << 9) - 1;
/// Via handles are packed into 12 bits on disk.
pub const MAX_VIA_HANDLE: u32 = (1 << 12) - 1;
/// Masks are a 2-bit field.
pub const MAX_MASK: u8 = 3;

/// The logical parent of a geometry record: discriminator and owner handle
/// as one value.
///
/// `Unknown` is the valid "detached, not yet linked" state used transiently
/// during construction; every other variant carries a non-null handle into
/// the corresponding parent table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeomOwner {
    #[default]
    Unknown,
    CellTemplate(Handle<CellTemplate>),
    PinGroup(Handle<PinGeometryGroup>),
    Polygon(Handle<Polygon>),
    BlockPin(Handle<BlockPin>),
    Via(Handle<ViaDef>),
    Instance(Handle<Instance>),
}

// On-disk discriminator values. The numbering leaves gaps for parent kinds
// (block wires, regions, blockages) that live in the routing layers above
// this store.
const TAG_UNKNOWN: u8 = 0;
const TAG_INSTANCE: u8 = 2;
const TAG_TEMPLATE: u8 = 8;
const TAG_PIN_GROUP: u8 = 9;
const TAG_VIA: u8 = 10;
const TAG_BLOCK_PIN: u8 = 12;
const TAG_POLYGON: u8 = 13;

impl GeomOwner {
    /// Persisted discriminator value.
    pub fn tag(&self) -> u8 {
        match self {
            GeomOwner::Unknown => TAG_UNKNOWN,
            GeomOwner::Instance(_) => TAG_INSTANCE,
            GeomOwner::CellTemplate(_) => TAG_TEMPLATE,
            GeomOwner::PinGroup(_) => TAG_PIN_GROUP,
            GeomOwner::Via(_) => TAG_VIA,
            GeomOwner::BlockPin(_) => TAG_BLOCK_PIN,
            GeomOwner::Polygon(_) => TAG_POLYGON,
        }
    }

    /// Raw owner handle as persisted; 0 only for `Unknown`.
    pub fn raw_handle(&self) -> u32 {
        match self {
            GeomOwner::Unknown => 0,
            GeomOwner::Instance(h) => h.raw(),
            GeomOwner::CellTemplate(h) => h.raw(),
            GeomOwner::PinGroup(h) => h.raw(),
            GeomOwner::Via(h) => h.raw(),
            GeomOwner::BlockPin(h) => h.raw(),
            GeomOwner::Polygon(h) => h.raw(),
        }
    }

    /// Rebuild from persisted tag + raw handle. Returns `None` for an
    /// unknown tag, or for a tagged owner with a null handle (handle 0 is
    /// only valid together with the `Unknown` tag).
    pub fn from_parts(tag: u8, raw: u32) -> Option<GeomOwner> {
        if tag == TAG_UNKNOWN {
            return if raw == 0 { Some(GeomOwner::Unknown) } else { None };
        }
        if raw == 0 {
            return None;
        }
        match tag {
            TAG_INSTANCE => Some(GeomOwner::Instance(Handle::from_raw(raw))),
            TAG_TEMPLATE => Some(GeomOwner::CellTemplate(Handle::from_raw(raw))),
            TAG_PIN_GROUP => Some(GeomOwner::PinGroup(Handle::from_raw(raw))),
            TAG_VIA => Some(GeomOwner::Via(Handle::from_raw(raw))),
            TAG_BLOCK_PIN => Some(GeomOwner::BlockPin(Handle::from_raw(raw))),
            TAG_POLYGON => Some(GeomOwner::Polygon(Handle::from_raw(raw))),
            _ => None,
        }
    }
}

/// The shared, heterogeneous geometry record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeomRecord {
    /// Rectangle or octagon payload; mutually exclusive variants.
    pub shape: Shape,
    /// Bound technology layer; null = no layer.
    pub layer: Handle<Layer>,
    /// 2-bit mask value; only legal when `layer` is set.
    pub mask: u8,
    /// Via definition this record is a copy of; null = not a via copy.
    pub via: Handle<ViaDef>,
    /// Logical parent (tag + handle, set atomically).
    pub owner: GeomOwner,
    /// Next sibling in the owner's child list.
    pub next: Handle<GeomRecord>,
    /// Design-rule width override; -1 = none.
    pub design_rule_width: i32,
    /// Traversal scratch bit; not meaningful across calls.
    pub visited: bool,
}

impl GeomRecord {
    pub fn is_via_copy(&self) -> bool {
        self.via.is_some()
    }

    pub fn bounding_box(&self) -> BBox {
        self.shape.bbox()
    }

    /// Set the mask value. Masks are 0–3 and require a bound layer;
    /// violations are reported, never silently dropped.
    pub fn set_mask(&mut self, mask: u8) -> Result<(), StoreError> {
        if mask > MAX_MASK {
            return Err(StoreError::MaskOutOfRange {
                mask,
                limit: MAX_MASK,
            });
        }
        if self.layer.is_none() && mask != 0 {
            return Err(StoreError::MaskWithoutLayer);
        }
        self.mask = mask;
        Ok(())
    }
}

impl Linked for GeomRecord {
    const BUILD_ORDER: ListOrder = ListOrder::Reversed;

    fn next(&self) -> Handle<GeomRecord> {
        self.next
    }

    fn set_next(&mut self, next: Handle<GeomRecord>) {
        self.next = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    #[test]
    fn test_owner_tag_roundtrip() {
        let owners = [
            GeomOwner::Unknown,
            GeomOwner::Instance(Handle::from_raw(4)),
            GeomOwner::CellTemplate(Handle::from_raw(1)),
            GeomOwner::PinGroup(Handle::from_raw(9)),
            GeomOwner::Via(Handle::from_raw(2)),
            GeomOwner::BlockPin(Handle::from_raw(7)),
            GeomOwner::Polygon(Handle::from_raw(3)),
        ];
        for owner in owners {
            let rebuilt = GeomOwner::from_parts(owner.tag(), owner.raw_handle());
            assert_eq!(rebuilt, Some(owner));
        }
    }

    #[test]
    fn test_owner_rejects_tagged_null_handle() {
        assert_eq!(GeomOwner::from_parts(TAG_PIN_GROUP, 0), None);
        assert_eq!(GeomOwner::from_parts(TAG_UNKNOWN, 5), None);
        assert_eq!(GeomOwner::from_parts(0xF, 1), None);
    }

    #[test]
    fn test_mask_requires_layer() {
        let mut rec = GeomRecord {
            shape: Shape::Rect(Rect::new(0, 0, 10, 10)),
            ..Default::default()
        };
        assert_eq!(rec.set_mask(2), Err(StoreError::MaskWithoutLayer));
        assert_eq!(rec.mask, 0);

        rec.layer = Handle::from_raw(1);
        rec.set_mask(2).unwrap();
        assert_eq!(rec.mask, 2);

        assert_eq!(
            rec.set_mask(4),
            Err(StoreError::MaskOutOfRange { mask: 4, limit: 3 })
        );
    }
}
