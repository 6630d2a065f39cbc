//! Via definitions: named multi-layer cut geometry that pin and obstruction
//! lists place by copy.

use serde::{Deserialize, Serialize};

use crate::geom::GeomRecord;
use crate::geometry::BBox;
use crate::handle::Handle;
use crate::layer::Layer;

/// A via definition. Member boxes are added one layer at a time; the
/// definition maintains a running bounding box over all members and tracks
/// its top and bottom layer by routing number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViaDef {
    pub name: String,
    /// Union of all member box bounds; `None` until the first member.
    pub bbox: Option<BBox>,
    /// Member layer with the largest routing number.
    pub top: Handle<Layer>,
    /// Member layer with the smallest routing number.
    pub bottom: Handle<Layer>,
    /// Head of the member geometry list.
    pub boxes: Handle<GeomRecord>,
}
