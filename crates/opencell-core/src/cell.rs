//! Cell-side entity records: reusable cell templates, their terminals and
//! pin geometry groups, polygon geometry, and template instances.
//!
//! These are plain records; all linking and lifecycle goes through the
//! factory methods on [`LayoutStore`](crate::store::LayoutStore).

use serde::{Deserialize, Serialize};

use crate::geom::GeomRecord;
use crate::geometry::{BBox, Point};
use crate::handle::Handle;
use crate::layer::Layer;
use crate::list::{Linked, ListOrder};

/// Minimum vertex count for a polygon; shorter point sequences are rejected.
pub const MIN_POLYGON_POINTS: usize = 4;

/// Classification of a cell template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemplateKind {
    #[default]
    Core,
    Pad,
    Block,
    Cover,
    EndCap,
}

/// Signal direction / role of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinDirection {
    #[default]
    InOut,
    Input,
    Output,
    Power,
    Ground,
}

/// A reusable cell definition: dimensions, identity, symmetry/type flags,
/// and the heads of its terminal and obstruction child lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellTemplate {
    pub name: String,
    /// Unique within the open store, assigned from a monotonic counter.
    pub template_id: u32,
    pub width: i32,
    pub height: i32,
    pub origin: Point,
    pub kind: TemplateKind,
    /// Once frozen, terminal order is fixed and no terminal may be added.
    pub frozen: bool,
    pub symmetry_x: bool,
    pub symmetry_y: bool,
    pub symmetry_r90: bool,
    /// Head of the terminal list.
    pub terminals: Handle<Terminal>,
    pub terminal_count: u32,
    /// Head of the rectangle/via-copy obstruction list.
    pub obstructions: Handle<GeomRecord>,
    /// Head of the polygon obstruction list.
    pub poly_obstructions: Handle<Polygon>,
}

impl CellTemplate {
    pub fn placement_boundary(&self) -> BBox {
        BBox::new(
            self.origin,
            Point::new(self.origin.x + self.width, self.origin.y + self.height),
        )
    }
}

/// A logical terminal on a cell template. Owns an ordered list of pin
/// geometry groups; gets a stable order index when the template is frozen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Terminal {
    pub name: String,
    pub template: Handle<CellTemplate>,
    pub direction: PinDirection,
    /// 0-based position in creation order; valid only once the owning
    /// template is frozen.
    pub order_index: u32,
    /// Head of the pin geometry group list.
    pub pin_groups: Handle<PinGeometryGroup>,
    pub next: Handle<Terminal>,
}

impl Linked for Terminal {
    const BUILD_ORDER: ListOrder = ListOrder::Reversed;

    fn next(&self) -> Handle<Terminal> {
        self.next
    }

    fn set_next(&mut self, next: Handle<Terminal>) {
        self.next = next;
    }
}

/// One physical pin of a terminal: rectangle/via-copy geometry, polygon
/// geometry, and per-placement-variant access-point references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinGeometryGroup {
    pub terminal: Handle<Terminal>,
    /// Head of the rectangle/via-copy geometry list.
    pub geometry: Handle<GeomRecord>,
    /// Head of the polygon geometry list.
    pub polygons: Handle<Polygon>,
    /// Access-point ids per placement variant; owned by an external
    /// collaborator, carried opaquely here.
    pub access_points: Vec<Vec<u32>>,
    pub next: Handle<PinGeometryGroup>,
}

impl Linked for PinGeometryGroup {
    const BUILD_ORDER: ListOrder = ListOrder::Reversed;

    fn next(&self) -> Handle<PinGeometryGroup> {
        self.next
    }

    fn set_next(&mut self, next: Handle<PinGeometryGroup>) {
        self.next = next;
    }
}

/// Which parent a polygon record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PolygonOwner {
    #[default]
    Unknown,
    CellTemplate(Handle<CellTemplate>),
    PinGroup(Handle<PinGeometryGroup>),
}

/// An owning polygon record: an arbitrary point sequence plus the child
/// rectangles it was decomposed into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
    pub layer: Handle<Layer>,
    /// Design-rule width override; -1 = none.
    pub design_rule_width: i32,
    pub owner: PolygonOwner,
    /// Head of the decomposed child rectangle list. Reversed once after
    /// decomposition so iteration follows the decomposer's output order.
    pub boxes: Handle<GeomRecord>,
    pub next: Handle<Polygon>,
}

impl Polygon {
    pub fn bounding_box(&self) -> Option<BBox> {
        BBox::from_points(&self.points)
    }
}

impl Linked for Polygon {
    const BUILD_ORDER: ListOrder = ListOrder::Reversed;

    fn next(&self) -> Handle<Polygon> {
        self.next
    }

    fn set_next(&mut self, next: Handle<Polygon>) {
        self.next = next;
    }
}

/// A placement of a cell template. Exists so the store can refuse to destroy
/// a template that is still instantiated, and to own an optional halo box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub template: Handle<CellTemplate>,
    pub location: Point,
    /// Placement halo box, if any; owned via `GeomOwner::Instance`.
    pub halo: Handle<GeomRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_boundary() {
        let tpl = CellTemplate {
            name: "INV".to_string(),
            width: 460,
            height: 1200,
            origin: Point::new(-10, 0),
            ..Default::default()
        };
        let bb = tpl.placement_boundary();
        assert_eq!(bb.min, Point::new(-10, 0));
        assert_eq!(bb.max, Point::new(450, 1200));
    }

    #[test]
    fn test_polygon_bounding_box() {
        let poly = Polygon {
            points: vec![
                Point::new(0, 0),
                Point::new(20, 0),
                Point::new(20, 10),
                Point::new(0, 10),
            ],
            ..Default::default()
        };
        let bb = poly.bounding_box().unwrap();
        assert_eq!(bb.max, Point::new(20, 10));
        assert!(Polygon::default().bounding_box().is_none());
    }
}
