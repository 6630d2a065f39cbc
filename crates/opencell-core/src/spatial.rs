use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::BBox;
use crate::handle::Handle;
use crate::layer::Layer;
use crate::observer::RecordRef;

/// Spatial-index collaborator interface. The store calls `insert`/`remove`
/// as geometry appears and disappears; algorithm layers query by window.
pub trait SpatialIndex {
    fn index_insert(&mut self, bbox: BBox, layer: Handle<Layer>, record: RecordRef);
    fn index_remove(&mut self, bbox: BBox, record: RecordRef);
    /// All records whose bounds intersect `window`, optionally restricted to
    /// one layer.
    fn index_query(&self, window: BBox, layer: Option<Handle<Layer>>) -> Vec<RecordRef>;
}

/// An entry in the R-tree spatial index.
#[derive(Debug, Clone, PartialEq)]
struct SpatialEntry {
    record: RecordRef,
    layer: Handle<Layer>,
    bbox: BBox,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[i32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.min.x, self.bbox.min.y],
            [self.bbox.max.x, self.bbox.max.y],
        )
    }
}

/// R-tree backed spatial index for point queries and window culling.
#[derive(Default)]
pub struct RTreeIndex {
    tree: RTree<SpatialEntry>,
}

impl RTreeIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl SpatialIndex for RTreeIndex {
    fn index_insert(&mut self, bbox: BBox, layer: Handle<Layer>, record: RecordRef) {
        self.tree.insert(SpatialEntry {
            record,
            layer,
            bbox,
        });
    }

    fn index_remove(&mut self, bbox: BBox, record: RecordRef) {
        let envelope = AABB::from_corners([bbox.min.x, bbox.min.y], [bbox.max.x, bbox.max.y]);
        let found = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .find(|entry| entry.record == record)
            .cloned();
        if let Some(entry) = found {
            self.tree.remove(&entry);
        }
    }

    fn index_query(&self, window: BBox, layer: Option<Handle<Layer>>) -> Vec<RecordRef> {
        let envelope = AABB::from_corners(
            [window.min.x, window.min.y],
            [window.max.x, window.max.y],
        );
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| layer.map_or(true, |l| entry.layer == l))
            .map(|entry| entry.record)
            .collect()
    }
}
