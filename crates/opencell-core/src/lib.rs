//! OpenCell core: the in-memory object store for standard-cell layout data.
//!
//! Records live in paged, freelist-backed tables and are addressed by typed
//! handles that stay stable for the life of the store. Parent/child
//! relationships are intrusive sibling lists; one shared geometry table backs
//! the rectangles, octagons, via copies, and polygon tiles of every parent
//! kind. Persistence lives in the companion `opencell-io` crate.

pub mod block;
pub mod cell;
pub mod decompose;
pub mod error;
pub mod geom;
pub mod geometry;
pub mod handle;
pub mod layer;
pub mod list;
pub mod observer;
pub mod spatial;
pub mod store;
pub mod table;
pub mod via;

pub use block::{BlockPin, BlockTerminal, PlacementStatus};
pub use cell::{
    CellTemplate, Instance, PinDirection, PinGeometryGroup, Polygon, PolygonOwner, TemplateKind,
    Terminal,
};
pub use error::StoreError;
pub use geom::{GeomOwner, GeomRecord};
pub use geometry::{BBox, Octagon, Point, Rect, Shape};
pub use handle::Handle;
pub use layer::Layer;
pub use observer::{ChangeObserver, RecordRef};
pub use spatial::{RTreeIndex, SpatialIndex};
pub use store::{LayoutStore, StoreMeta};
pub use table::Table;
pub use via::ViaDef;
