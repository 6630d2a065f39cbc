//! Synchronous mutation notification, consumed by external change observers
//! (incremental timing or routing updaters, for example).

use serde::{Deserialize, Serialize};

use crate::block::{BlockPin, BlockTerminal};
use crate::cell::{CellTemplate, Instance, PinGeometryGroup, Polygon, Terminal};
use crate::geom::GeomRecord;
use crate::handle::Handle;
use crate::via::ViaDef;

/// A typed reference to any record kind in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordRef {
    Template(Handle<CellTemplate>),
    Terminal(Handle<Terminal>),
    PinGroup(Handle<PinGeometryGroup>),
    Polygon(Handle<Polygon>),
    Geom(Handle<GeomRecord>),
    BlockTerminal(Handle<BlockTerminal>),
    BlockPin(Handle<BlockPin>),
    Via(Handle<ViaDef>),
    Instance(Handle<Instance>),
}

/// Observer of store mutations. `on_create` fires at the point of
/// allocation, before the record is linked into its parent list; `on_destroy`
/// fires after unlinking, before the slot is freed.
pub trait ChangeObserver {
    fn on_create(&mut self, record: RecordRef);
    fn on_destroy(&mut self, record: RecordRef);
}
