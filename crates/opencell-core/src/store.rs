//! The layout store: every object table, the factory/destroy surface, and
//! the collaborator hooks (change observers, spatial index).
//!
//! Single-writer, fully synchronous. No call blocks, suspends, or takes a
//! lock; callers that fan work out to threads must confine mutation to one
//! coordinating thread.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::{BlockPin, BlockTerminal, PlacementStatus};
use crate::cell::{
    CellTemplate, Instance, PinDirection, PinGeometryGroup, Polygon, PolygonOwner, Terminal,
    MIN_POLYGON_POINTS,
};
use crate::decompose::decompose_rectilinear;
use crate::error::StoreError;
use crate::geom::{GeomOwner, GeomRecord, MAX_LAYER_HANDLE, MAX_MASK, MAX_VIA_HANDLE};
use crate::geometry::{BBox, Octagon, Point, Rect, Shape};
use crate::handle::Handle;
use crate::layer::Layer;
use crate::list;
use crate::list::ListIter;
use crate::observer::{ChangeObserver, RecordRef};
use crate::spatial::SpatialIndex;
use crate::table::Table;
use crate::via::ViaDef;

/// Serializable store identity and table census, for the JSON tooling
/// surface. The design data itself goes through the binary codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub id: Uuid,
    pub name: String,
    pub next_template_id: u32,
    pub layers: usize,
    pub vias: usize,
    pub templates: usize,
    pub terminals: usize,
    pub pin_groups: usize,
    pub polygons: usize,
    pub geometry: usize,
    pub block_terminals: usize,
    pub block_pins: usize,
    pub instances: usize,
}

impl StoreMeta {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// The persistent object store of one open layout database.
pub struct LayoutStore {
    /// Database identifier.
    pub id: Uuid,
    /// Library / design name.
    pub name: String,
    pub layers: Table<Layer>,
    pub vias: Table<ViaDef>,
    pub templates: Table<CellTemplate>,
    pub terminals: Table<Terminal>,
    pub pin_groups: Table<PinGeometryGroup>,
    pub polygons: Table<Polygon>,
    pub geoms: Table<GeomRecord>,
    pub block_terminals: Table<BlockTerminal>,
    pub block_pins: Table<BlockPin>,
    pub instances: Table<Instance>,
    /// Monotonic template-id counter, scoped to this store; reset only by
    /// creating a fresh store.
    next_template_id: u32,
    observers: Vec<Box<dyn ChangeObserver>>,
    spatial: Option<Box<dyn SpatialIndex>>,
}

// The collaborator boxes are opaque; render the identity and table census.
impl fmt::Debug for LayoutStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutStore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("layers", &self.layers.len())
            .field("vias", &self.vias.len())
            .field("templates", &self.templates.len())
            .field("terminals", &self.terminals.len())
            .field("pin_groups", &self.pin_groups.len())
            .field("polygons", &self.polygons.len())
            .field("geoms", &self.geoms.len())
            .field("block_terminals", &self.block_terminals.len())
            .field("block_pins", &self.block_pins.len())
            .field("instances", &self.instances.len())
            .field("next_template_id", &self.next_template_id)
            .field("observers", &self.observers.len())
            .field("spatial", &self.spatial.is_some())
            .finish()
    }
}

impl LayoutStore {
    pub fn new(name: &str) -> Self {
        log::debug!("creating layout store '{}'", name);
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            layers: Table::new(),
            vias: Table::new(),
            templates: Table::new(),
            terminals: Table::new(),
            pin_groups: Table::new(),
            polygons: Table::new(),
            geoms: Table::new(),
            block_terminals: Table::new(),
            block_pins: Table::new(),
            instances: Table::new(),
            next_template_id: 1,
            observers: Vec::new(),
            spatial: None,
        }
    }

    pub fn meta(&self) -> StoreMeta {
        StoreMeta {
            id: self.id,
            name: self.name.clone(),
            next_template_id: self.next_template_id,
            layers: self.layers.len(),
            vias: self.vias.len(),
            templates: self.templates.len(),
            terminals: self.terminals.len(),
            pin_groups: self.pin_groups.len(),
            polygons: self.polygons.len(),
            geometry: self.geoms.len(),
            block_terminals: self.block_terminals.len(),
            block_pins: self.block_pins.len(),
            instances: self.instances.len(),
        }
    }

    pub fn template_id_counter(&self) -> u32 {
        self.next_template_id
    }

    /// Restore the template-id counter (codec use).
    pub fn set_template_id_counter(&mut self, value: u32) {
        self.next_template_id = value;
    }

    // ── Collaborators ────────────────────────────────────────────────

    pub fn attach_observer(&mut self, observer: Box<dyn ChangeObserver>) {
        self.observers.push(observer);
    }

    /// Attach a spatial index, seeding it with every block-pin box already
    /// in the store; a freshly loaded design holds them only in the tables.
    pub fn set_spatial_index(&mut self, mut index: Box<dyn SpatialIndex>) {
        for (h, record) in self.geoms.iter() {
            if matches!(record.owner, GeomOwner::BlockPin(_)) {
                index.index_insert(record.bounding_box(), record.layer, RecordRef::Geom(h));
            }
        }
        self.spatial = Some(index);
    }

    pub fn spatial_index(&self) -> Option<&dyn SpatialIndex> {
        self.spatial.as_deref()
    }

    fn notify_create(&mut self, record: RecordRef) {
        for observer in &mut self.observers {
            observer.on_create(record);
        }
    }

    fn notify_destroy(&mut self, record: RecordRef) {
        for observer in &mut self.observers {
            observer.on_destroy(record);
        }
    }

    // ── Checked record access ────────────────────────────────────────

    fn template(&self, h: Handle<CellTemplate>) -> Result<&CellTemplate, StoreError> {
        self.templates.get(h).ok_or(StoreError::StaleHandle {
            kind: "cell template",
            raw: h.raw(),
        })
    }

    fn template_mut(&mut self, h: Handle<CellTemplate>) -> Result<&mut CellTemplate, StoreError> {
        self.templates.get_mut(h).ok_or(StoreError::StaleHandle {
            kind: "cell template",
            raw: h.raw(),
        })
    }

    fn terminal(&self, h: Handle<Terminal>) -> Result<&Terminal, StoreError> {
        self.terminals.get(h).ok_or(StoreError::StaleHandle {
            kind: "terminal",
            raw: h.raw(),
        })
    }

    fn terminal_mut(&mut self, h: Handle<Terminal>) -> Result<&mut Terminal, StoreError> {
        self.terminals.get_mut(h).ok_or(StoreError::StaleHandle {
            kind: "terminal",
            raw: h.raw(),
        })
    }

    fn pin_group(&self, h: Handle<PinGeometryGroup>) -> Result<&PinGeometryGroup, StoreError> {
        self.pin_groups.get(h).ok_or(StoreError::StaleHandle {
            kind: "pin group",
            raw: h.raw(),
        })
    }

    fn pin_group_mut(
        &mut self,
        h: Handle<PinGeometryGroup>,
    ) -> Result<&mut PinGeometryGroup, StoreError> {
        self.pin_groups.get_mut(h).ok_or(StoreError::StaleHandle {
            kind: "pin group",
            raw: h.raw(),
        })
    }

    fn layer(&self, h: Handle<Layer>) -> Result<&Layer, StoreError> {
        self.layers.get(h).ok_or(StoreError::StaleHandle {
            kind: "layer",
            raw: h.raw(),
        })
    }

    fn via(&self, h: Handle<ViaDef>) -> Result<&ViaDef, StoreError> {
        self.vias.get(h).ok_or(StoreError::StaleHandle {
            kind: "via",
            raw: h.raw(),
        })
    }

    fn via_mut(&mut self, h: Handle<ViaDef>) -> Result<&mut ViaDef, StoreError> {
        self.vias.get_mut(h).ok_or(StoreError::StaleHandle {
            kind: "via",
            raw: h.raw(),
        })
    }

    fn polygon_mut(&mut self, h: Handle<Polygon>) -> Result<&mut Polygon, StoreError> {
        self.polygons.get_mut(h).ok_or(StoreError::StaleHandle {
            kind: "polygon",
            raw: h.raw(),
        })
    }

    fn block_terminal(&self, h: Handle<BlockTerminal>) -> Result<&BlockTerminal, StoreError> {
        self.block_terminals.get(h).ok_or(StoreError::StaleHandle {
            kind: "block terminal",
            raw: h.raw(),
        })
    }

    fn block_terminal_mut(
        &mut self,
        h: Handle<BlockTerminal>,
    ) -> Result<&mut BlockTerminal, StoreError> {
        self.block_terminals.get_mut(h).ok_or(StoreError::StaleHandle {
            kind: "block terminal",
            raw: h.raw(),
        })
    }

    fn block_pin(&self, h: Handle<BlockPin>) -> Result<&BlockPin, StoreError> {
        self.block_pins.get(h).ok_or(StoreError::StaleHandle {
            kind: "block pin",
            raw: h.raw(),
        })
    }

    fn block_pin_mut(&mut self, h: Handle<BlockPin>) -> Result<&mut BlockPin, StoreError> {
        self.block_pins.get_mut(h).ok_or(StoreError::StaleHandle {
            kind: "block pin",
            raw: h.raw(),
        })
    }

    fn geom(&self, h: Handle<GeomRecord>) -> Result<&GeomRecord, StoreError> {
        self.geoms.get(h).ok_or(StoreError::StaleHandle {
            kind: "geometry",
            raw: h.raw(),
        })
    }

    fn geom_mut(&mut self, h: Handle<GeomRecord>) -> Result<&mut GeomRecord, StoreError> {
        self.geoms.get_mut(h).ok_or(StoreError::StaleHandle {
            kind: "geometry",
            raw: h.raw(),
        })
    }

    fn instance(&self, h: Handle<Instance>) -> Result<&Instance, StoreError> {
        self.instances.get(h).ok_or(StoreError::StaleHandle {
            kind: "instance",
            raw: h.raw(),
        })
    }

    fn instance_mut(&mut self, h: Handle<Instance>) -> Result<&mut Instance, StoreError> {
        self.instances.get_mut(h).ok_or(StoreError::StaleHandle {
            kind: "instance",
            raw: h.raw(),
        })
    }

    // ── Layers and vias ──────────────────────────────────────────────

    pub fn add_layer(&mut self, name: &str, number: i32) -> Result<Handle<Layer>, StoreError> {
        let h = self.layers.allocate_with(|layer| {
            layer.name = name.to_string();
            layer.number = number;
        });
        if h.raw() > MAX_LAYER_HANDLE {
            let _ = self.layers.free(h, "layer");
            return Err(StoreError::LayerIdTooLarge {
                name: name.to_string(),
                index: h.raw(),
                limit: MAX_LAYER_HANDLE,
            });
        }
        Ok(h)
    }

    pub fn find_layer(&self, name: &str) -> Option<Handle<Layer>> {
        self.layers
            .iter()
            .find(|(_, layer)| layer.name == name)
            .map(|(h, _)| h)
    }

    pub fn create_via(&mut self, name: &str) -> Result<Handle<ViaDef>, StoreError> {
        if self.find_via(name).is_some() {
            return Err(StoreError::DuplicateName {
                kind: "via",
                name: name.to_string(),
            });
        }
        let h = self.vias.allocate_with(|via| via.name = name.to_string());
        if h.raw() > MAX_VIA_HANDLE {
            let _ = self.vias.free(h, "via");
            return Err(StoreError::ViaIdTooLarge {
                name: name.to_string(),
                index: h.raw(),
                limit: MAX_VIA_HANDLE,
            });
        }
        self.notify_create(RecordRef::Via(h));
        Ok(h)
    }

    pub fn find_via(&self, name: &str) -> Option<Handle<ViaDef>> {
        self.vias
            .iter()
            .find(|(_, via)| via.name == name)
            .map(|(h, _)| h)
    }

    /// Add a member box to a via definition, merging the via's running
    /// bounding box and updating its top/bottom layer by routing number.
    pub fn add_via_box(
        &mut self,
        via: Handle<ViaDef>,
        layer: Handle<Layer>,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
    ) -> Result<Handle<GeomRecord>, StoreError> {
        self.via(via)?;
        let number = self.layer(layer)?.number;
        let rect = Rect::new(x1, y1, x2, y2);

        let h = self.geoms.allocate_with(|record| {
            record.shape = Shape::Rect(rect);
            record.layer = layer;
            record.owner = GeomOwner::Via(via);
        });
        self.notify_create(RecordRef::Geom(h));

        let top_number = self.via(via)?.top;
        let bottom_number = self.via(via)?.bottom;
        let top_number = self.layers.get(top_number).map(|l| l.number);
        let bottom_number = self.layers.get(bottom_number).map(|l| l.number);

        let def = self.via_mut(via)?;
        match &mut def.bbox {
            Some(bb) => bb.merge(&rect.bbox()),
            None => def.bbox = Some(rect.bbox()),
        }
        if def.top.is_none() {
            def.top = layer;
            def.bottom = layer;
        } else {
            if top_number.is_some_and(|t| number > t) {
                def.top = layer;
            }
            if bottom_number.is_some_and(|b| number < b) {
                def.bottom = layer;
            }
        }
        let head = def.boxes;
        let head = list::push_front(&mut self.geoms, head, h);
        self.via_mut(via)?.boxes = head;
        Ok(h)
    }

    pub fn via_boxes_of(&self, via: Handle<ViaDef>) -> ListIter<'_, GeomRecord> {
        let head = self.vias.get(via).map(|v| v.boxes).unwrap_or_default();
        list::iter(&self.geoms, head)
    }

    // ── Cell templates ───────────────────────────────────────────────

    pub fn create_template(&mut self, name: &str) -> Result<Handle<CellTemplate>, StoreError> {
        if self.find_template(name).is_some() {
            return Err(StoreError::DuplicateName {
                kind: "cell template",
                name: name.to_string(),
            });
        }
        let id = self.next_template_id;
        self.next_template_id += 1;
        let h = self.templates.allocate_with(|template| {
            template.name = name.to_string();
            template.template_id = id;
        });
        self.notify_create(RecordRef::Template(h));
        Ok(h)
    }

    pub fn find_template(&self, name: &str) -> Option<Handle<CellTemplate>> {
        self.templates
            .iter()
            .find(|(_, template)| template.name == name)
            .map(|(h, _)| h)
    }

    /// Destroy a template and everything it owns. Refused while live
    /// instances of it exist.
    pub fn destroy_template(&mut self, h: Handle<CellTemplate>) -> Result<(), StoreError> {
        let template = self.template(h)?;
        let (name, template_id) = (template.name.clone(), template.template_id);
        let live_instances = self
            .instances
            .iter()
            .filter(|(_, inst)| inst.template == h)
            .count();
        if live_instances > 0 {
            return Err(StoreError::TemplateHasInstances {
                name,
                template_id,
                instances: live_instances,
            });
        }

        let terminal_handles: Vec<_> = self.terminals_of(h).collect();
        for terminal in terminal_handles {
            self.destroy_terminal_contents(terminal);
        }
        let obstructions = self.template(h)?.obstructions;
        self.free_geom_list(obstructions);
        let poly_head = self.template(h)?.poly_obstructions;
        let poly_handles: Vec<_> = list::iter(&self.polygons, poly_head).collect();
        for polygon in poly_handles {
            self.destroy_polygon_contents(polygon);
        }
        self.notify_destroy(RecordRef::Template(h));
        self.templates.free(h, "cell template")?;
        log::debug!("destroyed cell template '{}' (id {})", name, template_id);
        Ok(())
    }

    /// Freeze a template: canonicalize terminal iteration to creation order,
    /// assign each terminal its 0-based order index, and refuse any further
    /// terminal creation.
    pub fn freeze_template(&mut self, h: Handle<CellTemplate>) -> Result<(), StoreError> {
        if self.template(h)?.frozen {
            return Ok(());
        }
        let head = self.template(h)?.terminals;
        let head = list::reverse(&mut self.terminals, head);
        let mut index = 0u32;
        let mut cursor = head;
        while cursor.is_some() {
            let terminal = self.terminals.get_mut(cursor).ok_or(StoreError::StaleHandle {
                kind: "terminal",
                raw: cursor.raw(),
            })?;
            terminal.order_index = index;
            index += 1;
            cursor = terminal.next;
        }
        let template = self.template_mut(h)?;
        template.terminals = head;
        template.frozen = true;
        log::debug!(
            "froze cell template '{}' with {} terminal(s)",
            template.name,
            index
        );
        Ok(())
    }

    pub fn terminals_of(&self, template: Handle<CellTemplate>) -> ListIter<'_, Terminal> {
        let head = self
            .templates
            .get(template)
            .map(|t| t.terminals)
            .unwrap_or_default();
        list::iter(&self.terminals, head)
    }

    pub fn template_obstructions(&self, template: Handle<CellTemplate>) -> ListIter<'_, GeomRecord> {
        let head = self
            .templates
            .get(template)
            .map(|t| t.obstructions)
            .unwrap_or_default();
        list::iter(&self.geoms, head)
    }

    pub fn template_polygon_obstructions(
        &self,
        template: Handle<CellTemplate>,
    ) -> ListIter<'_, Polygon> {
        let head = self
            .templates
            .get(template)
            .map(|t| t.poly_obstructions)
            .unwrap_or_default();
        list::iter(&self.polygons, head)
    }

    /// Add a rectangle obstruction to a template.
    pub fn add_obstruction(
        &mut self,
        template: Handle<CellTemplate>,
        layer: Handle<Layer>,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
    ) -> Result<Handle<GeomRecord>, StoreError> {
        self.template(template)?;
        self.layer(layer)?;
        let h = self.geoms.allocate_with(|record| {
            record.shape = Shape::Rect(Rect::new(x1, y1, x2, y2));
            record.layer = layer;
            record.owner = GeomOwner::CellTemplate(template);
        });
        self.notify_create(RecordRef::Geom(h));
        let head = self.template(template)?.obstructions;
        let head = list::push_front(&mut self.geoms, head, h);
        self.template_mut(template)?.obstructions = head;
        Ok(h)
    }

    /// Place a copy of a via's bounding box as a template obstruction.
    pub fn add_template_via_copy(
        &mut self,
        template: Handle<CellTemplate>,
        via: Handle<ViaDef>,
        x: i32,
        y: i32,
    ) -> Result<Handle<GeomRecord>, StoreError> {
        self.template(template)?;
        let owner = GeomOwner::CellTemplate(template);
        let h = self.create_via_copy(via, owner, x, y)?;
        let head = self.template(template)?.obstructions;
        let head = list::push_front(&mut self.geoms, head, h);
        self.template_mut(template)?.obstructions = head;
        Ok(h)
    }

    // ── Terminals and pin groups ─────────────────────────────────────

    pub fn create_terminal(
        &mut self,
        template: Handle<CellTemplate>,
        name: &str,
        direction: PinDirection,
    ) -> Result<Handle<Terminal>, StoreError> {
        let t = self.template(template)?;
        if t.frozen {
            return Err(StoreError::TemplateFrozen {
                name: t.name.clone(),
                template_id: t.template_id,
            });
        }
        if self.find_terminal(template, name).is_some() {
            return Err(StoreError::DuplicateName {
                kind: "terminal",
                name: name.to_string(),
            });
        }
        let h = self.terminals.allocate_with(|terminal| {
            terminal.name = name.to_string();
            terminal.template = template;
            terminal.direction = direction;
        });
        self.notify_create(RecordRef::Terminal(h));
        let head = self.template(template)?.terminals;
        let head = list::push_front(&mut self.terminals, head, h);
        let t = self.template_mut(template)?;
        t.terminals = head;
        t.terminal_count += 1;
        Ok(h)
    }

    pub fn find_terminal(
        &self,
        template: Handle<CellTemplate>,
        name: &str,
    ) -> Option<Handle<Terminal>> {
        self.terminals_of(template)
            .find(|&h| self.terminals.get(h).is_some_and(|t| t.name == name))
    }

    /// The creation-order index of a terminal; only defined once the owning
    /// template has been frozen.
    pub fn terminal_order_index(&self, h: Handle<Terminal>) -> Result<u32, StoreError> {
        let terminal = self.terminal(h)?;
        let template = self.template(terminal.template)?;
        if !template.frozen {
            return Err(StoreError::TemplateNotFrozen {
                name: template.name.clone(),
                template_id: template.template_id,
            });
        }
        Ok(terminal.order_index)
    }

    pub fn create_pin_group(
        &mut self,
        terminal: Handle<Terminal>,
    ) -> Result<Handle<PinGeometryGroup>, StoreError> {
        self.terminal(terminal)?;
        let h = self.pin_groups.allocate_with(|group| group.terminal = terminal);
        self.notify_create(RecordRef::PinGroup(h));
        let head = self.terminal(terminal)?.pin_groups;
        let head = list::push_front(&mut self.pin_groups, head, h);
        self.terminal_mut(terminal)?.pin_groups = head;
        Ok(h)
    }

    pub fn pin_groups_of(&self, terminal: Handle<Terminal>) -> ListIter<'_, PinGeometryGroup> {
        let head = self
            .terminals
            .get(terminal)
            .map(|t| t.pin_groups)
            .unwrap_or_default();
        list::iter(&self.pin_groups, head)
    }

    pub fn pin_geometry_of(&self, pin_group: Handle<PinGeometryGroup>) -> ListIter<'_, GeomRecord> {
        let head = self
            .pin_groups
            .get(pin_group)
            .map(|p| p.geometry)
            .unwrap_or_default();
        list::iter(&self.geoms, head)
    }

    pub fn pin_polygons_of(&self, pin_group: Handle<PinGeometryGroup>) -> ListIter<'_, Polygon> {
        let head = self
            .pin_groups
            .get(pin_group)
            .map(|p| p.polygons)
            .unwrap_or_default();
        list::iter(&self.polygons, head)
    }

    /// Add a rectangle to a pin geometry group.
    pub fn add_pin_geometry(
        &mut self,
        pin_group: Handle<PinGeometryGroup>,
        layer: Handle<Layer>,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        mask: u8,
    ) -> Result<Handle<GeomRecord>, StoreError> {
        self.pin_group(pin_group)?;
        self.layer(layer)?;
        if mask > MAX_MASK {
            return Err(StoreError::MaskOutOfRange {
                mask,
                limit: MAX_MASK,
            });
        }
        let h = self.geoms.allocate_with(|record| {
            record.shape = Shape::Rect(Rect::new(x1, y1, x2, y2));
            record.layer = layer;
            record.mask = mask;
            record.owner = GeomOwner::PinGroup(pin_group);
        });
        self.notify_create(RecordRef::Geom(h));
        self.link_pin_geometry(pin_group, h);
        Ok(h)
    }

    /// Add an octilinear shape to a pin geometry group.
    pub fn add_pin_octagon(
        &mut self,
        pin_group: Handle<PinGeometryGroup>,
        layer: Handle<Layer>,
        octagon: Octagon,
    ) -> Result<Handle<GeomRecord>, StoreError> {
        self.pin_group(pin_group)?;
        self.layer(layer)?;
        let h = self.geoms.allocate_with(|record| {
            record.shape = Shape::Octagon(octagon);
            record.layer = layer;
            record.owner = GeomOwner::PinGroup(pin_group);
        });
        self.notify_create(RecordRef::Geom(h));
        self.link_pin_geometry(pin_group, h);
        Ok(h)
    }

    /// Place a copy of a via's bounding box into a pin geometry group.
    pub fn add_pin_via_copy(
        &mut self,
        pin_group: Handle<PinGeometryGroup>,
        via: Handle<ViaDef>,
        x: i32,
        y: i32,
    ) -> Result<Handle<GeomRecord>, StoreError> {
        self.pin_group(pin_group)?;
        let owner = GeomOwner::PinGroup(pin_group);
        let h = self.create_via_copy(via, owner, x, y)?;
        self.link_pin_geometry(pin_group, h);
        Ok(h)
    }

    fn link_pin_geometry(&mut self, pin_group: Handle<PinGeometryGroup>, h: Handle<GeomRecord>) {
        let head = self
            .pin_groups
            .get(pin_group)
            .map(|p| p.geometry)
            .unwrap_or_default();
        let head = list::push_front(&mut self.geoms, head, h);
        if let Some(p) = self.pin_groups.get_mut(pin_group) {
            p.geometry = head;
        }
    }

    /// Record an access-point reference on a pin group under the given
    /// placement variant, growing the variant list as needed.
    pub fn add_access_point(
        &mut self,
        pin_group: Handle<PinGeometryGroup>,
        variant: usize,
        access_point_id: u32,
    ) -> Result<(), StoreError> {
        let p = self.pin_group_mut(pin_group)?;
        if p.access_points.len() <= variant {
            p.access_points.resize(variant + 1, Vec::new());
        }
        p.access_points[variant].push(access_point_id);
        Ok(())
    }

    // ── Polygons ─────────────────────────────────────────────────────

    /// Create a polygon obstruction on a template, decomposing it into child
    /// rectangles owned by the polygon.
    pub fn create_polygon_obstruction(
        &mut self,
        template: Handle<CellTemplate>,
        layer: Handle<Layer>,
        points: Vec<Point>,
    ) -> Result<Handle<Polygon>, StoreError> {
        self.template(template)?;
        let owner = PolygonOwner::CellTemplate(template);
        let h = self.create_polygon(layer, points, owner)?;
        let head = self.template(template)?.poly_obstructions;
        let head = list::push_front(&mut self.polygons, head, h);
        self.template_mut(template)?.poly_obstructions = head;
        Ok(h)
    }

    /// Create polygon pin geometry under a pin group.
    pub fn create_polygon_pin(
        &mut self,
        pin_group: Handle<PinGeometryGroup>,
        layer: Handle<Layer>,
        points: Vec<Point>,
    ) -> Result<Handle<Polygon>, StoreError> {
        self.pin_group(pin_group)?;
        let owner = PolygonOwner::PinGroup(pin_group);
        let h = self.create_polygon(layer, points, owner)?;
        let head = self.pin_group(pin_group)?.polygons;
        let head = list::push_front(&mut self.polygons, head, h);
        self.pin_group_mut(pin_group)?.polygons = head;
        Ok(h)
    }

    fn create_polygon(
        &mut self,
        layer: Handle<Layer>,
        points: Vec<Point>,
        owner: PolygonOwner,
    ) -> Result<Handle<Polygon>, StoreError> {
        self.layer(layer)?;
        if points.len() < MIN_POLYGON_POINTS {
            return Err(StoreError::PolygonTooFewPoints {
                got: points.len(),
                min: MIN_POLYGON_POINTS,
            });
        }
        let rects = decompose_rectilinear(&points);

        let h = self.polygons.allocate_with(|polygon| {
            polygon.points = points;
            polygon.layer = layer;
            polygon.design_rule_width = -1;
            polygon.owner = owner;
        });
        self.notify_create(RecordRef::Polygon(h));

        // Link decomposed children front-first, then reverse once so the
        // externally observed order is the decomposer's output order.
        let mut head = Handle::none();
        for rect in rects {
            let child = self.geoms.allocate_with(|record| {
                record.shape = Shape::Rect(rect);
                record.layer = layer;
                record.owner = GeomOwner::Polygon(h);
            });
            self.notify_create(RecordRef::Geom(child));
            head = list::push_front(&mut self.geoms, head, child);
        }
        let head = list::reverse(&mut self.geoms, head);
        self.polygon_mut(h)?.boxes = head;
        Ok(h)
    }

    pub fn polygon_boxes_of(&self, polygon: Handle<Polygon>) -> ListIter<'_, GeomRecord> {
        let head = self
            .polygons
            .get(polygon)
            .map(|p| p.boxes)
            .unwrap_or_default();
        list::iter(&self.geoms, head)
    }

    // ── Block terminals and pins ─────────────────────────────────────

    pub fn create_block_terminal(
        &mut self,
        name: &str,
        direction: PinDirection,
    ) -> Result<Handle<BlockTerminal>, StoreError> {
        if self.find_block_terminal(name).is_some() {
            return Err(StoreError::DuplicateName {
                kind: "block terminal",
                name: name.to_string(),
            });
        }
        let h = self.block_terminals.allocate_with(|bterm| {
            bterm.name = name.to_string();
            bterm.direction = direction;
        });
        self.notify_create(RecordRef::BlockTerminal(h));
        Ok(h)
    }

    pub fn find_block_terminal(&self, name: &str) -> Option<Handle<BlockTerminal>> {
        self.block_terminals
            .iter()
            .find(|(_, bterm)| bterm.name == name)
            .map(|(h, _)| h)
    }

    pub fn create_block_pin(
        &mut self,
        terminal: Handle<BlockTerminal>,
    ) -> Result<Handle<BlockPin>, StoreError> {
        self.block_terminal(terminal)?;
        let h = self.block_pins.allocate_with(|pin| {
            pin.terminal = terminal;
            pin.effective_width = -1;
            pin.min_spacing = -1;
        });
        self.notify_create(RecordRef::BlockPin(h));
        let head = self.block_terminal(terminal)?.pins;
        let head = list::push_front(&mut self.block_pins, head, h);
        self.block_terminal_mut(terminal)?.pins = head;
        Ok(h)
    }

    pub fn block_pins_of(&self, terminal: Handle<BlockTerminal>) -> ListIter<'_, BlockPin> {
        let head = self
            .block_terminals
            .get(terminal)
            .map(|t| t.pins)
            .unwrap_or_default();
        list::iter(&self.block_pins, head)
    }

    pub fn block_pin_boxes_of(&self, pin: Handle<BlockPin>) -> ListIter<'_, GeomRecord> {
        let head = self.block_pins.get(pin).map(|p| p.boxes).unwrap_or_default();
        list::iter(&self.geoms, head)
    }

    pub fn set_placement_status(
        &mut self,
        pin: Handle<BlockPin>,
        status: PlacementStatus,
    ) -> Result<(), StoreError> {
        self.block_pin_mut(pin)?.status = status;
        Ok(())
    }

    pub fn set_effective_width(
        &mut self,
        pin: Handle<BlockPin>,
        width: i32,
    ) -> Result<(), StoreError> {
        self.block_pin_mut(pin)?.effective_width = width;
        Ok(())
    }

    pub fn set_min_spacing(&mut self, pin: Handle<BlockPin>, spacing: i32) -> Result<(), StoreError> {
        self.block_pin_mut(pin)?.min_spacing = spacing;
        Ok(())
    }

    /// Add a rectangle to a block pin and register it in the spatial index.
    pub fn add_block_pin_box(
        &mut self,
        pin: Handle<BlockPin>,
        layer: Handle<Layer>,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        mask: u8,
    ) -> Result<Handle<GeomRecord>, StoreError> {
        self.block_pin(pin)?;
        self.layer(layer)?;
        if mask > MAX_MASK {
            return Err(StoreError::MaskOutOfRange {
                mask,
                limit: MAX_MASK,
            });
        }
        let rect = Rect::new(x1, y1, x2, y2);
        let h = self.geoms.allocate_with(|record| {
            record.shape = Shape::Rect(rect);
            record.layer = layer;
            record.mask = mask;
            record.owner = GeomOwner::BlockPin(pin);
        });
        self.notify_create(RecordRef::Geom(h));
        let head = self.block_pin(pin)?.boxes;
        let head = list::push_front(&mut self.geoms, head, h);
        self.block_pin_mut(pin)?.boxes = head;
        if let Some(index) = self.spatial.as_deref_mut() {
            index.index_insert(rect.bbox(), layer, RecordRef::Geom(h));
        }
        Ok(h)
    }

    /// Destroy a block pin, cascading to its boxes and releasing their
    /// spatial-index registrations.
    pub fn destroy_block_pin(&mut self, pin: Handle<BlockPin>) -> Result<(), StoreError> {
        let terminal = self.block_pin(pin)?.terminal;
        if let Some(head) = self.block_terminals.get(terminal).map(|b| b.pins) {
            if let Some(new_head) = list::unlink(&mut self.block_pins, head, pin) {
                if let Some(bterm) = self.block_terminals.get_mut(terminal) {
                    bterm.pins = new_head;
                }
            }
        }
        let boxes = self.block_pin(pin)?.boxes;
        self.free_geom_list(boxes);
        self.notify_destroy(RecordRef::BlockPin(pin));
        self.block_pins.free(pin, "block pin")?;
        Ok(())
    }

    pub fn destroy_block_terminal(&mut self, terminal: Handle<BlockTerminal>) -> Result<(), StoreError> {
        let pins: Vec<_> = self.block_pins_of(terminal).collect();
        for pin in pins {
            self.destroy_block_pin(pin)?;
        }
        self.notify_destroy(RecordRef::BlockTerminal(terminal));
        self.block_terminals.free(terminal, "block terminal")?;
        Ok(())
    }

    // ── Instances ────────────────────────────────────────────────────

    pub fn create_instance(
        &mut self,
        template: Handle<CellTemplate>,
        name: &str,
        location: Point,
    ) -> Result<Handle<Instance>, StoreError> {
        self.template(template)?;
        let h = self.instances.allocate_with(|instance| {
            instance.name = name.to_string();
            instance.template = template;
            instance.location = location;
        });
        self.notify_create(RecordRef::Instance(h));
        Ok(h)
    }

    pub fn destroy_instance(&mut self, h: Handle<Instance>) -> Result<(), StoreError> {
        let halo = self.instance(h)?.halo;
        if halo.is_some() {
            self.notify_destroy(RecordRef::Geom(halo));
            self.geoms.free(halo, "geometry")?;
        }
        self.notify_destroy(RecordRef::Instance(h));
        self.instances.free(h, "instance")?;
        Ok(())
    }

    /// Attach a placement halo box to an instance; one per instance.
    pub fn set_instance_halo(
        &mut self,
        instance: Handle<Instance>,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
    ) -> Result<Handle<GeomRecord>, StoreError> {
        let inst = self.instance(instance)?;
        if inst.halo.is_some() {
            return Err(StoreError::HaloAlreadySet {
                name: inst.name.clone(),
            });
        }
        let h = self.geoms.allocate_with(|record| {
            record.shape = Shape::Rect(Rect::new(x1, y1, x2, y2));
            record.owner = GeomOwner::Instance(instance);
        });
        self.notify_create(RecordRef::Geom(h));
        self.instance_mut(instance)?.halo = h;
        Ok(h)
    }

    // ── Shared geometry operations ───────────────────────────────────

    /// Bounding box of any geometry record, independent of shape variant.
    pub fn geom_bounding_box(&self, h: Handle<GeomRecord>) -> Result<BBox, StoreError> {
        Ok(self.geom(h)?.bounding_box())
    }

    pub fn set_geom_mask(&mut self, h: Handle<GeomRecord>, mask: u8) -> Result<(), StoreError> {
        self.geom_mut(h)?.set_mask(mask)
    }

    pub fn set_design_rule_width(
        &mut self,
        h: Handle<GeomRecord>,
        width: i32,
    ) -> Result<(), StoreError> {
        self.geom_mut(h)?.design_rule_width = width;
        Ok(())
    }

    /// Resolve a geometry record's owner tag + handle against the correct
    /// parent table, returning a typed reference.
    pub fn resolve_owner(&self, h: Handle<GeomRecord>) -> Result<RecordRef, StoreError> {
        let record = self.geom(h)?;
        let mismatch = |detail: String| StoreError::OwnerMismatch {
            kind: "geometry",
            raw: h.raw(),
            detail,
        };
        match record.owner {
            GeomOwner::Unknown => Err(mismatch("record is detached (unknown owner)".into())),
            GeomOwner::CellTemplate(p) => self
                .templates
                .get(p)
                .map(|_| RecordRef::Template(p))
                .ok_or_else(|| mismatch(format!("cell template {} not live", p.raw()))),
            GeomOwner::PinGroup(p) => self
                .pin_groups
                .get(p)
                .map(|_| RecordRef::PinGroup(p))
                .ok_or_else(|| mismatch(format!("pin group {} not live", p.raw()))),
            GeomOwner::Polygon(p) => self
                .polygons
                .get(p)
                .map(|_| RecordRef::Polygon(p))
                .ok_or_else(|| mismatch(format!("polygon {} not live", p.raw()))),
            GeomOwner::BlockPin(p) => self
                .block_pins
                .get(p)
                .map(|_| RecordRef::BlockPin(p))
                .ok_or_else(|| mismatch(format!("block pin {} not live", p.raw()))),
            GeomOwner::Via(p) => self
                .vias
                .get(p)
                .map(|_| RecordRef::Via(p))
                .ok_or_else(|| mismatch(format!("via {} not live", p.raw()))),
            GeomOwner::Instance(p) => self
                .instances
                .get(p)
                .map(|_| RecordRef::Instance(p))
                .ok_or_else(|| mismatch(format!("instance {} not live", p.raw()))),
        }
    }

    /// Destroy one geometry record: unlink from its owner's child list,
    /// release any spatial registration, then free the slot.
    pub fn destroy_geom(&mut self, h: Handle<GeomRecord>) -> Result<(), StoreError> {
        let record = self.geom(h)?;
        let owner = record.owner;
        let bbox = record.bounding_box();
        match owner {
            GeomOwner::Unknown => {}
            GeomOwner::CellTemplate(p) => {
                if let Some(head) = self.templates.get(p).map(|t| t.obstructions) {
                    if let Some(new_head) = list::unlink(&mut self.geoms, head, h) {
                        if let Some(t) = self.templates.get_mut(p) {
                            t.obstructions = new_head;
                        }
                    }
                }
            }
            GeomOwner::PinGroup(p) => {
                if let Some(head) = self.pin_groups.get(p).map(|g| g.geometry) {
                    if let Some(new_head) = list::unlink(&mut self.geoms, head, h) {
                        if let Some(group) = self.pin_groups.get_mut(p) {
                            group.geometry = new_head;
                        }
                    }
                }
            }
            GeomOwner::Polygon(p) => {
                if let Some(head) = self.polygons.get(p).map(|poly| poly.boxes) {
                    if let Some(new_head) = list::unlink(&mut self.geoms, head, h) {
                        if let Some(polygon) = self.polygons.get_mut(p) {
                            polygon.boxes = new_head;
                        }
                    }
                }
            }
            GeomOwner::BlockPin(p) => {
                if let Some(head) = self.block_pins.get(p).map(|pin| pin.boxes) {
                    if let Some(new_head) = list::unlink(&mut self.geoms, head, h) {
                        if let Some(pin) = self.block_pins.get_mut(p) {
                            pin.boxes = new_head;
                        }
                    }
                }
                if let Some(index) = self.spatial.as_deref_mut() {
                    index.index_remove(bbox, RecordRef::Geom(h));
                }
            }
            GeomOwner::Via(p) => {
                if let Some(head) = self.vias.get(p).map(|v| v.boxes) {
                    if let Some(new_head) = list::unlink(&mut self.geoms, head, h) {
                        if let Some(via) = self.vias.get_mut(p) {
                            via.boxes = new_head;
                        }
                    }
                }
            }
            GeomOwner::Instance(p) => {
                if let Some(instance) = self.instances.get_mut(p) {
                    if instance.halo == h {
                        instance.halo = Handle::none();
                    }
                }
            }
        }
        self.notify_destroy(RecordRef::Geom(h));
        self.geoms.free(h, "geometry")?;
        Ok(())
    }

    // ── Internal helpers ─────────────────────────────────────────────

    fn create_via_copy(
        &mut self,
        via: Handle<ViaDef>,
        owner: GeomOwner,
        x: i32,
        y: i32,
    ) -> Result<Handle<GeomRecord>, StoreError> {
        let def = self.via(via)?;
        let bbox = def.bbox.ok_or_else(|| StoreError::ViaHasNoGeometry {
            name: def.name.clone(),
        })?;
        if via.raw() > MAX_VIA_HANDLE {
            return Err(StoreError::ViaIdTooLarge {
                name: def.name.clone(),
                index: via.raw(),
                limit: MAX_VIA_HANDLE,
            });
        }
        let placed = bbox.translate(x, y);
        let h = self.geoms.allocate_with(|record| {
            record.shape = Shape::Rect(Rect::new(
                placed.min.x,
                placed.min.y,
                placed.max.x,
                placed.max.y,
            ));
            record.via = via;
            record.owner = owner;
        });
        self.notify_create(RecordRef::Geom(h));
        Ok(h)
    }

    /// Free every record on a geometry list, releasing spatial registrations
    /// for records that had them.
    fn free_geom_list(&mut self, head: Handle<GeomRecord>) {
        let handles: Vec<_> = list::iter(&self.geoms, head).collect();
        for h in handles {
            if let Some(record) = self.geoms.get(h) {
                if matches!(record.owner, GeomOwner::BlockPin(_)) {
                    let bbox = record.bounding_box();
                    if let Some(index) = self.spatial.as_deref_mut() {
                        index.index_remove(bbox, RecordRef::Geom(h));
                    }
                }
            }
            self.notify_destroy(RecordRef::Geom(h));
            let _ = self.geoms.free(h, "geometry");
        }
    }

    fn destroy_terminal_contents(&mut self, terminal: Handle<Terminal>) {
        let groups: Vec<_> = self.pin_groups_of(terminal).collect();
        for group in groups {
            let geometry = self
                .pin_groups
                .get(group)
                .map(|p| p.geometry)
                .unwrap_or_default();
            self.free_geom_list(geometry);
            let polys: Vec<_> = self.pin_polygons_of(group).collect();
            for polygon in polys {
                self.destroy_polygon_contents(polygon);
            }
            self.notify_destroy(RecordRef::PinGroup(group));
            let _ = self.pin_groups.free(group, "pin group");
        }
        self.notify_destroy(RecordRef::Terminal(terminal));
        let _ = self.terminals.free(terminal, "terminal");
    }

    fn destroy_polygon_contents(&mut self, polygon: Handle<Polygon>) {
        let boxes = self
            .polygons
            .get(polygon)
            .map(|p| p.boxes)
            .unwrap_or_default();
        self.free_geom_list(boxes);
        self.notify_destroy(RecordRef::Polygon(polygon));
        let _ = self.polygons.free(polygon, "polygon");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::RTreeIndex;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store_with_layers() -> (LayoutStore, Handle<Layer>, Handle<Layer>) {
        let mut store = LayoutStore::new("test");
        let m1 = store.add_layer("metal1", 1).unwrap();
        let m2 = store.add_layer("metal2", 2).unwrap();
        (store, m1, m2)
    }

    #[test]
    fn test_template_id_counter_is_monotonic() {
        let mut store = LayoutStore::new("lib");
        let a = store.create_template("A").unwrap();
        let b = store.create_template("B").unwrap();
        assert_eq!(store.templates.get(a).unwrap().template_id, 1);
        assert_eq!(store.templates.get(b).unwrap().template_id, 2);
        store.destroy_template(a).unwrap();
        let c = store.create_template("C").unwrap();
        // Ids are never reused, even when slots are.
        assert_eq!(store.templates.get(c).unwrap().template_id, 3);
    }

    #[test]
    fn test_duplicate_template_name_rejected() {
        let mut store = LayoutStore::new("lib");
        store.create_template("INV").unwrap();
        assert!(matches!(
            store.create_template("INV"),
            Err(StoreError::DuplicateName { kind: "cell template", .. })
        ));
    }

    #[test]
    fn test_freeze_assigns_creation_order_indices() {
        let (mut store, _, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let a = store.create_terminal(tpl, "A", PinDirection::Input).unwrap();
        let y = store.create_terminal(tpl, "Y", PinDirection::Output).unwrap();
        let vdd = store.create_terminal(tpl, "VDD", PinDirection::Power).unwrap();

        assert!(matches!(
            store.terminal_order_index(a),
            Err(StoreError::TemplateNotFrozen { .. })
        ));

        store.freeze_template(tpl).unwrap();
        assert_eq!(store.terminal_order_index(a).unwrap(), 0);
        assert_eq!(store.terminal_order_index(y).unwrap(), 1);
        assert_eq!(store.terminal_order_index(vdd).unwrap(), 2);

        // Iteration now follows creation order.
        let names: Vec<String> = store
            .terminals_of(tpl)
            .map(|h| store.terminals.get(h).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["A", "Y", "VDD"]);

        // Frozen templates accept no further terminals.
        assert!(matches!(
            store.create_terminal(tpl, "GND", PinDirection::Ground),
            Err(StoreError::TemplateFrozen { .. })
        ));
        // Re-freezing is a no-op.
        store.freeze_template(tpl).unwrap();
        assert_eq!(store.terminal_order_index(a).unwrap(), 0);
    }

    #[test]
    fn test_owner_dispatch_totality() {
        let (mut store, m1, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let term = store.create_terminal(tpl, "A", PinDirection::Input).unwrap();
        let pin = store.create_pin_group(term).unwrap();
        let g = store.add_pin_geometry(pin, m1, 0, 0, 100, 100, 0).unwrap();

        let owner = store.resolve_owner(g).unwrap();
        assert_eq!(owner, RecordRef::PinGroup(pin));
        // The owner's child list contains the record.
        assert!(store.pin_geometry_of(pin).any(|h| h == g));

        let obs = store.add_obstruction(tpl, m1, 0, 0, 10, 10).unwrap();
        assert_eq!(store.resolve_owner(obs).unwrap(), RecordRef::Template(tpl));
        assert!(store.template_obstructions(tpl).any(|h| h == obs));
    }

    #[test]
    fn test_detached_record_owner_is_reported() {
        let mut store = LayoutStore::new("lib");
        let h = store.geoms.allocate();
        assert!(matches!(
            store.resolve_owner(h),
            Err(StoreError::OwnerMismatch { .. })
        ));
    }

    #[test]
    fn test_mask_precondition_through_store() {
        let (mut store, m1, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let term = store.create_terminal(tpl, "A", PinDirection::Input).unwrap();
        let pin = store.create_pin_group(term).unwrap();

        // Mask on a layered record is fine.
        let g = store.add_pin_geometry(pin, m1, 0, 0, 5, 5, 0).unwrap();
        store.set_geom_mask(g, 2).unwrap();
        assert_eq!(store.geoms.get(g).unwrap().mask, 2);

        // Mask on a layer-less record (via copy with no layer) is refused.
        let via = store.create_via("V12").unwrap();
        store.add_via_box(via, m1, 0, 0, 10, 10).unwrap();
        let copy = store.add_pin_via_copy(pin, via, 0, 0).unwrap();
        assert_eq!(store.set_geom_mask(copy, 2), Err(StoreError::MaskWithoutLayer));
    }

    #[test]
    fn test_via_running_bbox_and_layer_bounds() {
        let (mut store, m1, m2) = store_with_layers();
        let m3 = store.add_layer("metal3", 3).unwrap();
        let via = store.create_via("V23").unwrap();

        store.add_via_box(via, m2, 0, 0, 10, 10).unwrap();
        let def = store.vias.get(via).unwrap();
        assert_eq!(def.top, m2);
        assert_eq!(def.bottom, m2);
        assert_eq!(def.bbox.unwrap().max, Point::new(10, 10));

        store.add_via_box(via, m3, -5, 2, 8, 20).unwrap();
        store.add_via_box(via, m1, 0, -4, 6, 6).unwrap();
        let def = store.vias.get(via).unwrap();
        assert_eq!(def.top, m3);
        assert_eq!(def.bottom, m1);
        let bb = def.bbox.unwrap();
        assert_eq!(bb.min, Point::new(-5, -4));
        assert_eq!(bb.max, Point::new(10, 20));
        assert_eq!(list::count(&store.geoms, def.boxes), 3);
    }

    #[test]
    fn test_via_copy_requires_member_geometry() {
        let (mut store, _, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let via = store.create_via("V0").unwrap();
        assert!(matches!(
            store.add_template_via_copy(tpl, via, 0, 0),
            Err(StoreError::ViaHasNoGeometry { .. })
        ));
    }

    #[test]
    fn test_via_copy_translates_bbox_and_stamps_via() {
        let (mut store, m1, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let via = store.create_via("V1").unwrap();
        store.add_via_box(via, m1, 0, 0, 10, 10).unwrap();

        let copy = store.add_template_via_copy(tpl, via, 100, 200).unwrap();
        let record = store.geoms.get(copy).unwrap();
        assert!(record.is_via_copy());
        assert_eq!(record.via, via);
        let bb = record.bounding_box();
        assert_eq!(bb.min, Point::new(100, 200));
        assert_eq!(bb.max, Point::new(110, 210));
    }

    #[test]
    fn test_polygon_too_few_points_not_created() {
        let (mut store, m1, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let points = vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10)];
        assert_eq!(
            store.create_polygon_obstruction(tpl, m1, points),
            Err(StoreError::PolygonTooFewPoints { got: 3, min: 4 })
        );
        assert!(store.polygons.is_empty());
        assert!(store.geoms.is_empty());
    }

    #[test]
    fn test_polygon_children_iterate_in_decomposition_order() {
        let (mut store, m1, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let points = vec![
            Point::new(0, 0),
            Point::new(40, 0),
            Point::new(40, 10),
            Point::new(20, 10),
            Point::new(20, 30),
            Point::new(0, 30),
        ];
        let expected = decompose_rectilinear(&points);
        let poly = store
            .create_polygon_obstruction(tpl, m1, points)
            .unwrap();

        let got: Vec<Rect> = store
            .polygon_boxes_of(poly)
            .map(|h| match store.geoms.get(h).unwrap().shape {
                Shape::Rect(r) => r,
                Shape::Octagon(_) => unreachable!(),
            })
            .collect();
        assert_eq!(got, expected);

        // Every child resolves back to the polygon.
        for h in store.polygon_boxes_of(poly) {
            assert_eq!(store.resolve_owner(h).unwrap(), RecordRef::Polygon(poly));
        }
    }

    #[test]
    fn test_template_destroy_blocked_by_instances() {
        let (mut store, _, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let inst = store
            .create_instance(tpl, "u0", Point::new(0, 0))
            .unwrap();
        assert!(matches!(
            store.destroy_template(tpl),
            Err(StoreError::TemplateHasInstances { instances: 1, .. })
        ));
        store.destroy_instance(inst).unwrap();
        store.destroy_template(tpl).unwrap();
        assert!(store.templates.get(tpl).is_none());
    }

    #[test]
    fn test_template_destroy_cascades() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut store, m1, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let term = store.create_terminal(tpl, "A", PinDirection::Input).unwrap();
        let pin = store.create_pin_group(term).unwrap();
        store.add_pin_geometry(pin, m1, 0, 0, 5, 5, 0).unwrap();
        store.add_obstruction(tpl, m1, 0, 0, 2, 2).unwrap();
        store
            .create_polygon_obstruction(
                tpl,
                m1,
                vec![
                    Point::new(0, 0),
                    Point::new(10, 0),
                    Point::new(10, 10),
                    Point::new(0, 10),
                ],
            )
            .unwrap();

        store.destroy_template(tpl).unwrap();
        assert!(store.templates.is_empty());
        assert!(store.terminals.is_empty());
        assert!(store.pin_groups.is_empty());
        assert!(store.polygons.is_empty());
        assert!(store.geoms.is_empty());
    }

    #[test]
    fn test_block_pin_cascade_releases_spatial_index() {
        let (mut store, m1, _) = store_with_layers();
        store.set_spatial_index(Box::new(RTreeIndex::new()));
        let bterm = store
            .create_block_terminal("clk", PinDirection::Input)
            .unwrap();
        let pin = store.create_block_pin(bterm).unwrap();
        store.add_block_pin_box(pin, m1, 0, 0, 50, 50, 0).unwrap();
        store.add_block_pin_box(pin, m1, 100, 0, 150, 50, 0).unwrap();

        let window = BBox::new(Point::new(-10, -10), Point::new(200, 60));
        assert_eq!(store.spatial_index().unwrap().index_query(window, None).len(), 2);

        store.destroy_block_pin(pin).unwrap();
        assert!(store.spatial_index().unwrap().index_query(window, None).is_empty());
        assert!(store.block_pins.is_empty());
        assert!(store.geoms.is_empty());
        // The terminal survives its pin.
        assert!(store.block_terminals.get(bterm).is_some());
    }

    #[test]
    fn test_spatial_index_attached_late_sees_existing_boxes() {
        let (mut store, m1, _) = store_with_layers();
        let bterm = store
            .create_block_terminal("clk", PinDirection::Input)
            .unwrap();
        let pin = store.create_block_pin(bterm).unwrap();
        store.add_block_pin_box(pin, m1, 0, 0, 50, 50, 0).unwrap();
        store.add_block_pin_box(pin, m1, 100, 0, 150, 50, 0).unwrap();

        // Attaching after the boxes exist seeds the index with them.
        store.set_spatial_index(Box::new(RTreeIndex::new()));
        let window = BBox::new(Point::new(-10, -10), Point::new(200, 60));
        assert_eq!(store.spatial_index().unwrap().index_query(window, None).len(), 2);
    }

    #[test]
    fn test_debug_renders_identity_and_census() {
        let (mut store, _, _) = store_with_layers();
        store.set_spatial_index(Box::new(RTreeIndex::new()));
        let dump = format!("{:?}", store);
        assert!(dump.contains("name: \"test\""));
        assert!(dump.contains("layers: 2"));
        assert!(dump.contains("spatial: true"));
    }

    #[test]
    fn test_destroy_geom_unlinks_from_owner_list() {
        let (mut store, m1, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let a = store.add_obstruction(tpl, m1, 0, 0, 1, 1).unwrap();
        let b = store.add_obstruction(tpl, m1, 1, 1, 2, 2).unwrap();
        let c = store.add_obstruction(tpl, m1, 2, 2, 3, 3).unwrap();

        store.destroy_geom(b).unwrap();
        let remaining: Vec<_> = store.template_obstructions(tpl).collect();
        assert_eq!(remaining, vec![c, a]);
        assert!(store.geoms.get(b).is_none());
    }

    #[test]
    fn test_instance_halo() {
        let (mut store, _, _) = store_with_layers();
        let tpl = store.create_template("INV").unwrap();
        let inst = store.create_instance(tpl, "u0", Point::new(5, 5)).unwrap();
        let halo = store.set_instance_halo(inst, -10, -10, 20, 20).unwrap();
        assert_eq!(store.resolve_owner(halo).unwrap(), RecordRef::Instance(inst));
        assert!(matches!(
            store.set_instance_halo(inst, 0, 0, 1, 1),
            Err(StoreError::HaloAlreadySet { .. })
        ));
        store.destroy_instance(inst).unwrap();
        assert!(store.geoms.is_empty());
    }

    #[test]
    fn test_block_pin_status_and_rule_overrides() {
        let (mut store, _, _) = store_with_layers();
        let bterm = store
            .create_block_terminal("vdd", PinDirection::Power)
            .unwrap();
        let pin = store.create_block_pin(bterm).unwrap();

        let p = store.block_pins.get(pin).unwrap();
        assert!(!p.status.is_placed());
        assert!(!p.has_effective_width());
        assert!(!p.has_min_spacing());

        store.set_placement_status(pin, PlacementStatus::Locked).unwrap();
        store.set_effective_width(pin, 340).unwrap();
        store.set_min_spacing(pin, 80).unwrap();

        let p = store.block_pins.get(pin).unwrap();
        assert!(p.status.is_placed());
        assert_eq!(p.effective_width, 340);
        assert_eq!(p.min_spacing, 80);
    }

    #[derive(Default)]
    struct CountingObserver {
        created: Rc<RefCell<Vec<RecordRef>>>,
        destroyed: Rc<RefCell<Vec<RecordRef>>>,
    }

    impl ChangeObserver for CountingObserver {
        fn on_create(&mut self, record: RecordRef) {
            self.created.borrow_mut().push(record);
        }

        fn on_destroy(&mut self, record: RecordRef) {
            self.destroyed.borrow_mut().push(record);
        }
    }

    #[test]
    fn test_observer_sees_create_and_destroy() {
        let (mut store, m1, _) = store_with_layers();
        let created = Rc::new(RefCell::new(Vec::new()));
        let destroyed = Rc::new(RefCell::new(Vec::new()));
        store.attach_observer(Box::new(CountingObserver {
            created: created.clone(),
            destroyed: destroyed.clone(),
        }));

        let bterm = store
            .create_block_terminal("rst", PinDirection::Input)
            .unwrap();
        let pin = store.create_block_pin(bterm).unwrap();
        let g = store.add_block_pin_box(pin, m1, 0, 0, 4, 4, 0).unwrap();
        assert_eq!(
            *created.borrow(),
            vec![
                RecordRef::BlockTerminal(bterm),
                RecordRef::BlockPin(pin),
                RecordRef::Geom(g),
            ]
        );

        store.destroy_block_pin(pin).unwrap();
        assert_eq!(
            *destroyed.borrow(),
            vec![RecordRef::Geom(g), RecordRef::BlockPin(pin)]
        );
    }

    #[test]
    fn test_meta_json_roundtrip() {
        let (mut store, _, _) = store_with_layers();
        store.create_template("INV").unwrap();
        let meta = store.meta();
        let json = meta.to_json().unwrap();
        let parsed = StoreMeta::from_json(&json).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(parsed.templates, 1);
        assert_eq!(parsed.layers, 2);
    }
}
