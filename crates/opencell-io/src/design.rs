//! The binary design-file codec.
//!
//! Layout: magic, schema version, then every object table in a fixed order
//! (slot count, then per slot a live flag and the record body), then store
//! identity. Freelist holes are written as dead slots, so handles — including
//! the intrusive next-sibling links stored inside records — survive a
//! write/read cycle verbatim and `read(write(store))` reproduces the store
//! exactly, slot for slot.
//!
//! Writers always emit the current schema. Readers accept every schema back
//! to [`SCHEMA_BASE`]; the version only ever gated the geometry flags word,
//! whose three historical layouts each get their own decoder below.

use std::io::{Read, Write};

use thiserror::Error;
use uuid::Uuid;

use opencell_core::block::{BlockPin, BlockTerminal, PlacementStatus};
use opencell_core::cell::{
    CellTemplate, Instance, PinDirection, PinGeometryGroup, Polygon, PolygonOwner, TemplateKind,
    Terminal,
};
use opencell_core::geom::{GeomOwner, GeomRecord, MAX_LAYER_HANDLE, MAX_MASK, MAX_VIA_HANDLE};
use opencell_core::{Handle, Layer, LayoutStore, Octagon, Rect, Shape, Table, ViaDef};

use crate::stream::{StreamReader, StreamWriter};

pub const MAGIC: [u8; 4] = *b"OCDB";

/// First released schema: 8-bit layer field, 14-bit via field, no mask, no
/// design-rule width.
pub const SCHEMA_BASE: u32 = 1;
/// Widened the layer field to 9 bits and added the trailing design-rule
/// width; the via field shrank to 13 bits.
pub const SCHEMA_DESIGN_RULE_WIDTH: u32 = 2;
/// Added the 2-bit mask field; the via field shrank to 12 bits.
pub const SCHEMA_GEOM_MASK: u32 = 3;
pub const SCHEMA_CURRENT: u32 = SCHEMA_GEOM_MASK;

/// Slot and element counts come from untrusted streams; preallocation is
/// capped so a corrupt count cannot exhaust memory before decoding fails.
const PREALLOC_LIMIT: usize = 4096;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a design file (bad magic {found:02x?})")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported schema version {found} (supported: {min}..={max})")]
    UnsupportedSchema { found: u32, min: u32, max: u32 },

    #[error("{field} value {value} does not fit its packed field (limit {limit})")]
    FieldTooWide {
        field: &'static str,
        value: u32,
        limit: u32,
    },

    #[error("corrupt design file: {0}")]
    Corrupt(String),
}

// ── Top level ────────────────────────────────────────────────────────

/// Serialize a store to a byte stream in the current schema.
pub fn write_design<W: Write>(store: &LayoutStore, out: W) -> Result<(), CodecError> {
    let mut w = StreamWriter::new(out);
    w.write_bytes(&MAGIC)?;
    w.write_u32(SCHEMA_CURRENT)?;

    write_table(&mut w, &store.layers, encode_layer)?;
    write_table(&mut w, &store.vias, encode_via)?;
    write_table(&mut w, &store.templates, encode_template)?;
    write_table(&mut w, &store.terminals, encode_terminal)?;
    write_table(&mut w, &store.pin_groups, encode_pin_group)?;
    write_table(&mut w, &store.polygons, encode_polygon)?;
    write_table(&mut w, &store.geoms, encode_geom)?;
    write_table(&mut w, &store.block_terminals, encode_block_terminal)?;
    write_table(&mut w, &store.block_pins, encode_block_pin)?;
    write_table(&mut w, &store.instances, encode_instance)?;

    w.write_string(&store.name)?;
    w.write_bytes(store.id.as_bytes())?;
    w.write_u32(store.template_id_counter())?;
    w.flush()?;
    log::info!(
        "wrote design '{}' (schema {}, {} geometry record(s))",
        store.name,
        SCHEMA_CURRENT,
        store.geoms.len()
    );
    Ok(())
}

/// Deserialize a store from a byte stream, accepting any supported schema.
pub fn read_design<R: Read>(input: R) -> Result<LayoutStore, CodecError> {
    let mut r = StreamReader::new(input);
    let mut magic = [0u8; 4];
    r.read_bytes(&mut magic)?;
    if magic != MAGIC {
        return Err(CodecError::BadMagic { found: magic });
    }
    let schema = r.read_u32()?;
    if !(SCHEMA_BASE..=SCHEMA_CURRENT).contains(&schema) {
        return Err(CodecError::UnsupportedSchema {
            found: schema,
            min: SCHEMA_BASE,
            max: SCHEMA_CURRENT,
        });
    }

    let layers = read_table(&mut r, decode_layer)?;
    let vias = read_table(&mut r, decode_via)?;
    let templates = read_table(&mut r, decode_template)?;
    let terminals = read_table(&mut r, decode_terminal)?;
    let pin_groups = read_table(&mut r, decode_pin_group)?;
    let polygons = read_table(&mut r, decode_polygon)?;
    let geoms = read_table(&mut r, |r| decode_geom(r, schema))?;
    let block_terminals = read_table(&mut r, decode_block_terminal)?;
    let block_pins = read_table(&mut r, decode_block_pin)?;
    let instances = read_table(&mut r, decode_instance)?;

    let name = r.read_string()?;
    let mut id = [0u8; 16];
    r.read_bytes(&mut id)?;
    let counter = r.read_u32()?;

    let mut store = LayoutStore::new(&name);
    store.id = Uuid::from_bytes(id);
    store.layers = layers;
    store.vias = vias;
    store.templates = templates;
    store.terminals = terminals;
    store.pin_groups = pin_groups;
    store.polygons = polygons;
    store.geoms = geoms;
    store.block_terminals = block_terminals;
    store.block_pins = block_pins;
    store.instances = instances;
    store.set_template_id_counter(counter);
    log::info!(
        "read design '{}' (schema {}, {} geometry record(s))",
        store.name,
        schema,
        store.geoms.len()
    );
    Ok(store)
}

// ── Table framing ────────────────────────────────────────────────────

fn write_table<W, T, F>(
    w: &mut StreamWriter<W>,
    table: &Table<T>,
    mut encode: F,
) -> Result<(), CodecError>
where
    W: Write,
    T: Default,
    F: FnMut(&mut StreamWriter<W>, &T) -> Result<(), CodecError>,
{
    w.write_u32(table.slot_count() as u32)?;
    for slot in table.raw_slots() {
        match slot {
            Some(record) => {
                w.write_u8(1)?;
                encode(w, record)?;
            }
            None => w.write_u8(0)?,
        }
    }
    Ok(())
}

fn read_table<R, T, F>(r: &mut StreamReader<R>, mut decode: F) -> Result<Table<T>, CodecError>
where
    R: Read,
    T: Default,
    F: FnMut(&mut StreamReader<R>) -> Result<T, CodecError>,
{
    let count = r.read_u32()? as usize;
    let mut slots = Vec::with_capacity(count.min(PREALLOC_LIMIT));
    for _ in 0..count {
        if r.read_u8()? != 0 {
            slots.push(Some(decode(r)?));
        } else {
            slots.push(None);
        }
    }
    Ok(Table::from_slots(slots))
}

// ── Geometry flags word ──────────────────────────────────────────────
//
// Common to all schemas: bits [0..4) owner tag, bit 4 octilinear, bit 5
// via-copy, bit 6 visited. The layer / mask / via fields above bit 7 moved
// between schemas.

struct RawFlags {
    owner_tag: u8,
    octilinear: bool,
    visited: bool,
    layer: u32,
    mask: u8,
    via: u32,
    has_design_rule_width: bool,
}

fn decode_flags_v1(word: u32) -> RawFlags {
    RawFlags {
        owner_tag: (word & 0xF) as u8,
        octilinear: word & (1 << 4) != 0,
        visited: word & (1 << 6) != 0,
        layer: (word >> 7) & 0xFF,
        mask: 0,
        via: (word >> 15) & 0x3FFF,
        has_design_rule_width: false,
    }
}

fn decode_flags_v2(word: u32) -> RawFlags {
    RawFlags {
        owner_tag: (word & 0xF) as u8,
        octilinear: word & (1 << 4) != 0,
        visited: word & (1 << 6) != 0,
        layer: (word >> 7) & 0x1FF,
        mask: 0,
        via: (word >> 16) & 0x1FFF,
        has_design_rule_width: true,
    }
}

fn decode_flags_v3(word: u32) -> RawFlags {
    RawFlags {
        owner_tag: (word & 0xF) as u8,
        octilinear: word & (1 << 4) != 0,
        visited: word & (1 << 6) != 0,
        layer: (word >> 7) & 0x1FF,
        mask: ((word >> 16) & 0x3) as u8,
        via: (word >> 18) & 0xFFF,
        has_design_rule_width: true,
    }
}

fn encode_flags(record: &GeomRecord) -> Result<u32, CodecError> {
    let layer = record.layer.raw();
    if layer > MAX_LAYER_HANDLE {
        return Err(CodecError::FieldTooWide {
            field: "layer handle",
            value: layer,
            limit: MAX_LAYER_HANDLE,
        });
    }
    let via = record.via.raw();
    if via > MAX_VIA_HANDLE {
        return Err(CodecError::FieldTooWide {
            field: "via handle",
            value: via,
            limit: MAX_VIA_HANDLE,
        });
    }
    if record.mask > MAX_MASK {
        return Err(CodecError::FieldTooWide {
            field: "mask",
            value: record.mask as u32,
            limit: MAX_MASK as u32,
        });
    }
    let mut word = record.owner.tag() as u32;
    if record.shape.is_octilinear() {
        word |= 1 << 4;
    }
    if record.via.is_some() {
        word |= 1 << 5;
    }
    if record.visited {
        word |= 1 << 6;
    }
    word |= layer << 7;
    word |= (record.mask as u32) << 16;
    word |= via << 18;
    Ok(word)
}

// ── Record bodies ────────────────────────────────────────────────────

fn encode_geom<W: Write>(w: &mut StreamWriter<W>, record: &GeomRecord) -> Result<(), CodecError> {
    w.write_u32(encode_flags(record)?)?;
    match record.shape {
        Shape::Rect(r) => {
            let bb = r.bbox();
            w.write_point(bb.min)?;
            w.write_point(bb.max)?;
        }
        Shape::Octagon(o) => {
            w.write_point(o.center_low)?;
            w.write_point(o.center_high)?;
            w.write_i32(o.half_width)?;
        }
    }
    w.write_u32(record.owner.raw_handle())?;
    w.write_i32(record.design_rule_width)?;
    w.write_handle(record.next)?;
    Ok(())
}

fn decode_geom<R: Read>(r: &mut StreamReader<R>, schema: u32) -> Result<GeomRecord, CodecError> {
    let word = r.read_u32()?;
    let flags = match schema {
        SCHEMA_BASE => decode_flags_v1(word),
        SCHEMA_DESIGN_RULE_WIDTH => decode_flags_v2(word),
        _ => decode_flags_v3(word),
    };
    let shape = if flags.octilinear {
        let center_low = r.read_point()?;
        let center_high = r.read_point()?;
        let half_width = r.read_i32()?;
        Shape::Octagon(Octagon {
            center_low,
            center_high,
            half_width,
        })
    } else {
        let min = r.read_point()?;
        let max = r.read_point()?;
        Shape::Rect(Rect::new(min.x, min.y, max.x, max.y))
    };
    let owner_raw = r.read_u32()?;
    let owner = GeomOwner::from_parts(flags.owner_tag, owner_raw).ok_or_else(|| {
        CodecError::Corrupt(format!(
            "geometry owner tag {} with handle {} does not name a parent",
            flags.owner_tag, owner_raw
        ))
    })?;
    let design_rule_width = if flags.has_design_rule_width {
        r.read_i32()?
    } else {
        -1
    };
    let next = r.read_handle()?;
    Ok(GeomRecord {
        shape,
        layer: Handle::from_raw(flags.layer),
        mask: flags.mask,
        via: Handle::from_raw(flags.via),
        owner,
        next,
        design_rule_width,
        visited: flags.visited,
    })
}

fn encode_layer<W: Write>(w: &mut StreamWriter<W>, layer: &Layer) -> Result<(), CodecError> {
    w.write_string(&layer.name)?;
    w.write_i32(layer.number)?;
    Ok(())
}

fn decode_layer<R: Read>(r: &mut StreamReader<R>) -> Result<Layer, CodecError> {
    Ok(Layer {
        name: r.read_string()?,
        number: r.read_i32()?,
    })
}

fn encode_via<W: Write>(w: &mut StreamWriter<W>, via: &ViaDef) -> Result<(), CodecError> {
    w.write_string(&via.name)?;
    match via.bbox {
        Some(bb) => {
            w.write_bool(true)?;
            w.write_point(bb.min)?;
            w.write_point(bb.max)?;
        }
        None => w.write_bool(false)?,
    }
    w.write_handle(via.top)?;
    w.write_handle(via.bottom)?;
    w.write_handle(via.boxes)?;
    Ok(())
}

fn decode_via<R: Read>(r: &mut StreamReader<R>) -> Result<ViaDef, CodecError> {
    let name = r.read_string()?;
    let bbox = if r.read_bool()? {
        let min = r.read_point()?;
        let max = r.read_point()?;
        Some(opencell_core::BBox::new(min, max))
    } else {
        None
    };
    Ok(ViaDef {
        name,
        bbox,
        top: r.read_handle()?,
        bottom: r.read_handle()?,
        boxes: r.read_handle()?,
    })
}

fn encode_template<W: Write>(
    w: &mut StreamWriter<W>,
    template: &CellTemplate,
) -> Result<(), CodecError> {
    w.write_string(&template.name)?;
    w.write_u32(template.template_id)?;
    w.write_i32(template.width)?;
    w.write_i32(template.height)?;
    w.write_point(template.origin)?;
    w.write_u8(template_kind_code(template.kind))?;
    w.write_bool(template.frozen)?;
    w.write_bool(template.symmetry_x)?;
    w.write_bool(template.symmetry_y)?;
    w.write_bool(template.symmetry_r90)?;
    w.write_handle(template.terminals)?;
    w.write_u32(template.terminal_count)?;
    w.write_handle(template.obstructions)?;
    w.write_handle(template.poly_obstructions)?;
    Ok(())
}

fn decode_template<R: Read>(r: &mut StreamReader<R>) -> Result<CellTemplate, CodecError> {
    Ok(CellTemplate {
        name: r.read_string()?,
        template_id: r.read_u32()?,
        width: r.read_i32()?,
        height: r.read_i32()?,
        origin: r.read_point()?,
        kind: template_kind_from_code(r.read_u8()?)?,
        frozen: r.read_bool()?,
        symmetry_x: r.read_bool()?,
        symmetry_y: r.read_bool()?,
        symmetry_r90: r.read_bool()?,
        terminals: r.read_handle()?,
        terminal_count: r.read_u32()?,
        obstructions: r.read_handle()?,
        poly_obstructions: r.read_handle()?,
    })
}

fn encode_terminal<W: Write>(w: &mut StreamWriter<W>, terminal: &Terminal) -> Result<(), CodecError> {
    w.write_string(&terminal.name)?;
    w.write_handle(terminal.template)?;
    w.write_u8(direction_code(terminal.direction))?;
    w.write_u32(terminal.order_index)?;
    w.write_handle(terminal.pin_groups)?;
    w.write_handle(terminal.next)?;
    Ok(())
}

fn decode_terminal<R: Read>(r: &mut StreamReader<R>) -> Result<Terminal, CodecError> {
    Ok(Terminal {
        name: r.read_string()?,
        template: r.read_handle()?,
        direction: direction_from_code(r.read_u8()?)?,
        order_index: r.read_u32()?,
        pin_groups: r.read_handle()?,
        next: r.read_handle()?,
    })
}

fn encode_pin_group<W: Write>(
    w: &mut StreamWriter<W>,
    group: &PinGeometryGroup,
) -> Result<(), CodecError> {
    w.write_handle(group.terminal)?;
    w.write_handle(group.geometry)?;
    w.write_handle(group.polygons)?;
    w.write_u32(group.access_points.len() as u32)?;
    for variant in &group.access_points {
        w.write_u32(variant.len() as u32)?;
        for &id in variant {
            w.write_u32(id)?;
        }
    }
    w.write_handle(group.next)?;
    Ok(())
}

fn decode_pin_group<R: Read>(r: &mut StreamReader<R>) -> Result<PinGeometryGroup, CodecError> {
    let terminal = r.read_handle()?;
    let geometry = r.read_handle()?;
    let polygons = r.read_handle()?;
    let variants = r.read_u32()? as usize;
    let mut access_points = Vec::with_capacity(variants.min(PREALLOC_LIMIT));
    for _ in 0..variants {
        let count = r.read_u32()? as usize;
        let mut ids = Vec::with_capacity(count.min(PREALLOC_LIMIT));
        for _ in 0..count {
            ids.push(r.read_u32()?);
        }
        access_points.push(ids);
    }
    Ok(PinGeometryGroup {
        terminal,
        geometry,
        polygons,
        access_points,
        next: r.read_handle()?,
    })
}

fn encode_polygon<W: Write>(w: &mut StreamWriter<W>, polygon: &Polygon) -> Result<(), CodecError> {
    w.write_u32(polygon.points.len() as u32)?;
    for &point in &polygon.points {
        w.write_point(point)?;
    }
    w.write_handle(polygon.layer)?;
    w.write_i32(polygon.design_rule_width)?;
    let (tag, raw) = polygon_owner_parts(polygon.owner);
    w.write_u8(tag)?;
    w.write_u32(raw)?;
    w.write_handle(polygon.boxes)?;
    w.write_handle(polygon.next)?;
    Ok(())
}

fn decode_polygon<R: Read>(r: &mut StreamReader<R>) -> Result<Polygon, CodecError> {
    let count = r.read_u32()? as usize;
    let mut points = Vec::with_capacity(count.min(PREALLOC_LIMIT));
    for _ in 0..count {
        points.push(r.read_point()?);
    }
    let layer = r.read_handle()?;
    let design_rule_width = r.read_i32()?;
    let tag = r.read_u8()?;
    let raw = r.read_u32()?;
    let owner = polygon_owner_from_parts(tag, raw).ok_or_else(|| {
        CodecError::Corrupt(format!(
            "polygon owner tag {} with handle {} does not name a parent",
            tag, raw
        ))
    })?;
    Ok(Polygon {
        points,
        layer,
        design_rule_width,
        owner,
        boxes: r.read_handle()?,
        next: r.read_handle()?,
    })
}

fn encode_block_terminal<W: Write>(
    w: &mut StreamWriter<W>,
    bterm: &BlockTerminal,
) -> Result<(), CodecError> {
    w.write_string(&bterm.name)?;
    w.write_u8(direction_code(bterm.direction))?;
    w.write_handle(bterm.pins)?;
    Ok(())
}

fn decode_block_terminal<R: Read>(r: &mut StreamReader<R>) -> Result<BlockTerminal, CodecError> {
    Ok(BlockTerminal {
        name: r.read_string()?,
        direction: direction_from_code(r.read_u8()?)?,
        pins: r.read_handle()?,
    })
}

fn encode_block_pin<W: Write>(w: &mut StreamWriter<W>, pin: &BlockPin) -> Result<(), CodecError> {
    w.write_handle(pin.terminal)?;
    w.write_u8(status_code(pin.status))?;
    w.write_i32(pin.effective_width)?;
    w.write_i32(pin.min_spacing)?;
    w.write_handle(pin.boxes)?;
    w.write_handle(pin.next)?;
    Ok(())
}

fn decode_block_pin<R: Read>(r: &mut StreamReader<R>) -> Result<BlockPin, CodecError> {
    Ok(BlockPin {
        terminal: r.read_handle()?,
        status: status_from_code(r.read_u8()?)?,
        effective_width: r.read_i32()?,
        min_spacing: r.read_i32()?,
        boxes: r.read_handle()?,
        next: r.read_handle()?,
    })
}

fn encode_instance<W: Write>(w: &mut StreamWriter<W>, instance: &Instance) -> Result<(), CodecError> {
    w.write_string(&instance.name)?;
    w.write_handle(instance.template)?;
    w.write_point(instance.location)?;
    w.write_handle(instance.halo)?;
    Ok(())
}

fn decode_instance<R: Read>(r: &mut StreamReader<R>) -> Result<Instance, CodecError> {
    Ok(Instance {
        name: r.read_string()?,
        template: r.read_handle()?,
        location: r.read_point()?,
        halo: r.read_handle()?,
    })
}

// ── Enum codes ───────────────────────────────────────────────────────

fn template_kind_code(kind: TemplateKind) -> u8 {
    match kind {
        TemplateKind::Core => 0,
        TemplateKind::Pad => 1,
        TemplateKind::Block => 2,
        TemplateKind::Cover => 3,
        TemplateKind::EndCap => 4,
    }
}

fn template_kind_from_code(code: u8) -> Result<TemplateKind, CodecError> {
    match code {
        0 => Ok(TemplateKind::Core),
        1 => Ok(TemplateKind::Pad),
        2 => Ok(TemplateKind::Block),
        3 => Ok(TemplateKind::Cover),
        4 => Ok(TemplateKind::EndCap),
        _ => Err(CodecError::Corrupt(format!(
            "unknown template kind code {code}"
        ))),
    }
}

fn direction_code(direction: PinDirection) -> u8 {
    match direction {
        PinDirection::InOut => 0,
        PinDirection::Input => 1,
        PinDirection::Output => 2,
        PinDirection::Power => 3,
        PinDirection::Ground => 4,
    }
}

fn direction_from_code(code: u8) -> Result<PinDirection, CodecError> {
    match code {
        0 => Ok(PinDirection::InOut),
        1 => Ok(PinDirection::Input),
        2 => Ok(PinDirection::Output),
        3 => Ok(PinDirection::Power),
        4 => Ok(PinDirection::Ground),
        _ => Err(CodecError::Corrupt(format!(
            "unknown pin direction code {code}"
        ))),
    }
}

fn status_code(status: PlacementStatus) -> u8 {
    match status {
        PlacementStatus::Unplaced => 0,
        PlacementStatus::Suggested => 1,
        PlacementStatus::Placed => 2,
        PlacementStatus::Locked => 3,
        PlacementStatus::Firm => 4,
    }
}

fn status_from_code(code: u8) -> Result<PlacementStatus, CodecError> {
    match code {
        0 => Ok(PlacementStatus::Unplaced),
        1 => Ok(PlacementStatus::Suggested),
        2 => Ok(PlacementStatus::Placed),
        3 => Ok(PlacementStatus::Locked),
        4 => Ok(PlacementStatus::Firm),
        _ => Err(CodecError::Corrupt(format!(
            "unknown placement status code {code}"
        ))),
    }
}

// Same tag values the geometry owner uses, restricted to polygon parents.
fn polygon_owner_parts(owner: PolygonOwner) -> (u8, u32) {
    match owner {
        PolygonOwner::Unknown => (0, 0),
        PolygonOwner::CellTemplate(h) => (8, h.raw()),
        PolygonOwner::PinGroup(h) => (9, h.raw()),
    }
}

fn polygon_owner_from_parts(tag: u8, raw: u32) -> Option<PolygonOwner> {
    match (tag, raw) {
        (0, 0) => Some(PolygonOwner::Unknown),
        (8, raw) if raw != 0 => Some(PolygonOwner::CellTemplate(Handle::from_raw(raw))),
        (9, raw) if raw != 0 => Some(PolygonOwner::PinGroup(Handle::from_raw(raw))),
        _ => None,
    }
}
