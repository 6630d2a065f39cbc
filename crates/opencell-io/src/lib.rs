//! OpenCell IO: the versioned binary persistence layer for
//! [`opencell_core::LayoutStore`].
//!
//! `stream` holds the big-endian primitive readers/writers; `design` holds
//! the file format itself: framing, schema history, and the per-table record
//! codecs.

pub mod design;
pub mod stream;

pub use design::{
    read_design, write_design, CodecError, MAGIC, SCHEMA_BASE, SCHEMA_CURRENT,
    SCHEMA_DESIGN_RULE_WIDTH, SCHEMA_GEOM_MASK,
};
pub use stream::{StreamReader, StreamWriter};
