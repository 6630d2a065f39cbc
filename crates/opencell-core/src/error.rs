use thiserror::Error;

/// Errors surfaced by store mutation and handle resolution.
///
/// Structural misuse (stale or foreign handles) is reported rather than
/// silently resolving to another record's memory; domain-rule violations
/// (freeze order, mask preconditions, packed-field widths) carry the ids and
/// limits needed to diagnose them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("stale or null {kind} handle {raw}")]
    StaleHandle { kind: &'static str, raw: u32 },

    #[error("cell template '{name}' (id {template_id}) is frozen; terminals can no longer be added")]
    TemplateFrozen { name: String, template_id: u32 },

    #[error("cell template '{name}' (id {template_id}) still has {instances} live instance(s)")]
    TemplateHasInstances {
        name: String,
        template_id: u32,
        instances: usize,
    },

    #[error("cell template '{name}' (id {template_id}) is not frozen; terminal order is not assigned yet")]
    TemplateNotFrozen { name: String, template_id: u32 },

    #[error("mask must be between 0 and {limit}, got {mask}")]
    MaskOutOfRange { mask: u8, limit: u8 },

    #[error("mask must be 0 when no layer is bound to the record")]
    MaskWithoutLayer,

    #[error("layer '{name}' has index {index} which is too large to be stored (limit {limit})")]
    LayerIdTooLarge {
        name: String,
        index: u32,
        limit: u32,
    },

    #[error("via '{name}' has index {index} which is too large to be stored (limit {limit})")]
    ViaIdTooLarge {
        name: String,
        index: u32,
        limit: u32,
    },

    #[error("via '{name}' has no member geometry; cannot place a copy of it")]
    ViaHasNoGeometry { name: String },

    #[error("polygon needs at least {min} points, got {got}")]
    PolygonTooFewPoints { got: usize, min: usize },

    #[error("a {kind} named '{name}' already exists")]
    DuplicateName { kind: &'static str, name: String },

    #[error("instance '{name}' already has a halo box")]
    HaloAlreadySet { name: String },

    #[error("owner of {kind} record {raw} does not resolve: {detail}")]
    OwnerMismatch {
        kind: &'static str,
        raw: u32,
        detail: String,
    },
}
