use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// A typed, table-relative reference to a record in a [`Table`].
///
/// The raw value 0 means "no object"; live handles are 1-based slot numbers.
/// A handle survives serialization and table growth unchanged — slots are
/// never renumbered, which is the stability guarantee everything above the
/// substrate relies on.
///
/// [`Table`]: crate::table::Table
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Handle<T> {
    raw: u32,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// The null handle ("no object").
    pub const fn none() -> Self {
        Self {
            raw: 0,
            _marker: PhantomData,
        }
    }

    /// Reconstruct a handle from its persisted raw value.
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub const fn raw(&self) -> u32 {
        self.raw
    }

    pub const fn is_none(&self) -> bool {
        self.raw == 0
    }

    pub const fn is_some(&self) -> bool {
        self.raw != 0
    }

    /// Slot index of this handle; only meaningful for non-null handles.
    pub(crate) const fn index(&self) -> usize {
        self.raw as usize - 1
    }
}

// Manual impls: derives would put bounds on `T`, which is only a phantom.

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "Handle(none)")
        } else {
            write!(f, "Handle({})", self.raw)
        }
    }
}
