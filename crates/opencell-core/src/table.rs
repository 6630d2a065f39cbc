use crate::error::StoreError;
use crate::handle::Handle;

/// Slots are reserved in page-sized chunks so a burst of allocations does
/// not reallocate per record.
const PAGE_SIZE: usize = 128;

#[derive(Debug, Clone, PartialEq)]
enum Slot<T> {
    /// Freed slot, threaded onto the freelist. 0 terminates the list.
    Free { next_free: u32 },
    Live(T),
}

/// A growable, freelist-backed array of same-kind records — the unit of
/// serialization.
///
/// `allocate` hands out zero-initialized records in amortized O(1), reusing
/// freed slots before growing. `free` returns a slot to the freelist without
/// renumbering anything else, so all other handles stay valid; the cost is
/// that a table never shrinks below its historical maximum.
#[derive(Debug, Clone)]
pub struct Table<T> {
    slots: Vec<Slot<T>>,
    free_head: u32,
    live: usize,
}

impl<T: Default> Table<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: 0,
            live: 0,
        }
    }

    /// Allocate a zero-initialized record and return its handle.
    pub fn allocate(&mut self) -> Handle<T> {
        self.allocate_with(|_| {})
    }

    /// Allocate a record, initializing it in place before the handle is
    /// handed out.
    pub fn allocate_with(&mut self, init: impl FnOnce(&mut T)) -> Handle<T> {
        let mut record = T::default();
        init(&mut record);
        self.live += 1;
        if self.free_head != 0 {
            let raw = self.free_head;
            let idx = raw as usize - 1;
            match self.slots[idx] {
                Slot::Free { next_free } => self.free_head = next_free,
                Slot::Live(_) => unreachable!("freelist points at a live slot"),
            }
            self.slots[idx] = Slot::Live(record);
            return Handle::from_raw(raw);
        }
        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve(PAGE_SIZE);
        }
        self.slots.push(Slot::Live(record));
        Handle::from_raw(self.slots.len() as u32)
    }

    /// Look up a live record. Null and stale handles yield `None` — never
    /// another record's memory.
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        if handle.is_none() {
            return None;
        }
        match self.slots.get(handle.index()) {
            Some(Slot::Live(record)) => Some(record),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        if handle.is_none() {
            return None;
        }
        match self.slots.get_mut(handle.index()) {
            Some(Slot::Live(record)) => Some(record),
            _ => None,
        }
    }

    /// Free a live slot, invalidating the handle and returning the record.
    pub fn free(&mut self, handle: Handle<T>, kind: &'static str) -> Result<T, StoreError> {
        let stale = StoreError::StaleHandle {
            kind,
            raw: handle.raw(),
        };
        if handle.is_none() || handle.index() >= self.slots.len() {
            return Err(stale);
        }
        let idx = handle.index();
        if matches!(self.slots[idx], Slot::Free { .. }) {
            return Err(stale);
        }
        let old = std::mem::replace(
            &mut self.slots[idx],
            Slot::Free {
                next_free: self.free_head,
            },
        );
        self.free_head = handle.raw();
        self.live -= 1;
        match old {
            Slot::Live(record) => Ok(record),
            Slot::Free { .. } => unreachable!(),
        }
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total slots, live and free. Handles range over `1..=slot_count()`.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Iterate live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Live(record) => Some((Handle::from_raw(i as u32 + 1), record)),
            Slot::Free { .. } => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Live(record) => Some((Handle::from_raw(i as u32 + 1), record)),
                Slot::Free { .. } => None,
            })
    }

    /// One ordered pass over every slot, free ones as `None` — the codec's
    /// view of the table.
    pub fn raw_slots(&self) -> impl Iterator<Item = Option<&T>> {
        self.slots.iter().map(|slot| match slot {
            Slot::Live(record) => Some(record),
            Slot::Free { .. } => None,
        })
    }

    /// Rebuild a table (including its freelist) from a decoded slot vector.
    pub fn from_slots(decoded: Vec<Option<T>>) -> Self {
        let mut table = Self {
            slots: Vec::with_capacity(decoded.len()),
            free_head: 0,
            live: 0,
        };
        for opt in decoded {
            match opt {
                Some(record) => {
                    table.live += 1;
                    table.slots.push(Slot::Live(record));
                }
                None => {
                    table.slots.push(Slot::Free { next_free: 0 });
                }
            }
        }
        // Thread the freelist so the lowest free slot is reused first.
        let mut head = 0u32;
        for idx in (0..table.slots.len()).rev() {
            if let Slot::Free { next_free } = &mut table.slots[idx] {
                *next_free = head;
                head = idx as u32 + 1;
            }
        }
        table.free_head = head;
        table
    }
}

impl<T: Default> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}
