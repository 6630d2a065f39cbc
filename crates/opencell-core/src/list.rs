//! Intrusive singly-linked child lists.
//!
//! A parent stores only the handle of its first child; each child stores the
//! handle of its next sibling. `push_front` is the one insertion primitive,
//! so a freshly built list iterates in reverse creation order until
//! [`reverse`] canonicalizes it (polygon decomposition and template freezing
//! rely on this).

use crate::handle::Handle;
use crate::table::Table;

/// Whether walking a list yields records in creation order or reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    Forward,
    Reversed,
}

/// A record that participates in an intrusive sibling list.
pub trait Linked: Sized {
    /// Order a freshly decoded (or freshly `push_front`-built) list walks in,
    /// before any canonicalizing [`reverse`].
    const BUILD_ORDER: ListOrder = ListOrder::Reversed;

    fn next(&self) -> Handle<Self>;
    fn set_next(&mut self, next: Handle<Self>);
}

/// Link `item` in front of `head`; returns the new head.
pub fn push_front<T: Linked + Default>(
    table: &mut Table<T>,
    head: Handle<T>,
    item: Handle<T>,
) -> Handle<T> {
    if let Some(record) = table.get_mut(item) {
        record.set_next(head);
    }
    item
}

/// Unlink `item` from the list starting at `head`; returns the new head, or
/// `None` if `item` was not on the list.
pub fn unlink<T: Linked + Default>(
    table: &mut Table<T>,
    head: Handle<T>,
    item: Handle<T>,
) -> Option<Handle<T>> {
    let item_next = table.get(item)?.next();
    if head == item {
        table.get_mut(item)?.set_next(Handle::none());
        return Some(item_next);
    }
    let mut prev = head;
    while prev.is_some() {
        let prev_next = table.get(prev)?.next();
        if prev_next == item {
            table.get_mut(prev)?.set_next(item_next);
            table.get_mut(item)?.set_next(Handle::none());
            return Some(head);
        }
        prev = prev_next;
    }
    None
}

/// Iterator over an intrusive list, yielding handles.
pub struct ListIter<'a, T: Linked + Default> {
    table: &'a Table<T>,
    cursor: Handle<T>,
}

impl<'a, T: Linked + Default> Iterator for ListIter<'a, T> {
    type Item = Handle<T>;

    fn next(&mut self) -> Option<Handle<T>> {
        if self.cursor.is_none() {
            return None;
        }
        let current = self.cursor;
        self.cursor = match self.table.get(current) {
            Some(record) => record.next(),
            None => Handle::none(),
        };
        Some(current)
    }
}

/// Walk the list starting at `head`.
pub fn iter<T: Linked + Default>(table: &Table<T>, head: Handle<T>) -> ListIter<'_, T> {
    ListIter {
        table,
        cursor: head,
    }
}

/// Count by walking; O(n), acceptable since child lists are short.
pub fn count<T: Linked + Default>(table: &Table<T>, head: Handle<T>) -> usize {
    iter(table, head).count()
}

/// Relink the list in the opposite order; returns the new head. Applying it
/// twice restores the original order.
pub fn reverse<T: Linked + Default>(table: &mut Table<T>, head: Handle<T>) -> Handle<T> {
    let mut prev = Handle::none();
    let mut cursor = head;
    while cursor.is_some() {
        let next = match table.get(cursor) {
            Some(record) => record.next(),
            None => break,
        };
        if let Some(record) = table.get_mut(cursor) {
            record.set_next(prev);
        }
        prev = cursor;
        cursor = next;
    }
    prev
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Node {
        label: u32,
        next: Handle<Node>,
    }

    impl Linked for Node {
        fn next(&self) -> Handle<Node> {
            self.next
        }

        fn set_next(&mut self, next: Handle<Node>) {
            self.next = next;
        }
    }

    fn build(table: &mut Table<Node>, labels: &[u32]) -> Handle<Node> {
        let mut head = Handle::none();
        for &label in labels {
            let h = table.allocate();
            table.get_mut(h).unwrap().label = label;
            head = push_front(table, head, h);
        }
        head
    }

    fn labels(table: &Table<Node>, head: Handle<Node>) -> Vec<u32> {
        iter(table, head)
            .map(|h| table.get(h).unwrap().label)
            .collect()
    }

    #[test]
    fn test_push_front_reverses_creation_order() {
        let mut t = Table::new();
        let head = build(&mut t, &[1, 2, 3]);
        assert_eq!(labels(&t, head), vec![3, 2, 1]);
        assert_eq!(count(&t, head), 3);
    }

    #[test]
    fn test_reverse_restores_creation_order() {
        let mut t = Table::new();
        let head = build(&mut t, &[1, 2, 3, 4]);
        let head = reverse(&mut t, head);
        assert_eq!(labels(&t, head), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_reverse_is_involution() {
        let mut t = Table::new();
        let head = build(&mut t, &[10, 20, 30]);
        let before = labels(&t, head);
        let head2 = reverse(&mut t, head);
        let head3 = reverse(&mut t, head2);
        assert_eq!(head3, head);
        assert_eq!(labels(&t, head3), before);
        assert_eq!(count(&t, head3), 3);
    }

    #[test]
    fn test_reverse_empty_and_singleton() {
        let mut t: Table<Node> = Table::new();
        assert!(reverse(&mut t, Handle::none()).is_none());
        let head = build(&mut t, &[5]);
        assert_eq!(reverse(&mut t, head), head);
    }

    #[test]
    fn test_unlink_head_middle_tail() {
        let mut t = Table::new();
        let head = build(&mut t, &[1, 2, 3]); // list: 3, 2, 1
        let handles: Vec<_> = iter(&t, head).collect();

        // Middle.
        let head = unlink(&mut t, head, handles[1]).unwrap();
        assert_eq!(labels(&t, head), vec![3, 1]);
        // Head.
        let head = unlink(&mut t, head, handles[0]).unwrap();
        assert_eq!(labels(&t, head), vec![1]);
        // Tail (also the head now).
        let head = unlink(&mut t, head, handles[2]).unwrap();
        assert!(head.is_none());
        // Not on the list anymore.
        assert!(unlink(&mut t, head, handles[0]).is_none());
    }
}
