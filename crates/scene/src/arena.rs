//! Name-keyed registries addressed by typed handles.
//!
//! Render objects refer to meshes and materials through [`Handle`]s instead of
//! references, so sorting and comparing objects only looks at small integers.
//! Handles are ordered by insertion, which is the order used when the render
//! batch is sorted.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Index of a value in an [`Arena<T>`].
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }
}

// Manual impls: derives would require `T` to implement the same traits.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
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
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Append-only storage with a name index.
pub struct Arena<T> {
    items: Vec<T>,
    names: HashMap<String, Handle<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            names: HashMap::new(),
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`.
    ///
    /// Inserting an existing name replaces the value in place and returns the
    /// handle it already had, so handles given out earlier stay valid.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Handle<T> {
        let name = name.into();
        if let Some(&handle) = self.names.get(&name) {
            tracing::debug!("Replacing registry entry '{}'", name);
            self.items[handle.index as usize] = value;
            return handle;
        }

        let handle = Handle::from_index(self.items.len() as u32);
        self.items.push(value);
        self.names.insert(name, handle);
        handle
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index as usize)
    }

    pub fn handle(&self, name: &str) -> Option<Handle<T>> {
        self.names.get(name).copied()
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.handle(name).and_then(|handle| self.get(handle))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Values with their handles, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (Handle::from_index(i as u32), item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut arena = Arena::new();
        let monkey = arena.insert("monkey", 1);
        let triangle = arena.insert("triangle", 2);

        assert_ne!(monkey, triangle);
        assert_eq!(arena.get(monkey), Some(&1));
        assert_eq!(arena.handle("triangle"), Some(triangle));
        assert_eq!(arena.get_by_name("triangle"), Some(&2));
        assert_eq!(arena.get_by_name("wolf"), None);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_reinsert_keeps_handle() {
        let mut arena = Arena::new();
        let first = arena.insert("mesh", "a");
        let second = arena.insert("mesh", "b");

        assert_eq!(first, second);
        assert_eq!(arena.get(first), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_handles_order_by_insertion() {
        let mut arena = Arena::new();
        let a = arena.insert("defaultmesh", ());
        let b = arena.insert("texturedmesh", ());
        assert!(a < b);
        assert_eq!(a.index(), 0);
        assert_eq!(
            arena.iter().map(|(h, _)| h).collect::<Vec<_>>(),
            vec![a, b]
        );
    }

    #[test]
    fn test_handle_needs_no_bounds_on_t() {
        struct NotCopy;
        let mut arena = Arena::new();
        let handle = arena.insert("x", NotCopy);
        let copy = handle;
        assert_eq!(handle, copy);
    }
}
