use std::{marker::PhantomData, num::NonZeroU32};

/// Append-only storage where every value is addressed by a typed [`Handle`].
pub struct Arena<T> {
    slots: Vec<T>,
}

pub struct Handle<T> {
    index: NonZeroU32,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Copy for Handle<T> {}
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Eq for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index())
    }
}

impl<T> Handle<T> {
    pub fn index(self) -> usize {
        (self.index.get() - 1) as usize
    }

    fn from_index(index: usize) -> Handle<T> {
        let index = u32::try_from(index + 1)
            .ok()
            .and_then(NonZeroU32::new)
            .expect("arena exceeded the maximum number of slots");
        Handle { index, _phantom: PhantomData }
    }
}

impl<T> Arena<T> {
    pub const fn new() -> Arena<T> {
        Arena { slots: Vec::new() }
    }

    pub fn insert(&mut self, value: T) -> Handle<T> {
        let handle = Handle::from_index(self.slots.len());
        self.slots.push(value);
        handle
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (Handle<T>, &T)> + '_ {
        self.slots.iter().enumerate().map(|(index, value)| (Handle::from_index(index), value))
    }

    pub fn handles(&self) -> impl ExactSizeIterator<Item = Handle<T>> {
        (0..self.slots.len()).map(Handle::from_index)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<T> std::ops::Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &Self::Output {
        &self.slots[handle.index()]
    }
}

impl<T> std::ops::IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut Self::Output {
        &mut self.slots[handle.index()]
    }
}

/// Associates values with handles of another arena.
///
/// Every handle may be assigned at most once: the resolver produces exactly one semantic entry per
/// syntax node, so a second assignment means the same node was visited twice.
pub struct SecondaryMap<K, V> {
    values: Vec<Option<V>>,
    _phantom: PhantomData<fn() -> K>,
}

impl<K, V> SecondaryMap<K, V> {
    pub fn new() -> Self {
        SecondaryMap { values: Vec::new(), _phantom: PhantomData }
    }

    pub fn insert(&mut self, handle: Handle<K>, value: V) {
        let index = handle.index();
        if index >= self.values.len() {
            self.values.resize_with(index + 1, || None);
        }
        let slot = &mut self.values[index];
        assert!(slot.is_none(), "node {handle:?} was resolved more than once");
        *slot = Some(value);
    }

    pub fn get(&self, handle: Handle<K>) -> Option<&V> {
        self.values.get(handle.index())?.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<K>) -> Option<&mut V> {
        self.values.get_mut(handle.index())?.as_mut()
    }

    pub fn contains(&self, handle: Handle<K>) -> bool {
        self.get(handle).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &V)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(index, value)| Some((Handle::from_index(index), value.as_ref()?)))
    }
}

impl<K, V> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_dense() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(arena[b], "b");
        assert_eq!(arena.handles().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    #[should_panic(expected = "resolved more than once")]
    fn secondary_map_rejects_revisit() {
        let mut arena = Arena::new();
        let a = arena.insert(());
        let mut map = SecondaryMap::new();
        map.insert(a, 1);
        map.insert(a, 2);
    }
}
