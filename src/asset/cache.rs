use std::marker::PhantomData;

use super::Handle;

/// Slab of records addressed by [`Handle`]. Removed slots are recycled
/// before the slab grows.
///
/// `K` is the type handles are tagged with, so a registry can store private
/// bookkeeping while handing out handles to its public record type.
pub struct AssetCache<T, K = T> {
    items: Vec<Option<T>>,
    free: Vec<u32>,
    _key: PhantomData<fn() -> K>,
}

impl<T, K> AssetCache<T, K> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            free: Vec::new(),
            _key: PhantomData,
        }
    }

    pub fn insert(&mut self, item: T) -> Handle<K> {
        if let Some(index) = self.free.pop() {
            self.items[index as usize] = Some(item);
            return Handle::new(index);
        }

        let index = self.items.len() as u32;
        self.items.push(Some(item));
        Handle::new(index)
    }

    pub fn remove(&mut self, handle: Handle<K>) -> Option<T> {
        let item = self.items.get_mut(handle.index() as usize)?.take()?;
        self.free.push(handle.index());
        Some(item)
    }

    pub fn get(&self, handle: Handle<K>) -> Option<&T> {
        self.items.get(handle.index() as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<K>) -> Option<&mut T> {
        self.items.get_mut(handle.index() as usize)?.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| item.as_ref().map(|item| (Handle::new(index as u32), item)))
    }

    pub fn len(&self) -> usize {
        self.items.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, K> Default for AssetCache<T, K> {
    fn default() -> Self {
        Self::new()
    }
}
