//! The session buffer registry: buffers addressed by stable handle, with
//! unique names.

use crate::Buffer;
use core_status::{EdError, EdResult};
use slab::Slab;
use tracing::debug;

/// Stable handle to a buffer in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

#[derive(Debug, Default)]
pub struct BufferSet {
    slab: Slab<Buffer>,
}

impl BufferSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    /// Create a buffer. The name must be non-empty and unused.
    pub fn create(&mut self, name: &str) -> EdResult<BufferId> {
        if name.is_empty() {
            return Err(EdError::failure("Buffer name cannot be null"));
        }
        if self.find(name).is_some() {
            return Err(EdError::failure(format!(
                "Buffer \"{}\" already exists",
                name
            )));
        }
        let id = BufferId(self.slab.insert(Buffer::new(name)) as u32);
        debug!(target: "text.registry", name, id = id.0, "buffer_created");
        Ok(id)
    }

    /// Find by name, or create. Returns (id, created).
    pub fn find_or_create(&mut self, name: &str) -> EdResult<(BufferId, bool)> {
        match self.find(name) {
            Some(id) => Ok((id, false)),
            None => Ok((self.create(name)?, true)),
        }
    }

    pub fn get(&self, id: BufferId) -> Option<&Buffer> {
        self.slab.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut Buffer> {
        self.slab.get_mut(id.0 as usize)
    }

    /// Panicking access for ids known to be live.
    pub fn buf(&self, id: BufferId) -> &Buffer {
        &self.slab[id.0 as usize]
    }

    pub fn buf_mut(&mut self, id: BufferId) -> &mut Buffer {
        &mut self.slab[id.0 as usize]
    }

    pub fn find(&self, name: &str) -> Option<BufferId> {
        self.slab
            .iter()
            .find(|(_, b)| b.name == name)
            .map(|(k, _)| BufferId(k as u32))
    }

    /// Remove a buffer. The caller has already verified no window shows it
    /// and no macro invocation is active in it.
    pub fn delete(&mut self, id: BufferId) -> EdResult<Buffer> {
        if !self.slab.contains(id.0 as usize) {
            return Err(EdError::failure("No such buffer"));
        }
        let b = self.slab.remove(id.0 as usize);
        debug!(target: "text.registry", name = %b.name, "buffer_deleted");
        Ok(b)
    }

    pub fn rename(&mut self, id: BufferId, new_name: &str) -> EdResult<()> {
        if new_name.is_empty() {
            return Err(EdError::failure("Buffer name cannot be null"));
        }
        if let Some(other) = self.find(new_name) {
            if other != id {
                return Err(EdError::failure(format!(
                    "Buffer \"{}\" already exists",
                    new_name
                )));
            }
        }
        let b = self
            .get_mut(id)
            .ok_or_else(|| EdError::failure("No such buffer"))?;
        b.name = new_name.to_string();
        Ok(())
    }

    /// Iterate (id, buffer) in slab order.
    pub fn iter(&self) -> impl Iterator<Item = (BufferId, &Buffer)> {
        self.slab.iter().map(|(k, b)| (BufferId(k as u32), b))
    }

    /// Take the accumulated touch level of every buffer that has one.
    /// Redisplay calls this once per cycle to dirty the affected windows.
    pub fn drain_touches(&mut self) -> Vec<(BufferId, crate::TouchLevel)> {
        self.slab
            .iter_mut()
            .map(|(k, b)| (BufferId(k as u32), b.take_touch()))
            .filter(|(_, t)| *t != crate::TouchLevel::None)
            .collect()
    }

    /// Buffer names in ascending order, for listings and completion.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slab.iter().map(|(_, b)| b.name.clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_find_delete() {
        let mut set = BufferSet::new();
        let id = set.create("main").unwrap();
        assert_eq!(set.find("main"), Some(id));
        assert!(set.create("main").is_err());
        set.delete(id).unwrap();
        assert!(set.find("main").is_none());
        assert!(set.delete(id).is_err());
    }

    #[test]
    fn empty_name_refused() {
        let mut set = BufferSet::new();
        assert!(set.create("").is_err());
    }

    #[test]
    fn rename_collision_refused() {
        let mut set = BufferSet::new();
        let a = set.create("a").unwrap();
        set.create("b").unwrap();
        assert!(set.rename(a, "b").is_err());
        assert!(set.rename(a, "a").is_ok());
        assert!(set.rename(a, "c").is_ok());
        assert_eq!(set.buf(a).name, "c");
    }

    #[test]
    fn ids_stay_stable_across_deletes() {
        let mut set = BufferSet::new();
        let a = set.create("a").unwrap();
        let b = set.create("b").unwrap();
        set.delete(a).unwrap();
        assert_eq!(set.buf(b).name, "b");
    }
}
