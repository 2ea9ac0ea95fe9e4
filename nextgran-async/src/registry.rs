//! Entity registry
//!
//! Fixed-capacity table of entity contexts (cells, DUs, UEs). Each slot has a
//! generation counter that is bumped on release, and every handle carries the
//! generation it was issued with, so a handle that outlives its entity can never
//! reach the entity that later reuses the same index.
//!
//! Access is closure based (`with`, `with_mut`): the table lock is held only for
//! the duration of the closure and can never be carried across an `.await`.
//! Contexts that need to be used across await points are stored as `Arc<T>`
//! and fetched with [`EntityRegistry::get`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use parking_lot::Mutex;

use crate::error::RegistryError;

/// Kind of entity held in a registry.
pub trait EntityKind: 'static {
    /// Name used in logs and errors.
    const NAME: &'static str;
}

/// Generation-checked reference to an entity of kind `K`.
pub struct EntityHandle<K> {
    index: usize,
    generation: u32,
    _kind: PhantomData<fn() -> K>,
}

impl<K> EntityHandle<K> {
    fn new(index: usize, generation: u32) -> Self {
        Self {
            index,
            generation,
            _kind: PhantomData,
        }
    }

    /// Slot index, the value carried on the wire.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Generation the handle was issued with.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<K> Clone for EntityHandle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for EntityHandle<K> {}

impl<K> PartialEq for EntityHandle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<K> Eq for EntityHandle<K> {}

impl<K> Hash for EntityHandle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<K: EntityKind> fmt::Debug for EntityHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", K::NAME, self.index, self.generation)
    }
}

impl<K: EntityKind> fmt::Display for EntityHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", K::NAME, self.index)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Bounded table of entities of kind `K` with contexts of type `T`.
pub struct EntityRegistry<K, T> {
    slots: Mutex<Vec<Slot<T>>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: EntityKind, T> EntityRegistry<K, T> {
    /// Creates a registry holding at most `capacity` entities.
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        Self {
            slots: Mutex::new(slots),
            _kind: PhantomData,
        }
    }

    /// Stores `value` in the lowest free slot.
    pub fn allocate(&self, value: T) -> Result<EntityHandle<K>, RegistryError> {
        self.allocate_with(|_| value)
    }

    /// Stores the context built by `make` in the lowest free slot. `make`
    /// receives the handle the entity will have.
    pub fn allocate_with<F>(&self, make: F) -> Result<EntityHandle<K>, RegistryError>
    where
        F: FnOnce(EntityHandle<K>) -> T,
    {
        self.try_allocate_with(|handle| Ok::<_, RegistryError>(make(handle)))
    }

    /// Like [`allocate_with`](Self::allocate_with), but `make` may fail, in
    /// which case the slot stays free.
    pub fn try_allocate_with<F, E>(&self, make: F) -> Result<EntityHandle<K>, E>
    where
        F: FnOnce(EntityHandle<K>) -> Result<T, E>,
        E: From<RegistryError>,
    {
        let mut slots = self.slots.lock();
        let capacity = slots.len();
        let (index, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.value.is_none())
            .ok_or(RegistryError::Exhausted {
                kind: K::NAME,
                capacity,
            })?;
        let handle = EntityHandle::new(index, slot.generation);
        slot.value = Some(make(handle)?);
        Ok(handle)
    }

    /// Runs `f` on the context referred to by `handle`.
    pub fn with<R>(&self, handle: EntityHandle<K>, f: impl FnOnce(&T) -> R) -> Result<R, RegistryError> {
        let slots = self.slots.lock();
        Self::live(&slots, handle)
            .map(f)
            .ok_or_else(|| Self::not_found(handle.index))
    }

    /// Runs `f` on the context referred to by `handle`, mutably.
    pub fn with_mut<R>(
        &self,
        handle: EntityHandle<K>,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, RegistryError> {
        let mut slots = self.slots.lock();
        match slots.get_mut(handle.index) {
            Some(Slot {
                generation,
                value: Some(value),
            }) if *generation == handle.generation => Ok(f(value)),
            _ => Err(Self::not_found(handle.index)),
        }
    }

    /// Returns a clone of the context, typically an `Arc`.
    pub fn get(&self, handle: EntityHandle<K>) -> Result<T, RegistryError>
    where
        T: Clone,
    {
        self.with(handle, T::clone)
    }

    /// Turns a raw index into the handle of its current occupant.
    pub fn resolve(&self, index: usize) -> Option<EntityHandle<K>> {
        let slots = self.slots.lock();
        slots
            .get(index)
            .filter(|slot| slot.value.is_some())
            .map(|slot| EntityHandle::new(index, slot.generation))
    }

    /// Returns true if `handle` refers to a live entity.
    pub fn contains(&self, handle: EntityHandle<K>) -> bool {
        let slots = self.slots.lock();
        Self::live(&slots, handle).is_some()
    }

    /// Finds the first entity for which `pred` holds.
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<EntityHandle<K>> {
        let slots = self.slots.lock();
        slots.iter().enumerate().find_map(|(index, slot)| match &slot.value {
            Some(value) if pred(value) => Some(EntityHandle::new(index, slot.generation)),
            _ => None,
        })
    }

    /// Handles of every live entity, in index order.
    pub fn handles(&self) -> Vec<EntityHandle<K>> {
        let slots = self.slots.lock();
        slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| EntityHandle::new(index, slot.generation))
            .collect()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|slot| slot.value.is_some()).count()
    }

    /// Returns true if no entity is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Removes the entity and returns its context. Outstanding handles to it
    /// become stale.
    pub fn release(&self, handle: EntityHandle<K>) -> Result<T, RegistryError> {
        let mut slots = self.slots.lock();
        match slots.get_mut(handle.index) {
            Some(slot) if slot.generation == handle.generation && slot.value.is_some() => {
                slot.generation = slot.generation.wrapping_add(1);
                slot.value.take().ok_or_else(|| Self::not_found(handle.index))
            }
            _ => Err(Self::not_found(handle.index)),
        }
    }

    fn live(slots: &[Slot<T>], handle: EntityHandle<K>) -> Option<&T> {
        slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    fn not_found(index: usize) -> RegistryError {
        RegistryError::NotFound {
            kind: K::NAME,
            index,
        }
    }
}

impl<K: EntityKind, T> fmt::Debug for EntityRegistry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("kind", &K::NAME)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
