//! Pooled storage for order records.
//!
//! A growable vector of fixed-capacity slabs. Each slab keeps an
//! index-linked free list over its vacant slots; allocation pops the head,
//! deallocation pushes the slot back. When the current slab is exhausted a
//! fresh slab is appended and becomes current. Slabs are never removed or
//! reordered, so a `SlotId` handed out before growth stays valid.

use parking_lot::RwLock;
use types::errors::EngineError;
use types::ids::SlotId;
use types::order::Order;

/// Slots per slab.
pub const SLAB_CAPACITY: usize = 1024;

enum Slot {
    Vacant { next_free: Option<u32> },
    Occupied(Order),
}

struct Slab {
    slots: Vec<Slot>,
    free_head: Option<u32>,
}

impl Slab {
    fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let next_free = if i + 1 < capacity {
                Some(i as u32 + 1)
            } else {
                None
            };
            slots.push(Slot::Vacant { next_free });
        }
        Self {
            slots,
            free_head: Some(0),
        }
    }

    fn allocate(&mut self, order: Order) -> Option<u32> {
        let index = self.free_head?;
        if let Slot::Vacant { next_free } = self.slots[index as usize] {
            self.free_head = next_free;
        }
        self.slots[index as usize] = Slot::Occupied(order);
        Some(index)
    }

    /// Returns the evicted order, or None if the slot was already vacant.
    fn free(&mut self, index: u32) -> Option<Order> {
        let slot = self.slots.get_mut(index as usize)?;
        match slot {
            Slot::Occupied(order) => {
                let order = *order;
                *slot = Slot::Vacant {
                    next_free: self.free_head,
                };
                self.free_head = Some(index);
                Some(order)
            }
            Slot::Vacant { .. } => None,
        }
    }

    fn get(&self, index: u32) -> Option<&Order> {
        match self.slots.get(index as usize)? {
            Slot::Occupied(order) => Some(order),
            Slot::Vacant { .. } => None,
        }
    }

    fn get_mut(&mut self, index: u32) -> Option<&mut Order> {
        match self.slots.get_mut(index as usize)? {
            Slot::Occupied(order) => Some(order),
            Slot::Vacant { .. } => None,
        }
    }
}

struct PoolInner {
    slabs: Vec<Slab>,
    current: usize,
    live: usize,
}

/// Internally synchronized order record pool.
pub struct OrderPool {
    inner: RwLock<PoolInner>,
}

impl OrderPool {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PoolInner {
                slabs: vec![Slab::new(SLAB_CAPACITY)],
                current: 0,
                live: 0,
            }),
        }
    }

    fn try_allocate(inner: &mut PoolInner, order: Order) -> Option<SlotId> {
        let slab_no = inner.current;
        let index = inner.slabs[slab_no].allocate(order)?;
        let slot = SlotId::new(slab_no as u32, index);
        if let Some(stored) = inner.slabs[slab_no].get_mut(index) {
            stored.slot = slot;
        }
        inner.live += 1;
        Some(slot)
    }

    /// Store an order, growing by one slab if the current one is full.
    pub fn allocate(&self, order: Order) -> Result<SlotId, EngineError> {
        let mut inner = self.inner.write();
        if let Some(slot) = Self::try_allocate(&mut inner, order) {
            return Ok(slot);
        }
        inner.slabs.push(Slab::new(SLAB_CAPACITY));
        inner.current = inner.slabs.len() - 1;
        Self::try_allocate(&mut inner, order).ok_or(EngineError::PoolExhausted)
    }

    /// Return a slot to its slab's free list.
    ///
    /// Freeing an already-vacant slot is a no-op returning None.
    pub fn free(&self, slot: SlotId) -> Option<Order> {
        let mut inner = self.inner.write();
        let freed = inner.slabs.get_mut(slot.slab as usize)?.free(slot.index);
        if freed.is_some() {
            inner.live -= 1;
        }
        freed
    }

    /// Copy out the order stored at `slot`, if any.
    pub fn get(&self, slot: SlotId) -> Option<Order> {
        let inner = self.inner.read();
        inner.slabs.get(slot.slab as usize)?.get(slot.index).copied()
    }

    /// Mutate the order stored at `slot` in place.
    pub fn with_mut<R>(&self, slot: SlotId, f: impl FnOnce(&mut Order) -> R) -> Option<R> {
        let mut inner = self.inner.write();
        inner
            .slabs
            .get_mut(slot.slab as usize)?
            .get_mut(slot.index)
            .map(f)
    }

    /// Number of currently allocated records.
    pub fn live_count(&self) -> usize {
        self.inner.read().live
    }

    /// Number of slabs backing the pool.
    pub fn slab_count(&self) -> usize {
        self.inner.read().slabs.len()
    }
}

impl Default for OrderPool {
    fn default() -> Self {
        Self::new()
    }
}
