// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object arena addressed by generational handles.
//!
//! Every addressable object lives in one slot of a [`Heap`]. A [`Handle`]
//! names a slot plus the generation it was issued for, so a handle to a
//! released object never aliases a later occupant of the same slot.
//!
//! Slots can also be *reserved*: a handle exists but no object has been
//! placed yet. Readers use this to hand out addresses for objects whose
//! bytes have not been seen, then fill them in later.

use crate::descriptor::DescriptorId;
use crate::value::Value;
use std::fmt;

/// Address of an object in a [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Slot index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation the handle was issued for.
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a non-zero u64 (0 is reserved for null).
    pub fn to_bits(self) -> u64 {
        ((u64::from(self.index) + 1) << 32) | u64::from(self.generation)
    }

    /// Inverse of [`Handle::to_bits`]; `None` for the null encoding.
    pub fn from_bits(bits: u64) -> Option<Self> {
        let upper = bits >> 32;
        if upper == 0 {
            return None;
        }
        Some(Self {
            index: (upper - 1) as u32,
            generation: (bits & 0xFFFF_FFFF) as u32,
        })
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// An object together with the descriptor it was constructed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Runtime type stamp.
    pub descriptor: DescriptorId,
    /// Field storage.
    pub value: Value,
}

#[derive(Debug, Clone)]
enum SlotState {
    Free,
    Reserved,
    Occupied(Object),
    // Value temporarily moved out by `take_value`.
    Detached(DescriptorId),
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    state: SlotState,
}

/// Arena of objects.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Heap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied or detached slots.
    pub fn len(&self) -> usize {
        self.live
    }

    /// True when no object is allocated.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn claim(&mut self, state: SlotState) -> Handle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.state = state;
            return Handle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            state,
        });
        Handle {
            index,
            generation: 0,
        }
    }

    fn slot(&self, handle: Handle) -> Option<&Slot> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }

    fn slot_mut(&mut self, handle: Handle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }

    /// Place a new object and return its handle.
    pub fn alloc(&mut self, descriptor: DescriptorId, value: Value) -> Handle {
        self.live += 1;
        self.claim(SlotState::Occupied(Object { descriptor, value }))
    }

    /// Hand out a handle without an object behind it yet.
    pub fn reserve(&mut self) -> Handle {
        self.claim(SlotState::Reserved)
    }

    /// True if `handle` was reserved and not filled yet.
    pub fn is_reserved(&self, handle: Handle) -> bool {
        matches!(self.slot(handle), Some(Slot { state: SlotState::Reserved, .. }))
    }

    /// Place an object into a reserved slot.
    pub fn fill(&mut self, handle: Handle, descriptor: DescriptorId, value: Value) {
        let Some(slot) = self.slot_mut(handle) else {
            kernel_fatal!("fill of stale handle {}", handle);
        };
        kernel_assert!(
            matches!(slot.state, SlotState::Reserved),
            "fill of handle {} which is not reserved",
            handle
        );
        slot.state = SlotState::Occupied(Object { descriptor, value });
        self.live += 1;
    }

    /// True if `handle` names a live (occupied or detached) object.
    pub fn contains(&self, handle: Handle) -> bool {
        matches!(
            self.slot(handle),
            Some(Slot {
                state: SlotState::Occupied(_) | SlotState::Detached(_),
                ..
            })
        )
    }

    /// Borrow an object.
    pub fn get(&self, handle: Handle) -> Option<&Object> {
        match self.slot(handle) {
            Some(Slot {
                state: SlotState::Occupied(object),
                ..
            }) => Some(object),
            _ => None,
        }
    }

    /// Borrow an object mutably.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Object> {
        match self.slot_mut(handle) {
            Some(Slot {
                state: SlotState::Occupied(object),
                ..
            }) => Some(object),
            _ => None,
        }
    }

    /// Descriptor stamp of a live object, detached ones included.
    pub fn descriptor_of(&self, handle: Handle) -> Option<DescriptorId> {
        match self.slot(handle) {
            Some(Slot {
                state: SlotState::Occupied(object),
                ..
            }) => Some(object.descriptor),
            Some(Slot {
                state: SlotState::Detached(descriptor),
                ..
            }) => Some(*descriptor),
            _ => None,
        }
    }

    /// Borrow an object's value; fatal if the handle is not live.
    pub fn value(&self, handle: Handle) -> &Value {
        match self.get(handle) {
            Some(object) => &object.value,
            None => kernel_fatal!("no object at {}", handle),
        }
    }

    /// Mutably borrow an object's value; fatal if the handle is not live.
    pub fn value_mut(&mut self, handle: Handle) -> &mut Value {
        match self.get_mut(handle) {
            Some(object) => &mut object.value,
            None => kernel_fatal!("no object at {}", handle),
        }
    }

    /// Move an object's value out so the heap can be mutated while the
    /// value is being filled. Must be paired with [`Heap::restore_value`].
    pub fn take_value(&mut self, handle: Handle) -> Value {
        let Some(slot) = self.slot_mut(handle) else {
            kernel_fatal!("take of stale handle {}", handle);
        };
        let descriptor = match &slot.state {
            SlotState::Occupied(object) => object.descriptor,
            _ => kernel_fatal!("take of {} which holds no object", handle),
        };
        match std::mem::replace(&mut slot.state, SlotState::Detached(descriptor)) {
            SlotState::Occupied(object) => object.value,
            _ => unreachable!(),
        }
    }

    /// Put back a value moved out by [`Heap::take_value`].
    pub fn restore_value(&mut self, handle: Handle, value: Value) {
        let Some(slot) = self.slot_mut(handle) else {
            kernel_fatal!("restore of stale handle {}", handle);
        };
        let SlotState::Detached(descriptor) = slot.state else {
            kernel_fatal!("restore of {} which was not detached", handle);
        };
        slot.state = SlotState::Occupied(Object { descriptor, value });
    }

    /// Release a slot. Returns the object if one was there.
    pub fn release(&mut self, handle: Handle) -> Option<Object> {
        let slot = self.slot_mut(handle)?;
        let previous = std::mem::replace(&mut slot.state, SlotState::Free);
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        match previous {
            SlotState::Occupied(object) => {
                self.live -= 1;
                Some(object)
            }
            SlotState::Detached(_) => {
                self.live -= 1;
                None
            }
            SlotState::Reserved | SlotState::Free => None,
        }
    }

    /// Iterate over live objects in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Object)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match &slot.state {
            SlotState::Occupied(object) => Some((
                Handle {
                    index: index as u32,
                    generation: slot.generation,
                },
                object,
            )),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> DescriptorId {
        DescriptorId::from_raw(raw).expect("non-zero id")
    }

    #[test]
    fn test_alloc_and_get() {
        let mut heap = Heap::new();
        let h = heap.alloc(id(3), Value::Int(42));
        assert_eq!(heap.len(), 1);
        let object = heap.get(h).expect("object");
        assert_eq!(object.descriptor, id(3));
        assert_eq!(object.value, Value::Int(42));
    }

    #[test]
    fn test_released_handle_is_stale() {
        let mut heap = Heap::new();
        let h = heap.alloc(id(1), Value::Int(1));
        assert!(heap.release(h).is_some());
        assert!(heap.get(h).is_none());

        let reused = heap.alloc(id(1), Value::Int(2));
        assert_eq!(reused.index(), h.index());
        assert_ne!(reused.generation(), h.generation());
        assert!(heap.get(h).is_none());
        assert_eq!(heap.value(reused), &Value::Int(2));
    }

    #[test]
    fn test_reserve_then_fill() {
        let mut heap = Heap::new();
        let h = heap.reserve();
        assert!(heap.is_reserved(h));
        assert!(!heap.contains(h));
        heap.fill(h, id(2), Value::Str("x".into()));
        assert!(heap.contains(h));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_take_and_restore() {
        let mut heap = Heap::new();
        let h = heap.alloc(id(5), Value::Int(7));
        let value = heap.take_value(h);
        assert!(heap.get(h).is_none());
        assert_eq!(heap.descriptor_of(h), Some(id(5)));
        heap.restore_value(h, value);
        assert_eq!(heap.value(h), &Value::Int(7));
    }

    #[test]
    fn test_bits_roundtrip_and_null() {
        let mut heap = Heap::new();
        heap.alloc(id(1), Value::Int(0));
        let h = heap.alloc(id(1), Value::Int(0));
        assert_eq!(Handle::from_bits(h.to_bits()), Some(h));
        assert_eq!(Handle::from_bits(0), None);
    }

    #[test]
    #[should_panic(expected = "not reserved")]
    fn test_fill_occupied_is_fatal() {
        let mut heap = Heap::new();
        let h = heap.alloc(id(1), Value::Int(0));
        heap.fill(h, id(1), Value::Int(1));
    }
}
