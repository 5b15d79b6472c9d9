// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Descriptor ring bookkeeping.
//!
//! A `Ring` is a borrowed array of descriptor slots shared with the DMA
//! engine, plus the producer/consumer indices that track which slots belong
//! to whom. The descriptor *types* carry the actual ownership protocol (see
//! [`crate::desc::DescType`]); the ring's job is to make sure software only
//! ever looks at slots in order and never hands out a slot twice.
//!
//! # Indices
//!
//! `produced` and `consumed` are monotonically increasing logical indices;
//! the physical slot is `index % capacity`. This keeps the full/empty
//! distinction trivial (`produced - consumed` is the in-flight count) at the
//! cost of a modulo per access.
//!
//! Invariant: `0 <= produced - consumed <= capacity`.
//!
//! # The trailer
//!
//! The last element of the slot storage is not an ordinary slot: it is the
//! `LinkFix` trailer that points the hardware back at the ring's base
//! address for chain wraparound. It is wired once at construction and is
//! excluded from the producer/consumer index range, so no ordinary ring
//! operation can touch it.

use crate::desc::{DescType, Slot};
use drv_rswitch2_api::RingError;

pub struct Ring<'s, T: Slot> {
    /// Slot storage; `slots[..capacity]` are ring slots, `slots[capacity]`
    /// is the trailer.
    slots: &'s mut [T],
    capacity: usize,
    produced: u64,
    consumed: u64,
}

impl<'s, T: Slot> Ring<'s, T> {
    /// Builds a ring over `slots`, whose last element becomes the `LinkFix`
    /// trailer pointing at `base`, the bus address of the slot storage.
    ///
    /// Ordinary slots are left as provided; the queue engines rewrite each
    /// one in full before posting it. `slots` must hold at least two
    /// elements: one ring slot and the trailer.
    pub fn new(slots: &'s mut [T], base: u64) -> Self {
        assert!(slots.len() >= 2);
        let capacity = slots.len() - 1;

        let trailer = &mut slots[capacity];
        trailer.raw_mut().set_bus_addr(base);
        trailer.raw_mut().set_desc_type(DescType::LinkFix);

        Ring {
            slots,
            capacity,
            produced: 0,
            consumed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently handed out (produced but not consumed).
    pub fn in_flight(&self) -> usize {
        debug_assert!(self.produced >= self.consumed);
        debug_assert!(self.produced - self.consumed <= self.capacity as u64);
        (self.produced - self.consumed) as usize
    }

    pub fn is_full(&self) -> bool {
        self.in_flight() == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.produced == self.consumed
    }

    /// Physical index of the next producer slot, if the ring is not full.
    pub fn next_free_slot(&self) -> Option<usize> {
        if self.is_full() {
            None
        } else {
            Some((self.produced % self.capacity as u64) as usize)
        }
    }

    /// Physical index `n` slots past the producer position. Used when
    /// staging a multi-segment chain before committing it.
    pub fn producer_slot(&self, n: usize) -> usize {
        ((self.produced + n as u64) % self.capacity as u64) as usize
    }

    /// Physical index of the next consumer slot, or `None` if the ring is
    /// empty (TX). RX rings keep every posted slot in flight, so emptiness
    /// there means "nothing posted".
    pub fn next_used_slot(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some((self.consumed % self.capacity as u64) as usize)
        }
    }

    pub fn slot(&self, idx: usize) -> &T {
        debug_assert!(idx < self.capacity);
        &self.slots[idx]
    }

    pub fn slot_mut(&mut self, idx: usize) -> &mut T {
        debug_assert!(idx < self.capacity);
        &mut self.slots[idx]
    }

    /// Commits a staged chain of `len` slots whose head is the current
    /// producer slot.
    ///
    /// Contract: the caller has fully written every descriptor of the chain
    /// *except* the head's type field, which still reads as a
    /// software-owned type. This function issues a release fence and then
    /// writes `head_type` as the final memory write, because the hardware
    /// scans the chain from its head: the head's ownership-transfer write
    /// must happen after every other store or the engine can read a
    /// half-built chain. That ordering is a correctness requirement, not an
    /// optimization.
    pub fn commit(&mut self, len: usize, head_type: DescType) {
        debug_assert!(len >= 1);
        debug_assert!(self.in_flight() + len <= self.capacity);
        let head = (self.produced % self.capacity as u64) as usize;

        core::sync::atomic::fence(core::sync::atomic::Ordering::Release);
        self.slots[head].raw_mut().set_desc_type(head_type);

        self.produced += len as u64;
    }

    /// Advances `consumed` by `n` slots. Never regresses; attempting to
    /// consume more than is in flight is a caller bug.
    pub fn advance_consumed(&mut self, n: usize) {
        debug_assert!(n <= self.in_flight());
        self.consumed += n as u64;
    }

    /// Advances `consumed` up to and including physical slot `idx` (the
    /// next occurrence of that slot at or after the current consumer
    /// position).
    pub fn mark_consumed_through(&mut self, idx: usize) {
        debug_assert!(idx < self.capacity);
        let cur = (self.consumed % self.capacity as u64) as usize;
        let n = if idx >= cur {
            idx - cur + 1
        } else {
            self.capacity - cur + idx + 1
        };
        debug_assert!(n <= self.in_flight());
        self.consumed += n as u64;
    }

    /// Checks that the consumer-side slot `idx` is software-owned, i.e.
    /// that advancing over it would not steal a slot the hardware is still
    /// using. `hw_owned` captures the direction-specific tag set.
    pub fn check_sw_owned(
        &self,
        idx: usize,
        hw_owned: impl Fn(Option<DescType>) -> bool,
    ) -> Result<(), RingError> {
        if hw_owned(self.slots[idx].raw().desc_type()) {
            Err(RingError::Consistency)
        } else {
            Ok(())
        }
    }

    /// Bus address the trailer points at, i.e. the ring base handed to the
    /// hardware's chain-base register.
    pub fn base(&self) -> u64 {
        self.slots[self.capacity].raw().bus_addr()
    }

    #[cfg(test)]
    pub fn trailer(&self) -> &T {
        &self.slots[self.capacity]
    }

    #[cfg(test)]
    pub fn indices(&self) -> (u64, u64) {
        (self.produced, self.consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::ExtDesc;

    fn ring_of<const N: usize>(
        slots: &mut [ExtDesc; N],
    ) -> Ring<'_, ExtDesc> {
        Ring::new(slots, 0x1000)
    }

    #[test]
    fn trailer_is_wired_and_excluded() {
        let mut slots = [ExtDesc::zeroed(); 5];
        let r = ring_of(&mut slots);
        assert_eq!(r.capacity(), 4);
        assert_eq!(r.trailer().raw().desc_type(), Some(DescType::LinkFix));
        assert_eq!(r.base(), 0x1000);
    }

    #[test]
    fn produce_consume_invariant() {
        let mut slots = [ExtDesc::zeroed(); 5];
        let mut r = ring_of(&mut slots);

        // Fill the ring.
        for i in 0..4 {
            assert_eq!(r.next_free_slot(), Some(i));
            r.commit(1, DescType::FSingle);
        }
        assert!(r.is_full());
        assert_eq!(r.next_free_slot(), None);
        assert_eq!(r.in_flight(), 4);

        // Drain it.
        r.advance_consumed(2);
        assert_eq!(r.in_flight(), 2);
        assert_eq!(r.next_free_slot(), Some(0));
        r.advance_consumed(2);
        assert!(r.is_empty());
        assert_eq!(r.next_used_slot(), None);

        // Indices are monotonic, not wrapped.
        let (p, c) = r.indices();
        assert_eq!(p, 4);
        assert_eq!(c, 4);
    }

    #[test]
    fn mark_consumed_through_wraps() {
        let mut slots = [ExtDesc::zeroed(); 5];
        let mut r = ring_of(&mut slots);
        for _ in 0..4 {
            r.commit(1, DescType::FSingle);
        }
        r.advance_consumed(3);
        // Produce over the wrap: slots 0 and 1 again.
        r.commit(1, DescType::FSingle);
        r.commit(1, DescType::FSingle);
        // Consumer is at physical slot 3; consume through physical 1.
        r.mark_consumed_through(1);
        assert_eq!(r.in_flight(), 1);
        let (_, c) = r.indices();
        assert_eq!(c, 6);
    }

    #[test]
    fn hw_owned_slot_is_flagged() {
        let mut slots = [ExtDesc::zeroed(); 3];
        let mut r = ring_of(&mut slots);
        r.slot_mut(0).raw_mut().set_desc_type(DescType::FEmpty);
        assert_eq!(
            r.check_sw_owned(0, |t| {
                t.map(DescType::is_hw_owned_empty).unwrap_or(false)
            }),
            Err(RingError::Consistency)
        );
        assert_eq!(
            r.check_sw_owned(1, |t| {
                t.map(DescType::is_hw_owned_empty).unwrap_or(false)
            }),
            Ok(())
        );
    }
}
