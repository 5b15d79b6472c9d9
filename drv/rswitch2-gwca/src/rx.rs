// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Budgeted RX polling for one descriptor chain.
//!
//! The queue keeps every ring slot posted to the hardware with a mapped
//! buffer. [`RxQueue::poll`] consumes completed slots in ring order, demuxes
//! each frame to a port using the descriptor's routing metadata (or the
//! queue's fixed port, for chains dedicated to the gateway pseudo-port), and
//! immediately refills what it consumed.
//!
//! A slot whose buffer could not be mapped during refill is poisoned: it is
//! handed to the hardware with `size = 0`, and skipped without delivery when
//! it comes back around. One bad buffer therefore costs one frame, not the
//! ring.

use crate::desc::{DescType, ExtTsDesc};
use crate::ring::Ring;
use crate::{Buffer, DmaMapper, BUF_SIZE};
use drv_rswitch2_api::{PortId, RingError, RxError, Timestamp};

/// Per-slot bookkeeping. The caller supplies one per ring slot; contents
/// are managed by the queue.
#[derive(Copy, Clone, Debug, Default)]
pub struct RxMeta {
    map: Option<(u64, usize)>,
}

impl RxMeta {
    pub const INIT: RxMeta = RxMeta { map: None };
}

/// Outcome of one poll pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PollResult {
    /// Frames handed to the delivery callback.
    pub delivered: usize,
    /// True if a completed frame is still waiting (budget exhausted); the
    /// caller should re-schedule the poll rather than re-arm the interrupt.
    pub pending: bool,
}

pub struct RxQueue<'s> {
    ring: Ring<'s, ExtTsDesc>,
    bufs: &'s mut [Buffer],
    meta: &'s mut [RxMeta],
    chain: u8,
    /// Demux override for chains dedicated to the gateway pseudo-port; when
    /// set, routing metadata's source port is ignored.
    fixed_port: Option<PortId>,
    running: bool,
}

impl<'s> RxQueue<'s> {
    pub fn new(
        slots: &'s mut [ExtTsDesc],
        base: u64,
        bufs: &'s mut [Buffer],
        meta: &'s mut [RxMeta],
        chain: u8,
        fixed_port: Option<PortId>,
    ) -> Self {
        let ring = Ring::new(slots, base);
        assert_eq!(bufs.len(), ring.capacity());
        assert_eq!(meta.len(), ring.capacity());
        RxQueue {
            ring,
            bufs,
            meta,
            chain,
            fixed_port,
            running: false,
        }
    }

    pub fn chain(&self) -> u8 {
        self.chain
    }

    pub fn base(&self) -> u64 {
        self.ring.base()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Posts every slot to the hardware and starts the queue. Must run
    /// before the chain is enabled.
    pub fn start<M: DmaMapper>(&mut self, mapper: &mut M) {
        while !self.ring.is_full() {
            self.post_next(mapper);
        }
        self.running = true;
    }

    /// Maps a buffer into the slot at the producer position and hands the
    /// slot to the hardware. Only after the mapping succeeds is the size
    /// written; the ownership-transfer write of the type field comes last,
    /// behind a release fence, via `commit`. A mapping failure posts the
    /// slot poisoned instead.
    fn post_next<M: DmaMapper>(&mut self, mapper: &mut M) {
        let idx = self.ring.producer_slot(0);
        let mapped = mapper.map(&self.bufs[idx].0).ok();
        let slot = self.ring.slot_mut(idx);
        *slot = ExtTsDesc::zeroed();
        match mapped {
            Some(addr) => {
                slot.desc.set_size(BUF_SIZE);
                slot.desc.set_bus_addr(addr);
                self.meta[idx] = RxMeta {
                    map: Some((addr, BUF_SIZE)),
                };
            }
            None => {
                slot.desc.set_size(0);
                self.meta[idx] = RxMeta { map: None };
            }
        }
        self.ring.commit(1, DescType::FEmpty);
    }

    /// Consumes up to `budget` completed slots, delivering each frame as
    /// `(bytes, timestamp, port)`, then refills everything consumed.
    ///
    /// Poisoned slots and frames the hardware truncated to zero length
    /// spend budget but are not delivered.
    pub fn poll<M: DmaMapper>(
        &mut self,
        mapper: &mut M,
        budget: usize,
        mut deliver: impl FnMut(&[u8], Option<Timestamp>, PortId),
    ) -> Result<PollResult, RxError> {
        if !self.running {
            return Ok(PollResult {
                delivered: 0,
                pending: false,
            });
        }

        let mut delivered = 0;
        let mut spent = 0;
        while spent < budget {
            let Some(idx) = self.ring.next_used_slot() else {
                break;
            };
            let slot = self.ring.slot(idx);
            let ty = slot.desc.desc_type();
            match ty {
                Some(t) if t.is_hw_owned_empty() => break,
                Some(t) if t.is_data() => (),
                _ => {
                    // Desynced ring; stop touching it. Only teardown and a
                    // rebuild bring the queue back.
                    self.running = false;
                    return Err(RxError::Ring(RingError::Consistency));
                }
            }

            let size = slot.desc.size();
            if size != 0 {
                let routing = slot.routing();
                let port = match self.fixed_port {
                    Some(p) => p,
                    None => routing.source(),
                };
                let ts = if routing.has_timestamp {
                    Some(slot.timestamp())
                } else {
                    None
                };
                deliver(&self.bufs[idx].0[..size], ts, port);
                delivered += 1;
            }

            if let Some((addr, len)) = self.meta[idx].map.take() {
                mapper.unmap(addr, len);
            }
            self.ring.advance_consumed(1);
            spent += 1;
        }

        // Refill phase: re-post everything consumed so the hardware never
        // starves behind a slow consumer.
        while !self.ring.is_full() {
            self.post_next(mapper);
        }

        let pending = match self.ring.next_used_slot() {
            Some(i) => self
                .ring
                .slot(i)
                .desc
                .desc_type()
                .is_some_and(|t| t.is_data()),
            None => false,
        };
        Ok(PollResult { delivered, pending })
    }

    /// Unmaps every posted buffer and stops the queue. The chain must
    /// already be disabled; after this the hardware holds no references
    /// into the buffer storage.
    pub fn teardown<M: DmaMapper>(&mut self, mapper: &mut M) {
        self.running = false;
        for meta in self.meta.iter_mut() {
            if let Some((addr, len)) = meta.map.take() {
                mapper.unmap(addr, len);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn hw_deliver(
        &mut self,
        frame: &[u8],
        src_port: u8,
        ts: Option<Timestamp>,
    ) {
        // Simulates the engine writing a frame into the oldest still-empty
        // posted slot: scan forward from the consumer position past slots
        // already holding staged frames.
        use crate::desc::RoutingMeta;
        let (_, consumed) = self.ring.indices();
        let cap = self.ring.capacity() as u64;
        let idx = (0..self.ring.in_flight())
            .map(|n| ((consumed + n as u64) % cap) as usize)
            .find(|&i| {
                self.ring
                    .slot(i)
                    .desc
                    .desc_type()
                    .is_some_and(DescType::is_hw_owned_empty)
            })
            .unwrap();
        self.bufs[idx].0[..frame.len()].copy_from_slice(frame);
        let slot = self.ring.slot_mut(idx);
        slot.desc.set_size(frame.len());
        slot.set_routing(RoutingMeta {
            src_port,
            has_timestamp: ts.is_some(),
            ..RoutingMeta::default()
        });
        if let Some(ts) = ts {
            slot.set_timestamp(ts);
        }
        slot.desc.set_desc_type(DescType::FSingle);
    }

    #[cfg(test)]
    fn hw_complete_poisoned(&mut self, idx: usize) {
        // A poisoned slot comes back around with a data type but size 0.
        assert_eq!(self.ring.slot(idx).desc.size(), 0);
        self.ring.slot_mut(idx).desc.set_desc_type(DescType::FSingle);
    }
}
