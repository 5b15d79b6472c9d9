// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TX submission and reclaim for one descriptor chain.
//!
//! A frame is split into at most two DMA segments: a copied head segment in
//! a queue-owned, DMA-aligned bounce region (which also absorbs padding to
//! the minimum Ethernet length), and the remainder of the caller's buffer
//! mapped in place. Short frames fit entirely in the head segment and go out
//! as a single descriptor.
//!
//! The chain is committed by writing the head descriptor's type last, with a
//! release fence in between (see [`Ring::commit`]), then the chain's
//! doorbell bit is raised. The hardware signals completion by rewriting the
//! descriptor type back to the empty family; [`TxQueue::reclaim`] walks
//! completed chains in order and unmaps their segments.

use crate::desc::{DescType, ExtDesc, RoutingMeta};
use crate::regs;
use crate::ring::Ring;
use crate::tstamp::{TagFifo, TAG_INVALID};
use crate::{DmaMapper, FrameId, HeadBuffer, MAX_FRAME_LEN, MIN_FRAME_LEN, TX_HEAD_LEN};
use drv_rswitch2_api::config::PortMask;
use drv_rswitch2_api::{PortId, RingError, Rswitch2Rw, TxError};

#[derive(Copy, Clone, Debug)]
struct Mapping {
    addr: u64,
    len: usize,
}

/// Per-slot bookkeeping, recorded at a chain's head slot index. The caller
/// supplies one per ring slot; contents are managed by the queue.
#[derive(Copy, Clone, Debug, Default)]
pub struct TxMeta {
    frame: FrameId,
    segs: u8,
    head: Option<(u64, usize)>,
    body: Option<(u64, usize)>,
}

impl TxMeta {
    pub const INIT: TxMeta = TxMeta {
        frame: FrameId(0),
        segs: 0,
        head: None,
        body: None,
    };
}

pub struct TxQueue<'s> {
    ring: Ring<'s, ExtDesc>,
    heads: &'s mut [HeadBuffer],
    meta: &'s mut [TxMeta],
    chain: u8,
    port: PortId,
    next_frame: u32,
    running: bool,
    /// Latched on a ring consistency error; only teardown clears the queue
    /// after that.
    failed: bool,
}

impl<'s> TxQueue<'s> {
    /// Builds the queue over caller-provided storage. `slots` includes the
    /// trailer; `heads` and `meta` must each cover one entry per ring slot.
    pub fn new(
        slots: &'s mut [ExtDesc],
        base: u64,
        heads: &'s mut [HeadBuffer],
        meta: &'s mut [TxMeta],
        chain: u8,
        port: PortId,
    ) -> Self {
        let ring = Ring::new(slots, base);
        assert_eq!(heads.len(), ring.capacity());
        assert_eq!(meta.len(), ring.capacity());
        TxQueue {
            ring,
            heads,
            meta,
            chain,
            port,
            next_frame: 0,
            running: false,
            failed: false,
        }
    }

    pub fn chain(&self) -> u8 {
        self.chain
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn base(&self) -> u64 {
        self.ring.base()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stops accepting frames. Outstanding descriptors remain until
    /// [`Self::reclaim`] with `force` drains them; the engine drops the
    /// port's outstanding timestamp tags separately, since their
    /// completions will never be delivered once the doorbell is masked.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn in_flight(&self) -> usize {
        self.ring.in_flight()
    }

    /// Submits one frame for transmission.
    ///
    /// `tags` is the owning port's timestamp tag FIFO, shared by every TX
    /// queue on the port. On success the chain is committed and the
    /// doorbell has been rung; the returned [`FrameId`] identifies the
    /// frame in timestamp completions. On any error nothing was handed to
    /// the hardware: a mapping failure unwinds already-mapped segments and
    /// the allocated timestamp tag before returning.
    pub fn submit<R: Rswitch2Rw, M: DmaMapper>(
        &mut self,
        rw: &R,
        tags: &mut TagFifo,
        mapper: &mut M,
        frame: &[u8],
        dest: PortMask,
        csd: Option<u8>,
        timestamp_req: bool,
    ) -> Result<FrameId, TxError> {
        if self.failed || !self.running {
            return Err(TxError::QueueStopped);
        }
        if frame.len() > MAX_FRAME_LEN {
            return Err(TxError::TooLong);
        }

        // Padding lands in the head segment, so the head length is the
        // padded length for short frames and the bounce-region size
        // otherwise.
        let padded = frame.len().max(MIN_FRAME_LEN);
        let single = padded <= TX_HEAD_LEN;
        let segs = if single { 1 } else { 2 };

        if self.ring.capacity() - self.ring.in_flight() < segs {
            return Err(TxError::RingFull);
        }

        let id = FrameId(self.next_frame);
        let tag = if timestamp_req {
            match tags.allocate(self.chain, id) {
                Some(t) => Some(t),
                None => return Err(TxError::TimestampBacklog),
            }
        } else {
            None
        };

        let head_slot = self.ring.producer_slot(0);
        let head_len = if single { padded } else { TX_HEAD_LEN };
        let copy_len = frame.len().min(head_len);
        let bounce = &mut self.heads[head_slot].0;
        bounce[..copy_len].copy_from_slice(&frame[..copy_len]);
        bounce[copy_len..head_len].fill(0);

        let head_map = match mapper.map(&self.heads[head_slot].0[..head_len])
        {
            Ok(addr) => (addr, head_len),
            Err(_) => {
                if let Some(t) = tag {
                    tags.cancel(t);
                }
                return Err(TxError::MapFailed);
            }
        };

        let body_map = if single {
            None
        } else {
            match mapper.map(&frame[TX_HEAD_LEN..]) {
                Ok(addr) => Some((addr, frame.len() - TX_HEAD_LEN)),
                Err(_) => {
                    mapper.unmap(head_map.0, head_map.1);
                    if let Some(t) = tag {
                        tags.cancel(t);
                    }
                    return Err(TxError::MapFailed);
                }
            }
        };

        // Routing metadata rides in the chain's *final* descriptor; the
        // engine latches it when it consumes the end of the chain.
        let routing = RoutingMeta {
            dest,
            csd,
            src_port: 0,
            tag: tag.unwrap_or(TAG_INVALID),
            timestamp_req,
            has_timestamp: false,
        };

        // Stage the chain back to front; the head's type field is written
        // by commit, after everything else is in place.
        if let Some((addr, len)) = body_map {
            let idx = self.ring.producer_slot(1);
            let slot = self.ring.slot_mut(idx);
            *slot = ExtDesc::zeroed();
            slot.desc.set_size(len);
            slot.desc.set_bus_addr(addr);
            slot.set_routing(routing);
            slot.desc.set_desc_type(DescType::FEnd);
        }

        let slot = self.ring.slot_mut(head_slot);
        *slot = ExtDesc::zeroed();
        slot.desc.set_size(head_len);
        slot.desc.set_bus_addr(head_map.0);
        if single {
            slot.set_routing(routing);
        }

        self.meta[head_slot] = TxMeta {
            frame: id,
            segs: segs as u8,
            head: Some(head_map),
            body: body_map,
        };

        let head_type = if single {
            DescType::FSingle
        } else {
            DescType::FStart
        };
        self.ring.commit(segs, head_type);

        rw.write(regs::gwtrc(self.chain), regs::chain_bit(self.chain))?;

        self.next_frame = self.next_frame.wrapping_add(1);
        Ok(id)
    }

    /// Reclaims completed chains in submission order, unmapping their
    /// segments. Returns the number of frames reclaimed.
    ///
    /// A consistency error latches the queue failed: further submissions
    /// are rejected with `QueueStopped`, and the only way forward is
    /// teardown (whose forced reclaim skips the completion check).
    ///
    /// With `force`, chains are reclaimed regardless of completion state;
    /// this is only legal during queue teardown, after the chain has been
    /// disabled, since it frees buffers the hardware might otherwise still
    /// read.
    pub fn reclaim<M: DmaMapper>(
        &mut self,
        mapper: &mut M,
        force: bool,
    ) -> Result<usize, RingError> {
        let mut reclaimed = 0;
        while let Some(idx) = self.ring.next_used_slot() {
            if !force {
                match self.ring.slot(idx).desc.desc_type() {
                    Some(t) if t.is_hw_owned_empty() => (),
                    Some(t) if t.is_data() => break,
                    _ => {
                        self.failed = true;
                        self.running = false;
                        return Err(RingError::Consistency);
                    }
                }
            }
            let meta = core::mem::take(&mut self.meta[idx]);
            if let Some((addr, len)) = meta.head {
                mapper.unmap(addr, len);
            }
            if let Some((addr, len)) = meta.body {
                mapper.unmap(addr, len);
            }
            self.ring.advance_consumed(meta.segs as usize);
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    #[cfg(test)]
    pub(crate) fn head_bytes(&self, idx: usize) -> &[u8] {
        &self.heads[idx].0[..self.ring.slot(idx).desc.size()]
    }

    #[cfg(test)]
    pub(crate) fn slot_routing(&self, idx: usize) -> RoutingMeta {
        self.ring.slot(idx).routing()
    }

    #[cfg(test)]
    pub(crate) fn hw_complete_next(&mut self) {
        // Simulates the engine consuming the chain at the consumer
        // position: every slot of the chain is rewritten to the empty
        // family.
        let idx = self.ring.next_used_slot().unwrap();
        let segs = self.meta[idx].segs as usize;
        for n in 0..segs {
            let i = (idx + n) % self.ring.capacity();
            self.ring.slot_mut(i).desc.set_desc_type(DescType::FEmpty);
        }
    }
}
