// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Timestamp correlation.
//!
//! Transmitted frames that request a timestamp carry an 8-bit tag in their
//! routing metadata; the hardware echoes the tag back in a completion record
//! on the gateway's timestamp queue, generally *after* the TX completion of
//! the frame itself. This module matches the two halves up.
//!
//! Tag value 0xFF is reserved as the invalid/wrap marker, so at most 255
//! timestamp requests can be outstanding per port at once.

use crate::desc::{DescType, TsDesc};
use crate::FrameId;
use drv_rswitch2_api::{PortId, Timestamp};
use ringbuf::{ringbuf, ringbuf_entry};

/// Reserved tag value; never allocated.
pub const TAG_INVALID: u8 = 0xFF;

/// Maximum outstanding timestamp requests per port.
pub const TAGS_MAX: usize = 255;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    UnmatchedCompletion { tag: u8 },
}

ringbuf!(Trace, 16, Trace::None);

#[derive(Copy, Clone, Debug)]
struct TagEntry {
    tag: u8,
    chain: u8,
    frame: FrameId,
}

/// FIFO of outstanding `(tag, frame)` pairs for one port.
///
/// The tag space is per *port*: a port's TX queues all draw from the same
/// FIFO, so outstanding tags stay unique port-wide even when the port has
/// more than one queue. Each entry records the chain it was allocated for,
/// so completions can be attributed to the right queue and a queue's
/// entries can be dropped at teardown.
#[derive(Default)]
pub struct TagFifo {
    entries: heapless::Vec<TagEntry, TAGS_MAX>,
    next: u8,
}

impl TagFifo {
    pub const fn new() -> Self {
        TagFifo {
            entries: heapless::Vec::new(),
            next: 0,
        }
    }

    /// Allocates the next tag and records `frame` as waiting on it. Returns
    /// `None` when all 255 tags are outstanding.
    ///
    /// Tags are allocated from a monotonically increasing counter mod 255
    /// (skipping [`TAG_INVALID`]), but a tag still in flight is skipped, so
    /// two outstanding entries never share a value even when completions
    /// arrive out of order.
    pub fn allocate(&mut self, chain: u8, frame: FrameId) -> Option<u8> {
        if self.entries.is_full() {
            return None;
        }
        // Not full means at most 254 of the 255 usable values are taken, so
        // this loop always terminates with a free tag.
        let mut tag = self.next;
        while self.in_flight(tag) {
            tag = Self::succ(tag);
        }
        self.next = Self::succ(tag);

        // Capacity was checked above.
        let _ = self.entries.push(TagEntry { tag, chain, frame });
        Some(tag)
    }

    fn succ(tag: u8) -> u8 {
        if tag + 1 == TAG_INVALID {
            0
        } else {
            tag + 1
        }
    }

    fn in_flight(&self, tag: u8) -> bool {
        self.entries.iter().any(|e| e.tag == tag)
    }

    /// Matches a completion against the FIFO. On a match the entry is
    /// removed and `notify` is invoked with the owning chain, frame, and
    /// the timestamp; returns whether a match was found.
    ///
    /// An unmatched tag is dropped -- late or duplicated completions are a
    /// hardware reality and must not wedge anything -- but the drop is
    /// recorded in the trace ring for visibility.
    pub fn complete(
        &mut self,
        tag: u8,
        ts: Timestamp,
        notify: impl FnOnce(u8, FrameId, Timestamp),
    ) -> bool {
        // Linear scan; the list stays short because completions are
        // delivered promptly.
        match self.entries.iter().position(|e| e.tag == tag) {
            Some(i) => {
                let e = self.entries.remove(i);
                notify(e.chain, e.frame, ts);
                true
            }
            None => {
                ringbuf_entry!(Trace::UnmatchedCompletion { tag });
                false
            }
        }
    }

    /// Returns a tag allocated moments ago without waiting for its
    /// completion. Used to unwind a submission that fails after tag
    /// allocation; a later completion for this tag will be dropped as
    /// unmatched.
    pub fn cancel(&mut self, tag: u8) {
        if let Some(i) = self.entries.iter().position(|e| e.tag == tag) {
            self.entries.remove(i);
        }
    }

    pub fn outstanding(&self) -> usize {
        self.entries.len()
    }

    /// Drops all outstanding entries (port stop).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops the entries belonging to one chain (queue teardown); entries
    /// from the port's other queues stay outstanding.
    pub fn clear_chain(&mut self, chain: u8) {
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].chain == chain {
                self.entries.remove(i);
            } else {
                i += 1;
            }
        }
    }

    #[cfg(test)]
    pub fn assert_tags_unique(&self) {
        for (i, a) in self.entries.iter().enumerate() {
            for b in &self.entries[i + 1..] {
                assert_ne!(a.tag, b.tag);
            }
        }
    }
}

/// The gateway's timestamp completion ring: a small borrowed array of
/// [`TsDesc`] records the hardware posts into.
pub struct TsRing<'s> {
    slots: &'s mut [TsDesc],
    next: usize,
}

impl<'s> TsRing<'s> {
    pub fn new(slots: &'s mut [TsDesc]) -> Self {
        for s in slots.iter_mut() {
            s.set_desc_type(DescType::FEmpty);
        }
        Self { slots, next: 0 }
    }

    /// Consumes posted completion records in ring order, handing each
    /// `(port, tag, timestamp)` to `f` and returning the slot to the
    /// hardware.
    pub fn poll(&mut self, mut f: impl FnMut(PortId, u8, Timestamp)) -> usize {
        let mut n = 0;
        loop {
            let slot = &mut self.slots[self.next];
            match slot.desc_type() {
                Some(t) if t.is_data() => {
                    f(slot.port(), slot.tag(), slot.timestamp());
                    slot.set_desc_type(DescType::FEmpty);
                    self.next = (self.next + 1) % self.slots.len();
                    n += 1;
                }
                _ => break,
            }
        }
        n
    }

    #[cfg(test)]
    pub fn inject(&mut self, at: usize, d: TsDesc) {
        self.slots[at] = d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(nsec: u32) -> Timestamp {
        Timestamp { sec: 1, nsec }
    }

    #[test]
    fn tags_allocate_monotonically_and_skip_invalid() {
        let mut f = TagFifo::new();
        for i in 0..5 {
            assert_eq!(f.allocate(0, FrameId(i)), Some(i as u8));
        }
        // Walk the counter up to the wrap point.
        f.next = 0xFE;
        assert_eq!(f.allocate(0, FrameId(99)), Some(0xFE));
        // 0xFF is never handed out.
        assert_eq!(f.allocate(0, FrameId(100)), Some(0));
        f.assert_tags_unique();
    }

    #[test]
    fn wrap_skips_tags_still_in_flight() {
        let mut f = TagFifo::new();
        let t0 = f.allocate(0, FrameId(0)).unwrap();
        assert_eq!(t0, 0);
        // Wrap the counter all the way around without completing tag 0.
        f.next = 0;
        assert_eq!(f.allocate(0, FrameId(1)), Some(1));
        f.assert_tags_unique();
    }

    #[test]
    fn completes_out_of_order() {
        let mut f = TagFifo::new();
        let t0 = f.allocate(0, FrameId(10)).unwrap();
        let t1 = f.allocate(0, FrameId(11)).unwrap();
        let t2 = f.allocate(0, FrameId(12)).unwrap();

        let mut got = Vec::new();
        assert!(f.complete(t1, ts(100), |_, fr, t| got.push((fr, t))));
        assert!(f.complete(t0, ts(200), |_, fr, t| got.push((fr, t))));
        assert!(f.complete(t2, ts(300), |_, fr, t| got.push((fr, t))));

        assert_eq!(
            got,
            vec![
                (FrameId(11), ts(100)),
                (FrameId(10), ts(200)),
                (FrameId(12), ts(300)),
            ]
        );
        assert_eq!(f.outstanding(), 0);
    }

    #[test]
    fn unmatched_completion_is_dropped() {
        let mut f = TagFifo::new();
        let mut hits = 0;
        assert!(!f.complete(7, ts(1), |_, _, _| hits += 1));
        assert_eq!(hits, 0);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut f = TagFifo::new();
        for i in 0..TAGS_MAX as u32 {
            assert!(f.allocate(0, FrameId(i)).is_some());
        }
        assert_eq!(f.allocate(0, FrameId(1000)), None);
        f.assert_tags_unique();
    }

    #[test]
    fn chains_on_one_port_share_the_tag_space() {
        let mut f = TagFifo::new();
        // Both queues' frame counters start at zero; the shared FIFO still
        // hands out distinct tags and routes each completion back to the
        // chain that allocated it.
        let ta = f.allocate(3, FrameId(0)).unwrap();
        let tb = f.allocate(4, FrameId(0)).unwrap();
        assert_ne!(ta, tb);
        f.assert_tags_unique();

        let mut got = Vec::new();
        assert!(f.complete(tb, ts(1), |c, fr, _| got.push((c, fr))));
        assert!(f.complete(ta, ts(2), |c, fr, _| got.push((c, fr))));
        assert_eq!(got, vec![(4, FrameId(0)), (3, FrameId(0))]);
    }

    #[test]
    fn clear_chain_spares_the_other_queues() {
        let mut f = TagFifo::new();
        f.allocate(3, FrameId(0)).unwrap();
        let tb = f.allocate(4, FrameId(1)).unwrap();
        f.allocate(3, FrameId(2)).unwrap();

        f.clear_chain(3);
        assert_eq!(f.outstanding(), 1);
        let mut got = None;
        assert!(f.complete(tb, ts(9), |c, fr, _| got = Some((c, fr))));
        assert_eq!(got, Some((4, FrameId(1))));
    }

    #[test]
    fn ts_ring_consumes_in_order() {
        let mut slots = [TsDesc::zeroed(); 4];
        let mut ring = TsRing::new(&mut slots);
        ring.inject(0, TsDesc::post(3, PortId(1), ts(10)));
        ring.inject(1, TsDesc::post(4, PortId(2), ts(20)));

        let mut got = Vec::new();
        let n = ring.poll(|p, tag, t| got.push((p, tag, t)));
        assert_eq!(n, 2);
        assert_eq!(got[0], (PortId(1), 3, ts(10)));
        assert_eq!(got[1], (PortId(2), 4, ts(20)));

        // Nothing further posted.
        assert_eq!(ring.poll(|_, _, _| panic!("no completions")), 0);
    }
}
