// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw descriptor layout and typed accessors.
//!
//! Descriptors are the records the gateway DMA engine parses out of ring
//! memory, so their layout is fixed: little-endian fields, no padding
//! surprises. We use `zerocopy` to pin that down and keep all bit-shifting in
//! this module; the rest of the crate works in terms of [`DescType`] and
//! [`RoutingMeta`] and never re-parses raw integers.

use drv_rswitch2_api::{PortId, Timestamp};
use drv_rswitch2_api::config::PortMask;
use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Largest segment one descriptor can describe (12-bit size field).
pub const SEG_SIZE_MAX: usize = 4095;

/// Descriptor type, the high nibble of `die_dt`. This is the ownership
/// protocol between software and hardware: `FEmpty*` types are
/// hardware-owned RX slots, data types are software-visible completed
/// frames (RX) or committed frames in flight (TX), and the link types
/// terminate descriptor chains.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DescType {
    /// Chain terminator pointing back into the ring (self-referencing
    /// trailer for hardware wraparound).
    LinkFix,
    /// Link to an empty chain end.
    LEmpty,
    /// End of sequence.
    Eos,
    /// Complete frame in a single descriptor.
    FSingle,
    /// First segment of a multi-descriptor frame.
    FStart,
    /// Middle segment.
    FMid,
    /// Final segment.
    FEnd,
    /// Empty slot owned by hardware (RX: awaiting a frame).
    FEmpty,
    /// Empty, reserved as the first of a multi-segment group.
    FEmptyStart,
    /// Empty, reserved as a middle segment.
    FEmptyMid,
    /// Empty, reserved as a final segment.
    FEmptyEnd,
}

impl DescType {
    pub fn bits(self) -> u8 {
        match self {
            DescType::LinkFix => 0x1,
            DescType::LEmpty => 0x2,
            DescType::Eos => 0x3,
            DescType::FSingle => 0x8,
            DescType::FStart => 0x9,
            DescType::FMid => 0xA,
            DescType::FEnd => 0xB,
            DescType::FEmpty => 0xC,
            DescType::FEmptyStart => 0xD,
            DescType::FEmptyMid => 0xE,
            DescType::FEmptyEnd => 0xF,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x1 => Some(DescType::LinkFix),
            0x2 => Some(DescType::LEmpty),
            0x3 => Some(DescType::Eos),
            0x8 => Some(DescType::FSingle),
            0x9 => Some(DescType::FStart),
            0xA => Some(DescType::FMid),
            0xB => Some(DescType::FEnd),
            0xC => Some(DescType::FEmpty),
            0xD => Some(DescType::FEmptyStart),
            0xE => Some(DescType::FEmptyMid),
            0xF => Some(DescType::FEmptyEnd),
            _ => None,
        }
    }

    /// True for the `FEmpty*` family: the hardware owns the slot and may
    /// write it at any time. Software must not touch the descriptor body.
    pub fn is_hw_owned_empty(self) -> bool {
        matches!(
            self,
            DescType::FEmpty
                | DescType::FEmptyStart
                | DescType::FEmptyMid
                | DescType::FEmptyEnd
        )
    }

    /// True for the data-bearing types.
    pub fn is_data(self) -> bool {
        matches!(
            self,
            DescType::FSingle
                | DescType::FStart
                | DescType::FMid
                | DescType::FEnd
        )
    }

    /// True if this type terminates a frame (a complete frame is
    /// `FSingle`, or `FStart` (`FMid`)* `FEnd`).
    pub fn is_frame_end(self) -> bool {
        matches!(self, DescType::FSingle | DescType::FEnd)
    }
}

/// The 8-byte base descriptor: size, type, and a 40-bit buffer bus address.
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RawDesc {
    info_ds: U16,
    die_dt: u8,
    dptr_hi: u8,
    dptr_lo: U32,
}

impl RawDesc {
    pub const fn zeroed() -> Self {
        RawDesc {
            info_ds: U16::ZERO,
            die_dt: 0,
            dptr_hi: 0,
            dptr_lo: U32::ZERO,
        }
    }

    /// Segment size in bytes, 0..=4095.
    pub fn size(&self) -> usize {
        (self.info_ds.get() & 0x0FFF) as usize
    }

    pub fn set_size(&mut self, size: usize) {
        debug_assert!(size <= SEG_SIZE_MAX);
        let keep = self.info_ds.get() & !0x0FFF;
        self.info_ds.set(keep | (size as u16 & 0x0FFF));
    }

    pub fn desc_type(&self) -> Option<DescType> {
        DescType::from_bits(self.die_dt >> 4)
    }

    /// Sets the descriptor type, preserving the interrupt-index nibble.
    ///
    /// For a committed TX chain head this must be the *last* write to the
    /// chain; see `Ring::commit`.
    pub fn set_desc_type(&mut self, ty: DescType) {
        self.die_dt = (ty.bits() << 4) | (self.die_dt & 0x0F);
    }

    /// Interrupt index (low nibble of `die_dt`).
    pub fn die(&self) -> u8 {
        self.die_dt & 0x0F
    }

    pub fn set_die(&mut self, die: u8) {
        self.die_dt = (self.die_dt & 0xF0) | (die & 0x0F);
    }

    /// 40-bit buffer bus address.
    pub fn bus_addr(&self) -> u64 {
        ((self.dptr_hi as u64) << 32) | self.dptr_lo.get() as u64
    }

    pub fn set_bus_addr(&mut self, addr: u64) {
        debug_assert_eq!(addr >> 40, 0);
        self.dptr_hi = (addr >> 32) as u8;
        self.dptr_lo.set(addr as u32);
    }
}

/// Routing metadata carried in the `info1` field of extended descriptors,
/// decoded exactly once at the ring boundary.
///
/// Layout within the 64-bit field:
/// - bits 0..16: destination port vector
/// - bits 16..24: CPU sub-destination (0xFF = none)
/// - bits 24..32: source port (RX) / unused (TX)
/// - bits 32..40: timestamp tag
/// - bit 40: timestamp capture requested (TX)
/// - bit 41: timestamp fields valid (RX)
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RoutingMeta {
    pub dest: PortMask,
    pub csd: Option<u8>,
    pub src_port: u8,
    pub tag: u8,
    pub timestamp_req: bool,
    pub has_timestamp: bool,
}

const CSD_NONE: u8 = 0xFF;

impl RoutingMeta {
    pub fn encode(&self) -> u64 {
        let mut v = self.dest.0 & 0xFFFF;
        v |= (self.csd.unwrap_or(CSD_NONE) as u64) << 16;
        v |= (self.src_port as u64) << 24;
        v |= (self.tag as u64) << 32;
        if self.timestamp_req {
            v |= 1 << 40;
        }
        if self.has_timestamp {
            v |= 1 << 41;
        }
        v
    }

    pub fn decode(v: u64) -> Self {
        let csd = (v >> 16) as u8;
        RoutingMeta {
            dest: PortMask(v & 0xFFFF),
            csd: if csd == CSD_NONE { None } else { Some(csd) },
            src_port: (v >> 24) as u8,
            tag: (v >> 32) as u8,
            timestamp_req: v & (1 << 40) != 0,
            has_timestamp: v & (1 << 41) != 0,
        }
    }

    /// The port an RX frame should be attributed to.
    pub fn source(&self) -> PortId {
        PortId(self.src_port)
    }
}

/// TX descriptor: base + routing metadata.
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ExtDesc {
    pub desc: RawDesc,
    info1: U64,
}

impl ExtDesc {
    pub const fn zeroed() -> Self {
        ExtDesc {
            desc: RawDesc::zeroed(),
            info1: U64::ZERO,
        }
    }

    pub fn routing(&self) -> RoutingMeta {
        RoutingMeta::decode(self.info1.get())
    }

    pub fn set_routing(&mut self, meta: RoutingMeta) {
        self.info1.set(meta.encode());
    }
}

/// RX descriptor: base + routing metadata + inline timestamp.
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ExtTsDesc {
    pub desc: RawDesc,
    info1: U64,
    ts_nsec: U32,
    ts_sec: U32,
}

impl ExtTsDesc {
    pub const fn zeroed() -> Self {
        ExtTsDesc {
            desc: RawDesc::zeroed(),
            info1: U64::ZERO,
            ts_nsec: U32::ZERO,
            ts_sec: U32::ZERO,
        }
    }

    pub fn routing(&self) -> RoutingMeta {
        RoutingMeta::decode(self.info1.get())
    }

    pub fn set_routing(&mut self, meta: RoutingMeta) {
        self.info1.set(meta.encode());
    }

    pub fn timestamp(&self) -> Timestamp {
        Timestamp {
            sec: self.ts_sec.get(),
            nsec: self.ts_nsec.get(),
        }
    }

    pub fn set_timestamp(&mut self, ts: Timestamp) {
        self.ts_sec.set(ts.sec);
        self.ts_nsec.set(ts.nsec);
    }
}

/// Timestamp completion record, posted by hardware to the gateway's
/// timestamp queue: the 8-bit tag echoed from the transmitted frame's
/// routing metadata, the port that captured it, and the capture time.
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct TsDesc {
    info_ds: U16,
    die_dt: u8,
    tag: u8,
    src_port: u8,
    _rsvd: [u8; 3],
    ts_nsec: U32,
    ts_sec: U32,
}

impl TsDesc {
    pub const fn zeroed() -> Self {
        TsDesc {
            info_ds: U16::ZERO,
            die_dt: 0,
            tag: 0,
            src_port: 0,
            _rsvd: [0; 3],
            ts_nsec: U32::ZERO,
            ts_sec: U32::ZERO,
        }
    }

    pub fn desc_type(&self) -> Option<DescType> {
        DescType::from_bits(self.die_dt >> 4)
    }

    pub fn set_desc_type(&mut self, ty: DescType) {
        self.die_dt = (ty.bits() << 4) | (self.die_dt & 0x0F);
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn port(&self) -> PortId {
        PortId(self.src_port)
    }

    pub fn timestamp(&self) -> Timestamp {
        Timestamp {
            sec: self.ts_sec.get(),
            nsec: self.ts_nsec.get(),
        }
    }

    #[cfg(test)]
    pub fn post(tag: u8, port: PortId, ts: Timestamp) -> Self {
        let mut d = TsDesc::zeroed();
        d.tag = tag;
        d.src_port = port.0;
        d.ts_nsec.set(ts.nsec);
        d.ts_sec.set(ts.sec);
        d.set_desc_type(DescType::FSingle);
        d
    }
}

/// Implemented by the slot types a [`crate::ring::Ring`] can hold.
pub trait Slot: Copy {
    fn raw(&self) -> &RawDesc;
    fn raw_mut(&mut self) -> &mut RawDesc;
}

impl Slot for ExtDesc {
    fn raw(&self) -> &RawDesc {
        &self.desc
    }
    fn raw_mut(&mut self) -> &mut RawDesc {
        &mut self.desc
    }
}

impl Slot for ExtTsDesc {
    fn raw(&self) -> &RawDesc {
        &self.desc
    }
    fn raw_mut(&mut self) -> &mut RawDesc {
        &mut self.desc
    }
}

static_assertions::const_assert_eq!(core::mem::size_of::<RawDesc>(), 8);
static_assertions::const_assert_eq!(core::mem::size_of::<ExtDesc>(), 16);
static_assertions::const_assert_eq!(core::mem::size_of::<ExtTsDesc>(), 24);
static_assertions::const_assert_eq!(core::mem::size_of::<TsDesc>(), 16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desc_type_bits_round_trip() {
        for ty in [
            DescType::LinkFix,
            DescType::LEmpty,
            DescType::Eos,
            DescType::FSingle,
            DescType::FStart,
            DescType::FMid,
            DescType::FEnd,
            DescType::FEmpty,
            DescType::FEmptyStart,
            DescType::FEmptyMid,
            DescType::FEmptyEnd,
        ] {
            assert_eq!(DescType::from_bits(ty.bits()), Some(ty));
        }
        assert_eq!(DescType::from_bits(0x0), None);
        assert_eq!(DescType::from_bits(0x7), None);
    }

    #[test]
    fn size_field_does_not_clobber_flags() {
        let mut d = RawDesc::zeroed();
        d.set_size(4095);
        d.set_desc_type(DescType::FSingle);
        d.set_die(3);
        assert_eq!(d.size(), 4095);
        assert_eq!(d.desc_type(), Some(DescType::FSingle));
        assert_eq!(d.die(), 3);
        d.set_size(0);
        assert_eq!(d.desc_type(), Some(DescType::FSingle));
    }

    #[test]
    fn bus_addr_40_bits() {
        let mut d = RawDesc::zeroed();
        d.set_bus_addr(0xFF_1234_5678);
        assert_eq!(d.bus_addr(), 0xFF_1234_5678);
    }

    #[test]
    fn routing_meta_round_trip() {
        let m = RoutingMeta {
            dest: PortMask(0b1010),
            csd: Some(2),
            src_port: 1,
            tag: 0x7E,
            timestamp_req: true,
            has_timestamp: false,
        };
        assert_eq!(RoutingMeta::decode(m.encode()), m);

        let none = RoutingMeta::default();
        assert_eq!(RoutingMeta::decode(none.encode()).csd, None);
    }
}
