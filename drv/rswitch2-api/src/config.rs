// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Administrative configuration surface for the switch core.
//!
//! These are plain-old-data structures handed to the driver by the control
//! plane. Each table sub-config is a fixed-capacity list with an explicit
//! length (`heapless::Vec`), matching the hardware's fixed table sizes.

use crate::PortId;
use bitflags::bitflags;
use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Documented capacity of the MAC, VLAN, IP-stream and L3 routing hash
/// tables.
pub const HASH_TABLE_ENTRIES_MAX: usize = 1024;
/// Documented capacity of the L2/L3 update (routing rewrite) table.
pub const L23_UPDATE_ENTRIES_MAX: usize = 255;
/// Multicast chain table slots.
pub const MCAST_CHAIN_SLOTS: usize = 128;
/// Longest legal multicast fan-out chain.
pub const MCAST_CHAIN_LEN_MAX: usize = 7;
/// Byte-pattern filters per width class.
pub const FILTERS_PER_CLASS: usize = 4;
/// Cascade filter entries.
pub const CASCADE_FILTERS_MAX: usize = 4;
/// Underlying filter ids one cascade entry may AND together.
pub const CASCADE_REFS_MAX: usize = 7;

/// A set of destination ports, one bit per physical port.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct PortMask(pub u64);

impl PortMask {
    pub const EMPTY: PortMask = PortMask(0);

    /// Bit for `port`, or zero for ports past the mask width (notably the
    /// [`PortId::GATEWAY`] sentinel, which is never a destination).
    fn bit(port: PortId) -> u64 {
        1u64.checked_shl(u32::from(port.0)).unwrap_or(0)
    }

    pub fn single(port: PortId) -> Self {
        PortMask(Self::bit(port))
    }

    pub fn with(self, port: PortId) -> Self {
        PortMask(self.0 | Self::bit(port))
    }

    pub fn contains(self, port: PortId) -> bool {
        self.0 & Self::bit(port) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

bitflags! {
    /// Which key fields a table's hash equation folds in. Programmed per
    /// table family, consulted when computing an entry's hash index.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct HashFields: u16 {
        const DST_MAC = 1 << 0;
        const SRC_MAC = 1 << 1;
        const VLAN = 1 << 2;
        const SRC_IP = 1 << 3;
        const DST_IP = 1 << 4;
        const SRC_PORT = 1 << 5;
        const DST_PORT = 1 << 6;
    }
}

bitflags! {
    /// Per-tag-class ingress pass filter. A set bit means frames of that
    /// class are accepted on the port; a clear bit means they are rejected.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct TagClassAccept: u16 {
        const UNTAGGED = 1 << 0;
        const S_AND_C = 1 << 1;
        const S_AND_C_REJECT = 1 << 2;
        const C = 1 << 3;
        const C_REJECT = 1 << 4;
        const S_REJECT = 1 << 5;
        const S = 1 << 6;
        const R_TAG = 1 << 7;
        const NO_TAG = 1 << 8;
    }
}

bitflags! {
    /// Which forwarding table families a port consults at all.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct ActiveTables: u8 {
        const MAC = 1 << 0;
        const VLAN = 1 << 1;
        const IP_STREAM = 1 << 2;
        const L3 = 1 << 3;
    }
}

/// VLAN tag fields for one tag (C or S).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VlanTag {
    /// 12-bit VLAN id.
    pub vid: u16,
    /// 3-bit priority code point.
    pub pcp: u8,
    /// Drop-eligible indicator.
    pub dei: bool,
}

/// How frames are tagged on egress from a port.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum VlanEgressMode {
    /// Leave frames untouched.
    None,
    /// Insert the port's C-tag in software-supplied frames.
    CTag,
    /// Insert the port's S-tag in software-supplied frames.
    STag,
    /// Hardware inserts the C-tag from the port config.
    HwCTag,
    /// Hardware inserts the S-tag from the port config.
    HwSTag,
}

/// Per-port VLAN configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PortVlanConfig {
    pub port: PortId,
    /// True for the internal CPU-facing pseudo-port.
    pub cpu: bool,
    pub egress: VlanEgressMode,
    pub ctag: VlanTag,
    pub stag: VlanTag,
    pub accept: TagClassAccept,
}

/// Per-port forwarding defaults: which tables are consulted, and what to do
/// with frames whose key misses every consulted table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PortFwdDefaults {
    pub port: PortId,
    pub active: ActiveTables,
    pub reject_unknown_mac: bool,
    pub reject_unknown_vlan: bool,
    pub reject_unknown_ip: bool,
}

/// The forwarding decision a table entry carries.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Ports the frame is fanned out to.
    pub ports: PortMask,
    /// CPU sub-destination (RX queue selector) when the CPU is a target.
    pub csd: Option<u8>,
    /// Copy the frame to the mirror port as well.
    pub mirror: bool,
    /// Internal priority override, 0..=7.
    pub ipv: Option<u8>,
}

/// One MAC table entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MacEntry {
    pub mac: [u8; 6],
    pub dest: Destination,
    /// Ports this MAC is allowed to appear on as a source; frames from other
    /// ports are security-rejected by the hardware.
    pub src_lock: PortMask,
    /// Entry ages out like a hardware-learned one.
    pub dynamic: bool,
    /// Hardware must not re-learn/move this entry.
    pub learn_disable: bool,
    /// Source-port violations drop the frame rather than just flagging it.
    pub security: bool,
}

/// One VLAN table entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VlanEntry {
    /// 12-bit VLAN id.
    pub vid: u16,
    pub dest: Destination,
    pub learn_disable: bool,
    pub security: bool,
}

/// Frame format classification for IP-stream keys.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FrameFormat {
    Plain,
    Udp,
    Tcp,
}

/// One IPv4 stream table entry. Optional key fields participate in the
/// lookup only when the corresponding `hash` bit is set.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IpStreamEntry {
    pub dst_ip: [u8; 4],
    pub src_ip: Option<[u8; 4]>,
    pub dst_port: Option<u16>,
    pub src_port: Option<u16>,
    /// C-tag VLAN id included in the stream key, if any.
    pub vid: Option<u16>,
    pub format: FrameFormat,
    pub dest: Destination,
    pub security: bool,
}

/// One L3 routing entry: an IP pair key resolving to a destination plus a
/// reference into the L2/L3 update table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct L3Entry {
    pub src_ip: [u8; 4],
    pub dst_ip: [u8; 4],
    pub format: FrameFormat,
    pub dest: Destination,
    /// Index of the rewrite template applied on egress.
    pub routing_number: u8,
    pub security: bool,
}

bitflags! {
    /// Which rewrites an update template applies.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct RewriteOps: u8 {
        const DST_MAC = 1 << 0;
        const C_TAG = 1 << 1;
        const S_TAG = 1 << 2;
        const TTL_DECREMENT = 1 << 3;
        const ROUTING_TAG = 1 << 4;
    }
}

// The flags types serialize as their raw bits. Unknown bits survive a
// round trip; `bitflags` keeps them via `from_bits_retain`.
macro_rules! serde_as_bits {
    ($($ty:ident: $repr:ty,)*) => {
        $(
            impl Serialize for $ty {
                fn serialize<S: serde::Serializer>(
                    &self,
                    serializer: S,
                ) -> Result<S::Ok, S::Error> {
                    self.bits().serialize(serializer)
                }
            }

            impl<'de> Deserialize<'de> for $ty {
                fn deserialize<D: serde::Deserializer<'de>>(
                    deserializer: D,
                ) -> Result<Self, D::Error> {
                    Ok(Self::from_bits_retain(<$repr>::deserialize(
                        deserializer,
                    )?))
                }
            }
        )*
    };
}

serde_as_bits! {
    HashFields: u16,
    TagClassAccept: u16,
    ActiveTables: u8,
    RewriteOps: u8,
}

/// One L2/L3 update (routing rewrite) template, referenced from `L3Entry` by
/// routing number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct L23UpdateEntry {
    pub routing_number: u8,
    pub ops: RewriteOps,
    pub dst_mac: [u8; 6],
    pub ctag: VlanTag,
    pub stag: VlanTag,
    pub routing_tag: u16,
}

/// How a byte-pattern filter compares the extracted bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FilterUnitMode {
    /// Compare under the entry's mask.
    Mask,
    /// Expand the value across the unit before comparing.
    Expand,
    /// Exact comparison.
    Precise,
}

/// A two-byte pattern filter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TwoByteFilter {
    /// Byte offset from the start of the frame.
    pub offset: u16,
    pub value: u16,
    pub mask: u16,
    pub mode: FilterUnitMode,
}

/// A three-byte pattern filter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ThreeByteFilter {
    pub offset: u16,
    pub value: [u8; 3],
    pub mask: [u8; 3],
    pub mode: FilterUnitMode,
}

/// A four-byte pattern filter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FourByteFilter {
    pub offset: u16,
    pub value: u32,
    pub mask: u32,
    pub mode: FilterUnitMode,
}

/// A range filter: matches when the two bytes at `offset` fall within
/// `base ..= base + range`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub offset: u16,
    pub base: u16,
    pub range: u16,
}

/// Identifies one programmed filter: width class plus index within its bank.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FilterRef {
    TwoByte(u8),
    ThreeByte(u8),
    FourByte(u8),
    Range(u8),
}

/// A cascade filter ANDs up to [`CASCADE_REFS_MAX`] underlying filters and
/// gates forwarding per source-port class.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CascadeFilter {
    pub refs: Vec<FilterRef, CASCADE_REFS_MAX>,
    /// Destination gate applied to frames arriving on physical ports.
    pub physical_gate: PortMask,
    /// Destination gate applied to pass-through (gateway-injected) frames.
    pub passthrough_gate: PortMask,
}

/// All byte-pattern filter banks. Each bank is fully cleared before being
/// populated from these lists.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub two_byte: Vec<TwoByteFilter, FILTERS_PER_CLASS>,
    pub three_byte: Vec<ThreeByteFilter, FILTERS_PER_CLASS>,
    pub four_byte: Vec<FourByteFilter, FILTERS_PER_CLASS>,
    pub range: Vec<RangeFilter, FILTERS_PER_CLASS>,
    pub cascade: Vec<CascadeFilter, CASCADE_FILTERS_MAX>,
}

/// One multicast fan-out chain: a head slot and the slots it links through,
/// in order. The hardware walks at most [`MCAST_CHAIN_LEN_MAX`] links;
/// longer chains are rejected at programming time, not silently truncated.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct McastChain {
    /// Table slots in chain order; `slots[0]` is the head entry that table
    /// lookups point at.
    pub slots: Vec<u8, MCAST_CHAIN_SLOTS>,
    /// The port each chain slot delivers to.
    pub ports: Vec<PortId, MCAST_CHAIN_SLOTS>,
}

/// MAC table sub-config.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MacTableConfig {
    pub hash: HashFields,
    pub entries: Vec<MacEntry, HASH_TABLE_ENTRIES_MAX>,
}

/// VLAN table sub-config.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VlanTableConfig {
    pub entries: Vec<VlanEntry, HASH_TABLE_ENTRIES_MAX>,
}

/// IPv4 stream table sub-config.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IpStreamTableConfig {
    pub hash: HashFields,
    pub entries: Vec<IpStreamEntry, HASH_TABLE_ENTRIES_MAX>,
}

/// L3 routing table sub-config.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct L3TableConfig {
    pub hash: HashFields,
    pub entries: Vec<L3Entry, HASH_TABLE_ENTRIES_MAX>,
    pub updates: Vec<L23UpdateEntry, L23_UPDATE_ENTRIES_MAX>,
}

/// Multicast chain table sub-config.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct McastTableConfig {
    pub chains: Vec<McastChain, MCAST_CHAIN_SLOTS>,
}

/// The aggregate forwarding configuration. Absent sub-configs leave the
/// corresponding table family untouched.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FwdConfig {
    pub port_defaults: Vec<PortFwdDefaults, { crate::MAX_PORTS }>,
    pub mac: Option<MacTableConfig>,
    pub vlan: Option<VlanTableConfig>,
    pub ip_stream: Option<IpStreamTableConfig>,
    pub l3: Option<L3TableConfig>,
    pub filters: Option<FilterConfig>,
    pub mcast: Option<McastTableConfig>,
}
