// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Switch-core register map: per-port mode and VLAN registers, and the
//! forwarding engine's table staging registers.
//!
//! Every hash-table family exposes the same register shape (reset trigger,
//! reset/status, hash config, staging window, learn result), so the
//! per-family modules hand [`crate::fwd`] a [`Family`] describing theirs.

use drv_rswitch2_api::RegAddr;

/// One table family's shared-protocol registers.
pub struct Family {
    /// Write [`TABLE_RESET`] to begin a table reset.
    pub reset: RegAddr,
    /// Poll for [`TABLE_RESET_DONE`].
    pub status: RegAddr,
    /// Learn result, valid once [`LEARN_BUSY`] clears.
    pub result: RegAddr,
}

pub const TABLE_RESET: u32 = 1 << 0;
pub const TABLE_RESET_DONE: u32 = 1 << 0;

/// Learn in progress; set by the triggering staging write.
pub const LEARN_BUSY: u32 = 1 << 31;
pub const LEARN_CODE_MASK: u32 = 0x3;
pub const LEARN_OK: u32 = 0;
pub const LEARN_FAIL_GENERAL: u32 = 1;
pub const LEARN_FAIL_SECURITY: u32 = 2;
pub const LEARN_FAIL_FORMAT: u32 = 3;

// Per-port blocks, 0x100 apart.

const PORT_BASE: u32 = 0x1000;
const PORT_STRIDE: u32 = 0x100;

const fn port_reg(port: u8, offset: u32) -> RegAddr {
    RegAddr(PORT_BASE + port as u32 * PORT_STRIDE + offset)
}

/// Port mode control.
pub const fn pmc(port: u8) -> RegAddr {
    port_reg(port, 0x00)
}

/// Port mode status.
pub const fn pms(port: u8) -> RegAddr {
    port_reg(port, 0x04)
}

/// Port VLAN control: CPU flag and egress mode.
pub const fn pvcc(port: u8) -> RegAddr {
    port_reg(port, 0x10)
}

/// Port C-tag fields.
pub const fn pvct(port: u8) -> RegAddr {
    port_reg(port, 0x14)
}

/// Port S-tag fields.
pub const fn pvst(port: u8) -> RegAddr {
    port_reg(port, 0x18)
}

/// Port tag-class accept filter.
pub const fn ptfc(port: u8) -> RegAddr {
    port_reg(port, 0x1C)
}

pub const PVCC_CPU: u32 = 1 << 8;

/// Per-port forwarding defaults: active table families and unknown-key
/// rejection policy. Read-modify-write; administratively serialized.
pub const fn fwpc(port: u8) -> RegAddr {
    RegAddr(0x4000 + port as u32 * 4)
}

pub const FWPC_REJECT_UNK_MAC: u32 = 1 << 8;
pub const FWPC_REJECT_UNK_VLAN: u32 = 1 << 9;
pub const FWPC_REJECT_UNK_IP: u32 = 1 << 10;
pub const FWPC_ACTIVE_MASK: u32 = 0xF;

// MAC table family.

pub const FWMACTR: RegAddr = RegAddr(0x4100);
pub const FWMACTSR: RegAddr = RegAddr(0x4104);
pub const FWMACHC: RegAddr = RegAddr(0x4108);
/// Learned-entry count; cleared by table reset.
pub const FWMACEC: RegAddr = RegAddr(0x410C);
pub const FWMACTL: RegAddr = RegAddr(0x4110);

/// MAC staging window, 6 words; the write to the last word triggers the
/// learn.
pub const fn fwmacte(word: u32) -> RegAddr {
    RegAddr(0x4120).offset(word)
}
pub const FWMACTE_WORDS: u32 = 6;

// VLAN table family (direct-indexed by VLAN id, no hash config).

pub const FWVLANTR: RegAddr = RegAddr(0x4200);
pub const FWVLANTSR: RegAddr = RegAddr(0x4204);
pub const FWVLANTL: RegAddr = RegAddr(0x4210);

/// VLAN staging window, 4 words.
pub const fn fwvlante(word: u32) -> RegAddr {
    RegAddr(0x4220).offset(word)
}
pub const FWVLANTE_WORDS: u32 = 4;

// IPv4 stream table family.

pub const FWIP4TR: RegAddr = RegAddr(0x4300);
pub const FWIP4TSR: RegAddr = RegAddr(0x4304);
pub const FWIP4HC: RegAddr = RegAddr(0x4308);
pub const FWIP4TL: RegAddr = RegAddr(0x4310);

/// IPv4 stream staging window, 6 words.
pub const fn fwip4te(word: u32) -> RegAddr {
    RegAddr(0x4320).offset(word)
}
pub const FWIP4TE_WORDS: u32 = 6;

// L3 routing table family, plus the L2/L3 update (rewrite template) table
// that shares its reset domain.

pub const FWL3TR: RegAddr = RegAddr(0x4400);
pub const FWL3TSR: RegAddr = RegAddr(0x4404);
pub const FWL3HC: RegAddr = RegAddr(0x4408);
pub const FWL3TL: RegAddr = RegAddr(0x4410);

/// L3 staging window, 5 words.
pub const fn fwl3te(word: u32) -> RegAddr {
    RegAddr(0x4420).offset(word)
}
pub const FWL3TE_WORDS: u32 = 5;

pub const FWL23UL: RegAddr = RegAddr(0x4414);

/// L2/L3 update staging window, 5 words.
pub const fn fwl23ue(word: u32) -> RegAddr {
    RegAddr(0x4440).offset(word)
}
pub const FWL23UE_WORDS: u32 = 5;

// Byte-pattern filter banks. Each filter occupies a fixed window; writing
// word 0 with the enable bit clear disables the slot.

pub const FILTER_ENABLE: u32 = 1 << 31;

/// Two-byte filter `i`, word `w` (2 words per filter).
pub const fn fwtwbf(i: u8, w: u32) -> RegAddr {
    RegAddr(0x4500 + i as u32 * 8).offset(w)
}

/// Three-byte filter `i`, word `w` (3 words per filter).
pub const fn fwthbf(i: u8, w: u32) -> RegAddr {
    RegAddr(0x4540 + i as u32 * 12).offset(w)
}

/// Four-byte filter `i`, word `w` (3 words per filter).
pub const fn fwfobf(i: u8, w: u32) -> RegAddr {
    RegAddr(0x4580 + i as u32 * 12).offset(w)
}

/// Range filter `i`, word `w` (2 words per filter).
pub const fn fwrgf(i: u8, w: u32) -> RegAddr {
    RegAddr(0x45C0 + i as u32 * 8).offset(w)
}

/// Cascade filter `i`, word `w` (4 words: enable plus physical gate,
/// pass-through gate, then packed filter refs).
pub const fn fwcsf(i: u8, w: u32) -> RegAddr {
    RegAddr(0x4600 + i as u32 * 16).offset(w)
}

/// "No filter" in a cascade's packed reference list.
pub const CASCADE_REF_NONE: u32 = 0xFF;

// Multicast chain table.

pub const FWMCTR: RegAddr = RegAddr(0x4700);
pub const FWMCTSR: RegAddr = RegAddr(0x4704);

/// Multicast chain link entry for `slot`: destination port, next-slot link
/// and valid bit.
pub const fn fwmcle(slot: u8) -> RegAddr {
    RegAddr(0x4720 + slot as u32 * 4)
}

pub const MCAST_LINK_VALID: u32 = 1 << 31;
/// Next-link value terminating a chain.
pub const MCAST_LINK_END: u32 = 0xFF;
