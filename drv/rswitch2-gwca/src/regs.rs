// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gateway engine register map.
//!
//! Offsets are relative to the GWCA block base. Per-chain registers are
//! generated by small const fns; the doorbell and interrupt registers are
//! banked 32 chains to a 32-bit register, with one bit per chain.

use drv_rswitch2_api::RegAddr;

/// Number of descriptor chains one gateway engine multiplexes.
pub const CHAINS_MAX: usize = 128;

/// Operating mode control (mode select in the low bits).
pub const GWMC: RegAddr = RegAddr(0x0000);
/// Operating mode status.
pub const GWMS: RegAddr = RegAddr(0x0004);
/// Software reset; write [`GWRR_RST`], poll [`GWRR_CLR`] low.
pub const GWRR: RegAddr = RegAddr(0x0008);

pub const GWRR_RST: u32 = 1 << 0;
pub const GWRR_CLR: u32 = 1 << 1;

/// Timestamp completion queue: chain base address (high byte of 40 bits).
pub const GWTSDCAC0: RegAddr = RegAddr(0x0040);
/// Timestamp completion queue: chain base address (low 32 bits).
pub const GWTSDCAC1: RegAddr = RegAddr(0x0044);
/// Timestamp completion queue: depth and enable.
pub const GWTSDCC: RegAddr = RegAddr(0x0048);

pub const GWTSDCC_ENABLE: u32 = 1 << 0;

/// Per-chain config: enable, direction, and descriptor format.
pub const fn gwdcc(chain: u8) -> RegAddr {
    RegAddr(0x0100 + chain as u32 * 4)
}

/// Chain enable.
pub const GWDCC_ENABLE: u32 = 1 << 0;
/// Direction: set for TX chains, clear for RX.
pub const GWDCC_DQT: u32 = 1 << 1;
/// Extended (routing-metadata) descriptor format.
pub const GWDCC_EDE: u32 = 1 << 2;
/// Extended-with-timestamp descriptor format (RX).
pub const GWDCC_ETS: u32 = 1 << 3;

/// Per-chain descriptor base address, high byte of 40 bits.
pub const fn gwdcbac0(chain: u8) -> RegAddr {
    RegAddr(0x0300 + chain as u32 * 8)
}

/// Per-chain descriptor base address, low 32 bits.
pub const fn gwdcbac1(chain: u8) -> RegAddr {
    RegAddr(0x0304 + chain as u32 * 8)
}

/// TX doorbell bank for `chain`; write [`chain_bit`] to start the engine on
/// that chain's descriptor ring.
pub const fn gwtrc(chain: u8) -> RegAddr {
    RegAddr(0x0700 + (chain as u32 / 32) * 4)
}

/// Data interrupt enable bank (write 1 to enable).
pub const fn gwdie(chain: u8) -> RegAddr {
    RegAddr(0x0740 + (chain as u32 / 32) * 4)
}

/// Data interrupt disable bank (write 1 to disable).
pub const fn gwdid(chain: u8) -> RegAddr {
    RegAddr(0x0780 + (chain as u32 / 32) * 4)
}

/// Data interrupt status bank (write 1 to acknowledge).
pub const fn gwdis(chain: u8) -> RegAddr {
    RegAddr(0x07C0 + (chain as u32 / 32) * 4)
}

/// Bit position of `chain` within its 32-chain register bank.
pub const fn chain_bit(chain: u8) -> u32 {
    1 << (chain as u32 % 32)
}
