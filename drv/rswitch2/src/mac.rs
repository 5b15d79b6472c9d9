// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MAC address table programming.

use crate::fwd::{self, HashKey};
use crate::regs::{self, Family};
use drv_rswitch2_api::config::{Destination, MacEntry, MacTableConfig, HASH_TABLE_ENTRIES_MAX};
use drv_rswitch2_api::{LearnReport, Rswitch2Rw, TableError};

const FAMILY: Family = Family {
    reset: regs::FWMACTR,
    status: regs::FWMACTSR,
    result: regs::FWMACTL,
};

const FLAG_DYNAMIC: u32 = 1 << 0;
const FLAG_LEARN_DISABLE: u32 = 1 << 1;
const FLAG_SECURITY: u32 = 1 << 2;

/// Packs a destination's vector word: port vector, CPU sub-destination
/// (0xFF when the CPU is not a target) and the mirror flag. Shared with the
/// other value-shaped families.
pub(crate) fn dest_vector_word(d: &Destination) -> u32 {
    let csd = d.csd.unwrap_or(0xFF) as u32;
    let mut w = (d.ports.0 as u32 & 0xFFFF) | (csd << 16);
    if d.mirror {
        w |= 1 << 24;
    }
    w
}

/// Packs a destination's priority word: internal priority override value
/// and its valid bit.
pub(crate) fn dest_priority_word(d: &Destination) -> u32 {
    match d.ipv {
        Some(p) => (p as u32 & 0x7) | (1 << 3),
        None => 0,
    }
}

/// Resets and programs the MAC table. Per-entry learn rejects are collected
/// in the returned report; register transport faults and a reset timeout
/// abort the batch.
pub fn program<R: Rswitch2Rw>(
    rw: &R,
    cfg: &MacTableConfig,
) -> Result<LearnReport, TableError> {
    if cfg.entries.len() > HASH_TABLE_ENTRIES_MAX {
        return Err(TableError::TooManyEntries);
    }
    fwd::reset_table(rw, &FAMILY)?;
    rw.write(regs::FWMACHC, cfg.hash.bits() as u32)?;

    let mut report = LearnReport::default();
    for (i, e) in cfg.entries.iter().enumerate() {
        program_entry(rw, cfg, e)?;
        fwd::finish_learn(rw, &FAMILY, i as u16, &mut report)?;
    }
    Ok(report)
}

// Staging order is fixed: flags and hash, then the key, then the
// destination/lock words. The final write triggers the learn.
fn program_entry<R: Rswitch2Rw>(
    rw: &R,
    cfg: &MacTableConfig,
    e: &MacEntry,
) -> Result<(), TableError> {
    let hash = fwd::hash_index(
        cfg.hash,
        &HashKey {
            dst_mac: Some(e.mac),
            ..HashKey::default()
        },
    );

    let mut flags = 0;
    if e.dynamic {
        flags |= FLAG_DYNAMIC;
    }
    if e.learn_disable {
        flags |= FLAG_LEARN_DISABLE;
    }
    if e.security {
        flags |= FLAG_SECURITY;
    }

    rw.write(regs::fwmacte(0), flags | (hash as u32) << 16)?;
    rw.write(
        regs::fwmacte(1),
        u16::from_be_bytes([e.mac[0], e.mac[1]]) as u32,
    )?;
    rw.write(
        regs::fwmacte(2),
        u32::from_be_bytes([e.mac[2], e.mac[3], e.mac[4], e.mac[5]]),
    )?;
    rw.write(regs::fwmacte(3), e.src_lock.0 as u32 & 0xFFFF)?;
    rw.write(regs::fwmacte(4), dest_vector_word(&e.dest))?;
    rw.write(regs::fwmacte(5), dest_priority_word(&e.dest))?;
    Ok(())
}

/// Number of entries currently learned, from the hardware's entry counter.
/// Zero right after a reset.
pub fn count_entries<R: Rswitch2Rw>(rw: &R) -> Result<u32, TableError> {
    Ok(rw.read(regs::FWMACEC)?)
}
