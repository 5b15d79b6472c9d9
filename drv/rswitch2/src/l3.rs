// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! L3 routing table and L2/L3 update (rewrite template) programming.
//!
//! The two tables share a reset domain: routing entries reference update
//! templates by routing number, so tearing one down without the other would
//! leave dangling references. One reset covers both, then routing entries
//! and templates are learned through their own staging windows.

use crate::fwd::{self, HashKey};
use crate::ip::format_bits;
use crate::mac::{dest_priority_word, dest_vector_word};
use crate::regs::{self, Family};
use drv_rswitch2_api::config::{
    L23UpdateEntry, L3Entry, L3TableConfig, VlanTag, HASH_TABLE_ENTRIES_MAX,
    L23_UPDATE_ENTRIES_MAX,
};
use drv_rswitch2_api::{LearnReport, Rswitch2Rw, TableError};

const FAMILY: Family = Family {
    reset: regs::FWL3TR,
    status: regs::FWL3TSR,
    result: regs::FWL3TL,
};

const UPDATE_FAMILY: Family = Family {
    reset: regs::FWL3TR,
    status: regs::FWL3TSR,
    result: regs::FWL23UL,
};

const FLAG_SECURITY: u32 = 1 << 0;

/// Packs one VLAN tag's fields into 16 bits: VID, PCP, DEI.
pub(crate) fn vlan_tag_bits(t: &VlanTag) -> u32 {
    (t.vid as u32 & 0xFFF)
        | ((t.pcp as u32 & 0x7) << 12)
        | ((t.dei as u32) << 15)
}

/// Reports from the two halves of the L3 configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct L3Reports {
    pub routes: LearnReport,
    pub updates: LearnReport,
}

pub fn program<R: Rswitch2Rw>(
    rw: &R,
    cfg: &L3TableConfig,
) -> Result<L3Reports, TableError> {
    if cfg.entries.len() > HASH_TABLE_ENTRIES_MAX
        || cfg.updates.len() > L23_UPDATE_ENTRIES_MAX
    {
        return Err(TableError::TooManyEntries);
    }
    fwd::reset_table(rw, &FAMILY)?;
    rw.write(regs::FWL3HC, cfg.hash.bits() as u32)?;

    // Templates first: routing entries reference them by number, and the
    // hardware validates the reference at learn time.
    let mut updates = LearnReport::default();
    for (i, u) in cfg.updates.iter().enumerate() {
        program_update(rw, u)?;
        fwd::finish_learn(rw, &UPDATE_FAMILY, i as u16, &mut updates)?;
    }

    let mut routes = LearnReport::default();
    for (i, e) in cfg.entries.iter().enumerate() {
        program_entry(rw, cfg, e)?;
        fwd::finish_learn(rw, &FAMILY, i as u16, &mut routes)?;
    }
    Ok(L3Reports { routes, updates })
}

fn program_entry<R: Rswitch2Rw>(
    rw: &R,
    cfg: &L3TableConfig,
    e: &L3Entry,
) -> Result<(), TableError> {
    let hash = fwd::hash_index(
        cfg.hash,
        &HashKey {
            src_ip: Some(e.src_ip),
            dst_ip: Some(e.dst_ip),
            ..HashKey::default()
        },
    );

    let mut w0 = (format_bits(e.format) << 4) | ((hash as u32) << 16);
    if e.security {
        w0 |= FLAG_SECURITY;
    }
    rw.write(regs::fwl3te(0), w0)?;
    rw.write(regs::fwl3te(1), u32::from_be_bytes(e.src_ip))?;
    rw.write(regs::fwl3te(2), u32::from_be_bytes(e.dst_ip))?;
    rw.write(regs::fwl3te(3), dest_vector_word(&e.dest))?;
    rw.write(
        regs::fwl3te(4),
        e.routing_number as u32 | (dest_priority_word(&e.dest) << 8),
    )?;
    Ok(())
}

fn program_update<R: Rswitch2Rw>(
    rw: &R,
    u: &L23UpdateEntry,
) -> Result<(), TableError> {
    rw.write(
        regs::fwl23ue(0),
        u.ops.bits() as u32 | ((u.routing_number as u32) << 8),
    )?;
    rw.write(
        regs::fwl23ue(1),
        u16::from_be_bytes([u.dst_mac[0], u.dst_mac[1]]) as u32,
    )?;
    rw.write(
        regs::fwl23ue(2),
        u32::from_be_bytes([
            u.dst_mac[2],
            u.dst_mac[3],
            u.dst_mac[4],
            u.dst_mac[5],
        ]),
    )?;
    rw.write(
        regs::fwl23ue(3),
        vlan_tag_bits(&u.ctag) | (vlan_tag_bits(&u.stag) << 16),
    )?;
    rw.write(regs::fwl23ue(4), u.routing_tag as u32)?;
    Ok(())
}
