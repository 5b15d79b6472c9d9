// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! VLAN table programming. Direct-indexed by the 12-bit VLAN id, so there
//! is no hash configuration; otherwise the shape matches the MAC table.

use crate::fwd;
use crate::mac::{dest_priority_word, dest_vector_word};
use crate::regs::{self, Family};
use drv_rswitch2_api::config::{
    VlanEntry, VlanTableConfig, HASH_TABLE_ENTRIES_MAX,
};
use drv_rswitch2_api::{LearnReport, Rswitch2Rw, TableError};

const FAMILY: Family = Family {
    reset: regs::FWVLANTR,
    status: regs::FWVLANTSR,
    result: regs::FWVLANTL,
};

const FLAG_LEARN_DISABLE: u32 = 1 << 0;
const FLAG_SECURITY: u32 = 1 << 1;

pub fn program<R: Rswitch2Rw>(
    rw: &R,
    cfg: &VlanTableConfig,
) -> Result<LearnReport, TableError> {
    if cfg.entries.len() > HASH_TABLE_ENTRIES_MAX {
        return Err(TableError::TooManyEntries);
    }
    fwd::reset_table(rw, &FAMILY)?;

    let mut report = LearnReport::default();
    for (i, e) in cfg.entries.iter().enumerate() {
        program_entry(rw, e)?;
        fwd::finish_learn(rw, &FAMILY, i as u16, &mut report)?;
    }
    Ok(report)
}

fn program_entry<R: Rswitch2Rw>(
    rw: &R,
    e: &VlanEntry,
) -> Result<(), TableError> {
    let mut flags = 0;
    if e.learn_disable {
        flags |= FLAG_LEARN_DISABLE;
    }
    if e.security {
        flags |= FLAG_SECURITY;
    }
    rw.write(regs::fwvlante(0), flags)?;
    rw.write(regs::fwvlante(1), e.vid as u32 & 0xFFF)?;
    rw.write(regs::fwvlante(2), dest_vector_word(&e.dest))?;
    rw.write(regs::fwvlante(3), dest_priority_word(&e.dest))?;
    Ok(())
}
