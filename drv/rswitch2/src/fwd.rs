// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The protocol shared by every forwarding-table family.
//!
//! Each family (MAC, VLAN, IPv4-stream, L3/update, multicast chain) is
//! programmed the same way:
//!
//! 1. **Reset** the table and poll for completion; a timeout is fatal to
//!    the batch because a half-reset table must not be consulted.
//! 2. **Program** each entry by writing its staging window in fixed field
//!    order (mode/flags, key parts, destination/lock masks,
//!    mirroring/priority). Hash-indexed families first fold the key fields
//!    selected by their hash configuration into a bucket index.
//! 3. **Learn**: the final staging write triggers the hardware learn; the
//!    result register reports success or a per-entry reject, which is
//!    collected into the batch's [`LearnReport`] without stopping it.

use crate::regs::{self, Family};
use crc::{Crc, CRC_32_ISO_HDLC};
use drv_rswitch2_api::config::{HashFields, PortFwdDefaults};
use drv_rswitch2_api::{
    poll_ready, LearnReason, LearnReport, Rswitch2Rw, TableError, POLL_TRIES,
};
use ringbuf::{ringbuf, ringbuf_entry};

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    TableReset { reset: u32 },
    LearnFailed { index: u16, code: u32 },
    LearnTimeout { index: u16 },
}

ringbuf!(Trace, 32, Trace::None);

/// Resets a table family and waits for completion. Idempotent; the entry
/// counter and all learned entries are gone afterwards.
pub(crate) fn reset_table<R: Rswitch2Rw>(
    rw: &R,
    family: &Family,
) -> Result<(), TableError> {
    ringbuf_entry!(Trace::TableReset {
        reset: family.reset.0
    });
    rw.write(family.reset, regs::TABLE_RESET)?;
    let done = poll_ready(rw, POLL_TRIES, |rw| {
        Ok(rw.read(family.status)? & regs::TABLE_RESET_DONE != 0)
    })?;
    if !done {
        return Err(TableError::ResetTimeout);
    }
    Ok(())
}

/// Waits out one entry's learn and records the outcome in `report`.
///
/// A learn that never finishes within the poll budget is recorded as a
/// general per-entry failure rather than aborting the batch; unlike a
/// half-reset table, one wedged entry leaves the rest of the table usable.
pub(crate) fn finish_learn<R: Rswitch2Rw>(
    rw: &R,
    family: &Family,
    index: u16,
    report: &mut LearnReport,
) -> Result<(), TableError> {
    let settled = poll_ready(rw, POLL_TRIES, |rw| {
        Ok(rw.read(family.result)? & regs::LEARN_BUSY == 0)
    })?;
    if !settled {
        ringbuf_entry!(Trace::LearnTimeout { index });
        report.record_failure(index, LearnReason::General);
        return Ok(());
    }
    let code = rw.read(family.result)? & regs::LEARN_CODE_MASK;
    match code {
        regs::LEARN_OK => report.record_ok(),
        _ => {
            ringbuf_entry!(Trace::LearnFailed { index, code });
            let reason = match code {
                regs::LEARN_FAIL_SECURITY => LearnReason::Security,
                regs::LEARN_FAIL_FORMAT => LearnReason::Format,
                _ => LearnReason::General,
            };
            report.record_failure(index, reason);
        }
    }
    Ok(())
}

const HASH_ALG: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Key material a hash equation can draw on. Families fill in the parts
/// their keys have; [`hash_index`] folds in only the parts the table's hash
/// configuration selects.
#[derive(Default)]
pub(crate) struct HashKey {
    pub dst_mac: Option<[u8; 6]>,
    pub src_mac: Option<[u8; 6]>,
    pub vlan: Option<u16>,
    pub src_ip: Option<[u8; 4]>,
    pub dst_ip: Option<[u8; 4]>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

/// Computes a 10-bit hash-table bucket index (1024-entry tables) by CRC-32
/// folding the selected key fields in a fixed order.
pub(crate) fn hash_index(fields: HashFields, key: &HashKey) -> u16 {
    let mut digest = HASH_ALG.digest();
    if fields.contains(HashFields::DST_MAC) {
        if let Some(m) = key.dst_mac {
            digest.update(&m);
        }
    }
    if fields.contains(HashFields::SRC_MAC) {
        if let Some(m) = key.src_mac {
            digest.update(&m);
        }
    }
    if fields.contains(HashFields::VLAN) {
        if let Some(v) = key.vlan {
            digest.update(&v.to_be_bytes());
        }
    }
    if fields.contains(HashFields::SRC_IP) {
        if let Some(ip) = key.src_ip {
            digest.update(&ip);
        }
    }
    if fields.contains(HashFields::DST_IP) {
        if let Some(ip) = key.dst_ip {
            digest.update(&ip);
        }
    }
    if fields.contains(HashFields::SRC_PORT) {
        if let Some(p) = key.src_port {
            digest.update(&p.to_be_bytes());
        }
    }
    if fields.contains(HashFields::DST_PORT) {
        if let Some(p) = key.dst_port {
            digest.update(&p.to_be_bytes());
        }
    }
    let h = digest.finalize();
    ((h ^ (h >> 10) ^ (h >> 20)) & 0x3FF) as u16
}

/// Applies one port's forwarding defaults: which table families its frames
/// consult, and whether unknown keys are rejected or flooded.
///
/// This is a read-modify-write of a register the hardware also consults per
/// frame; callers guarantee the port is not switching traffic (held outside
/// `Operate` by the admin surface).
pub(crate) fn apply_port_defaults<R: Rswitch2Rw>(
    rw: &R,
    d: &PortFwdDefaults,
) -> Result<(), TableError> {
    rw.modify(regs::fwpc(d.port.0), |v| {
        *v &= !(regs::FWPC_ACTIVE_MASK
            | regs::FWPC_REJECT_UNK_MAC
            | regs::FWPC_REJECT_UNK_VLAN
            | regs::FWPC_REJECT_UNK_IP);
        *v |= d.active.bits() as u32 & regs::FWPC_ACTIVE_MASK;
        if d.reject_unknown_mac {
            *v |= regs::FWPC_REJECT_UNK_MAC;
        }
        if d.reject_unknown_vlan {
            *v |= regs::FWPC_REJECT_UNK_VLAN;
        }
        if d.reject_unknown_ip {
            *v |= regs::FWPC_REJECT_UNK_IP;
        }
    })?;
    Ok(())
}
