// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IPv4 stream table programming. Keys are 5-tuple-like: destination IP
//! plus optional source IP, transport ports and C-tag VLAN id, with a frame
//! format classification. Optional key parts participate in the hash only
//! when present *and* selected by the hash configuration; the presence
//! bitmap is part of the programmed entry so the hardware knows which
//! fields to extract.

use crate::fwd::{self, HashKey};
use crate::mac::{dest_priority_word, dest_vector_word};
use crate::regs::{self, Family};
use drv_rswitch2_api::config::{
    FrameFormat, IpStreamEntry, IpStreamTableConfig, HASH_TABLE_ENTRIES_MAX,
};
use drv_rswitch2_api::{LearnReport, Rswitch2Rw, TableError};

const FAMILY: Family = Family {
    reset: regs::FWIP4TR,
    status: regs::FWIP4TSR,
    result: regs::FWIP4TL,
};

const FLAG_SECURITY: u32 = 1 << 0;

const HAS_SRC_IP: u32 = 1 << 8;
const HAS_DST_PORT: u32 = 1 << 9;
const HAS_SRC_PORT: u32 = 1 << 10;
const HAS_VID: u32 = 1 << 11;

pub(crate) fn format_bits(f: FrameFormat) -> u32 {
    match f {
        FrameFormat::Plain => 0,
        FrameFormat::Udp => 1,
        FrameFormat::Tcp => 2,
    }
}

pub fn program<R: Rswitch2Rw>(
    rw: &R,
    cfg: &IpStreamTableConfig,
) -> Result<LearnReport, TableError> {
    if cfg.entries.len() > HASH_TABLE_ENTRIES_MAX {
        return Err(TableError::TooManyEntries);
    }
    fwd::reset_table(rw, &FAMILY)?;
    rw.write(regs::FWIP4HC, cfg.hash.bits() as u32)?;

    let mut report = LearnReport::default();
    for (i, e) in cfg.entries.iter().enumerate() {
        program_entry(rw, cfg, e)?;
        fwd::finish_learn(rw, &FAMILY, i as u16, &mut report)?;
    }
    Ok(report)
}

fn program_entry<R: Rswitch2Rw>(
    rw: &R,
    cfg: &IpStreamTableConfig,
    e: &IpStreamEntry,
) -> Result<(), TableError> {
    let hash = fwd::hash_index(
        cfg.hash,
        &HashKey {
            dst_ip: Some(e.dst_ip),
            src_ip: e.src_ip,
            dst_port: e.dst_port,
            src_port: e.src_port,
            vlan: e.vid,
            ..HashKey::default()
        },
    );

    let mut w0 = (format_bits(e.format) << 4) | ((hash as u32) << 16);
    if e.security {
        w0 |= FLAG_SECURITY;
    }
    if e.src_ip.is_some() {
        w0 |= HAS_SRC_IP;
    }
    if e.dst_port.is_some() {
        w0 |= HAS_DST_PORT;
    }
    if e.src_port.is_some() {
        w0 |= HAS_SRC_PORT;
    }
    if e.vid.is_some() {
        w0 |= HAS_VID;
    }

    rw.write(regs::fwip4te(0), w0)?;
    rw.write(regs::fwip4te(1), u32::from_be_bytes(e.dst_ip))?;
    rw.write(
        regs::fwip4te(2),
        u32::from_be_bytes(e.src_ip.unwrap_or([0; 4])),
    )?;
    rw.write(
        regs::fwip4te(3),
        (e.dst_port.unwrap_or(0) as u32)
            | ((e.src_port.unwrap_or(0) as u32) << 16),
    )?;
    rw.write(
        regs::fwip4te(4),
        (e.vid.unwrap_or(0) as u32 & 0xFFF)
            | (dest_priority_word(&e.dest) << 16),
    )?;
    rw.write(regs::fwip4te(5), dest_vector_word(&e.dest))?;
    Ok(())
}
