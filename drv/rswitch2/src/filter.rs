// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-pattern and cascade filter programming.
//!
//! Unlike the hash tables there is no reset/learn protocol here: every bank
//! is fully cleared by direct register writes, then populated from the
//! config. Cascade references are validated against the populated banks
//! before anything is written, so a bad config leaves the previous filter
//! state intact.

use crate::regs;
use drv_rswitch2_api::config::{
    CascadeFilter, FilterConfig, FilterRef, FilterUnitMode,
    CASCADE_FILTERS_MAX, FILTERS_PER_CLASS,
};
use drv_rswitch2_api::{Rswitch2Rw, TableError};

fn mode_bits(m: FilterUnitMode) -> u32 {
    match m {
        FilterUnitMode::Mask => 0,
        FilterUnitMode::Expand => 1,
        FilterUnitMode::Precise => 2,
    }
}

/// Checks that a cascade only references filters the config actually
/// populates.
fn validate_cascade(
    cfg: &FilterConfig,
    c: &CascadeFilter,
) -> Result<(), TableError> {
    for r in &c.refs {
        let (idx, populated) = match *r {
            FilterRef::TwoByte(i) => (i, cfg.two_byte.len()),
            FilterRef::ThreeByte(i) => (i, cfg.three_byte.len()),
            FilterRef::FourByte(i) => (i, cfg.four_byte.len()),
            FilterRef::Range(i) => (i, cfg.range.len()),
        };
        if idx as usize >= populated {
            return Err(TableError::BadFilterRef);
        }
    }
    Ok(())
}

/// Packed 8-bit encoding of a filter reference: width class in the high
/// nibble, bank index in the low.
fn ref_bits(r: FilterRef) -> u32 {
    let (class, idx) = match r {
        FilterRef::TwoByte(i) => (0, i),
        FilterRef::ThreeByte(i) => (1, i),
        FilterRef::FourByte(i) => (2, i),
        FilterRef::Range(i) => (3, i),
    };
    (class << 4) | idx as u32
}

pub fn program<R: Rswitch2Rw>(
    rw: &R,
    cfg: &FilterConfig,
) -> Result<(), TableError> {
    for c in &cfg.cascade {
        validate_cascade(cfg, c)?;
    }

    // Clear every bank, so filters absent from the config stop matching.
    for i in 0..FILTERS_PER_CLASS as u8 {
        rw.write(regs::fwtwbf(i, 0), 0)?;
        rw.write(regs::fwthbf(i, 0), 0)?;
        rw.write(regs::fwfobf(i, 0), 0)?;
        rw.write(regs::fwrgf(i, 0), 0)?;
    }
    for i in 0..CASCADE_FILTERS_MAX as u8 {
        rw.write(regs::fwcsf(i, 0), 0)?;
    }

    for (i, f) in cfg.two_byte.iter().enumerate() {
        let i = i as u8;
        rw.write(
            regs::fwtwbf(i, 1),
            f.value as u32 | ((f.mask as u32) << 16),
        )?;
        rw.write(
            regs::fwtwbf(i, 0),
            regs::FILTER_ENABLE | f.offset as u32 | (mode_bits(f.mode) << 16),
        )?;
    }
    for (i, f) in cfg.three_byte.iter().enumerate() {
        let i = i as u8;
        rw.write(
            regs::fwthbf(i, 1),
            u32::from_be_bytes([0, f.value[0], f.value[1], f.value[2]]),
        )?;
        rw.write(
            regs::fwthbf(i, 2),
            u32::from_be_bytes([0, f.mask[0], f.mask[1], f.mask[2]]),
        )?;
        rw.write(
            regs::fwthbf(i, 0),
            regs::FILTER_ENABLE | f.offset as u32 | (mode_bits(f.mode) << 16),
        )?;
    }
    for (i, f) in cfg.four_byte.iter().enumerate() {
        let i = i as u8;
        rw.write(regs::fwfobf(i, 1), f.value)?;
        rw.write(regs::fwfobf(i, 2), f.mask)?;
        rw.write(
            regs::fwfobf(i, 0),
            regs::FILTER_ENABLE | f.offset as u32 | (mode_bits(f.mode) << 16),
        )?;
    }
    for (i, f) in cfg.range.iter().enumerate() {
        let i = i as u8;
        rw.write(
            regs::fwrgf(i, 1),
            f.base as u32 | ((f.range as u32) << 16),
        )?;
        rw.write(
            regs::fwrgf(i, 0),
            regs::FILTER_ENABLE | f.offset as u32,
        )?;
    }

    for (i, c) in cfg.cascade.iter().enumerate() {
        let i = i as u8;
        // Up to 7 packed refs across two words; unused slots read as
        // CASCADE_REF_NONE.
        let mut packed = [regs::CASCADE_REF_NONE; 7];
        for (slot, r) in c.refs.iter().enumerate() {
            packed[slot] = ref_bits(*r);
        }
        rw.write(regs::fwcsf(i, 1), c.passthrough_gate.0 as u32 & 0xFFFF)?;
        rw.write(
            regs::fwcsf(i, 2),
            packed[0]
                | (packed[1] << 8)
                | (packed[2] << 16)
                | (packed[3] << 24),
        )?;
        rw.write(
            regs::fwcsf(i, 3),
            packed[4] | (packed[5] << 8) | (packed[6] << 16),
        )?;
        rw.write(
            regs::fwcsf(i, 0),
            regs::FILTER_ENABLE | (c.physical_gate.0 as u32 & 0xFFFF),
        )?;
    }
    Ok(())
}
