// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Switch-core driver: port mode state machines, per-port VLAN
//! configuration, and the forwarding engine's table families (MAC, VLAN,
//! IPv4 stream, L3 routing with L2/L3 rewrite templates, byte-pattern and
//! cascade filters, multicast chains).
//!
//! The driver is generic over [`Rswitch2Rw`], the register transport, so the
//! same code runs against memory-mapped hardware and against the register
//! fakes in the test suite. All configuration entry points are gated on the
//! target port being in `Config` mode and check that gate before touching
//! any register.
//!
//! Each table family follows the same hardware protocol: reset the table and
//! poll for completion, then stage one entry at a time through a fixed
//! register window where the final write triggers the hardware learn. A
//! learn can be rejected per entry (security, format, or a general fault);
//! rejects are collected in a [`LearnReport`] rather than aborting the rest
//! of the batch. See [`fwd`] for the shared protocol pieces.

#![cfg_attr(not(test), no_std)]

pub mod filter;
mod fwd;
pub mod ip;
pub mod l3;
pub mod mac;
pub mod mcast;
pub mod port;
pub mod regs;
pub mod vlan;

pub use l3::L3Reports;
pub use port::PortState;

use drv_rswitch2_api::config::{FwdConfig, PortVlanConfig, VlanEgressMode};
use drv_rswitch2_api::{
    DevError, LearnReport, OpMode, PortId, Rswitch2Rw, StateError, TableError,
    MAX_PORTS,
};

/// Error from the aggregate configuration entry points: either the port
/// state gate rejected the operation, or a table family did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    State(StateError),
    Table(TableError),
}

impl From<StateError> for ConfigError {
    fn from(e: StateError) -> Self {
        ConfigError::State(e)
    }
}

impl From<TableError> for ConfigError {
    fn from(e: TableError) -> Self {
        ConfigError::Table(e)
    }
}

impl From<DevError> for ConfigError {
    fn from(e: DevError) -> Self {
        ConfigError::State(StateError::Dev(e))
    }
}

/// Per-family learn reports from one [`Rswitch2::apply_fwd_config`] call.
/// `None` means the sub-config was absent and the family was not touched.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApplyReport {
    pub mac: Option<LearnReport>,
    pub vlan: Option<LearnReport>,
    pub ip_stream: Option<LearnReport>,
    pub l3: Option<L3Reports>,
}

impl ApplyReport {
    /// True when every programmed family accepted every entry.
    pub fn is_clean(&self) -> bool {
        self.mac.as_ref().is_none_or(LearnReport::is_clean)
            && self.vlan.as_ref().is_none_or(LearnReport::is_clean)
            && self.ip_stream.as_ref().is_none_or(LearnReport::is_clean)
            && self.l3.as_ref().is_none_or(|r| {
                r.routes.is_clean() && r.updates.is_clean()
            })
    }
}

/// Driver front end: owns the software-side mode state for every port and
/// dispatches configuration to the table families.
pub struct Rswitch2<'a, R> {
    rw: &'a R,
    ports: [PortState; MAX_PORTS],
}

impl<'a, R: Rswitch2Rw> Rswitch2<'a, R> {
    /// All ports start in `Reset`, matching the hardware's post-reset state.
    pub fn new(rw: &'a R) -> Self {
        Self {
            rw,
            ports: [PortState::default(); MAX_PORTS],
        }
    }

    fn index(port: PortId) -> Result<usize, StateError> {
        let i = port.0 as usize;
        if i < MAX_PORTS {
            Ok(i)
        } else {
            Err(StateError::Dev(DevError::OutOfRange))
        }
    }

    fn port(&self, port: PortId) -> Result<&PortState, StateError> {
        Ok(&self.ports[Self::index(port)?])
    }

    /// The committed mode of `port`.
    pub fn port_mode(&self, port: PortId) -> Result<OpMode, StateError> {
        Ok(self.port(port)?.mode())
    }

    /// Drives `port` to `target`; see [`PortState::change_mode`] for the
    /// timeout and `Failed` latching behavior.
    pub fn change_port_mode(
        &mut self,
        port: PortId,
        target: OpMode,
    ) -> Result<(), StateError> {
        let i = Self::index(port)?;
        self.ports[i].change_mode(self.rw, port, target)
    }

    /// Applies an aggregate forwarding configuration. `port` is the port
    /// being configured and must be in `Config` mode; the gate is checked
    /// before the first register write.
    ///
    /// Families are programmed in a fixed order: port defaults, then MAC,
    /// VLAN, IPv4 stream, L3 (templates before routes), filters, and
    /// multicast chains. A family error stops the sequence there; earlier
    /// families keep what they were programmed with.
    pub fn apply_fwd_config(
        &self,
        port: PortId,
        cfg: &FwdConfig,
    ) -> Result<ApplyReport, ConfigError> {
        self.port(port)?.require_config()?;

        for d in &cfg.port_defaults {
            fwd::apply_port_defaults(self.rw, d)?;
        }

        let mut report = ApplyReport::default();
        if let Some(c) = &cfg.mac {
            report.mac = Some(mac::program(self.rw, c)?);
        }
        if let Some(c) = &cfg.vlan {
            report.vlan = Some(vlan::program(self.rw, c)?);
        }
        if let Some(c) = &cfg.ip_stream {
            report.ip_stream = Some(ip::program(self.rw, c)?);
        }
        if let Some(c) = &cfg.l3 {
            report.l3 = Some(l3::program(self.rw, c)?);
        }
        if let Some(c) = &cfg.filters {
            filter::program(self.rw, c)?;
        }
        if let Some(c) = &cfg.mcast {
            mcast::program(self.rw, c)?;
        }
        Ok(report)
    }

    /// Programs one port's VLAN registers: CPU flag and egress mode, the
    /// port C- and S-tags, and the ingress tag-class accept filter. The
    /// port must be in `Config` mode.
    pub fn apply_port_vlan_config(
        &self,
        cfg: &PortVlanConfig,
    ) -> Result<(), ConfigError> {
        self.port(cfg.port)?.require_config()?;

        let mut vcc = egress_bits(cfg.egress);
        if cfg.cpu {
            vcc |= regs::PVCC_CPU;
        }
        self.rw.write(regs::pvcc(cfg.port.0), vcc)?;
        self.rw.write(regs::pvct(cfg.port.0), l3::vlan_tag_bits(&cfg.ctag))?;
        self.rw.write(regs::pvst(cfg.port.0), l3::vlan_tag_bits(&cfg.stag))?;
        self.rw.write(regs::ptfc(cfg.port.0), cfg.accept.bits() as u32)?;
        Ok(())
    }
}

fn egress_bits(mode: VlanEgressMode) -> u32 {
    match mode {
        VlanEgressMode::None => 0,
        VlanEgressMode::CTag => 1,
        VlanEgressMode::STag => 2,
        VlanEgressMode::HwCTag => 3,
        VlanEgressMode::HwSTag => 4,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A behavioral register fake: resets complete immediately (unless
    //! wedged), staging-trigger writes latch a scripted learn result, and
    //! a port's mode status can be made to mirror its mode control.

    use crate::regs;
    use core::cell::RefCell;
    use drv_rswitch2_api::{DevError, PortId, RegAddr, Rswitch2Rw};
    use std::collections::{BTreeMap, VecDeque};

    struct FamilyBehavior {
        reset: RegAddr,
        status: RegAddr,
        /// Staging word whose write triggers a learn, if the family has
        /// a learn protocol.
        trigger: Option<RegAddr>,
        result: Option<RegAddr>,
        /// Entry counter: cleared by reset, bumped by an accepted learn.
        counter: Option<RegAddr>,
    }

    const FAMILIES: [FamilyBehavior; 6] = [
        FamilyBehavior {
            reset: regs::FWMACTR,
            status: regs::FWMACTSR,
            trigger: Some(regs::fwmacte(regs::FWMACTE_WORDS - 1)),
            result: Some(regs::FWMACTL),
            counter: Some(regs::FWMACEC),
        },
        FamilyBehavior {
            reset: regs::FWVLANTR,
            status: regs::FWVLANTSR,
            trigger: Some(regs::fwvlante(regs::FWVLANTE_WORDS - 1)),
            result: Some(regs::FWVLANTL),
            counter: None,
        },
        FamilyBehavior {
            reset: regs::FWIP4TR,
            status: regs::FWIP4TSR,
            trigger: Some(regs::fwip4te(regs::FWIP4TE_WORDS - 1)),
            result: Some(regs::FWIP4TL),
            counter: None,
        },
        FamilyBehavior {
            reset: regs::FWL3TR,
            status: regs::FWL3TSR,
            trigger: Some(regs::fwl3te(regs::FWL3TE_WORDS - 1)),
            result: Some(regs::FWL3TL),
            counter: None,
        },
        // The rewrite-template half shares the L3 reset domain but has its
        // own staging window and result register.
        FamilyBehavior {
            reset: regs::FWL3TR,
            status: regs::FWL3TSR,
            trigger: Some(regs::fwl23ue(regs::FWL23UE_WORDS - 1)),
            result: Some(regs::FWL23UL),
            counter: None,
        },
        FamilyBehavior {
            reset: regs::FWMCTR,
            status: regs::FWMCTSR,
            trigger: None,
            result: None,
            counter: None,
        },
    ];

    #[derive(Default)]
    pub struct FwdFake {
        regs: RefCell<BTreeMap<u32, u32>>,
        writes: RefCell<Vec<(u32, u32)>>,
        /// Ports whose mode status reads back their mode control.
        mirrored: RefCell<Vec<u8>>,
        /// Scripted learn results keyed by result register; an empty queue
        /// means every learn is accepted.
        learn_scripts: RefCell<BTreeMap<u32, VecDeque<u32>>>,
        /// Reset registers whose completion bit never sets.
        wedged: RefCell<Vec<u32>>,
    }

    impl FwdFake {
        /// Makes `port`'s mode status follow its mode control, so
        /// transitions on it succeed.
        pub fn mirror_mode(&self, port: PortId) {
            self.mirrored.borrow_mut().push(port.0);
        }

        /// Queues learn results for the family owning `result`; once the
        /// queue drains, further learns are accepted.
        pub fn script_learn(&self, result: RegAddr, codes: &[u32]) {
            self.learn_scripts
                .borrow_mut()
                .entry(result.0)
                .or_default()
                .extend(codes);
        }

        /// Makes resets through `reset` hang forever.
        pub fn wedge_reset(&self, reset: RegAddr) {
            self.wedged.borrow_mut().push(reset.0);
        }

        pub fn reg(&self, reg: RegAddr) -> u32 {
            *self.regs.borrow().get(&reg.0).unwrap_or(&0)
        }

        pub fn write_count(&self) -> usize {
            self.writes.borrow().len()
        }

        /// Number of writes made to `reg` so far.
        pub fn writes_to(&self, reg: RegAddr) -> usize {
            self.writes.borrow().iter().filter(|(r, _)| *r == reg.0).count()
        }

        pub fn snapshot(&self) -> BTreeMap<u32, u32> {
            self.regs.borrow().clone()
        }

        fn next_learn_code(&self, result: RegAddr) -> u32 {
            self.learn_scripts
                .borrow_mut()
                .get_mut(&result.0)
                .and_then(VecDeque::pop_front)
                .unwrap_or(regs::LEARN_OK)
        }
    }

    impl Rswitch2Rw for FwdFake {
        fn read(&self, reg: RegAddr) -> Result<u32, DevError> {
            for &p in self.mirrored.borrow().iter() {
                if reg == regs::pms(p) {
                    return Ok(self.reg(regs::pmc(p)));
                }
            }
            Ok(self.reg(reg))
        }

        fn write(&self, reg: RegAddr, value: u32) -> Result<(), DevError> {
            self.writes.borrow_mut().push((reg.0, value));
            self.regs.borrow_mut().insert(reg.0, value);

            for f in &FAMILIES {
                if reg == f.reset && value & regs::TABLE_RESET != 0 {
                    let done = if self.wedged.borrow().contains(&f.reset.0) {
                        0
                    } else {
                        regs::TABLE_RESET_DONE
                    };
                    self.regs.borrow_mut().insert(f.status.0, done);
                    if let Some(c) = f.counter {
                        self.regs.borrow_mut().insert(c.0, 0);
                    }
                }
                if let (Some(trigger), Some(result)) = (f.trigger, f.result) {
                    if trigger == reg {
                        // Learns complete within one poll in this fake;
                        // the busy bit is never observed set.
                        let code = self.next_learn_code(result);
                        self.regs.borrow_mut().insert(result.0, code);
                        if code == regs::LEARN_OK {
                            if let Some(c) = f.counter {
                                let n = self.reg(c);
                                self.regs.borrow_mut().insert(c.0, n + 1);
                            }
                        }
                    }
                }
            }
            Ok(())
        }

        fn sleep_ms(&self, _ms: u32) {}
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FwdFake;
    use super::*;
    use drv_rswitch2_api::config::{
        CascadeFilter, Destination, FilterConfig, FilterRef, FilterUnitMode,
        HashFields, MacEntry, MacTableConfig, PortMask, TagClassAccept,
        TwoByteFilter, VlanTag,
    };
    use drv_rswitch2_api::{LearnFailure, LearnReason};

    fn mac_entry(last_octet: u8) -> MacEntry {
        MacEntry {
            mac: [0x02, 0, 0, 0, 0, last_octet],
            dest: Destination {
                ports: PortMask::single(PortId(1)),
                csd: None,
                mirror: false,
                ipv: None,
            },
            src_lock: PortMask::EMPTY,
            dynamic: false,
            learn_disable: false,
            security: false,
        }
    }

    fn mac_config(n: u8) -> FwdConfig {
        let mut entries = heapless::Vec::new();
        for i in 0..n {
            entries.push(mac_entry(i)).unwrap();
        }
        FwdConfig {
            mac: Some(MacTableConfig {
                hash: HashFields::DST_MAC,
                entries,
            }),
            ..FwdConfig::default()
        }
    }

    fn switch_in_config(rw: &FwdFake) -> Rswitch2<'_, FwdFake> {
        rw.mirror_mode(PortId(0));
        let mut sw = Rswitch2::new(rw);
        sw.change_port_mode(PortId(0), OpMode::Disable).unwrap();
        sw.change_port_mode(PortId(0), OpMode::Config).unwrap();
        sw
    }

    #[test]
    fn learn_reject_does_not_abort_the_batch() {
        let rw = FwdFake::default();
        let sw = switch_in_config(&rw);
        rw.script_learn(
            regs::FWMACTL,
            &[
                regs::LEARN_OK,
                regs::LEARN_OK,
                regs::LEARN_OK,
                regs::LEARN_FAIL_SECURITY,
                regs::LEARN_OK,
            ],
        );

        let report = sw.apply_fwd_config(PortId(0), &mac_config(5)).unwrap();
        let mac = report.mac.unwrap();
        assert_eq!(mac.programmed, 4);
        assert_eq!(
            mac.failures.as_slice(),
            &[LearnFailure {
                index: 3,
                reason: LearnReason::Security,
            }]
        );
        assert_eq!(mac.dropped_failures, 0);
        assert_eq!(mac::count_entries(&rw).unwrap(), 4);
    }

    #[test]
    fn table_reset_is_idempotent() {
        let rw = FwdFake::default();
        let sw = switch_in_config(&rw);

        sw.apply_fwd_config(PortId(0), &mac_config(3)).unwrap();
        assert_eq!(mac::count_entries(&rw).unwrap(), 3);

        // Reapplying the same batch resets first; entries do not pile up.
        sw.apply_fwd_config(PortId(0), &mac_config(3)).unwrap();
        assert_eq!(mac::count_entries(&rw).unwrap(), 3);

        // An empty batch leaves the table reset and empty.
        sw.apply_fwd_config(PortId(0), &mac_config(0)).unwrap();
        assert_eq!(mac::count_entries(&rw).unwrap(), 0);
    }

    #[test]
    fn reset_timeout_aborts_before_any_staging_write() {
        let rw = FwdFake::default();
        let sw = switch_in_config(&rw);
        rw.wedge_reset(regs::FWMACTR);

        assert_eq!(
            sw.apply_fwd_config(PortId(0), &mac_config(3)),
            Err(ConfigError::Table(TableError::ResetTimeout))
        );
        assert_eq!(rw.writes_to(regs::fwmacte(0)), 0);
        assert_eq!(rw.writes_to(regs::FWMACHC), 0);
    }

    #[test]
    fn config_gate_rejects_without_register_traffic() {
        let rw = FwdFake::default();
        let mut sw = switch_in_config(&rw);
        sw.change_port_mode(PortId(0), OpMode::Operate).unwrap();

        let shadow = rw.snapshot();
        assert_eq!(
            sw.apply_fwd_config(PortId(0), &mac_config(2)),
            Err(ConfigError::State(StateError::NotInConfig))
        );
        let vlan_cfg = PortVlanConfig {
            port: PortId(0),
            cpu: false,
            egress: VlanEgressMode::None,
            ctag: VlanTag {
                vid: 1,
                pcp: 0,
                dei: false,
            },
            stag: VlanTag {
                vid: 1,
                pcp: 0,
                dei: false,
            },
            accept: TagClassAccept::UNTAGGED,
        };
        assert_eq!(
            sw.apply_port_vlan_config(&vlan_cfg),
            Err(ConfigError::State(StateError::NotInConfig))
        );
        assert_eq!(rw.snapshot(), shadow);
    }

    #[test]
    fn port_vlan_config_programs_tag_registers() {
        let rw = FwdFake::default();
        rw.mirror_mode(PortId(3));
        let mut sw = Rswitch2::new(&rw);
        sw.change_port_mode(PortId(3), OpMode::Disable).unwrap();
        sw.change_port_mode(PortId(3), OpMode::Config).unwrap();

        sw.apply_port_vlan_config(&PortVlanConfig {
            port: PortId(3),
            cpu: true,
            egress: VlanEgressMode::HwCTag,
            ctag: VlanTag {
                vid: 100,
                pcp: 2,
                dei: false,
            },
            stag: VlanTag {
                vid: 200,
                pcp: 0,
                dei: true,
            },
            accept: TagClassAccept::UNTAGGED | TagClassAccept::C,
        })
        .unwrap();

        assert_eq!(rw.reg(regs::pvcc(3)), 3 | regs::PVCC_CPU);
        assert_eq!(rw.reg(regs::pvct(3)), 100 | (2 << 12));
        assert_eq!(rw.reg(regs::pvst(3)), 200 | (1 << 15));
        assert_eq!(
            rw.reg(regs::ptfc(3)),
            (TagClassAccept::UNTAGGED | TagClassAccept::C).bits() as u32
        );
    }

    #[test]
    fn bad_cascade_ref_rejected_before_bank_writes() {
        let rw = FwdFake::default();
        let sw = switch_in_config(&rw);

        let mut filters = FilterConfig::default();
        filters
            .two_byte
            .push(TwoByteFilter {
                offset: 12,
                value: 0x8100,
                mask: 0xFFFF,
                mode: FilterUnitMode::Precise,
            })
            .unwrap();
        let mut refs = heapless::Vec::new();
        // Only one two-byte filter is populated; index 2 is dangling.
        refs.push(FilterRef::TwoByte(2)).unwrap();
        filters
            .cascade
            .push(CascadeFilter {
                refs,
                physical_gate: PortMask::single(PortId(1)),
                passthrough_gate: PortMask::EMPTY,
            })
            .unwrap();

        let cfg = FwdConfig {
            filters: Some(filters),
            ..FwdConfig::default()
        };
        assert_eq!(
            sw.apply_fwd_config(PortId(0), &cfg),
            Err(ConfigError::Table(TableError::BadFilterRef))
        );
        assert_eq!(rw.writes_to(regs::fwtwbf(0, 0)), 0);
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        let rw = FwdFake::default();
        let mut sw = Rswitch2::new(&rw);
        assert_eq!(
            sw.port_mode(PortId::GATEWAY),
            Err(StateError::Dev(DevError::OutOfRange))
        );
        assert_eq!(
            sw.change_port_mode(PortId(MAX_PORTS as u8), OpMode::Disable),
            Err(StateError::Dev(DevError::OutOfRange))
        );
    }
}
