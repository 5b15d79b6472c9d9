// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-port operational state machine.
//!
//! The hardware path is `Reset -> Disable -> Config -> Operate`; `Failed`
//! is a software-side sink a port falls into when a transition times out,
//! and the only way out is an explicit transition back through `Reset`.
//! Table programming and VLAN/queue configuration are legal only in
//! `Config`; [`PortState::require_config`] is the gate every such operation
//! checks *before* its first register write.

use crate::regs;
use drv_rswitch2_api::{
    poll_ready, OpMode, PortId, Rswitch2Rw, StateError, POLL_TRIES,
};

#[derive(Copy, Clone, Debug)]
pub struct PortState {
    mode: OpMode,
}

impl Default for PortState {
    fn default() -> Self {
        PortState {
            mode: OpMode::Reset,
        }
    }
}

impl PortState {
    /// The committed mode: the last target the hardware confirmed, or
    /// `Failed`.
    pub fn mode(&self) -> OpMode {
        self.mode
    }

    /// Drives the port to `target`: writes the mode select, then polls the
    /// mode status until the hardware reports the target.
    ///
    /// On poll expiry the port latches `Failed` and every subsequent
    /// transition except `Reset` is rejected without touching the
    /// hardware. `Reset` from `Failed` is the recovery path.
    pub fn change_mode<R: Rswitch2Rw>(
        &mut self,
        rw: &R,
        port: PortId,
        target: OpMode,
    ) -> Result<(), StateError> {
        let Some(sel) = target.select_bits() else {
            // Failed is not a hardware mode; it cannot be requested.
            return Err(StateError::Failed);
        };
        if self.mode == OpMode::Failed && target != OpMode::Reset {
            return Err(StateError::Failed);
        }

        rw.write(regs::pmc(port.0), sel)?;
        let ok = poll_ready(rw, POLL_TRIES, |rw| {
            Ok(OpMode::from_status_bits(rw.read(regs::pms(port.0))?)
                == Some(target))
        })?;
        if !ok {
            self.mode = OpMode::Failed;
            return Err(StateError::Timeout);
        }
        self.mode = target;
        Ok(())
    }

    /// Gate for `Config`-only operations. Fails without any register
    /// traffic when the port is elsewhere.
    pub fn require_config(&self) -> Result<(), StateError> {
        match self.mode {
            OpMode::Config => Ok(()),
            OpMode::Failed => Err(StateError::Failed),
            _ => Err(StateError::NotInConfig),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FwdFake;

    #[test]
    fn transition_commits_on_status_report() {
        let rw = FwdFake::default();
        rw.mirror_mode(PortId(2));
        let mut p = PortState::default();

        p.change_mode(&rw, PortId(2), OpMode::Disable).unwrap();
        p.change_mode(&rw, PortId(2), OpMode::Config).unwrap();
        p.change_mode(&rw, PortId(2), OpMode::Operate).unwrap();
        assert_eq!(p.mode(), OpMode::Operate);
    }

    #[test]
    fn timeout_latches_failed_until_reset() {
        let rw = FwdFake::default();
        // No mode mirror: status never reports the target.
        let mut p = PortState::default();
        assert_eq!(
            p.change_mode(&rw, PortId(0), OpMode::Config),
            Err(StateError::Timeout)
        );
        assert_eq!(p.mode(), OpMode::Failed);

        // Everything except recovery is rejected with no register writes.
        let writes_before = rw.write_count();
        assert_eq!(
            p.change_mode(&rw, PortId(0), OpMode::Operate),
            Err(StateError::Failed)
        );
        assert_eq!(p.require_config(), Err(StateError::Failed));
        assert_eq!(rw.write_count(), writes_before);

        // Reset is allowed through and recovers the port.
        rw.mirror_mode(PortId(0));
        p.change_mode(&rw, PortId(0), OpMode::Reset).unwrap();
        assert_eq!(p.mode(), OpMode::Reset);
    }

    #[test]
    fn config_gate() {
        let rw = FwdFake::default();
        rw.mirror_mode(PortId(1));
        let mut p = PortState::default();
        assert_eq!(p.require_config(), Err(StateError::NotInConfig));
        p.change_mode(&rw, PortId(1), OpMode::Config).unwrap();
        assert_eq!(p.require_config(), Ok(()));
        p.change_mode(&rw, PortId(1), OpMode::Operate).unwrap();
        assert_eq!(p.require_config(), Err(StateError::NotInConfig));
    }
}
