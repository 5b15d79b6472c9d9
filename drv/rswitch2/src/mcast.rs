// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Multicast fan-out chain table programming.
//!
//! The table is an array of link entries: each valid slot names a delivery
//! port and the next slot in its chain (or an end marker). A frame whose
//! forwarding decision points at a chain head is replicated to every port
//! along the chain. The hardware walks at most [`MCAST_CHAIN_LEN_MAX`]
//! links, so validation rejects longer chains, cyclic or slot-sharing
//! chains, and out-of-range links before touching the table.

use crate::fwd;
use crate::regs::{self, Family};
use drv_rswitch2_api::config::{
    McastChain, McastTableConfig, MCAST_CHAIN_LEN_MAX, MCAST_CHAIN_SLOTS,
};
use drv_rswitch2_api::{Rswitch2Rw, TableError};

const FAMILY: Family = Family {
    reset: regs::FWMCTR,
    status: regs::FWMCTSR,
    // The chain table has no learn protocol; entries are direct register
    // writes. Only the reset half of the family is used.
    result: regs::FWMCTSR,
};

fn validate(cfg: &McastTableConfig) -> Result<(), TableError> {
    // One bit per table slot; a slot claimed twice (within one chain or
    // across chains) would splice the chains together.
    let mut claimed = [false; MCAST_CHAIN_SLOTS];
    for chain in &cfg.chains {
        validate_chain(chain)?;
        for &slot in &chain.slots {
            let slot = slot as usize;
            if slot >= MCAST_CHAIN_SLOTS {
                return Err(TableError::BadChainLink);
            }
            if claimed[slot] {
                return Err(TableError::ChainCycle);
            }
            claimed[slot] = true;
        }
    }
    Ok(())
}

fn validate_chain(chain: &McastChain) -> Result<(), TableError> {
    if chain.slots.len() != chain.ports.len() {
        return Err(TableError::BadChainLink);
    }
    if chain.slots.len() > MCAST_CHAIN_LEN_MAX {
        return Err(TableError::ChainTooLong);
    }
    Ok(())
}

pub fn program<R: Rswitch2Rw>(
    rw: &R,
    cfg: &McastTableConfig,
) -> Result<(), TableError> {
    validate(cfg)?;
    fwd::reset_table(rw, &FAMILY)?;

    for chain in &cfg.chains {
        for (i, (&slot, &port)) in
            chain.slots.iter().zip(&chain.ports).enumerate()
        {
            let next = match chain.slots.get(i + 1) {
                Some(&n) => n as u32,
                None => regs::MCAST_LINK_END,
            };
            rw.write(
                regs::fwmcle(slot),
                regs::MCAST_LINK_VALID | port.0 as u32 | (next << 8),
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_rswitch2_api::PortId;
    use heapless::Vec;

    fn chain(slots: &[u8]) -> McastChain {
        McastChain {
            slots: Vec::from_slice(slots).unwrap(),
            ports: slots
                .iter()
                .map(|&s| PortId(s % 4))
                .collect::<Vec<_, MCAST_CHAIN_SLOTS>>(),
        }
    }

    #[test]
    fn rejects_overlong_chain() {
        let cfg = McastTableConfig {
            chains: Vec::from_slice(&[chain(&[0, 1, 2, 3, 4, 5, 6, 7])])
                .unwrap(),
        };
        assert_eq!(validate(&cfg), Err(TableError::ChainTooLong));
    }

    #[test]
    fn rejects_shared_slot() {
        let cfg = McastTableConfig {
            chains: Vec::from_slice(&[chain(&[0, 1]), chain(&[2, 1])])
                .unwrap(),
        };
        assert_eq!(validate(&cfg), Err(TableError::ChainCycle));
    }

    #[test]
    fn rejects_self_cycle() {
        let cfg = McastTableConfig {
            chains: Vec::from_slice(&[chain(&[3, 4, 3])]).unwrap(),
        };
        assert_eq!(validate(&cfg), Err(TableError::ChainCycle));
    }

    #[test]
    fn rejects_out_of_range_slot() {
        let cfg = McastTableConfig {
            chains: Vec::from_slice(&[chain(&[0, 200])]).unwrap(),
        };
        assert_eq!(validate(&cfg), Err(TableError::BadChainLink));
    }

    #[test]
    fn accepts_disjoint_chains() {
        let cfg = McastTableConfig {
            chains: Vec::from_slice(&[chain(&[0, 1, 2]), chain(&[10, 11])])
                .unwrap(),
        };
        assert_eq!(validate(&cfg), Ok(()));
    }
}
