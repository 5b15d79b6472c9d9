// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared types for the R-Switch2 gateway DMA engine and switch core.
//!
//! This crate is factored out so that `drv/rswitch2-gwca` (the descriptor
//! ring engine) and `drv/rswitch2` (the forwarding engine configurator) can
//! share ids, the register access trait, the administrative configuration
//! surface, and the error taxonomy without depending on each other.

#![cfg_attr(not(test), no_std)]

pub mod config;

use serde::{Deserialize, Serialize};

/// Identifies one physical port, or the internal CPU/gateway pseudo-port.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct PortId(pub u8);

impl PortId {
    /// Sentinel for the internal gateway pseudo-port. This is what RX
    /// descriptors carry for queues dedicated to CPU traffic, where the
    /// routing metadata has no physical source port to report.
    pub const GATEWAY: PortId = PortId(0xFF);

    pub fn is_gateway(self) -> bool {
        self == Self::GATEWAY
    }
}

/// Identifies one directional queue within a gateway engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct QueueId(pub u8);

/// The most physical ports an engine instance will track.
pub const MAX_PORTS: usize = 16;

/// Per-port (and per-gateway-engine) operational mode.
///
/// `Failed` is a software-side sink state: it is entered when a mode
/// transition times out, and is never reported by the hardware itself.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OpMode {
    Reset,
    Disable,
    Config,
    Operate,
    Failed,
}

impl OpMode {
    /// Hardware encoding of the mode-select field. `Failed` has no encoding;
    /// asking for one is a caller bug.
    pub fn select_bits(self) -> Option<u32> {
        match self {
            OpMode::Reset => Some(0),
            OpMode::Disable => Some(1),
            OpMode::Config => Some(2),
            OpMode::Operate => Some(3),
            OpMode::Failed => None,
        }
    }

    pub fn from_status_bits(bits: u32) -> Option<Self> {
        match bits & 0b111 {
            0 => Some(OpMode::Reset),
            1 => Some(OpMode::Disable),
            2 => Some(OpMode::Config),
            3 => Some(OpMode::Operate),
            _ => None,
        }
    }
}

/// A hardware timestamp, as carried in extended descriptors and timestamp
/// completion records.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timestamp {
    pub sec: u32,
    pub nsec: u32,
}

/// Address of a 32-bit register within the device's register space. The
/// layout of that space is owned by the driver crates; this is deliberately
/// opaque.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct RegAddr(pub u32);

impl RegAddr {
    pub const fn offset(self, words: u32) -> Self {
        RegAddr(self.0 + words * 4)
    }
}

/// Register transport failure. MMIO itself can't fail, but the register
/// window may sit behind a bus (PCIe, SPI bridge) that can, and fakes use
/// this to inject faults.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DevError {
    /// The transport reported an error completing the access.
    Bus,
    /// The address is outside any mapped register window.
    OutOfRange,
}

/// This trait abstracts over ways of talking to an R-Switch2.
///
/// Implementations exist for memory-mapped hardware and for scripted fakes in
/// tests; `sleep_ms` exists so that the bounded hardware-readiness polls can
/// run instantaneously against a fake.
pub trait Rswitch2Rw {
    fn read(&self, reg: RegAddr) -> Result<u32, DevError>;

    fn write(&self, reg: RegAddr, value: u32) -> Result<(), DevError>;

    /// Sleeps for roughly `ms` milliseconds between readiness polls.
    fn sleep_ms(&self, ms: u32);

    /// Performs a write where the value is built by calling `f` on zero.
    /// Reduces manual type bookkeeping at call sites.
    fn write_with<F>(&self, reg: RegAddr, f: F) -> Result<(), DevError>
    where
        F: Fn(&mut u32),
    {
        let mut data = 0;
        f(&mut data);
        self.write(reg, data)
    }

    /// Performs a read-modify-write on a register. The caller must hold
    /// whatever serialization the register requires; see the concurrency
    /// notes in the driver crates.
    fn modify<F>(&self, reg: RegAddr, f: F) -> Result<(), DevError>
    where
        F: Fn(&mut u32),
    {
        let mut data = self.read(reg)?;
        f(&mut data);
        self.write(reg, data)
    }
}

/// Default number of 1 ms readiness polls before a hardware operation is
/// declared timed out.
pub const POLL_TRIES: u32 = 100;

/// Polls `ready` up to `tries` times, sleeping 1 ms between attempts.
///
/// Returns `Ok(true)` as soon as `ready` reports true, `Ok(false)` if the
/// budget expires first. Register transport errors abort the poll. This is
/// the bounded replacement for an unbounded status-bit spin: the caller maps
/// `Ok(false)` to its own timeout error.
pub fn poll_ready<R, F>(rw: &R, tries: u32, ready: F) -> Result<bool, DevError>
where
    R: Rswitch2Rw,
    F: Fn(&R) -> Result<bool, DevError>,
{
    for i in 0..tries {
        if ready(rw)? {
            return Ok(true);
        }
        if i + 1 != tries {
            rw.sleep_ms(1);
        }
    }
    Ok(false)
}

/// Fatal ring desynchronization: software tried to advance past a slot whose
/// descriptor type says the hardware still owns it. This indicates a race
/// with the hardware or a driver bug; the queue must be torn down and reset,
/// not resumed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RingError {
    Consistency,
}

/// Errors from the TX submission path.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TxError {
    /// Frame exceeds the maximum frame size.
    TooLong,
    /// The queue is not accepting frames (owning port is not in `Operate`,
    /// or the queue latched a ring consistency fault).
    QueueStopped,
    /// No free descriptor slots; apply backpressure and retry after reclaim.
    RingFull,
    /// DMA mapping failed; the partial chain was unwound and nothing was
    /// committed to the hardware.
    MapFailed,
    /// All 255 timestamp tags are outstanding on this queue's port.
    TimestampBacklog,
    Dev(DevError),
}

impl From<DevError> for TxError {
    fn from(e: DevError) -> Self {
        TxError::Dev(e)
    }
}

/// Errors from the RX path. Mapping failures during refill are handled
/// internally by poisoning the slot (`size = 0`), so this only surfaces for
/// consistency faults.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RxError {
    Ring(RingError),
    Dev(DevError),
}

impl From<DevError> for RxError {
    fn from(e: DevError) -> Self {
        RxError::Dev(e)
    }
}

/// Errors from queue maintenance operations addressed by `QueueId`
/// (teardown, forced reclaim, enable/disable).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum QueueError {
    /// No queue is registered under that id.
    Unknown,
    Ring(RingError),
    Dev(DevError),
}

impl From<RingError> for QueueError {
    fn from(e: RingError) -> Self {
        QueueError::Ring(e)
    }
}

impl From<DevError> for QueueError {
    fn from(e: DevError) -> Self {
        QueueError::Dev(e)
    }
}

/// Why the hardware refused to learn a table entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LearnReason {
    /// General failure (typically a hash-bucket collision).
    General,
    /// The entry violated a security/source-lock constraint.
    Security,
    /// The entry's fields were rejected as malformed.
    Format,
}

/// One per-entry learn failure, identified by the entry's index in the
/// submitted batch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LearnFailure {
    pub index: u16,
    pub reason: LearnReason,
}

/// How many individual learn failures a report can carry before it starts
/// counting instead of recording.
pub const LEARN_FAILURES_MAX: usize = 32;

/// Aggregate result of programming one table family: per-entry learn
/// failures do not abort the batch, they are collected here.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LearnReport {
    /// Entries accepted by the hardware.
    pub programmed: u16,
    /// The first `LEARN_FAILURES_MAX` failures, in batch order.
    pub failures: heapless::Vec<LearnFailure, LEARN_FAILURES_MAX>,
    /// Failures beyond the recording capacity.
    pub dropped_failures: u16,
}

impl LearnReport {
    pub fn record_ok(&mut self) {
        self.programmed += 1;
    }

    pub fn record_failure(&mut self, index: u16, reason: LearnReason) {
        if self.failures.push(LearnFailure { index, reason }).is_err() {
            self.dropped_failures += 1;
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.dropped_failures == 0
    }
}

/// Errors from forwarding-table configuration. These abort the batch for the
/// affected table family only; other families are unaffected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableError {
    /// Table reset did not report completion within the poll budget. The
    /// table is in an undefined state and must not be used.
    ResetTimeout,
    /// The sub-config exceeds the table's documented capacity.
    TooManyEntries,
    /// A cascade filter references a filter id outside its bank.
    BadFilterRef,
    /// A multicast chain exceeds the hardware bound of 7 links.
    ChainTooLong,
    /// A multicast chain's next-links loop back on themselves, or two
    /// chains claim the same table slot.
    ChainCycle,
    /// A multicast chain references a slot outside the table, or its slot
    /// and port lists disagree in length.
    BadChainLink,
    Dev(DevError),
}

impl From<DevError> for TableError {
    fn from(e: DevError) -> Self {
        TableError::Dev(e)
    }
}

/// Errors from port/engine mode transitions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StateError {
    /// The mode-status register never reported the requested mode; the port
    /// has been latched `Failed`.
    Timeout,
    /// A `Config`-only operation was invoked while the port was operating.
    /// Nothing was written to the hardware.
    NotInConfig,
    /// The port is in the `Failed` sink and must be explicitly recovered
    /// through `Reset` first.
    Failed,
    Dev(DevError),
}

impl From<DevError> for StateError {
    fn from(e: DevError) -> Self {
        StateError::Dev(e)
    }
}
