//! Register bus abstraction
//!
//! The cores in this crate never touch hardware directly: every operation is
//! a sequence of 32-bit register reads and writes issued through the
//! [`RegisterBus`] seam. The transport behind it (memory-mapped I/O, a USB
//! bridge, the simulated register file) is supplied by the caller and is
//! assumed reliable and synchronous; the cores perform no retries.
//!
//! Register addresses are computed by each core as `base + stride * index`
//! over a fixed per-core index table.

use std::sync::{Arc, Mutex};

use crate::error::{CoreError, CoreResult};

/// 32-bit register access seam consumed by the cores
pub trait RegisterBus: Send {
    /// Write a 32-bit value to the given register address
    fn write32(&mut self, addr: u32, value: u32) -> CoreResult<()>;

    /// Read a 32-bit value from the given register address
    fn read32(&mut self, addr: u32) -> CoreResult<u32>;
}

/// Shared-ownership handle to one transport, so a single bus can serve
/// several register-mapped cores. The transport lives as long as the
/// longest-surviving core holding a clone.
pub type SharedBus = Arc<Mutex<dyn RegisterBus>>;

pub(crate) fn poke32(bus: &SharedBus, addr: u32, value: u32) -> CoreResult<()> {
    bus.lock()
        .map_err(|_| CoreError::BusUnavailable("register bus lock poisoned".to_string()))?
        .write32(addr, value)
}

pub(crate) fn peek32(bus: &SharedBus, addr: u32) -> CoreResult<u32> {
    bus.lock()
        .map_err(|_| CoreError::BusUnavailable("register bus lock poisoned".to_string()))?
        .read32(addr)
}
