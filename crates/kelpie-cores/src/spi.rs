//! SPI transaction core
//!
//! Register-driven protocol engine for a synchronous serial peripheral bus.
//! The host configures a clock divider and a shutdown gate, then issues a
//! transaction by assembling a control word and writing an MSB-justified
//! payload; the engine shifts the payload out and captures MISO into a
//! readback register.
//!
//! Register layout (address = base + stride * index):
//!
//! - index 0, divider: serial clock half-period count
//! - index 1, control: slave select, transfer length, edge selects
//! - index 2, data: MSB-justified payload; the write triggers the transfer
//! - index 3, shutdown: nonzero drops every subsequent transaction
//!
//! plus an independently supplied readback address holding captured MISO
//! bits. While shut down, the hardware drops transactions silently; the
//! core neither detects nor reports the loss.

use serde::{Deserialize, Serialize};

use crate::bus::{self, SharedBus};
use crate::error::{CoreError, CoreResult};

/// SPI engine register index table
pub mod regs {
    /// Serial clock divider
    pub const DIVIDER: u32 = 0;
    /// Transaction control word
    pub const CONTROL: u32 = 1;
    /// Transmit data; writing starts the transfer
    pub const DATA: u32 = 2;
    /// Shutdown gate
    pub const SHUTDOWN: u32 = 3;
}

// Control word layout
const CTRL_SLAVE_MASK: u32 = 0x00FF_FFFF;
const CTRL_LENGTH_SHIFT: u32 = 24;
const CTRL_MISO_EDGE_RISE: u32 = 1 << 30;
const CTRL_MOSI_EDGE_FALL: u32 = 1 << 31;

/// Clock edge on which data is launched or sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpiEdge {
    /// Rising edge of the serial clock
    Rise,
    /// Falling edge of the serial clock
    Fall,
}

/// Edge configuration for one attached slave device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiConfig {
    /// Edge on which MOSI data is launched
    pub mosi_edge: SpiEdge,
    /// Edge on which MISO data is sampled
    pub miso_edge: SpiEdge,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            mosi_edge: SpiEdge::Rise,
            miso_edge: SpiEdge::Rise,
        }
    }
}

/// Boxed register write function, for composing SPI access without the
/// full bus abstraction
pub type Poke32Fn = Box<dyn FnMut(u32, u32) -> CoreResult<()> + Send>;
/// Boxed register read function
pub type Peek32Fn = Box<dyn FnMut(u32) -> CoreResult<u32> + Send>;

/// Access path to the engine's registers; both variants behave identically
enum SpiAccess {
    Bus(SharedBus),
    Fns { poke32: Poke32Fn, peek32: Peek32Fn },
}

impl SpiAccess {
    fn poke32(&mut self, addr: u32, value: u32) -> CoreResult<()> {
        match self {
            SpiAccess::Bus(shared) => bus::poke32(shared, addr, value),
            SpiAccess::Fns { poke32, .. } => poke32(addr, value),
        }
    }

    fn peek32(&mut self, addr: u32) -> CoreResult<u32> {
        match self {
            SpiAccess::Bus(shared) => bus::peek32(shared, addr),
            SpiAccess::Fns { peek32, .. } => peek32(addr),
        }
    }
}

/// One SPI engine instance
pub struct SpiCore {
    access: SpiAccess,
    div_reg: u32,
    ctrl_reg: u32,
    data_reg: u32,
    shutdown_reg: u32,
    readback_reg: u32,
    cached_div: Option<u32>,
    cached_ctrl: Option<u32>,
    shutdown: bool,
}

impl SpiCore {
    /// Register stride used when constructing from a shared bus handle
    pub const DEFAULT_STRIDE: u32 = 4;

    /// Build from a shared register bus handle
    pub fn new(bus: SharedBus, base: u32, readback: u32) -> Self {
        Self::with_access(SpiAccess::Bus(bus), base, Self::DEFAULT_STRIDE, readback)
    }

    /// Build from independently supplied register accessors, for callers
    /// that compose SPI access without the full bus abstraction
    pub fn from_fns(
        poke32: Poke32Fn,
        peek32: Peek32Fn,
        base: u32,
        stride: u32,
        readback: u32,
    ) -> Self {
        Self::with_access(SpiAccess::Fns { poke32, peek32 }, base, stride, readback)
    }

    fn with_access(access: SpiAccess, base: u32, stride: u32, readback: u32) -> Self {
        Self {
            access,
            div_reg: base + stride * regs::DIVIDER,
            ctrl_reg: base + stride * regs::CONTROL,
            data_reg: base + stride * regs::DATA,
            shutdown_reg: base + stride * regs::SHUTDOWN,
            readback_reg: readback,
            cached_div: None,
            cached_ctrl: None,
            shutdown: false,
        }
    }

    /// Program the serial clock divider from the requested bus-clock
    /// ratio. The engine counts half-periods, so the programmed value is
    /// `div / 2 - 0.5` truncated, floored at zero. Redundant writes are
    /// suppressed.
    pub fn set_divider(&mut self, div: f64) -> CoreResult<()> {
        let divisor = ((div / 2.0) - 0.5).max(0.0) as u32;
        if self.cached_div != Some(divisor) {
            self.access.poke32(self.div_reg, divisor)?;
            self.cached_div = Some(divisor);
        }
        Ok(())
    }

    /// Gate the engine. While shut down the hardware drops every
    /// transaction without notifying the host.
    pub fn set_shutdown(&mut self, enabled: bool) -> CoreResult<()> {
        self.shutdown = enabled;
        tracing::debug!("spi engine shutdown = {}", enabled);
        self.access.poke32(self.shutdown_reg, enabled as u32)
    }

    /// Last commanded shutdown state
    pub fn shutdown(&self) -> bool {
        self.shutdown
    }

    /// Issue one transaction: shift out the low `num_bits` of `data`, MSB
    /// first, to the slaves selected by `slave`. With `readback` the
    /// captured MISO bits are read and returned; the readback peek is the
    /// completion point. Without it the write is fire-and-forget and 0 is
    /// returned.
    ///
    /// Control and divider registers are rewritten only when their cached
    /// values change.
    pub fn transact(
        &mut self,
        slave: u32,
        num_bits: u32,
        data: u32,
        readback: bool,
        config: &SpiConfig,
    ) -> CoreResult<u32> {
        if num_bits == 0 || num_bits > 32 {
            return Err(CoreError::InvalidSpiLength(num_bits));
        }

        let mut ctrl = (slave & CTRL_SLAVE_MASK) | ((num_bits & 0x3F) << CTRL_LENGTH_SHIFT);
        if config.miso_edge == SpiEdge::Rise {
            ctrl |= CTRL_MISO_EDGE_RISE;
        }
        if config.mosi_edge == SpiEdge::Fall {
            ctrl |= CTRL_MOSI_EDGE_FALL;
        }

        if self.cached_ctrl != Some(ctrl) {
            self.access.poke32(self.ctrl_reg, ctrl)?;
            self.cached_ctrl = Some(ctrl);
        }

        // The engine shifts from the register's MSB down.
        let payload = data << (32 - num_bits);
        self.access.poke32(self.data_reg, payload)?;
        tracing::trace!(
            "spi transact slave 0x{:06x}, {} bits, payload 0x{:08x}",
            slave,
            num_bits,
            payload
        );

        if readback {
            self.access.peek32(self.readback_reg)
        } else {
            Ok(0)
        }
    }
}
