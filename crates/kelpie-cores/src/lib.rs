//! Kelpie host-side control cores
//!
//! This crate drives the register-mapped control blocks of the kelpie
//! receive chain from the host:
//!
//! - **RX front-end correction core**: I/Q channel mapping, DC-offset
//!   cancellation, IQ imbalance correction, and the quarter-rate
//!   downconversion mixer, all programmed from physical-unit inputs.
//! - **SPI transaction core**: clock divider, shutdown gate, and the
//!   register-driven transaction primitive for the synchronous serial bus.
//!
//! Both cores reach hardware only through the [`RegisterBus`] seam, so any
//! synchronous 32-bit register transport works; [`SimRegisters`] provides a
//! software register file for development without hardware.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use kelpie_cores::{FeConnection, RxFrontendCore, SamplingMode, SharedBus, SimRegisters};
//!
//! let bus: SharedBus = Arc::new(Mutex::new(SimRegisters::new()));
//! let mut fe = RxFrontendCore::new(bus, 0x2000, 4);
//!
//! fe.set_adc_rate(40e6);
//! let conn = FeConnection::new(SamplingMode::Heterodyne).if_freq(10e6);
//! fe.set_fe_connection(&conn).unwrap();
//! ```

pub mod bus;
pub mod error;
pub mod fixed;
pub mod rx_frontend;
pub mod sim;
pub mod spi;
pub mod tree;

// Re-export main types
pub use bus::{RegisterBus, SharedBus};
pub use error::{CoreError, CoreResult};
pub use rx_frontend::{FeConnection, RxFrontendCore, SamplingMode};
pub use sim::SimRegisters;
pub use spi::{SpiConfig, SpiCore, SpiEdge};
pub use tree::{PropValue, PropertyTree, SharedRxFrontend};
