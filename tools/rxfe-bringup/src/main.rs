//! RX front-end bring-up against the simulated register bus.
//!
//! Walks the control cores through a typical receive-chain setup (a
//! heterodyne connection, fixed DC offset, IQ balance correction, and one
//! SPI transaction), then dumps the resulting register file. No hardware
//! required; useful for eyeballing register encodings during development.

use std::sync::{Arc, Mutex};

use num_complex::Complex64;
use tracing_subscriber::EnvFilter;

use kelpie_cores::{
    CoreResult, FeConnection, RxFrontendCore, SamplingMode, SharedBus, SimRegisters, SpiConfig,
    SpiCore,
};

const FE_BASE: u32 = 0x2000;
const FE_STRIDE: u32 = 4;
const SPI_BASE: u32 = 0x0600;
const SPI_READBACK: u32 = 0x0900;

const ADC_RATE_HZ: f64 = 40e6;
const IF_FREQ_HZ: f64 = 10e6;

fn main() -> CoreResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let sim = Arc::new(Mutex::new(SimRegisters::new()));
    let bus: SharedBus = sim.clone();

    // Front end: heterodyne connection at a quarter of the ADC rate.
    let mut fe = RxFrontendCore::new(bus.clone(), FE_BASE, FE_STRIDE);
    fe.set_adc_rate(ADC_RATE_HZ);
    let conn = FeConnection::new(SamplingMode::Heterodyne).if_freq(IF_FREQ_HZ);
    fe.set_fe_connection(&conn)?;

    let applied = fe.set_dc_offset(Complex64::new(0.0123, -0.0042))?;
    tracing::info!("dc offset applied as {:+.9} {:+.9}i", applied.re, applied.im);
    fe.set_iq_balance(Complex64::new(0.02, -0.015))?;

    // SPI engine: program a slave register and read the shifted-out echo.
    let mut spi = SpiCore::new(bus, SPI_BASE, SPI_READBACK);
    spi.set_divider(16.0)?;
    spi.set_shutdown(false)?;
    sim.lock()
        .map_err(|_| kelpie_cores::CoreError::BusUnavailable("sim lock poisoned".to_string()))?
        .preload(SPI_READBACK, 0x0000_00A5);
    let miso = spi.transact(0x1, 24, 0x00_8F_42, true, &SpiConfig::default())?;
    tracing::info!("spi readback 0x{:06x}", miso);

    // Dump the register file in write order.
    let sim = sim
        .lock()
        .map_err(|_| kelpie_cores::CoreError::BusUnavailable("sim lock poisoned".to_string()))?;
    println!("addr       value");
    for (addr, value) in sim.writes() {
        println!("0x{:08x} 0x{:08x}", addr, value);
    }

    Ok(())
}
