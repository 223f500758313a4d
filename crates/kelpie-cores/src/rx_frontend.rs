//! RX front-end correction core
//!
//! Host-side control for the receive front-end DSP block: I/Q channel
//! mapping, DC-offset cancellation, IQ imbalance correction, and the
//! quarter-rate digital downconversion mixer. All configuration happens
//! through fixed-width register writes over the [`RegisterBus`] seam; this
//! module owns the numeric translation from physical units (full-scale
//! fractions, Hz) into the fixed-point register encodings.
//!
//! The downconversion mixer only supports an IF that aliases to exactly a
//! quarter of the ADC rate; anything else is a caller error.
//!
//! [`RegisterBus`]: crate::bus::RegisterBus

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::bus::{self, SharedBus};
use crate::error::{CoreError, CoreResult};
use crate::fixed;

/// Front-end register index table (address = base + stride * index)
pub mod regs {
    /// IQ magnitude correction (18 bits)
    pub const MAG_CORRECTION: u32 = 0;
    /// IQ phase correction (18 bits)
    pub const PHASE_CORRECTION: u32 = 1;
    /// I channel DC offset (30-bit magnitude plus control flags)
    pub const OFFSET_I: u32 = 2;
    /// Q channel DC offset (30-bit magnitude plus control flags)
    pub const OFFSET_Q: u32 = 3;
    /// Channel mapping and mode select
    pub const MAPPING: u32 = 4;
    /// Heterodyne mixer rotation direction
    pub const HET_PHASE: u32 = 5;
}

/// Mapping register bits
pub mod mapping {
    /// Swap the I and Q channels
    pub const SWAP_IQ: u32 = 1 << 0;
    /// Real-valued sampling (single ADC channel)
    pub const REAL_MODE: u32 = 1 << 1;
    /// Invert the Q channel
    pub const INVERT_Q: u32 = 1 << 2;
    /// Invert the I channel
    pub const INVERT_I: u32 = 1 << 3;
    /// Enable the quarter-rate downconversion mixer
    pub const DOWNCONVERT: u32 = 1 << 4;
    /// Bypass every correction stage
    pub const BYPASS_ALL: u32 = 1 << 7;
}

// DC offset register layout: the low 30 bits carry the signed magnitude,
// the top two bits are control flags.
const OFFSET_FIXED: u32 = 1 << 31;
const OFFSET_SET: u32 = 1 << 30;
const OFFSET_VALUE_MASK: u32 = !(OFFSET_FIXED | OFFSET_SET);

const DC_OFFSET_FRAC_BITS: u32 = 29;
const IQ_CORRECTION_BITS: u32 = 18;

/// Normalized DC offset lower bound
pub const DC_OFFSET_MIN: f64 = -1.0;
/// Normalized DC offset upper bound
pub const DC_OFFSET_MAX: f64 = 1.0;

/// Default DC offset correction
pub const DEFAULT_DC_OFFSET: Complex64 = Complex64::new(0.0, 0.0);
/// Hardware auto-tracking governs the offset until a fixed value is latched
pub const DEFAULT_DC_OFFSET_AUTO: bool = true;
/// Default IQ imbalance correction
pub const DEFAULT_IQ_BALANCE: Complex64 = Complex64::new(0.0, 0.0);

/// How raw ADC samples are presented to the baseband I/Q path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMode {
    /// Both channels digitized directly; no mode bit set
    Complex,
    /// A single real channel is digitized
    Real,
    /// A single real channel is digitized and digitally downconverted
    /// from an intermediate frequency
    Heterodyne,
}

/// Connection descriptor: how raw ADC I/Q maps onto baseband I/Q
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeConnection {
    /// Sampling mode of the attached front end
    pub sampling_mode: SamplingMode,
    /// Swap the I and Q channels
    pub swap_iq: bool,
    /// Invert the I channel
    pub invert_i: bool,
    /// Invert the Q channel
    pub invert_q: bool,
    /// Intermediate frequency in Hz (heterodyne mode only)
    pub if_freq_hz: f64,
}

impl Default for FeConnection {
    fn default() -> Self {
        Self::new(SamplingMode::Complex)
    }
}

impl FeConnection {
    /// Create a descriptor with no swaps, no inversions, and a 0 Hz IF
    pub fn new(sampling_mode: SamplingMode) -> Self {
        Self {
            sampling_mode,
            swap_iq: false,
            invert_i: false,
            invert_q: false,
            if_freq_hz: 0.0,
        }
    }

    /// Builder: swap the I and Q channels
    pub fn swap_iq(mut self, swap: bool) -> Self {
        self.swap_iq = swap;
        self
    }

    /// Builder: invert the I channel
    pub fn invert_i(mut self, invert: bool) -> Self {
        self.invert_i = invert;
        self
    }

    /// Builder: invert the Q channel
    pub fn invert_q(mut self, invert: bool) -> Self {
        self.invert_q = invert;
        self
    }

    /// Builder: set the intermediate frequency in Hz
    pub fn if_freq(mut self, hz: f64) -> Self {
        self.if_freq_hz = hz;
        self
    }
}

/// Address set for one front-end instance, fixed at construction
#[derive(Debug, Clone, Copy)]
struct RxFeRegisters {
    mag_corr: u32,
    phase_corr: u32,
    offset_i: u32,
    offset_q: u32,
    mapping: u32,
    het_phase: u32,
}

impl RxFeRegisters {
    fn new(base: u32, stride: u32) -> Self {
        Self {
            mag_corr: base + stride * regs::MAG_CORRECTION,
            phase_corr: base + stride * regs::PHASE_CORRECTION,
            offset_i: base + stride * regs::OFFSET_I,
            offset_q: base + stride * regs::OFFSET_Q,
            mapping: base + stride * regs::MAPPING,
            het_phase: base + stride * regs::HET_PHASE,
        }
    }
}

/// One RX front-end correction block
pub struct RxFrontendCore {
    bus: SharedBus,
    regs: RxFeRegisters,
    i_dc_off: i32,
    q_dc_off: i32,
    adc_rate: f64,
    fe_conn: FeConnection,
}

impl RxFrontendCore {
    /// Create a core over the register block at `base` with the given
    /// per-register address stride
    pub fn new(bus: SharedBus, base: u32, stride: u32) -> Self {
        Self {
            bus,
            regs: RxFeRegisters::new(base, stride),
            i_dc_off: 0,
            q_dc_off: 0,
            adc_rate: 0.0,
            fe_conn: FeConnection::default(),
        }
    }

    /// Store the ADC sample rate in Hz. Must be non-zero before a
    /// heterodyne connection is applied.
    pub fn set_adc_rate(&mut self, rate_hz: f64) {
        self.adc_rate = rate_hz;
    }

    /// Stored ADC sample rate in Hz
    pub fn adc_rate(&self) -> f64 {
        self.adc_rate
    }

    /// Last applied connection descriptor
    pub fn fe_connection(&self) -> &FeConnection {
        &self.fe_conn
    }

    /// Apply a connection descriptor: program the mapping register and,
    /// for heterodyne mode, the mixer rotation direction.
    ///
    /// Heterodyne connections require a non-zero ADC rate and an IF that
    /// aliases to exactly a quarter of it.
    pub fn set_fe_connection(&mut self, conn: &FeConnection) -> CoreResult<()> {
        let mut mapping_val = match conn.sampling_mode {
            SamplingMode::Complex => 0,
            SamplingMode::Real => mapping::REAL_MODE,
            SamplingMode::Heterodyne => mapping::REAL_MODE | mapping::DOWNCONVERT,
        };

        if conn.swap_iq {
            mapping_val |= mapping::SWAP_IQ;
        }
        if conn.invert_i {
            mapping_val |= mapping::INVERT_I;
        }
        if conn.invert_q {
            mapping_val |= mapping::INVERT_Q;
        }

        bus::poke32(&self.bus, self.regs.mapping, mapping_val)?;

        if conn.sampling_mode == SamplingMode::Heterodyne {
            if self.adc_rate == 0.0 {
                return Err(CoreError::AdcRateNotSet);
            }

            // Keep the sign of the requested IF; the fold below discards it.
            let if_sign: f64 = if conn.if_freq_hz < 0.0 { -1.0 } else { 1.0 };

            // Fold the IF into [0, rate), then into the Nyquist-centered
            // range [-rate/2, rate/2). This is the aliased frequency the
            // sampled spectrum actually contains.
            let mut if_freq = (conn.if_freq_hz % self.adc_rate).abs();
            if if_freq > self.adc_rate / 2.0 {
                if_freq -= self.adc_rate;
            }

            // The mixer spins opposite to the aliased frequency.
            let cancel_freq = if_freq * -if_sign;
            let ratio = (self.adc_rate / cancel_freq).abs();
            if !fixed::approx_eq(ratio, 4.0) {
                return Err(CoreError::UnsupportedDownconversionRatio {
                    adc_rate: self.adc_rate,
                    mixer_freq: cancel_freq,
                });
            }

            bus::poke32(
                &self.bus,
                self.regs.het_phase,
                if cancel_freq > 0.0 { 0 } else { 1 },
            )?;
            tracing::debug!(
                "heterodyne mixer at {:.0} Hz against {:.0} Hz ADC rate",
                cancel_freq,
                self.adc_rate
            );
        }

        tracing::debug!("front-end mapping 0x{:02x} ({:?})", mapping_val, conn.sampling_mode);
        self.fe_conn = *conn;
        Ok(())
    }

    /// Bypass every correction stage, or restore the last applied
    /// connection. The core keeps no bypass flag; callers track it.
    pub fn bypass_all(&mut self, enable: bool) -> CoreResult<()> {
        if enable {
            bus::poke32(&self.bus, self.regs.mapping, mapping::BYPASS_ALL)
        } else {
            let conn = self.fe_conn;
            self.set_fe_connection(&conn)
        }
    }

    /// Select hardware auto-tracking (true) or the latched fixed offset
    /// (false). The latched I/Q values are preserved either way.
    pub fn set_dc_offset_auto(&mut self, enable: bool) -> CoreResult<()> {
        self.write_dc_offset(if enable { 0 } else { OFFSET_FIXED })
    }

    /// Latch a fixed DC offset correction, in fractions of full scale.
    ///
    /// Each component is quantized to 29 fractional bits and clamped to the
    /// representable range. Returns the value actually applied; callers
    /// must treat the return as the authoritative setting.
    pub fn set_dc_offset(&mut self, offset: Complex64) -> CoreResult<Complex64> {
        self.i_dc_off = fixed::fs_to_fixed(offset.re, DC_OFFSET_FRAC_BITS);
        self.q_dc_off = fixed::fs_to_fixed(offset.im, DC_OFFSET_FRAC_BITS);

        self.write_dc_offset(OFFSET_SET | OFFSET_FIXED)?;

        Ok(Complex64::new(
            fixed::fixed_to_fs(self.i_dc_off, DC_OFFSET_FRAC_BITS),
            fixed::fixed_to_fs(self.q_dc_off, DC_OFFSET_FRAC_BITS),
        ))
    }

    fn write_dc_offset(&mut self, flags: u32) -> CoreResult<()> {
        bus::poke32(
            &self.bus,
            self.regs.offset_i,
            flags | (self.i_dc_off as u32 & OFFSET_VALUE_MASK),
        )?;
        bus::poke32(
            &self.bus,
            self.regs.offset_q,
            flags | (self.q_dc_off as u32 & OFFSET_VALUE_MASK),
        )
    }

    /// Write the IQ imbalance correction: real part to the magnitude
    /// register, imaginary part to the phase register, each as a signed
    /// 18-bit full-scale fraction (saturating).
    pub fn set_iq_balance(&mut self, correction: Complex64) -> CoreResult<()> {
        bus::poke32(
            &self.bus,
            self.regs.mag_corr,
            fixed::fs_to_bits(correction.re, IQ_CORRECTION_BITS),
        )?;
        bus::poke32(
            &self.bus,
            self.regs.phase_corr,
            fixed::fs_to_bits(correction.im, IQ_CORRECTION_BITS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRegisters;
    use std::sync::{Arc, Mutex};

    const BASE: u32 = 0x2000;
    const STRIDE: u32 = 4;

    fn reg(index: u32) -> u32 {
        BASE + STRIDE * index
    }

    fn setup() -> (Arc<Mutex<SimRegisters>>, RxFrontendCore) {
        let sim = Arc::new(Mutex::new(SimRegisters::new()));
        let core = RxFrontendCore::new(sim.clone(), BASE, STRIDE);
        (sim, core)
    }

    fn last(sim: &Arc<Mutex<SimRegisters>>, index: u32) -> Option<u32> {
        sim.lock().unwrap().last_write(reg(index))
    }

    #[test]
    fn test_mapping_complex_no_flags() {
        let (sim, mut core) = setup();
        core.set_fe_connection(&FeConnection::default()).unwrap();
        assert_eq!(last(&sim, regs::MAPPING), Some(0));
    }

    #[test]
    fn test_mapping_real_mode_with_flags() {
        let (sim, mut core) = setup();
        let conn = FeConnection::new(SamplingMode::Real)
            .swap_iq(true)
            .invert_i(true)
            .invert_q(true);
        core.set_fe_connection(&conn).unwrap();

        let expected =
            mapping::REAL_MODE | mapping::SWAP_IQ | mapping::INVERT_I | mapping::INVERT_Q;
        assert_eq!(last(&sim, regs::MAPPING), Some(expected));
    }

    #[test]
    fn test_mapping_no_extraneous_bits() {
        let (sim, mut core) = setup();
        let conn = FeConnection::new(SamplingMode::Real).invert_q(true);
        core.set_fe_connection(&conn).unwrap();

        let value = last(&sim, regs::MAPPING).unwrap();
        assert_eq!(value, mapping::REAL_MODE | mapping::INVERT_Q);
        assert_eq!(value & !(mapping::REAL_MODE | mapping::INVERT_Q), 0);
    }

    #[test]
    fn test_heterodyne_quarter_rate() {
        let (sim, mut core) = setup();
        core.set_adc_rate(40e6);
        let conn = FeConnection::new(SamplingMode::Heterodyne).if_freq(10e6);
        core.set_fe_connection(&conn).unwrap();

        // 10 MHz IF at 40 MHz rate aliases to itself; the mixer spins at
        // -10 MHz, so the phase bit selects the negative direction.
        assert_eq!(
            last(&sim, regs::MAPPING),
            Some(mapping::REAL_MODE | mapping::DOWNCONVERT)
        );
        assert_eq!(last(&sim, regs::HET_PHASE), Some(1));
    }

    #[test]
    fn test_heterodyne_negative_if() {
        let (sim, mut core) = setup();
        core.set_adc_rate(40e6);
        let conn = FeConnection::new(SamplingMode::Heterodyne).if_freq(-10e6);
        core.set_fe_connection(&conn).unwrap();

        // Negative IF: the cancellation frequency is +10 MHz.
        assert_eq!(last(&sim, regs::HET_PHASE), Some(0));
    }

    #[test]
    fn test_heterodyne_aliased_if() {
        let (sim, mut core) = setup();
        core.set_adc_rate(40e6);
        // 30 MHz folds to -10 MHz; the mixer cancels it spinning positive.
        let conn = FeConnection::new(SamplingMode::Heterodyne).if_freq(30e6);
        core.set_fe_connection(&conn).unwrap();

        assert_eq!(last(&sim, regs::HET_PHASE), Some(0));
    }

    #[test]
    fn test_heterodyne_above_rate_if() {
        let (sim, mut core) = setup();
        core.set_adc_rate(40e6);
        // 50 MHz folds modulo 40 MHz to 10 MHz.
        let conn = FeConnection::new(SamplingMode::Heterodyne).if_freq(50e6);
        core.set_fe_connection(&conn).unwrap();

        assert_eq!(last(&sim, regs::HET_PHASE), Some(1));
    }

    #[test]
    fn test_heterodyne_requires_adc_rate() {
        let (sim, mut core) = setup();
        let conn = FeConnection::new(SamplingMode::Heterodyne).if_freq(10e6);
        let err = core.set_fe_connection(&conn).unwrap_err();

        assert!(matches!(err, CoreError::AdcRateNotSet));
        assert!(err.is_precondition());
        // The mapping register write precedes the precondition check.
        assert_eq!(
            last(&sim, regs::MAPPING),
            Some(mapping::REAL_MODE | mapping::DOWNCONVERT)
        );
        assert_eq!(last(&sim, regs::HET_PHASE), None);
    }

    #[test]
    fn test_heterodyne_rejects_non_quarter_rate() {
        let (sim, mut core) = setup();
        core.set_adc_rate(40e6);
        let conn = FeConnection::new(SamplingMode::Heterodyne).if_freq(5e6);
        let err = core.set_fe_connection(&conn).unwrap_err();

        assert!(matches!(
            err,
            CoreError::UnsupportedDownconversionRatio { .. }
        ));
        assert_eq!(last(&sim, regs::HET_PHASE), None);
        // The failed descriptor must not become the stored connection.
        assert_eq!(core.fe_connection().sampling_mode, SamplingMode::Complex);
    }

    #[test]
    fn test_heterodyne_rejects_zero_if() {
        let (_sim, mut core) = setup();
        core.set_adc_rate(40e6);
        let conn = FeConnection::new(SamplingMode::Heterodyne);
        assert!(core.set_fe_connection(&conn).is_err());
    }

    #[test]
    fn test_dc_offset_coercion_roundtrip() {
        let (_sim, mut core) = setup();
        let requested = Complex64::new(0.1234567, -0.7654321);
        let applied = core.set_dc_offset(requested).unwrap();

        // Quantization error is at most one LSB per component.
        let lsb = 1.0 / (1u64 << 29) as f64;
        assert!((applied.re - requested.re).abs() <= lsb);
        assert!((applied.im - requested.im).abs() <= lsb);

        // Re-applying the coerced value is a fixed point of quantization.
        let reapplied = core.set_dc_offset(applied).unwrap();
        assert_eq!(applied, reapplied);
    }

    #[test]
    fn test_dc_offset_clamps_to_full_scale() {
        let (_sim, mut core) = setup();
        let applied = core.set_dc_offset(Complex64::new(1.5, -2.0)).unwrap();

        let max = ((1i64 << 29) - 1) as f64 / (1i64 << 29) as f64;
        assert_eq!(applied.re, max);
        assert_eq!(applied.im, -1.0);
    }

    #[test]
    fn test_dc_offset_register_layout() {
        let (sim, mut core) = setup();
        core.set_dc_offset(Complex64::new(0.5, -0.25)).unwrap();

        // 0.5 * 2^29 with set+fixed flags
        assert_eq!(last(&sim, regs::OFFSET_I), Some(0xD000_0000));
        // -0.25 * 2^29 masked into the low 30 bits, same flags
        assert_eq!(last(&sim, regs::OFFSET_Q), Some(0xF800_0000));
    }

    #[test]
    fn test_dc_offset_auto_preserves_latched_value() {
        let (sim, mut core) = setup();
        core.set_dc_offset(Complex64::new(0.5, 0.0)).unwrap();

        core.set_dc_offset_auto(true).unwrap();
        // Auto mode clears both control flags but keeps the magnitude.
        assert_eq!(last(&sim, regs::OFFSET_I), Some(0x1000_0000));

        core.set_dc_offset_auto(false).unwrap();
        // Fixed mode re-applies the latched value, not zero.
        assert_eq!(last(&sim, regs::OFFSET_I), Some(0x9000_0000));
    }

    #[test]
    fn test_bypass_all_is_reversible() {
        let (sim, mut core) = setup();
        core.set_adc_rate(40e6);
        let conn = FeConnection::new(SamplingMode::Heterodyne)
            .if_freq(10e6)
            .swap_iq(true);
        core.set_fe_connection(&conn).unwrap();

        core.bypass_all(true).unwrap();
        assert_eq!(last(&sim, regs::MAPPING), Some(mapping::BYPASS_ALL));

        core.bypass_all(false).unwrap();
        assert_eq!(
            last(&sim, regs::MAPPING),
            Some(mapping::REAL_MODE | mapping::DOWNCONVERT | mapping::SWAP_IQ)
        );
        assert_eq!(last(&sim, regs::HET_PHASE), Some(1));
    }

    #[test]
    fn test_iq_balance_saturates_at_full_scale() {
        let (sim, mut core) = setup();
        core.set_iq_balance(Complex64::new(1.0, -1.0)).unwrap();

        // Maximum positive and minimum negative 18-bit words; no wraparound.
        assert_eq!(last(&sim, regs::MAG_CORRECTION), Some(0x1FFFF));
        assert_eq!(last(&sim, regs::PHASE_CORRECTION), Some(0x20000));
    }

    #[test]
    fn test_iq_balance_midscale() {
        let (sim, mut core) = setup();
        core.set_iq_balance(Complex64::new(0.5, -0.5)).unwrap();

        assert_eq!(last(&sim, regs::MAG_CORRECTION), Some(0x10000));
        assert_eq!(last(&sim, regs::PHASE_CORRECTION), Some(0x30000));
    }

    #[test]
    fn test_register_addresses_follow_stride() {
        let (sim, mut core) = setup();
        core.set_iq_balance(Complex64::new(0.25, 0.25)).unwrap();

        let sim = sim.lock().unwrap();
        let writes = sim.writes();
        assert_eq!(writes[0].0, BASE + STRIDE * regs::MAG_CORRECTION);
        assert_eq!(writes[1].0, BASE + STRIDE * regs::PHASE_CORRECTION);
    }
}
