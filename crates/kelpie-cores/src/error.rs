//! Core error types

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while driving the register-mapped cores
#[derive(Error, Debug)]
pub enum CoreError {
    /// A heterodyne connection was applied before the ADC rate was set
    #[error("ADC rate not set: call set_adc_rate() before applying a heterodyne connection")]
    AdcRateNotSet,

    /// The requested IF does not alias to a quarter-rate mixer frequency
    #[error(
        "unsupported downconversion: ADC rate {adc_rate} Hz over mixer frequency \
         {mixer_freq} Hz is not a quarter-rate ratio"
    )]
    UnsupportedDownconversionRatio { adc_rate: f64, mixer_freq: f64 },

    /// SPI transfer length outside the 1..=32 bit range the engine shifts
    #[error("SPI transfer length {0} out of range (1..=32 bits)")]
    InvalidSpiLength(u32),

    /// The shared register bus handle could not be acquired
    #[error("register bus unavailable: {0}")]
    BusUnavailable(String),

    /// The underlying transport reported a fault
    #[error("bus fault at 0x{address:08x}: {reason}")]
    BusFault { address: u32, reason: String },

    /// No property registered at the given tree path
    #[error("unknown property path: {0}")]
    UnknownProperty(String),

    /// A property was set with a value of the wrong variant
    #[error("type mismatch for property {path}: expected {expected}")]
    PropertyType { path: String, expected: &'static str },
}

impl CoreError {
    /// Check if this error signals caller misuse rather than a transport fault
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            CoreError::AdcRateNotSet
                | CoreError::UnsupportedDownconversionRatio { .. }
                | CoreError::InvalidSpiLength(_)
        )
    }
}
