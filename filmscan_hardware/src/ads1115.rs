use std::time::Duration;

use rppal::i2c::I2c;
use tracing::trace;

use filmscan_traits::{HwResult, PhotoSensor};

use crate::error::{HwError, Result};
use crate::util::poll_until;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;
// OS=1 (start), MUX=AINx vs GND, PGA ±4.096 V, single-shot, 860 SPS, comparator off.
const CONFIG_BASE: u16 = 0x8000 | 0x4000 | 0x0200 | 0x0100 | 0x00E0 | 0x0003;
const CONFIG_OS_READY: u16 = 0x8000;

fn i2c_err(e: rppal::i2c::Error) -> HwError {
    HwError::I2c(e.to_string())
}

/// Phototransistor sampled through an ADS1115 in single-shot mode.
pub struct Ads1115 {
    bus: I2c,
    channel: u8,
    timeout: Duration,
}

impl Ads1115 {
    pub fn new(address: u16, channel: u8, timeout: Duration) -> Result<Self> {
        if channel > 3 {
            return Err(HwError::I2c(format!("ads1115 channel {channel} out of range")));
        }
        let mut bus = I2c::new().map_err(i2c_err)?;
        bus.set_slave_address(address).map_err(i2c_err)?;
        Ok(Self {
            bus,
            channel,
            timeout,
        })
    }

    fn read_register(&mut self, reg: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.bus.write_read(&[reg], &mut buf).map_err(i2c_err)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// One conversion, scaled to 0..=1023.
    pub fn read_scaled(&mut self) -> Result<u16> {
        let config = CONFIG_BASE | (u16::from(self.channel) << 12);
        let [hi, lo] = config.to_be_bytes();
        self.bus.write(&[REG_CONFIG, hi, lo]).map_err(i2c_err)?;

        let timeout = self.timeout;
        poll_until(
            || Ok(self.read_register(REG_CONFIG)? & CONFIG_OS_READY != 0),
            timeout,
            Duration::from_micros(200),
        )?;

        let raw = i16::from_be_bytes(self.read_register(REG_CONVERSION)?.to_be_bytes());
        // Single-ended inputs never go meaningfully negative.
        let scaled = (i32::from(raw).max(0) >> 5) as u16;
        trace!(raw, scaled, "ads1115 conversion");
        Ok(scaled.min(1023))
    }
}

impl PhotoSensor for Ads1115 {
    fn read_level(&mut self) -> HwResult<u16> {
        let mut attempts = 0;
        let max_attempts = 3;
        loop {
            match self.read_scaled() {
                Ok(v) => return Ok(v),
                Err(HwError::DataReadyTimeout) if attempts < max_attempts => {
                    attempts += 1;
                    tracing::warn!(retries = attempts, "pt conversion timeout, retrying");
                }
                Err(e) => {
                    tracing::error!("PT read error: {}", e);
                    return Err(Box::new(e));
                }
            }
        }
    }
}
