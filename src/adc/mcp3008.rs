//! MCP3008 driver over Linux spidev
//!
//! One conversion is a 3-byte full-duplex transfer. The chip wants
//! f_CLK = 18 * f_SAMPLE, so its 200 ksps ceiling needs 3.6 MHz; on a
//! Raspberry Pi the closest core-clock divider above that is 250 MHz / 64.

use super::AdcTransport;
use crate::config::MAX_CHANNEL;
use crate::error::AdcError;
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use std::io;

/// SPI clock: 250 MHz core clock divided by 64 (3.9 MHz)
pub const SPI_SPEED_HZ: u32 = 250_000_000 / 64;

const START_BIT: u8 = 0x01;
const SINGLE_ENDED: u8 = 0x08;

pub struct Mcp3008 {
    spi: Option<Spidev>,
    path: String,
}

impl Mcp3008 {
    /// Open `/dev/spidev{bus}.{device}` and configure it for the MCP3008
    pub fn open(bus: u8, device: u8) -> Result<Self, AdcError> {
        let path = format!("/dev/spidev{}.{}", bus, device);
        let open_error = |source: io::Error| AdcError::Open {
            path: path.clone(),
            source,
        };

        let mut spi = Spidev::open(&path).map_err(open_error)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(SPI_SPEED_HZ)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options).map_err(open_error)?;

        tracing::debug!(path = %path, speed_hz = SPI_SPEED_HZ, "Opened MCP3008");
        Ok(Self {
            spi: Some(spi),
            path,
        })
    }

    /// Pseudo-differential conversion on the pair selected by `channel`
    pub fn read_differential(&mut self, channel: u8) -> Result<u16, AdcError> {
        self.transfer(channel, channel << 4)
    }

    fn transfer(&mut self, channel: u8, control: u8) -> Result<u16, AdcError> {
        if channel > MAX_CHANNEL {
            return Err(AdcError::InvalidChannel(channel));
        }
        let spi = self.spi.as_mut().ok_or(AdcError::Closed)?;

        let tx = [START_BIT, control, 0];
        let mut rx = [0u8; 3];
        {
            let mut transfer = SpidevTransfer::read_write(&tx, &mut rx);
            spi.transfer(&mut transfer)
                .map_err(|source| AdcError::Read { channel, source })?;
        }

        Ok(decode(&rx))
    }
}

/// Extract the 10-bit result from the last two bytes of a transfer
fn decode(rx: &[u8; 3]) -> u16 {
    (((rx[1] & 0x03) as u16) << 8) | rx[2] as u16
}

/// Control byte for a single-ended conversion
fn single_ended(channel: u8) -> u8 {
    (SINGLE_ENDED + channel) << 4
}

impl AdcTransport for Mcp3008 {
    fn read(&mut self, channel: u8) -> Result<u16, AdcError> {
        self.transfer(channel, single_ended(channel))
    }

    fn close(&mut self) -> Result<(), AdcError> {
        match self.spi.take() {
            Some(spi) => {
                drop(spi);
                tracing::debug!(path = %self.path, "Closed MCP3008");
                Ok(())
            }
            None => Err(AdcError::Closed),
        }
    }

    fn describe(&self) -> String {
        format!("MCP3008 on {}", self.path)
    }
}
