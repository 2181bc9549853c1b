//! SX127x LoRa Transceiver Register Interface
//!
//! The SX1276/77/78/79 family is driven entirely through single-register
//! SPI exchanges: the master clocks out an address byte (bit 7 set for a
//! write) followed by a value byte, and simultaneously clocks in two bytes.
//! For reads the second returned byte is the register content.
//!
//! Everything above this module talks to the chip only through
//! [`Transceiver::transact`] and its read/write helpers.

use embedded_hal::spi::{Error as _, ErrorKind};
use embedded_hal_async::spi::SpiDevice;

use crate::error::{LinkError, LinkResult};

/// SX127x register addresses (LoRa page)
pub mod reg {
    /// FIFO data input/output
    pub const FIFO: u8 = 0x00;
    /// Operating mode and LoRa mode bit
    pub const OP_MODE: u8 = 0x01;
    /// Power amplifier selection and output power
    pub const PA_CONFIG: u8 = 0x09;
    /// FIFO SPI pointer
    pub const FIFO_ADDR_PTR: u8 = 0x0D;
    /// Start of the transmit area in the FIFO
    pub const FIFO_TX_BASE_ADDR: u8 = 0x0E;
    /// Start of the receive area in the FIFO
    pub const FIFO_RX_BASE_ADDR: u8 = 0x0F;
    /// Start address of the last packet received
    pub const FIFO_RX_CURRENT_ADDR: u8 = 0x10;
    /// Interrupt flags (write 1 to clear)
    pub const IRQ_FLAGS: u8 = 0x12;
    /// Number of payload bytes of the last packet received
    pub const RX_NB_BYTES: u8 = 0x13;
    /// Payload length for transmit
    pub const PAYLOAD_LENGTH: u8 = 0x22;
    /// DIO0-DIO3 pin mapping
    pub const DIO_MAPPING_1: u8 = 0x40;
}

/// `IRQ_FLAGS` bits
pub mod irq {
    /// Receive timeout
    pub const RX_TIMEOUT: u8 = 0x80;
    /// Packet reception complete
    pub const RX_DONE: u8 = 0x40;
    /// Payload CRC error
    pub const PAYLOAD_CRC_ERROR: u8 = 0x20;
    /// Transmit complete
    pub const TX_DONE: u8 = 0x08;
    /// Every flag, used to clear them all at once
    pub const ALL: u8 = 0xFF;
}

/// Direction bit of the address byte
pub const WRITE_BIT: u8 = 0x80;

/// Address mask (7-bit register space)
pub const ADDRESS_MASK: u8 = 0x7F;

/// Full-duplex two-byte exchange with the transceiver
///
/// Implementations perform exactly one chip-select cycle per call and never
/// retry.
pub trait RegisterBus {
    /// Clock out `[address, value]`, return the two bytes clocked in
    async fn exchange(&mut self, frame: [u8; 2]) -> Result<[u8; 2], ErrorKind>;
}

/// [`RegisterBus`] over any `embedded-hal-async` SPI device
///
/// The device owns chip select, so each exchange is one `transfer_in_place`
/// inside its own transaction.
pub struct SpiRegisterBus<S> {
    spi: S,
}

impl<S: SpiDevice> SpiRegisterBus<S> {
    /// Wrap an SPI device
    #[must_use]
    pub const fn new(spi: S) -> Self {
        Self { spi }
    }

    /// Release the SPI device
    pub fn release(self) -> S {
        self.spi
    }
}

impl<S: SpiDevice> RegisterBus for SpiRegisterBus<S> {
    async fn exchange(&mut self, frame: [u8; 2]) -> Result<[u8; 2], ErrorKind> {
        let mut buf = frame;
        self.spi
            .transfer_in_place(&mut buf)
            .await
            .map_err(|e| e.kind())?;
        Ok(buf)
    }
}

/// SX127x register interface
pub struct Transceiver<B> {
    bus: B,
}

impl<B: RegisterBus> Transceiver<B> {
    /// Create a register interface over a bus
    #[must_use]
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }

    /// One address/value exchange
    ///
    /// Returns `(echoed_address, returned_value)`.
    pub async fn transact(&mut self, address: u8, value: u8) -> LinkResult<(u8, u8)> {
        let [echo, data] = self.bus.exchange([address, value]).await.map_err(|kind| {
            warn!("SPI exchange {:?} failed", address);
            LinkError::BusFailure(kind)
        })?;
        trace!("SPI {:?} {:?} -> {:?}", address, value, data);
        Ok((echo, data))
    }

    /// Read a single register
    pub async fn read_reg(&mut self, register: u8) -> LinkResult<u8> {
        let (_, value) = self.transact(register & ADDRESS_MASK, 0x00).await?;
        Ok(value)
    }

    /// Write a single register
    pub async fn write_reg(&mut self, register: u8, value: u8) -> LinkResult<()> {
        self.transact(WRITE_BIT | (register & ADDRESS_MASK), value)
            .await
            .map(|_| ())
    }

    /// Write a register, then read it back and compare
    pub async fn write_verified(&mut self, register: u8, value: u8) -> LinkResult<()> {
        self.write_reg(register, value).await?;
        let actual = self.read_reg(register).await?;
        if actual == value {
            Ok(())
        } else {
            Err(LinkError::VerifyFailed {
                register,
                expected: value,
                actual,
            })
        }
    }

    /// Borrow the underlying bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutably borrow the underlying bus
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Release the underlying bus
    pub fn release(self) -> B {
        self.bus
    }
}
