//! System configuration and hardware constants
//!
//! This module defines compile-time constants for the gateway hardware and
//! the radio link, plus the runtime [`LinkConfig`] consumed by the
//! dispatch router. Register addresses live with the driver in
//! [`crate::drivers::sx127x::reg`].

/// SPI clock for the SX127x (datasheet maximum is 10 MHz)
pub const SPI_FREQUENCY_HZ: u32 = 1_000_000;

/// Largest payload the receiver accepts; larger byte counts are treated as
/// corruption and never read out of the FIFO
pub const MAX_RX_PAYLOAD: usize = 10;

/// Largest outbound frame (`module + opcode + args + key`)
pub const MAX_FRAME_LEN: usize = 10;

/// Largest argument list a command may carry
pub const MAX_COMMAND_ARGS: usize = MAX_FRAME_LEN - 3;

/// FIFO offset where outbound payloads are staged
pub const FIFO_TX_BASE_ADDR: u8 = 0x80;

/// FIFO offset where the receiver starts writing
pub const FIFO_RX_BASE_ADDR: u8 = 0x00;

/// Output power setting written to `PA_CONFIG` (PA_BOOST, maximum power)
pub const PA_CONFIG_MAX_POWER: u8 = 0xFF;

/// Signal-pin mapping written to `DIO_MAPPING_1` (DIO0 = RxDone/TxDone)
pub const DIO_MAPPING_DEFAULT: u8 = 0x00;

/// Token every module starts with after power-up
pub const DEFAULT_KEY: u8 = 0x55;

/// Token value that is never issued
pub const RESERVED_KEY: u8 = 0x00;

/// Wait between a command frame and its key rotation frame
pub const SETTLE_DELAY_MS: u32 = 5_000;

/// Upper bound on waiting for the transmit-done flag
pub const TX_TIMEOUT_MS: u32 = 3_000;

/// Interval between transmit-done polls
pub const TX_POLL_INTERVAL_US: u32 = 1_000;

/// Interval between receive polls of the background task
pub const RX_POLL_INTERVAL_MS: u64 = 20;

/// Default thermostat setpoint used when a requested value is out of range
pub const DEFAULT_SETPOINT_DEGREES: u8 = 70;

/// Host bridge line buffer size
pub const HOST_LINE_BUFFER_SIZE: usize = 64;

/// Depth of the command queue between the host bridge and the radio task
pub const COMMAND_QUEUE_SIZE: usize = 8;

/// Depth of the report queue between the radio task and the host bridge
pub const REPORT_QUEUE_SIZE: usize = 16;

/// USB VID (use test VID for development)
pub const USB_VID: u16 = 0x1209;

/// USB PID (get from pid.codes for production)
pub const USB_PID: u16 = 0x0002;

/// USB CDC ACM packet size
pub const USB_CDC_PACKET_SIZE: u16 = 64;

/// Pin assignments for GPIO
pub mod pins {
    //! GPIO pin assignments matching the gateway board

    /// Status LED
    pub const LED_STATUS: &str = "PA5";

    /// SPI1 SCK (SX127x)
    pub const SPI1_SCK: &str = "PB3";

    /// SPI1 MISO (SX127x)
    pub const SPI1_MISO: &str = "PB4";

    /// SPI1 MOSI (SX127x)
    pub const SPI1_MOSI: &str = "PB5";

    /// SX127x chip select (active low, driven manually)
    pub const LORA_NSS: &str = "PA4";

    /// SX127x reset (active low)
    pub const LORA_RESET: &str = "PA3";

    /// USB D+ (handled by USB peripheral)
    pub const USB_DP: &str = "PA12";

    /// USB D- (handled by USB peripheral)
    pub const USB_DM: &str = "PA11";
}

/// DMA channel assignments
pub mod dma {
    //! DMA channel assignments for SPI transfers

    /// SPI1 TX DMA channel
    pub const SPI1_TX: u8 = 1;

    /// SPI1 RX DMA channel
    pub const SPI1_RX: u8 = 2;
}

/// Runtime parameters of the radio link
///
/// All timings are plain integers so the value can be built in a `const`
/// context and shared between host tests and the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkConfig {
    /// Wait between a command frame and the key rotation frame
    pub settle_delay_ms: u32,
    /// Upper bound on waiting for the transmit-done flag
    pub tx_timeout_ms: u32,
    /// Interval between transmit-done polls
    pub tx_poll_interval_us: u32,
    /// Token every module starts with
    pub initial_key: u8,
    /// Report a desync when a module never acknowledged its last rotation
    pub require_rotation_ack: bool,
}

impl LinkConfig {
    /// Configuration matching the deployed module firmware
    #[must_use]
    pub const fn new() -> Self {
        Self {
            settle_delay_ms: SETTLE_DELAY_MS,
            tx_timeout_ms: TX_TIMEOUT_MS,
            tx_poll_interval_us: TX_POLL_INTERVAL_US,
            initial_key: DEFAULT_KEY,
            require_rotation_ack: false,
        }
    }

    /// Set the settling delay (returns new config)
    #[must_use]
    pub const fn with_settle_delay_ms(self, settle_delay_ms: u32) -> Self {
        Self {
            settle_delay_ms,
            ..self
        }
    }

    /// Set the transmit timeout (returns new config)
    #[must_use]
    pub const fn with_tx_timeout_ms(self, tx_timeout_ms: u32) -> Self {
        Self {
            tx_timeout_ms,
            ..self
        }
    }

    /// Set the transmit-done poll interval (returns new config)
    #[must_use]
    pub const fn with_tx_poll_interval_us(self, tx_poll_interval_us: u32) -> Self {
        Self {
            tx_poll_interval_us,
            ..self
        }
    }

    /// Set the power-up token (returns new config)
    ///
    /// The reserved value `0` is replaced by [`DEFAULT_KEY`].
    #[must_use]
    pub const fn with_initial_key(self, initial_key: u8) -> Self {
        let initial_key = if initial_key == RESERVED_KEY {
            DEFAULT_KEY
        } else {
            initial_key
        };
        Self {
            initial_key,
            ..self
        }
    }

    /// Enable or disable rotation acknowledgement tracking (returns new config)
    #[must_use]
    pub const fn with_rotation_ack(self, require_rotation_ack: bool) -> Self {
        Self {
            require_rotation_ack,
            ..self
        }
    }

    /// Number of transmit-done polls before giving up (at least one)
    #[must_use]
    pub const fn tx_poll_limit(&self) -> u32 {
        if self.tx_poll_interval_us == 0 {
            return 1;
        }
        let polls = self.tx_timeout_ms.saturating_mul(1_000) / self.tx_poll_interval_us;
        if polls == 0 {
            1
        } else {
            polls
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for LinkConfig {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "LinkConfig(settle={}ms, tx_timeout={}ms, ack={})",
            self.settle_delay_ms,
            self.tx_timeout_ms,
            self.require_rotation_ack
        );
    }
}
