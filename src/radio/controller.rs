//! Radio State Controller
//!
//! Drives the transceiver through its operating modes:
//!
//! ```text
//!            initialize
//!   (none) ─────────────► Sleep ──► ReceiveContinuous ◄──┐
//!                                        │               │
//!                                transmit│       rearm   │
//!                                        ▼               │
//!                      Standby ──► Transmit ──► Standby ─┘
//!                                   (TX_DONE)
//! ```
//!
//! The controller remembers the last mode it wrote. `None` means the chip
//! was never configured.

use embedded_hal_async::delay::DelayNs;

use crate::config::{
    DIO_MAPPING_DEFAULT, FIFO_RX_BASE_ADDR, FIFO_TX_BASE_ADDR, MAX_FRAME_LEN, PA_CONFIG_MAX_POWER,
};
use crate::drivers::sx127x::{irq, reg, RegisterBus, Transceiver};
use crate::error::{LinkError, LinkResult};
use crate::protocol::{self, InboundFrame};
use crate::types::RadioMode;

/// Transceiver mode controller
pub struct Radio<B> {
    xcvr: Transceiver<B>,
    mode: Option<RadioMode>,
}

impl<B: RegisterBus> Radio<B> {
    /// Wrap a register interface; the chip is not touched until
    /// [`initialize`](Self::initialize)
    #[must_use]
    pub const fn new(xcvr: Transceiver<B>) -> Self {
        Self { xcvr, mode: None }
    }

    /// Mode last written to the chip
    #[must_use]
    pub const fn mode(&self) -> Option<RadioMode> {
        self.mode
    }

    /// Whether [`initialize`](Self::initialize) has succeeded
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.mode.is_some()
    }

    /// Put the chip in LoRa sleep and write the link configuration
    ///
    /// Safe to call again at any time; the chip ends up in Sleep.
    pub async fn initialize(&mut self) -> LinkResult<()> {
        self.xcvr
            .write_verified(reg::OP_MODE, RadioMode::Sleep.op_mode())
            .await?;
        self.xcvr
            .write_verified(reg::PA_CONFIG, PA_CONFIG_MAX_POWER)
            .await?;
        self.xcvr
            .write_reg(reg::DIO_MAPPING_1, DIO_MAPPING_DEFAULT)
            .await?;
        self.mode = Some(RadioMode::Sleep);
        info!("Radio initialized");
        Ok(())
    }

    /// Listen for packets until told otherwise
    pub async fn enter_receive_continuous(&mut self) -> LinkResult<()> {
        self.ensure_initialized()?;
        self.set_mode(RadioMode::Sleep).await?;
        self.xcvr
            .write_reg(reg::FIFO_ADDR_PTR, FIFO_RX_BASE_ADDR)
            .await?;
        self.set_mode(RadioMode::ReceiveContinuous).await
    }

    /// Send one frame and wait for the transmit-done flag
    ///
    /// The flag is read at most `poll_limit` times, `poll_interval_us`
    /// apart. On success the chip is back in Standby.
    pub async fn transmit<D: DelayNs>(
        &mut self,
        frame: &[u8],
        delay: &mut D,
        poll_limit: u32,
        poll_interval_us: u32,
    ) -> LinkResult<()> {
        self.ensure_initialized()?;
        if self.mode == Some(RadioMode::Transmit) {
            return Err(LinkError::Busy);
        }
        debug_assert!(frame.len() <= MAX_FRAME_LEN);

        self.set_mode(RadioMode::Standby).await?;
        self.xcvr
            .write_reg(reg::FIFO_ADDR_PTR, FIFO_TX_BASE_ADDR)
            .await?;
        for &byte in frame {
            self.xcvr.write_reg(reg::FIFO, byte).await?;
        }
        let length = u8::try_from(frame.len()).unwrap_or(u8::MAX);
        self.xcvr.write_reg(reg::PAYLOAD_LENGTH, length).await?;
        // A flag left over from an unconfirmed transmit must not confirm this one
        self.xcvr.write_reg(reg::IRQ_FLAGS, irq::TX_DONE).await?;
        self.set_mode(RadioMode::Transmit).await?;

        let polls = poll_limit.max(1);
        for attempt in 0..polls {
            let flags = self.xcvr.read_reg(reg::IRQ_FLAGS).await?;
            if flags & irq::TX_DONE != 0 {
                self.xcvr.write_reg(reg::IRQ_FLAGS, irq::TX_DONE).await?;
                self.mode = Some(RadioMode::Standby);
                trace!("TX done after {} polls", attempt + 1);
                return Ok(());
            }
            if attempt + 1 < polls {
                delay.delay_us(poll_interval_us).await;
            }
        }

        warn!("TX not confirmed after {} polls", polls);
        Err(LinkError::TransmitNotConfirmed { polls })
    }

    /// Collect a received frame, if one is pending
    pub async fn poll_frame(&mut self) -> LinkResult<Option<InboundFrame>> {
        self.ensure_initialized()?;
        protocol::decode(&mut self.xcvr).await
    }

    /// Borrow the register interface
    pub fn transceiver(&self) -> &Transceiver<B> {
        &self.xcvr
    }

    /// Release the register interface
    pub fn release(self) -> Transceiver<B> {
        self.xcvr
    }

    async fn set_mode(&mut self, mode: RadioMode) -> LinkResult<()> {
        self.xcvr.write_reg(reg::OP_MODE, mode.op_mode()).await?;
        self.mode = Some(mode);
        Ok(())
    }

    fn ensure_initialized(&self) -> LinkResult<()> {
        if self.mode.is_some() {
            Ok(())
        } else {
            Err(LinkError::NotInitialized)
        }
    }
}
