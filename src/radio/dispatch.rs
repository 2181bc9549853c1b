//! Dispatch Router
//!
//! Turns abstract commands into the two-frame exchange the modules expect:
//!
//! ```text
//! [module, opcode, args.., key] ──settle──► [module, 0x04, new, old] ──► commit
//! ```
//!
//! and hands received frames back to the caller. The radio is returned to
//! continuous receive after every exchange, whatever its outcome.

use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::config::LinkConfig;
use crate::drivers::sx127x::{RegisterBus, Transceiver};
use crate::error::{LinkError, LinkResult};
use crate::protocol::{self, Command, InboundFrame, OutboundFrame};
use crate::radio::controller::Radio;
use crate::radio::keys::KeyRing;
use crate::radio::report::{LinkObserver, LinkReport};
use crate::types::ModuleId;

/// Radio link endpoint of the hub
///
/// Owns the transceiver, the key ring and everything the exchange needs to
/// wait and draw tokens. Methods take `&mut self`, so a single `Gateway`
/// never interleaves two exchanges; see
/// [`SharedGateway`](crate::radio::shared::SharedGateway) for sharing it
/// between tasks.
pub struct Gateway<B, D, R, O = ()> {
    radio: Radio<B>,
    keys: KeyRing,
    delay: D,
    rng: R,
    observer: O,
    config: LinkConfig,
}

impl<B, D, R> Gateway<B, D, R>
where
    B: RegisterBus,
    D: DelayNs,
    R: RngCore,
{
    /// Create a gateway; call [`start`](Self::start) before use
    #[must_use]
    pub fn new(xcvr: Transceiver<B>, delay: D, rng: R, config: LinkConfig) -> Self {
        Self {
            radio: Radio::new(xcvr),
            keys: KeyRing::new(config.initial_key),
            delay,
            rng,
            observer: (),
            config,
        }
    }
}

impl<B, D, R, O> Gateway<B, D, R, O>
where
    B: RegisterBus,
    D: DelayNs,
    R: RngCore,
    O: LinkObserver,
{
    /// Replace the event observer (returns new gateway)
    #[must_use]
    pub fn with_observer<P: LinkObserver>(self, observer: P) -> Gateway<B, D, R, P> {
        Gateway {
            radio: self.radio,
            keys: self.keys,
            delay: self.delay,
            rng: self.rng,
            observer,
            config: self.config,
        }
    }

    /// Configure the transceiver and start listening
    pub async fn start(&mut self) -> LinkResult<()> {
        self.radio.initialize().await?;
        self.radio.enter_receive_continuous().await?;
        info!("Gateway listening");
        Ok(())
    }

    /// Deliver one command and rotate the module's token
    ///
    /// Sends the command under the current token, waits the settling delay,
    /// then sends a rotation frame and commits the new token once that frame
    /// is confirmed. A failed command transmit skips the rotation. The
    /// first error encountered is returned; the radio is re-armed for
    /// receive in every case. Failures are also reported to the observer.
    pub async fn handle(&mut self, command: &Command) -> LinkResult<()> {
        let result = self.exchange(command).await;
        if let Err(err) = result {
            error!("Command for {} failed: {}", command.module().name(), err);
            self.observer.report(LinkReport::CommandFailed(err));
        }
        result
    }

    async fn exchange(&mut self, command: &Command) -> LinkResult<()> {
        let module = command.module();
        if !module.accepts(command.opcode(), command.args().len()) {
            warn!("{} rejects opcode {}", module.name(), command.opcode());
            return Err(LinkError::UnsupportedCommand {
                module,
                opcode: command.opcode(),
            });
        }
        if !self.radio.is_initialized() {
            return Err(LinkError::NotInitialized);
        }

        if self.config.require_rotation_ack && self.keys.awaiting_ack(module) {
            warn!("{} never acknowledged its last key", module.name());
            self.observer.report(LinkReport::KeyDesync { module });
        }

        let frame = protocol::encode(command, self.keys.current(module));
        let sent = self.send(&frame).await;
        let rearmed = self.radio.enter_receive_continuous().await;
        sent.and(rearmed)?;

        self.delay.delay_ms(self.config.settle_delay_ms).await;

        let pending = self.keys.prepare_rotation(module, &mut self.rng);
        let sent = self.send(&pending.frame()).await;
        if sent.is_ok() {
            let key = pending.new_key();
            if self.keys.commit(pending) {
                debug!("{} key rotated", module.name());
                self.observer.report(LinkReport::KeyRotated { module, key });
            }
        }
        let rearmed = self.radio.enter_receive_continuous().await;
        sent.and(rearmed)
    }

    /// Collect one inbound frame, if any is pending
    ///
    /// Accepted frames and rejections both re-arm the receiver. With
    /// `require_rotation_ack` set, a key acknowledgement that disagrees with
    /// the gateway's token yields [`LinkError::KeyDesync`] after the frame
    /// has been reported. Otherwise such frames are returned like any other.
    pub async fn poll(&mut self) -> LinkResult<Option<InboundFrame>> {
        match self.radio.poll_frame().await {
            Ok(None) => Ok(None),
            Ok(Some(frame)) => {
                info!("RX {}", frame);
                self.observer.report(LinkReport::FrameReceived(frame.clone()));
                self.radio.enter_receive_continuous().await?;

                let ack = frame
                    .as_key_ack()
                    .filter(|_| self.config.require_rotation_ack);
                if let Some((module, key)) = ack {
                    if let Err(err) = self.keys.acknowledge(module, key) {
                        warn!("{} acknowledged a key it was never given", module.name());
                        self.observer.report(LinkReport::KeyDesync { module });
                        return Err(err);
                    }
                    debug!("{} acknowledged its key", module.name());
                }
                Ok(Some(frame))
            }
            Err(LinkError::FrameRejected(reason)) => {
                warn!("RX rejected: {}", reason);
                self.observer.report(LinkReport::FrameRejected(reason));
                self.radio.enter_receive_continuous().await?;
                Err(LinkError::FrameRejected(reason))
            }
            Err(err) => Err(err),
        }
    }

    /// Force a module's token after an out-of-band recovery
    ///
    /// Returns false for the reserved token `0`.
    pub fn resync(&mut self, module: ModuleId, key: u8) -> bool {
        let accepted = self.keys.resync(module, key);
        if accepted {
            info!("{} key resynced", module.name());
            self.observer.report(LinkReport::KeyRotated { module, key });
        }
        accepted
    }

    /// Per-module tokens
    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    /// Transceiver mode controller
    pub fn radio(&self) -> &Radio<B> {
        &self.radio
    }

    /// Link configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Event observer
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Release the transceiver, delay and RNG
    pub fn release(self) -> (Transceiver<B>, D, R) {
        (self.radio.release(), self.delay, self.rng)
    }

    async fn send(&mut self, frame: &OutboundFrame) -> LinkResult<()> {
        self.radio
            .transmit(
                frame.as_bytes(),
                &mut self.delay,
                self.config.tx_poll_limit(),
                self.config.tx_poll_interval_us,
            )
            .await?;
        info!("TX {}", frame);
        self.observer.report(LinkReport::FrameSent(frame.clone()));
        Ok(())
    }
}
