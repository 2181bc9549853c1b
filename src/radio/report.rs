//! Link event reporting
//!
//! The router offers every link event to a [`LinkObserver`]. Observers must
//! not block: the radio sequence never waits on whoever is listening.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Sender;

use crate::error::{LinkError, RejectReason};
use crate::protocol::{InboundFrame, OutboundFrame};
use crate::types::ModuleId;

/// Something observable happened on the link
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum LinkReport {
    /// A frame was transmitted and confirmed
    FrameSent(OutboundFrame),
    /// An inbound frame was accepted
    FrameReceived(InboundFrame),
    /// An inbound poll was rejected
    FrameRejected(RejectReason),
    /// A module's token was replaced
    KeyRotated {
        /// Rotated module
        module: ModuleId,
        /// Token now in effect
        key: u8,
    },
    /// A module and the gateway disagree on the token
    KeyDesync {
        /// Affected module
        module: ModuleId,
    },
    /// A command could not be delivered
    CommandFailed(LinkError),
}

/// Receiver of link events
pub trait LinkObserver {
    /// Called once per event, must return promptly
    fn report(&mut self, report: LinkReport);
}

/// Discard every event
impl LinkObserver for () {
    fn report(&mut self, _report: LinkReport) {}
}

/// Forward events into a channel, dropping them while it is full
impl<M: RawMutex, const N: usize> LinkObserver for Sender<'_, M, LinkReport, N> {
    fn report(&mut self, report: LinkReport) {
        if self.try_send(report).is_err() {
            debug!("Report queue full, event dropped");
        }
    }
}

impl<O: LinkObserver + ?Sized> LinkObserver for &mut O {
    fn report(&mut self, report: LinkReport) {
        (**self).report(report);
    }
}
