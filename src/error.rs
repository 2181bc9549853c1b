//! Link error taxonomy
//!
//! Every fallible link operation returns [`LinkResult`]. Bus failures and
//! unconfirmed transmits abort the operation in progress; rejected inbound
//! frames are recovered by polling again.

use embedded_hal::spi::ErrorKind;
use thiserror::Error;

use crate::types::ModuleId;

/// Link operation result
pub type LinkResult<T> = Result<T, LinkError>;

/// Why an inbound poll produced no usable frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum RejectReason {
    /// Receiver reported more bytes than any valid frame carries
    #[error("oversized payload ({0} bytes)")]
    Oversized(u8),
    /// Receive timeout flag was set
    #[error("receive timeout")]
    Timeout,
    /// Payload CRC check failed in the transceiver
    #[error("payload CRC error")]
    CrcError,
}

/// Errors raised by the radio link
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum LinkError {
    /// A register transaction did not complete
    #[error("register bus failure: {0}")]
    BusFailure(ErrorKind),
    /// An inbound poll found no usable frame this cycle
    #[error("frame rejected: {0}")]
    FrameRejected(RejectReason),
    /// The transmit-done flag never appeared
    #[error("transmit not confirmed after {polls} polls")]
    TransmitNotConfirmed {
        /// Number of flag reads performed
        polls: u32,
    },
    /// The module and the gateway no longer agree on the shared token
    #[error("key out of sync with {module}")]
    KeyDesync {
        /// Module whose token drifted
        module: ModuleId,
    },
    /// An operation was attempted before `initialize`
    #[error("radio not initialized")]
    NotInitialized,
    /// A transmit was requested while a previous one is unconfirmed
    #[error("radio busy transmitting")]
    Busy,
    /// A configuration register did not read back what was written
    #[error("register {register:#04x} reads {actual:#04x}, expected {expected:#04x}")]
    VerifyFailed {
        /// Register address
        register: u8,
        /// Value written
        expected: u8,
        /// Value read back
        actual: u8,
    },
    /// The module has no such opcode, or the argument count is wrong
    #[error("{module} does not accept opcode {opcode:#04x}")]
    UnsupportedCommand {
        /// Addressed module
        module: ModuleId,
        /// Requested opcode
        opcode: u8,
    },
}

impl LinkError {
    /// Whether polling may simply continue after this error
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::FrameRejected(_) | Self::KeyDesync { .. })
    }
}

impl From<RejectReason> for LinkError {
    fn from(reason: RejectReason) -> Self {
        Self::FrameRejected(reason)
    }
}
