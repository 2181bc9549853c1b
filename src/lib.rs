//! LoRa Hub Gateway Link Layer
//!
//! This library implements the radio side of a home-automation hub: the
//! gateway receives abstract device commands from a cloud glue process and
//! delivers them over a narrow-band LoRa link (SX127x-class transceiver on
//! SPI) to low-power modules such as locks, relay banks and thermostats.
//!
//! # Architecture
//!
//! The crate is organized in layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    APPLICATION LAYER                         │
//! │  Dispatch Router (Gateway)  │  Host bridge protocol          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      LINK LAYER                              │
//! │  Frame Codec  │  Key Rotation Manager  │  Radio Controller   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      DRIVER LAYER                            │
//! │  SX127x register interface (two-byte SPI transactions)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    RTOS / SCHEDULER                          │
//! │           embassy-rs (async/await executor)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - **Single owner of the radio**: every radio operation takes `&mut self`;
//!   sharing goes through [`radio::shared::SharedGateway`]
//! - **No hidden globals**: per-module key tokens live in one
//!   [`radio::keys::KeyRing`]
//! - **Bounded waits**: transmit completion is polled with an explicit limit
//! - **Functional core, imperative shell**: frame layout is pure, register I/O
//!   is isolated behind [`drivers::sx127x::RegisterBus`]
//! - **Explicit error handling**: all fallible operations return `Result`

#![cfg_attr(not(feature = "std"), no_std)]
#![allow(async_fn_in_trait)] // Traits are only implemented inside the gateway and its tests
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(all(feature = "std", feature = "embedded"))]
compile_error!("Features `std` and `embedded` are mutually exclusive");

// Logging shim must come first so its macros are visible to every module
#[macro_use]
mod fmt;

// Re-export dependencies needed by applications (only in embedded mode)
#[cfg(feature = "embedded")]
pub use embassy_executor;
#[cfg(feature = "embedded")]
pub use embassy_stm32;
#[cfg(feature = "embedded")]
pub use embassy_time;
#[cfg(feature = "embedded")]
pub use embassy_usb;

/// Peripheral Drivers
///
/// Register-level access to the LoRa transceiver.
pub mod drivers;

/// Radio Link Logic
///
/// Radio state controller, key rotation and command dispatch.
pub mod radio;

/// Radio Frame Codec
///
/// Outbound frame layout and inbound frame extraction.
pub mod protocol;

/// Host Bridge Protocol
///
/// Line-oriented commands and reports exchanged with the cloud glue process.
pub mod host;

/// Link error taxonomy
pub mod error;

/// Shared types used across modules
pub mod types;

/// System configuration and constants
pub mod config;

/// Embassy tasks owning the radio on the target
#[cfg(feature = "embedded")]
pub mod tasks;

/// USB Subsystem
///
/// CDC ACM bridge to the host running the cloud glue.
#[cfg(feature = "embedded")]
pub mod usb;

pub use error::{LinkError, LinkResult, RejectReason};
pub use protocol::{Command, InboundFrame, OutboundFrame};
pub use radio::dispatch::Gateway;
pub use types::{DeviceAction, ModuleId, RadioMode};

/// Prelude module for common imports
#[cfg(feature = "embedded")]
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::*;
    pub use crate::types::*;

    // Embassy
    pub use embassy_time::{Duration, Instant, Timer};

    // Error handling
    pub use core::result::Result;

    // Logging
    pub use defmt::{debug, error, info, trace, warn};
}
