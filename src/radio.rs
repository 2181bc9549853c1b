//! Radio Link Logic
//!
//! Mode control of the transceiver, per-module key bookkeeping and the
//! router that turns abstract commands into frame exchanges.

pub mod controller;
pub mod dispatch;
pub mod keys;
pub mod report;
pub mod shared;
