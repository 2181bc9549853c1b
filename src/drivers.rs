//! Peripheral Drivers
//!
//! Register-level drivers for external ICs. These provide the single
//! primitive the link layer builds on.

pub mod sx127x;
