//! USB Subsystem
//!
//! Provides USB functionality for the gateway:
//! - CDC ACM bridge carrying the host line protocol

pub mod cdc;
