//! Gateway shared between tasks
//!
//! Command handling holds the lock for the whole send, settle, rotate, send
//! sequence, so frames of different modules never interleave on the air.
//! Receive polling never waits for the lock: while a command is in flight
//! the poll simply reports nothing.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::drivers::sx127x::RegisterBus;
use crate::error::LinkResult;
use crate::protocol::{Command, InboundFrame};
use crate::radio::dispatch::Gateway;
use crate::radio::report::LinkObserver;
use crate::types::ModuleId;

/// [`Gateway`] behind an async mutex
pub struct SharedGateway<M: RawMutex, B, D, R, O = ()> {
    inner: Mutex<M, Gateway<B, D, R, O>>,
}

impl<M, B, D, R, O> SharedGateway<M, B, D, R, O>
where
    M: RawMutex,
    B: RegisterBus,
    D: DelayNs,
    R: RngCore,
    O: LinkObserver,
{
    /// Wrap a gateway
    pub const fn new(gateway: Gateway<B, D, R, O>) -> Self {
        Self {
            inner: Mutex::new(gateway),
        }
    }

    /// See [`Gateway::start`]
    pub async fn start(&self) -> LinkResult<()> {
        self.inner.lock().await.start().await
    }

    /// See [`Gateway::handle`]; waits for any exchange in progress
    pub async fn handle(&self, command: &Command) -> LinkResult<()> {
        self.inner.lock().await.handle(command).await
    }

    /// See [`Gateway::poll`]; returns `Ok(None)` while the radio is busy
    pub async fn poll(&self) -> LinkResult<Option<InboundFrame>> {
        match self.inner.try_lock() {
            Ok(mut gateway) => gateway.poll().await,
            Err(_) => {
                trace!("Radio busy, poll skipped");
                Ok(None)
            }
        }
    }

    /// See [`Gateway::resync`]
    pub async fn resync(&self, module: ModuleId, key: u8) -> bool {
        self.inner.lock().await.resync(module, key)
    }

    /// Exclusive access to the gateway
    pub async fn lock(&self) -> MutexGuard<'_, M, Gateway<B, D, R, O>> {
        self.inner.lock().await
    }

    /// Unwrap the gateway
    pub fn into_inner(self) -> Gateway<B, D, R, O> {
        self.inner.into_inner()
    }
}
