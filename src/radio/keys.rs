//! Key Rotation Manager
//!
//! Each module shares a one-byte token with the gateway. The token is
//! replaced after every command: the gateway prepares a fresh value, sends
//! it in a rotation frame and only then makes it current.
//!
//! ```text
//! current ──prepare_rotation──► PendingRotation ──transmit ok──► commit
//!                                      │
//!                                      └── dropped: old token stays current
//! ```

use rand_core::RngCore;

use crate::config::{DEFAULT_KEY, RESERVED_KEY};
use crate::error::{LinkError, LinkResult};
use crate::protocol::{self, OutboundFrame};
use crate::types::ModuleId;

/// Token state for one module
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySlot {
    current: u8,
    awaiting_ack: bool,
}

impl KeySlot {
    const fn new(key: u8) -> Self {
        Self {
            current: key,
            awaiting_ack: false,
        }
    }

    /// Token used for outbound frames
    #[must_use]
    pub const fn current(&self) -> u8 {
        self.current
    }

    /// Whether the last committed rotation has not been acknowledged yet
    #[must_use]
    pub const fn awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }
}

/// A drawn but not yet effective token
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use = "a rotation only takes effect once committed"]
pub struct PendingRotation {
    module: ModuleId,
    old_key: u8,
    new_key: u8,
}

impl PendingRotation {
    /// Module being rotated
    pub const fn module(&self) -> ModuleId {
        self.module
    }

    /// Token in effect until commit
    pub const fn old_key(&self) -> u8 {
        self.old_key
    }

    /// Token taking effect on commit
    pub const fn new_key(&self) -> u8 {
        self.new_key
    }

    /// Rotation frame announcing the new token under the old one
    pub fn frame(&self) -> OutboundFrame {
        protocol::encode_rotation(self.module, self.new_key, self.old_key)
    }
}

/// Per-module tokens, owned by the dispatch router
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRing {
    slots: [KeySlot; ModuleId::COUNT],
}

impl KeyRing {
    /// Every module starts with `initial_key` (the reserved value `0` is
    /// replaced by the default token)
    #[must_use]
    pub const fn new(initial_key: u8) -> Self {
        let key = if initial_key == RESERVED_KEY {
            DEFAULT_KEY
        } else {
            initial_key
        };
        Self {
            slots: [KeySlot::new(key); ModuleId::COUNT],
        }
    }

    /// Current token of a module
    #[must_use]
    pub const fn current(&self, module: ModuleId) -> u8 {
        self.slots[module.index()].current
    }

    /// Full slot of a module
    #[must_use]
    pub const fn slot(&self, module: ModuleId) -> KeySlot {
        self.slots[module.index()]
    }

    /// Whether the module's last rotation is still unacknowledged
    #[must_use]
    pub const fn awaiting_ack(&self, module: ModuleId) -> bool {
        self.slots[module.index()].awaiting_ack
    }

    /// Draw a new token in `1..=255`; the current one stays in effect
    pub fn prepare_rotation<R: RngCore>(&self, module: ModuleId, rng: &mut R) -> PendingRotation {
        PendingRotation {
            module,
            old_key: self.current(module),
            new_key: draw_key(rng),
        }
    }

    /// Make a transmitted rotation effective
    ///
    /// Returns false, leaving the slot untouched, if the slot changed since
    /// the rotation was prepared.
    pub fn commit(&mut self, pending: PendingRotation) -> bool {
        let slot = &mut self.slots[pending.module.index()];
        if slot.current != pending.old_key {
            warn!("Stale rotation for {} refused", pending.module.name());
            return false;
        }
        slot.current = pending.new_key;
        slot.awaiting_ack = true;
        true
    }

    /// Record a key acknowledgement from a module
    pub fn acknowledge(&mut self, module: ModuleId, key: u8) -> LinkResult<()> {
        let slot = &mut self.slots[module.index()];
        if slot.current == key {
            slot.awaiting_ack = false;
            Ok(())
        } else {
            Err(LinkError::KeyDesync { module })
        }
    }

    /// Force a module's token, clearing any pending acknowledgement
    ///
    /// Returns false for the reserved token `0`.
    pub fn resync(&mut self, module: ModuleId, key: u8) -> bool {
        if key == RESERVED_KEY {
            return false;
        }
        self.slots[module.index()] = KeySlot::new(key);
        true
    }
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new(DEFAULT_KEY)
    }
}

/// Uniform draw over `1..=255` by rejecting the reserved value
fn draw_key<R: RngCore>(rng: &mut R) -> u8 {
    loop {
        let [byte, ..] = rng.next_u32().to_le_bytes();
        if byte != RESERVED_KEY {
            return byte;
        }
    }
}
