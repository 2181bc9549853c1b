//! Radio Frame Codec
//!
//! Frame layout on the link (one transceiver packet = one frame, no
//! delimiter, no checksum beyond the transceiver's own CRC):
//!
//! ```text
//! command:      [module, opcode, args..., key]
//! key rotation: [module, 0x04, new_key, old_key]
//! ```
//!
//! The trailing key is a clear-text shared token, not a cipher. Inbound
//! frames are raw FIFO contents; the receiver only enforces a size bound.

use core::fmt;

use heapless::Vec;

use crate::config::{MAX_COMMAND_ARGS, MAX_FRAME_LEN, MAX_RX_PAYLOAD};
use crate::drivers::sx127x::{irq, reg, RegisterBus, Transceiver};
use crate::error::{LinkResult, RejectReason};
use crate::types::{DeviceAction, ModuleId, KEY_ROTATE_OPCODE};

/// Abstract command delivered by the command source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    module: ModuleId,
    opcode: u8,
    args: Vec<u8, MAX_COMMAND_ARGS>,
}

impl Command {
    /// Create a command, returns None if `args` is longer than a frame allows
    #[must_use]
    pub fn new(module: ModuleId, opcode: u8, args: &[u8]) -> Option<Self> {
        Some(Self {
            module,
            opcode,
            args: Vec::from_slice(args).ok()?,
        })
    }

    /// Addressed module
    #[must_use]
    pub const fn module(&self) -> ModuleId {
        self.module
    }

    /// Opcode byte
    #[must_use]
    pub const fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Argument bytes
    #[must_use]
    pub fn args(&self) -> &[u8] {
        &self.args
    }
}

impl From<DeviceAction> for Command {
    fn from(action: DeviceAction) -> Self {
        let mut args = Vec::new();
        if let Some(arg) = action.arg() {
            // Capacity is at least one
            let _ = args.push(arg);
        }
        Self {
            module: action.module(),
            opcode: action.opcode(),
            args,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Command {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Command({}, op={=u8:#x}, args={=[u8]:#x})",
            self.module,
            self.opcode,
            self.args.as_slice()
        );
    }
}

/// Frame ready to be staged in the transmit FIFO
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundFrame(Vec<u8, MAX_FRAME_LEN>);

impl OutboundFrame {
    /// Raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Frame length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Frames always carry at least module, opcode and key
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Addressed module
    #[must_use]
    pub fn module(&self) -> Option<ModuleId> {
        self.0.first().copied().and_then(ModuleId::from_byte)
    }

    /// Opcode byte
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        self.0.get(1).copied()
    }
}

impl fmt::Display for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for OutboundFrame {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=[u8]:#x}", self.0.as_slice());
    }
}

/// Raw frame read out of the receive FIFO
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct InboundFrame(Vec<u8, MAX_RX_PAYLOAD>);

impl InboundFrame {
    /// Build from raw bytes, returns None if longer than the receive bound
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Vec::from_slice(bytes).ok().map(Self)
    }

    /// Raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Frame length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for zero-length packets
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sending module, if the first byte names one
    #[must_use]
    pub fn module(&self) -> Option<ModuleId> {
        self.0.first().copied().and_then(ModuleId::from_byte)
    }

    /// Opcode byte
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        self.0.get(1).copied()
    }

    /// Key acknowledgement `[module, 0x04, key]` sent by a module that applied
    /// a rotation
    #[must_use]
    pub fn as_key_ack(&self) -> Option<(ModuleId, u8)> {
        match self.0.as_slice() {
            [module, KEY_ROTATE_OPCODE, key] => Some((ModuleId::from_byte(*module)?, *key)),
            _ => None,
        }
    }
}

impl fmt::Display for InboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for InboundFrame {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=[u8]:#x}", self.0.as_slice());
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{byte:02X}")?;
    }
    Ok(())
}

/// Fields of a frame in the outbound layout
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedFrame {
    /// Addressed module
    pub module: ModuleId,
    /// Opcode byte
    pub opcode: u8,
    /// Bytes between opcode and key
    pub args: Vec<u8, MAX_COMMAND_ARGS>,
    /// Trailing key byte
    pub key: u8,
}

/// Serialize a command with the module's current key
#[must_use]
pub fn encode(command: &Command, key: u8) -> OutboundFrame {
    let mut frame = Vec::new();
    // MAX_COMMAND_ARGS + 3 == MAX_FRAME_LEN, so none of these can overflow
    let _ = frame.push(command.module.as_byte());
    let _ = frame.push(command.opcode);
    let _ = frame.extend_from_slice(&command.args);
    let _ = frame.push(key);
    OutboundFrame(frame)
}

/// Serialize a key rotation request
#[must_use]
pub fn encode_rotation(module: ModuleId, new_key: u8, old_key: u8) -> OutboundFrame {
    let mut frame = Vec::new();
    let _ = frame.extend_from_slice(&[module.as_byte(), KEY_ROTATE_OPCODE, new_key, old_key]);
    OutboundFrame(frame)
}

/// Split bytes laid out as `[module, opcode, args..., key]`
///
/// Returns None for frames shorter than three bytes, longer than
/// [`MAX_FRAME_LEN`], or addressed to an unknown module.
#[must_use]
pub fn parse(bytes: &[u8]) -> Option<ParsedFrame> {
    if bytes.len() < 3 || bytes.len() > MAX_FRAME_LEN {
        return None;
    }
    let (&key, head) = bytes.split_last()?;
    Some(ParsedFrame {
        module: ModuleId::from_byte(head[0])?,
        opcode: head[1],
        args: Vec::from_slice(&head[2..]).ok()?,
        key,
    })
}

/// Collect the frame the transceiver has received, if any
///
/// `Ok(None)` means no receive event is pending. Rejections clear the
/// interrupt flags and never touch the FIFO.
pub async fn decode<B: RegisterBus>(xcvr: &mut Transceiver<B>) -> LinkResult<Option<InboundFrame>> {
    let flags = xcvr.read_reg(reg::IRQ_FLAGS).await?;

    if flags & irq::RX_DONE != 0 {
        xcvr.write_reg(reg::IRQ_FLAGS, irq::ALL).await?;
        let count = xcvr.read_reg(reg::RX_NB_BYTES).await?;
        if usize::from(count) > MAX_RX_PAYLOAD {
            return Err(RejectReason::Oversized(count).into());
        }

        let start = xcvr.read_reg(reg::FIFO_RX_CURRENT_ADDR).await?;
        xcvr.write_reg(reg::FIFO_ADDR_PTR, start).await?;
        let mut bytes = Vec::new();
        for _ in 0..count {
            let byte = xcvr.read_reg(reg::FIFO).await?;
            // count <= MAX_RX_PAYLOAD was checked above
            let _ = bytes.push(byte);
        }
        xcvr.write_reg(reg::FIFO_ADDR_PTR, 0x00).await?;
        return Ok(Some(InboundFrame(bytes)));
    }

    if flags & (irq::RX_TIMEOUT | irq::PAYLOAD_CRC_ERROR) != 0 {
        xcvr.write_reg(reg::IRQ_FLAGS, irq::ALL).await?;
        let reason = if flags & irq::RX_TIMEOUT != 0 {
            RejectReason::Timeout
        } else {
            RejectReason::CrcError
        };
        return Err(reason.into());
    }

    Ok(None)
}
