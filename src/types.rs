//! Shared types used across the gateway
//!
//! This module defines domain-specific types that enforce invariants
//! at compile time: which device classes exist, which opcodes each of them
//! understands, and which operating modes the transceiver can be in.

use core::fmt;

use crate::config::DEFAULT_SETPOINT_DEGREES;

/// Opcode reserved for key rotation frames on every module
pub const KEY_ROTATE_OPCODE: u8 = 0x04;

/// Logical remote device class
///
/// The discriminant is the byte carried in the first position of every
/// frame exchanged with the module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ModuleId {
    /// Security camera
    Camera = 0x02,
    /// Door lock
    Lock = 0x03,
    /// Motion sensor (receive-only)
    Motion = 0x04,
    /// Eight-channel relay bank
    Relay = 0x05,
    /// Thermostat
    Thermostat = 0x06,
}

impl ModuleId {
    /// Number of module classes
    pub const COUNT: usize = 5;

    /// Every module class in wire order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Camera,
        Self::Lock,
        Self::Motion,
        Self::Relay,
        Self::Thermostat,
    ];

    /// Look up a module from its wire byte
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x02 => Some(Self::Camera),
            0x03 => Some(Self::Lock),
            0x04 => Some(Self::Motion),
            0x05 => Some(Self::Relay),
            0x06 => Some(Self::Thermostat),
            _ => None,
        }
    }

    /// Wire byte of this module
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Dense index, used for per-module tables
    #[must_use]
    pub const fn index(self) -> usize {
        (self as u8 - 0x02) as usize
    }

    /// Human readable name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Camera => "Camera",
            Self::Lock => "Lock",
            Self::Motion => "Motion",
            Self::Relay => "Relay",
            Self::Thermostat => "Thermostat",
        }
    }

    /// Commands this module accepts
    #[must_use]
    pub const fn opcodes(self) -> &'static [OpcodeSpec] {
        match self {
            Self::Camera => &CAMERA_OPCODES,
            Self::Lock => &LOCK_OPCODES,
            Self::Motion => &[],
            Self::Relay => &RELAY_OPCODES,
            Self::Thermostat => &THERMOSTAT_OPCODES,
        }
    }

    /// Check whether `opcode` with `arg_count` arguments is a valid command
    #[must_use]
    pub fn accepts(self, opcode: u8, arg_count: usize) -> bool {
        self.opcodes()
            .iter()
            .any(|spec| spec.opcode == opcode && usize::from(spec.args) == arg_count)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ModuleId {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.name());
    }
}

/// One entry of a module's command table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpcodeSpec {
    /// Opcode byte
    pub opcode: u8,
    /// Number of argument bytes following the opcode
    pub args: u8,
}

impl OpcodeSpec {
    const fn new(opcode: u8, args: u8) -> Self {
        Self { opcode, args }
    }
}

const CAMERA_OPCODES: [OpcodeSpec; 3] = [
    OpcodeSpec::new(0x01, 1), // recording
    OpcodeSpec::new(0x02, 1), // livestream
    OpcodeSpec::new(0x03, 0), // delete recordings
];

const LOCK_OPCODES: [OpcodeSpec; 1] = [OpcodeSpec::new(0x01, 1)];

// Channel n uses opcode n + 1. Channel 3 shares its opcode with key
// rotation; deployed relay firmware tells them apart by the trailing key.
const RELAY_OPCODES: [OpcodeSpec; 8] = [
    OpcodeSpec::new(0x01, 1),
    OpcodeSpec::new(0x02, 1),
    OpcodeSpec::new(0x03, 1),
    OpcodeSpec::new(0x04, 1),
    OpcodeSpec::new(0x05, 1),
    OpcodeSpec::new(0x06, 1),
    OpcodeSpec::new(0x07, 1),
    OpcodeSpec::new(0x08, 1),
];

const THERMOSTAT_OPCODES: [OpcodeSpec; 2] = [
    OpcodeSpec::new(0x02, 1), // setpoint
    OpcodeSpec::new(0x03, 1), // heat/cool
];

/// Transceiver operating mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RadioMode {
    /// Low power, FIFO cleared, configuration allowed
    #[default]
    Sleep,
    /// Oscillator running, FIFO accessible
    Standby,
    /// Sending the staged payload
    Transmit,
    /// Listening until told otherwise
    ReceiveContinuous,
}

impl RadioMode {
    /// LoRa mode bit, kept set in every mode write
    pub const LONG_RANGE_MODE: u8 = 0x80;

    /// Mode bits (`OP_MODE[2:0]`)
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Sleep => 0x00,
            Self::Standby => 0x01,
            Self::Transmit => 0x03,
            Self::ReceiveContinuous => 0x05,
        }
    }

    /// Full `OP_MODE` register value
    #[must_use]
    pub const fn op_mode(self) -> u8 {
        Self::LONG_RANGE_MODE | self.bits()
    }

    /// Decode the mode bits of an `OP_MODE` value
    #[must_use]
    pub const fn from_op_mode(value: u8) -> Option<Self> {
        match value & 0x07 {
            0x00 => Some(Self::Sleep),
            0x01 => Some(Self::Standby),
            0x03 => Some(Self::Transmit),
            0x05 => Some(Self::ReceiveContinuous),
            _ => None,
        }
    }
}

impl fmt::Display for RadioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sleep => write!(f, "SLEEP"),
            Self::Standby => write!(f, "STBY"),
            Self::Transmit => write!(f, "TX"),
            Self::ReceiveContinuous => write!(f, "RXCONT"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for RadioMode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Sleep => defmt::write!(f, "SLEEP"),
            Self::Standby => defmt::write!(f, "STBY"),
            Self::Transmit => defmt::write!(f, "TX"),
            Self::ReceiveContinuous => defmt::write!(f, "RXCONT"),
        }
    }
}

/// On/off argument
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Switch {
    /// 0x00
    Off,
    /// 0x01
    On,
}

impl Switch {
    /// Argument byte
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Off => 0x00,
            Self::On => 0x01,
        }
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// Lock state argument
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    /// 0x00
    Unlocked,
    /// 0x01
    Locked,
}

/// Thermostat mode argument
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HvacMode {
    /// 0x00
    Cool,
    /// 0x01
    Heat,
}

/// Relay channel index (0-7)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RelayChannel(u8);

impl RelayChannel {
    /// Number of channels on a relay bank
    pub const COUNT: u8 = 8;

    /// Create a channel, returns None if out of range
    #[must_use]
    pub const fn new(channel: u8) -> Option<Self> {
        if channel < Self::COUNT {
            Some(Self(channel))
        } else {
            None
        }
    }

    /// Channel index
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Opcode selecting this channel
    #[must_use]
    pub const fn opcode(self) -> u8 {
        self.0 + 1
    }
}

/// Typed device command, one variant per row of the module command tables
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceAction {
    /// Start or stop camera recording
    CameraRecording(Switch),
    /// Start or stop the camera livestream
    CameraLivestream(Switch),
    /// Delete stored recordings
    CameraDeleteRecordings,
    /// Lock or unlock the door
    Lock(LockState),
    /// Switch one relay channel
    Relay(RelayChannel, Switch),
    /// Thermostat setpoint in degrees
    ThermostatSetpoint(u8),
    /// Heating or cooling
    ThermostatMode(HvacMode),
}

impl DeviceAction {
    /// Setpoint from an untrusted integer; out-of-range values fall back to
    /// [`DEFAULT_SETPOINT_DEGREES`]
    #[must_use]
    pub fn thermostat_setpoint(degrees: i32) -> Self {
        let degrees = u8::try_from(degrees).unwrap_or(DEFAULT_SETPOINT_DEGREES);
        Self::ThermostatSetpoint(degrees)
    }

    /// Module addressed by this action
    #[must_use]
    pub const fn module(self) -> ModuleId {
        match self {
            Self::CameraRecording(_) | Self::CameraLivestream(_) | Self::CameraDeleteRecordings => {
                ModuleId::Camera
            }
            Self::Lock(_) => ModuleId::Lock,
            Self::Relay(..) => ModuleId::Relay,
            Self::ThermostatSetpoint(_) | Self::ThermostatMode(_) => ModuleId::Thermostat,
        }
    }

    /// Opcode byte
    #[must_use]
    pub const fn opcode(self) -> u8 {
        match self {
            Self::CameraRecording(_) | Self::Lock(_) => 0x01,
            Self::CameraLivestream(_) | Self::ThermostatSetpoint(_) => 0x02,
            Self::CameraDeleteRecordings | Self::ThermostatMode(_) => 0x03,
            Self::Relay(channel, _) => channel.opcode(),
        }
    }

    /// Argument byte, if the opcode takes one
    #[must_use]
    pub const fn arg(self) -> Option<u8> {
        match self {
            Self::CameraRecording(switch) | Self::CameraLivestream(switch) | Self::Relay(_, switch) => {
                Some(switch.as_byte())
            }
            Self::CameraDeleteRecordings => None,
            Self::Lock(LockState::Unlocked) | Self::ThermostatMode(HvacMode::Cool) => Some(0x00),
            Self::Lock(LockState::Locked) | Self::ThermostatMode(HvacMode::Heat) => Some(0x01),
            Self::ThermostatSetpoint(degrees) => Some(degrees),
        }
    }
}
