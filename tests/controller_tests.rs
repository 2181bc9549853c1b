//! Radio State Controller Tests
//!
//! Tests for mode transitions, transmit sequencing and bounded
//! transmit-done polling.
//! Run with: cargo test --no-default-features --features std --test controller_tests

mod common;

use common::{Access, RecordingDelay, SimChip};
use futures::executor::block_on;
use lora_gateway::drivers::sx127x::{irq, reg, Transceiver};
use lora_gateway::radio::controller::Radio;
use lora_gateway::{LinkError, RadioMode};

fn radio() -> (Radio<SimChip>, SimChip) {
    let chip = SimChip::new();
    (Radio::new(Transceiver::new(chip.clone())), chip)
}

fn ready() -> (Radio<SimChip>, SimChip) {
    let (mut radio, chip) = radio();
    block_on(radio.initialize()).unwrap();
    chip.clear_log();
    (radio, chip)
}

fn write(register: u8, value: u8) -> Access {
    Access {
        write: true,
        register,
        value,
    }
}

fn read(register: u8) -> Access {
    Access {
        write: false,
        register,
        value: 0,
    }
}

// ============================================================================
// Initialization Tests
// ============================================================================

#[test]
fn initialize_configures_and_verifies() {
    let (mut radio, chip) = radio();

    block_on(radio.initialize()).unwrap();

    assert_eq!(
        chip.log(),
        vec![
            write(reg::OP_MODE, 0x80),
            read(reg::OP_MODE),
            write(reg::PA_CONFIG, 0xFF),
            read(reg::PA_CONFIG),
            write(reg::DIO_MAPPING_1, 0x00),
        ]
    );
    assert_eq!(radio.mode(), Some(RadioMode::Sleep));
}

#[test]
fn initialize_is_idempotent() {
    let (mut radio, chip) = radio();

    block_on(radio.initialize()).unwrap();
    block_on(radio.initialize()).unwrap();

    assert_eq!(radio.mode(), Some(RadioMode::Sleep));
    assert_eq!(chip.reg(reg::OP_MODE), 0x80);
    assert_eq!(chip.reg(reg::PA_CONFIG), 0xFF);
}

#[test]
fn initialize_fails_when_power_does_not_stick() {
    let (mut radio, chip) = radio();
    chip.stick(reg::PA_CONFIG);

    let result = block_on(radio.initialize());

    assert!(matches!(
        result,
        Err(LinkError::VerifyFailed {
            register: reg::PA_CONFIG,
            ..
        })
    ));
    assert!(!radio.is_initialized());
}

#[test]
fn operations_require_initialization() {
    let (mut radio, chip) = radio();
    let mut delay = RecordingDelay::default();

    assert_eq!(block_on(radio.enter_receive_continuous()), Err(LinkError::NotInitialized));
    assert_eq!(
        block_on(radio.transmit(&[0x05, 0x01, 0x01, 0x55], &mut delay, 10, 1000)),
        Err(LinkError::NotInitialized)
    );
    assert_eq!(block_on(radio.poll_frame()), Err(LinkError::NotInitialized));
    assert!(chip.log().is_empty());
}

// ============================================================================
// Receive Mode Tests
// ============================================================================

#[test]
fn receive_continuous_sequence() {
    let (mut radio, chip) = ready();

    block_on(radio.enter_receive_continuous()).unwrap();

    assert_eq!(
        chip.log(),
        vec![
            write(reg::OP_MODE, 0x80),
            write(reg::FIFO_ADDR_PTR, 0x00),
            write(reg::OP_MODE, 0x85),
        ]
    );
    assert_eq!(radio.mode(), Some(RadioMode::ReceiveContinuous));
}

#[test]
fn poll_frame_with_nothing_pending() {
    let (mut radio, _chip) = ready();
    block_on(radio.enter_receive_continuous()).unwrap();

    assert_eq!(block_on(radio.poll_frame()), Ok(None));
}

// ============================================================================
// Transmit Tests
// ============================================================================

#[test]
fn transmit_sequence() {
    let (mut radio, chip) = ready();
    let mut delay = RecordingDelay::default();

    block_on(radio.transmit(&[0x05, 0x01, 0x01, 0x55], &mut delay, 10, 1000)).unwrap();

    assert_eq!(
        chip.log(),
        vec![
            write(reg::OP_MODE, 0x81),
            write(reg::FIFO_ADDR_PTR, 0x80),
            write(reg::FIFO, 0x05),
            write(reg::FIFO, 0x01),
            write(reg::FIFO, 0x01),
            write(reg::FIFO, 0x55),
            write(reg::PAYLOAD_LENGTH, 4),
            write(reg::IRQ_FLAGS, irq::TX_DONE),
            write(reg::OP_MODE, 0x83),
            read(reg::IRQ_FLAGS),
            write(reg::IRQ_FLAGS, irq::TX_DONE),
        ]
    );
    assert_eq!(chip.transmitted(), vec![vec![0x05, 0x01, 0x01, 0x55]]);
    assert_eq!(radio.mode(), Some(RadioMode::Standby));
    assert_eq!(chip.reg(reg::IRQ_FLAGS) & irq::TX_DONE, 0);
    assert!(delay.us.is_empty());
}

#[test]
fn transmit_poll_is_bounded() {
    let (mut radio, chip) = ready();
    chip.set_never_done();
    let mut delay = RecordingDelay::default();

    let result = block_on(radio.transmit(&[0x03, 0x01, 0x01, 0x55], &mut delay, 5, 250));

    assert_eq!(result, Err(LinkError::TransmitNotConfirmed { polls: 5 }));
    assert_eq!(chip.reads_of(reg::IRQ_FLAGS), 5);
    assert_eq!(delay.us, vec![250; 4]);
    assert_eq!(radio.mode(), Some(RadioMode::Transmit));
}

#[test]
fn stale_tx_done_does_not_confirm() {
    let (mut radio, chip) = ready();
    chip.raise(irq::TX_DONE);
    chip.set_never_done();
    let mut delay = RecordingDelay::default();

    let result = block_on(radio.transmit(&[0x05, 0x02, 0x01, 0x55], &mut delay, 3, 100));

    assert_eq!(result, Err(LinkError::TransmitNotConfirmed { polls: 3 }));
    assert_eq!(chip.reads_of(reg::IRQ_FLAGS), 3);
}

#[test]
fn transmit_while_unconfirmed_is_busy() {
    let (mut radio, chip) = ready();
    chip.set_never_done();
    let mut delay = RecordingDelay::default();
    let frame = [0x03, 0x01, 0x00, 0x55];

    let _ = block_on(radio.transmit(&frame, &mut delay, 2, 100));
    chip.clear_log();

    assert_eq!(block_on(radio.transmit(&frame, &mut delay, 2, 100)), Err(LinkError::Busy));
    assert!(chip.log().is_empty());
}

#[test]
fn rearm_after_unconfirmed_transmit_clears_busy() {
    let (mut radio, chip) = ready();
    chip.confirm_only(0);
    let mut delay = RecordingDelay::default();
    let frame = [0x03, 0x01, 0x00, 0x55];

    let _ = block_on(radio.transmit(&frame, &mut delay, 2, 100));
    block_on(radio.enter_receive_continuous()).unwrap();
    chip.confirm_only(1);

    assert_eq!(block_on(radio.transmit(&frame, &mut delay, 2, 100)), Ok(()));
}

#[test]
fn zero_poll_limit_still_checks_once() {
    let (mut radio, chip) = ready();
    let mut delay = RecordingDelay::default();

    block_on(radio.transmit(&[0x02, 0x03, 0x55], &mut delay, 0, 100)).unwrap();

    assert_eq!(chip.reads_of(reg::IRQ_FLAGS), 1);
}
