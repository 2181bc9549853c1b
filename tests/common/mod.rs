//! Shared test fixtures
//!
//! A register-level SX127x simulation plus the delay, RNG and observer the
//! gateway needs on the host.

#![allow(dead_code)]

use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::rc::Rc;

use embedded_hal::spi::ErrorKind;
use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use lora_gateway::config::LinkConfig;
use lora_gateway::drivers::sx127x::{irq, reg, RegisterBus, Transceiver, WRITE_BIT};
use lora_gateway::radio::report::{LinkObserver, LinkReport};
use lora_gateway::Gateway;

/// Power-on value of `FIFO_TX_BASE_ADDR`
const RESET_TX_BASE: u8 = 0x80;

/// One register access seen by the chip
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Access {
    pub write: bool,
    pub register: u8,
    pub value: u8,
}

/// Chip state shared between the bus handle owned by the gateway and the
/// handle kept by the test
struct ChipState {
    regs: [u8; 128],
    fifo: [u8; 256],
    log: Vec<Access>,
    transmitted: Vec<Vec<u8>>,
    tx_done_budget: Option<usize>,
    fail_at: Option<usize>,
    stuck: Vec<u8>,
}

/// Simulated transceiver behind the register bus
#[derive(Clone)]
pub struct SimChip {
    state: Rc<RefCell<ChipState>>,
}

impl Default for SimChip {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChip {
    pub fn new() -> Self {
        let mut regs = [0u8; 128];
        regs[usize::from(reg::FIFO_TX_BASE_ADDR)] = RESET_TX_BASE;
        Self {
            state: Rc::new(RefCell::new(ChipState {
                regs,
                fifo: [0; 256],
                log: Vec::new(),
                transmitted: Vec::new(),
                tx_done_budget: None,
                fail_at: None,
                stuck: Vec::new(),
            })),
        }
    }

    /// Current register content
    pub fn reg(&self, register: u8) -> u8 {
        self.state.borrow().regs[usize::from(register)]
    }

    /// Deliver a packet as the receiver would
    pub fn inject_rx(&self, payload: &[u8]) {
        let mut s = self.state.borrow_mut();
        let start = s.regs[usize::from(reg::FIFO_RX_BASE_ADDR)];
        for (i, &byte) in payload.iter().enumerate() {
            s.fifo[usize::from(start.wrapping_add(i as u8))] = byte;
        }
        s.regs[usize::from(reg::FIFO_RX_CURRENT_ADDR)] = start;
        s.regs[usize::from(reg::RX_NB_BYTES)] = payload.len() as u8;
        s.regs[usize::from(reg::IRQ_FLAGS)] |= irq::RX_DONE;
    }

    /// Raise RX_DONE with a byte count but no meaningful payload
    pub fn inject_rx_count(&self, count: u8) {
        let mut s = self.state.borrow_mut();
        s.regs[usize::from(reg::RX_NB_BYTES)] = count;
        s.regs[usize::from(reg::IRQ_FLAGS)] |= irq::RX_DONE;
    }

    /// Raise arbitrary interrupt flags
    pub fn raise(&self, flags: u8) {
        self.state.borrow_mut().regs[usize::from(reg::IRQ_FLAGS)] |= flags;
    }

    /// Never raise TX_DONE
    pub fn set_never_done(&self) {
        self.state.borrow_mut().tx_done_budget = Some(0);
    }

    /// Raise TX_DONE for the next `n` transmissions only
    pub fn confirm_only(&self, n: usize) {
        self.state.borrow_mut().tx_done_budget = Some(n);
    }

    /// Fail the exchange `n` steps from now (0 = the next one)
    pub fn fail_after(&self, n: usize) {
        let mut s = self.state.borrow_mut();
        s.fail_at = Some(s.log.len() + n);
    }

    /// Make a register ignore writes
    pub fn stick(&self, register: u8) {
        self.state.borrow_mut().stuck.push(register);
    }

    /// Forget the exchanges seen so far
    pub fn clear_log(&self) {
        let mut s = self.state.borrow_mut();
        s.log.clear();
        s.fail_at = None;
    }

    /// Every exchange since the last clear, in order
    pub fn log(&self) -> Vec<Access> {
        self.state.borrow().log.clone()
    }

    /// Payloads sent over the air
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.state.borrow().transmitted.clone()
    }

    /// Values written to a register, in order
    pub fn writes_to(&self, register: u8) -> Vec<u8> {
        self.state
            .borrow()
            .log
            .iter()
            .filter(|a| a.write && a.register == register)
            .map(|a| a.value)
            .collect()
    }

    /// Number of reads of a register
    pub fn reads_of(&self, register: u8) -> usize {
        self.state
            .borrow()
            .log
            .iter()
            .filter(|a| !a.write && a.register == register)
            .count()
    }

    /// Operating mode writes, in order
    pub fn mode_writes(&self) -> Vec<u8> {
        self.writes_to(reg::OP_MODE)
    }

    /// Last value written to `OP_MODE`
    pub fn last_mode(&self) -> Option<u8> {
        self.mode_writes().last().copied()
    }
}

impl ChipState {
    fn fifo_access(&mut self) -> usize {
        let ptr = self.regs[usize::from(reg::FIFO_ADDR_PTR)];
        self.regs[usize::from(reg::FIFO_ADDR_PTR)] = ptr.wrapping_add(1);
        usize::from(ptr)
    }

    fn write(&mut self, register: u8, value: u8) {
        if self.stuck.contains(&register) {
            return;
        }
        match register {
            reg::FIFO => {
                let at = self.fifo_access();
                self.fifo[at] = value;
            }
            reg::IRQ_FLAGS => {
                self.regs[usize::from(reg::IRQ_FLAGS)] &= !value;
            }
            reg::OP_MODE => {
                self.regs[usize::from(reg::OP_MODE)] = value;
                if value & 0x07 == 0x03 {
                    self.start_tx();
                }
            }
            _ => self.regs[usize::from(register)] = value,
        }
    }

    fn start_tx(&mut self) {
        let base = usize::from(self.regs[usize::from(reg::FIFO_TX_BASE_ADDR)]);
        let len = usize::from(self.regs[usize::from(reg::PAYLOAD_LENGTH)]);
        let payload = (0..len).map(|i| self.fifo[(base + i) % 256]).collect();
        self.transmitted.push(payload);
        let confirmed = match &mut self.tx_done_budget {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        };
        if confirmed {
            self.regs[usize::from(reg::IRQ_FLAGS)] |= irq::TX_DONE;
            // Chip drops back to standby on its own
            self.regs[usize::from(reg::OP_MODE)] = 0x81;
        }
    }

    fn read(&mut self, register: u8) -> u8 {
        if register == reg::FIFO {
            let at = self.fifo_access();
            self.fifo[at]
        } else {
            self.regs[usize::from(register)]
        }
    }
}

impl RegisterBus for SimChip {
    async fn exchange(&mut self, frame: [u8; 2]) -> Result<[u8; 2], ErrorKind> {
        let [address, value] = frame;
        let write = address & WRITE_BIT != 0;
        let register = address & 0x7F;
        let mut s = self.state.borrow_mut();
        let index = s.log.len();
        s.log.push(Access {
            write,
            register,
            value,
        });
        if s.fail_at == Some(index) {
            return Err(ErrorKind::Other);
        }
        if write {
            s.write(register, value);
            Ok([0x00, 0x00])
        } else {
            Ok([0x00, s.read(register)])
        }
    }
}

/// Resolves on the second poll, so every delay is a scheduling point
struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Delay that records what it was asked for and returns at once
#[derive(Default)]
pub struct RecordingDelay {
    pub ms: Vec<u32>,
    pub us: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, _ns: u32) {
        YieldNow(false).await;
    }

    async fn delay_us(&mut self, us: u32) {
        self.us.push(us);
        YieldNow(false).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.ms.push(ms);
        YieldNow(false).await;
    }
}

/// RNG replaying a fixed sequence of words
pub struct ScriptedRng {
    words: Vec<u32>,
    next: usize,
}

impl ScriptedRng {
    pub fn new(words: &[u32]) -> Self {
        assert!(!words.is_empty());
        Self {
            words: words.to_vec(),
            next: 0,
        }
    }

    /// Number of words drawn so far
    pub fn draws(&self) -> usize {
        self.next
    }
}

impl RngCore for ScriptedRng {
    fn next_u32(&mut self) -> u32 {
        let word = self.words[self.next % self.words.len()];
        self.next += 1;
        word
    }

    fn next_u64(&mut self) -> u64 {
        rand_core::impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        rand_core::impls::fill_bytes_via_next(self, dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Observer keeping every report
#[derive(Default)]
pub struct Recorder(pub Vec<LinkReport>);

impl LinkObserver for Recorder {
    fn report(&mut self, report: LinkReport) {
        self.0.push(report);
    }
}

pub type TestGateway = Gateway<SimChip, RecordingDelay, ScriptedRng, Recorder>;

/// Gateway over a fresh chip; not started
pub fn gateway(config: LinkConfig, rng_words: &[u32]) -> (TestGateway, SimChip) {
    let chip = SimChip::new();
    let gw = Gateway::new(
        Transceiver::new(chip.clone()),
        RecordingDelay::default(),
        ScriptedRng::new(rng_words),
        config,
    )
    .with_observer(Recorder::default());
    (gw, chip)
}

/// Gateway already listening, with the start-up traffic cleared
pub fn started(config: LinkConfig, rng_words: &[u32]) -> (TestGateway, SimChip) {
    let (mut gw, chip) = gateway(config, rng_words);
    futures::executor::block_on(gw.start()).expect("start");
    chip.clear_log();
    (gw, chip)
}

/// Events reported so far
pub fn reports(gw: &TestGateway) -> &[LinkReport] {
    &gw.observer().0
}
