//! Radio tasks
//!
//! Two tasks share the gateway: one drains the command queue fed by the
//! host bridge, the other polls the receiver on a fixed tick. Link events
//! flow back to the bridge through [`REPORTS`].

use embassy_stm32::gpio::Output;
use embassy_stm32::mode::Async;
use embassy_stm32::spi::Spi;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_time::{Delay, Duration, Ticker};
use embedded_hal_bus::spi::ExclusiveDevice;
use rand_wyrand::WyRand;

use crate::config::{COMMAND_QUEUE_SIZE, REPORT_QUEUE_SIZE, RX_POLL_INTERVAL_MS};
use crate::drivers::sx127x::SpiRegisterBus;
use crate::host::HostLine;
use crate::radio::report::LinkReport;
use crate::radio::shared::SharedGateway;

/// SX127x on SPI1 with a manually driven chip select
pub type LoraSpi = ExclusiveDevice<Spi<'static, Async>, Output<'static>, Delay>;

/// Observer forwarding link events to the host bridge
pub type ReportSender = Sender<'static, CriticalSectionRawMutex, LinkReport, REPORT_QUEUE_SIZE>;

/// Gateway as wired on the board
pub type HubGateway =
    SharedGateway<CriticalSectionRawMutex, SpiRegisterBus<LoraSpi>, Delay, WyRand, ReportSender>;

/// Host lines waiting for the radio
pub static COMMANDS: Channel<CriticalSectionRawMutex, HostLine, COMMAND_QUEUE_SIZE> = Channel::new();

/// Link events waiting for the host bridge
pub static REPORTS: Channel<CriticalSectionRawMutex, LinkReport, REPORT_QUEUE_SIZE> = Channel::new();

/// Deliver queued host lines, one exchange at a time
#[embassy_executor::task]
pub async fn command_task(gateway: &'static HubGateway) -> ! {
    info!("Command task started");
    loop {
        match COMMANDS.receive().await {
            HostLine::Command(command) => {
                debug!("Handling {}", command);
                // Failures are reported to the host by the gateway itself
                let _ = gateway.handle(&command).await;
            }
            HostLine::Resync { module, key } => {
                if !gateway.resync(module, key).await {
                    warn!("Resync of {} to reserved key ignored", module);
                }
            }
            HostLine::Invalid => {}
        }
    }
}

/// Poll the receiver while no command is in flight
#[embassy_executor::task]
pub async fn receive_task(gateway: &'static HubGateway) -> ! {
    info!("Receive task started");
    let mut ticker = Ticker::every(Duration::from_millis(RX_POLL_INTERVAL_MS));
    loop {
        match gateway.poll().await {
            Ok(_) => {}
            Err(err) if err.is_recoverable() => {}
            Err(err) => error!("Receive poll failed: {}", err),
        }
        ticker.next().await;
    }
}
