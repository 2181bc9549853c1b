//! USB CDC ACM (Serial) Host Bridge
//!
//! Provides the virtual serial port the cloud glue process talks to.
//! Incoming bytes go through [`HostParser`]; complete lines are queued for
//! the command task. Link reports are written back as they arrive.

use embassy_futures::select::{select, Either};
use embassy_stm32::peripherals::USB;
use embassy_stm32::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embassy_usb::class::cdc_acm::{self, CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, UsbDevice};
use static_cell::StaticCell;

use crate::config::{REPORT_QUEUE_SIZE, USB_CDC_PACKET_SIZE, USB_PID, USB_VID};
use crate::host::{HostLine, HostParser, HostResponse};
use crate::radio::report::LinkReport;
use crate::tasks::COMMANDS;

/// USB driver of the STM32G4 full-speed peripheral
pub type UsbDriver = Driver<'static, USB>;

/// Receiving end of the report queue
pub type ReportReceiver =
    Receiver<'static, CriticalSectionRawMutex, LinkReport, REPORT_QUEUE_SIZE>;

/// USB device descriptor strings
pub struct UsbStrings {
    /// Manufacturer name
    pub manufacturer: &'static str,
    /// Product name
    pub product: &'static str,
    /// Serial number
    pub serial: &'static str,
}

impl Default for UsbStrings {
    fn default() -> Self {
        Self {
            manufacturer: "Hub Gateway",
            product: "LoRa Gateway",
            serial: "0001",
        }
    }
}

/// Build the USB device and its CDC ACM class
///
/// Must be called once; descriptor buffers live in static cells.
pub fn init(
    driver: UsbDriver,
    strings: &UsbStrings,
) -> (UsbDevice<'static, UsbDriver>, CdcAcmClass<'static, UsbDriver>) {
    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static MSOS_DESCRIPTOR: StaticCell<[u8; 0]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static STATE: StaticCell<State<'static>> = StaticCell::new();

    let mut config = embassy_usb::Config::new(USB_VID, USB_PID);
    config.manufacturer = Some(strings.manufacturer);
    config.product = Some(strings.product);
    config.serial_number = Some(strings.serial);
    config.max_power = 100;
    config.max_packet_size_0 = 64;

    let mut builder = Builder::new(
        driver,
        config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        MSOS_DESCRIPTOR.init([]),
        CONTROL_BUF.init([0; 64]),
    );
    let class = CdcAcmClass::new(&mut builder, STATE.init(State::new()), USB_CDC_PACKET_SIZE);
    (builder.build(), class)
}

/// Run the USB device stack
#[embassy_executor::task]
pub async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    device.run().await
}

/// Bridge the serial port and the radio tasks
#[embassy_executor::task]
pub async fn usb_bridge_task(class: CdcAcmClass<'static, UsbDriver>, reports: ReportReceiver) -> ! {
    let (mut tx, mut rx) = class.split();
    loop {
        rx.wait_connection().await;
        info!("Host connected");
        let _ = bridge(&mut tx, &mut rx, &reports).await;
        info!("Host disconnected");
    }
}

async fn bridge(
    tx: &mut cdc_acm::Sender<'static, UsbDriver>,
    rx: &mut cdc_acm::Receiver<'static, UsbDriver>,
    reports: &ReportReceiver,
) -> Result<(), EndpointError> {
    let mut parser = HostParser::new();
    let mut response = HostResponse::new();
    let mut packet = [0u8; USB_CDC_PACKET_SIZE as usize];

    loop {
        match select(rx.read_packet(&mut packet), reports.receive()).await {
            Either::First(read) => {
                let n = read?;
                for &byte in &packet[..n] {
                    match parser.feed(byte) {
                        Some(HostLine::Invalid) => {
                            response.invalid();
                            write_line(tx, response.as_bytes()).await?;
                        }
                        Some(line) => {
                            if COMMANDS.try_send(line).is_err() {
                                response.queue_full();
                                write_line(tx, response.as_bytes()).await?;
                            }
                        }
                        None => {}
                    }
                }
            }
            Either::Second(report) => {
                response.report(&report);
                write_line(tx, response.as_bytes()).await?;
            }
        }
    }
}

/// Write a line in packet-sized chunks, ending with a short packet
async fn write_line(
    tx: &mut cdc_acm::Sender<'static, UsbDriver>,
    bytes: &[u8],
) -> Result<(), EndpointError> {
    let size = usize::from(USB_CDC_PACKET_SIZE);
    for chunk in bytes.chunks(size) {
        tx.write_packet(chunk).await?;
    }
    if bytes.len() % size == 0 {
        tx.write_packet(&[]).await?;
    }
    Ok(())
}
