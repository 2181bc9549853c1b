//! LoRa Gateway Main Application
//!
//! Entry point for the STM32G474-based hub gateway firmware.
//! Initializes hardware, brings up the radio link and spawns async tasks.

#![no_std]
#![no_main]

use defmt::{error, info};
use embassy_executor::Spawner;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::rng::{self, Rng};
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::Hertz;
use embassy_stm32::usb::{self, Driver};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::Delay;
use embedded_hal_bus::spi::ExclusiveDevice;
use rand_core::{RngCore, SeedableRng};
use rand_wyrand::WyRand;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use lora_gateway::drivers::sx127x::{SpiRegisterBus, Transceiver};
use lora_gateway::prelude::*;
use lora_gateway::radio::shared::SharedGateway;
use lora_gateway::tasks::{self, HubGateway, REPORTS};
use lora_gateway::usb::cdc::{self, UsbStrings};
use lora_gateway::Gateway;

// Bind interrupt handlers
bind_interrupts!(struct Irqs {
    RNG => rng::InterruptHandler<peripherals::RNG>;
    USB_LP => usb::InterruptHandler<peripherals::USB>;
});

static GATEWAY: StaticCell<HubGateway> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("LoRa Gateway Firmware v{}", env!("CARGO_PKG_VERSION"));

    // USB and the RNG both run from the 48 MHz clock
    let mut config = embassy_stm32::Config::default();
    {
        use embassy_stm32::rcc::{mux, Hsi48Config};
        config.rcc.hsi48 = Some(Hsi48Config { sync_from_usb: true });
        config.rcc.mux.clk48sel = mux::Clk48sel::HSI48;
    }
    let p = embassy_stm32::init(config);

    info!("Peripherals initialized");

    let led = Output::new(p.PA5, Level::Low, Speed::Low);

    // Pulse NRESET; the pin is left floating afterwards as the SX127x expects
    let mut reset = Output::new(p.PA3, Level::Low, Speed::Low);
    Timer::after(Duration::from_millis(1)).await;
    reset.set_high();
    drop(reset);
    Timer::after(Duration::from_millis(10)).await;

    // SPI1: PB3 = SCK, PB5 = MOSI, PB4 = MISO, PA4 = NSS
    let mut spi_config = spi::Config::default();
    spi_config.frequency = Hertz(SPI_FREQUENCY_HZ);
    let spi = Spi::new(p.SPI1, p.PB3, p.PB5, p.PB4, p.DMA1_CH1, p.DMA1_CH2, spi_config);
    let nss = Output::new(p.PA4, Level::High, Speed::VeryHigh);
    let device = match ExclusiveDevice::new(spi, nss, Delay) {
        Ok(device) => device,
        Err(_) => defmt::panic!("LoRa chip select unavailable"),
    };

    info!("SPI1 initialized at {} Hz", SPI_FREQUENCY_HZ);

    let seed = Rng::new(p.RNG, Irqs).next_u64();
    let gateway = Gateway::new(
        Transceiver::new(SpiRegisterBus::new(device)),
        Delay,
        WyRand::seed_from_u64(seed),
        LinkConfig::new(),
    )
    .with_observer(REPORTS.sender());
    let gateway: &'static HubGateway = GATEWAY.init(SharedGateway::new(gateway));

    while let Err(err) = gateway.start().await {
        error!("Radio start failed: {}", err);
        Timer::after(Duration::from_secs(1)).await;
    }

    let driver = Driver::new(p.USB, Irqs, p.PA12, p.PA11);
    let (usb_device, class) = cdc::init(driver, &UsbStrings::default());

    // Spawn background tasks
    spawner.must_spawn(heartbeat_task(led));
    spawner.must_spawn(cdc::usb_task(usb_device));
    spawner.must_spawn(cdc::usb_bridge_task(class, REPORTS.receiver()));
    spawner.must_spawn(tasks::command_task(gateway));
    spawner.must_spawn(tasks::receive_task(gateway));

    info!("Tasks spawned");
}

/// Heartbeat task - blinks LED to show system is running
#[embassy_executor::task]
async fn heartbeat_task(mut led: Output<'static>) {
    loop {
        led.set_high();
        Timer::after(Duration::from_millis(100)).await;
        led.set_low();
        Timer::after(Duration::from_millis(900)).await;
    }
}
