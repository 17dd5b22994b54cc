#![cfg_attr(target_arch = "xtensa", no_std)]
#![cfg_attr(target_arch = "xtensa", no_main)]

#[cfg(target_arch = "xtensa")]
mod cstr;
#[cfg(target_arch = "xtensa")]
mod sensors;
#[cfg(target_arch = "xtensa")]
mod transport;
#[cfg(target_arch = "xtensa")]
mod uplink;
#[cfg(target_arch = "xtensa")]
mod wifi;

#[cfg(target_arch = "xtensa")]
use prelude::*;

#[cfg(target_arch = "xtensa")]
mod prelude {
    pub use embassy_executor::Spawner;
    pub use embassy_net::Stack;
    pub use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
    pub use embassy_time::{Duration, Timer};

    pub use esp_alloc as _;
    pub use esp_backtrace as _;
    pub use esp_hal::{self as hal};
    pub use esp_mbedtls::Tls;
    pub use esp_println::logger::init_logger;

    pub use hal::{
        i2c::master::{BusTimeout, I2c},
        rng::Rng,
        time::Rate,
        timer::timg::TimerGroup,
        uart::{RxConfig, Uart},
    };

    pub use static_cell::StaticCell;

    pub use rockshield::config::CONFIG;
    pub use rockshield::constants::*;

    pub use crate::sensors::{I2cBus, Sensors};
    pub use crate::uplink::Uplink;
    pub use crate::wifi::Wifi;
}

#[cfg(target_arch = "xtensa")]
esp_bootloader_esp_idf::esp_app_desc!();

#[cfg(target_arch = "xtensa")]
static I2C_BUS: StaticCell<I2cBus> = StaticCell::new();
#[cfg(target_arch = "xtensa")]
static TLS: StaticCell<Tls<'static>> = StaticCell::new();
#[cfg(target_arch = "xtensa")]
static STACK: StaticCell<Mutex<NoopRawMutex, Stack<'static>>> = StaticCell::new();
#[cfg(target_arch = "xtensa")]
static RX_BUF: StaticCell<Mutex<NoopRawMutex, [u8; RX_BUFFER_SIZE]>> = StaticCell::new();
#[cfg(target_arch = "xtensa")]
static TX_BUF: StaticCell<Mutex<NoopRawMutex, [u8; TX_BUFFER_SIZE]>> = StaticCell::new();

#[cfg(target_arch = "xtensa")]
#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    init_logger(log::LevelFilter::Info);
    log::info!("RockShield firmware v{} ({})", VERSION, CONFIG.device_id);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: HEAP_DRAM_SIZE);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let timg1 = TimerGroup::new(peripherals.TIMG1);

    esp_hal_embassy::init(timg0.timer0);

    // nothing network-facing starts until cfg.toml is filled in
    if let Err(e) = CONFIG.validate() {
        log::error!("Configuration invalid: {:?}. Edit cfg.toml and reflash.", e);
        loop {
            Timer::after(Duration::from_secs(3600)).await;
        }
    }

    // possibly high transient required at init
    // https://github.com/esp-rs/esp-hal/issues/1626
    Timer::after(Duration::from_millis(1000)).await;

    let mut sensors = Sensors::new();

    if cfg!(feature = "bme280") || cfg!(feature = "scd30") {
        let (sda, scl) = (peripherals.GPIO21, peripherals.GPIO22);

        let i2c_config = hal::i2c::master::Config::default()
            .with_frequency(Rate::from_khz(100))
            .with_timeout(BusTimeout::BusCycles(24));

        match I2c::new(peripherals.I2C0, i2c_config) {
            Ok(i2c) => {
                let i2c = i2c.with_sda(sda).with_scl(scl).into_async();
                let i2c_bus = I2C_BUS.init(Mutex::new(i2c));

                if cfg!(feature = "bme280") {
                    if let Err(e) = sensors.add_bme280(i2c_bus).await {
                        log::error!("BME280 unavailable: {:?}", e);
                    }
                }

                if cfg!(feature = "scd30") {
                    if let Err(e) = sensors
                        .add_scd30(i2c_bus, CONFIG.measurement_interval_seconds)
                        .await
                    {
                        log::error!("SCD30 unavailable: {:?}", e);
                    }
                }
            }
            Err(e) => log::error!("I2C bus setup failed: {:?}", e),
        }
    }

    if cfg!(feature = "sds011") {
        let (tx, rx) = (peripherals.GPIO17, peripherals.GPIO16);

        let uart_config = hal::uart::Config::default()
            .with_rx(RxConfig::default().with_fifo_full_threshold(UART_READ_BUFFER_SIZE as u16))
            .with_baudrate(9600)
            .with_stop_bits(hal::uart::StopBits::_1)
            .with_data_bits(hal::uart::DataBits::_8)
            .with_parity(hal::uart::Parity::None);

        match Uart::new(peripherals.UART2, uart_config) {
            Ok(uart) => {
                let mut uart = uart.with_tx(tx).with_rx(rx).into_async();
                uart.set_at_cmd(hal::uart::AtCmdConfig::default().with_cmd_char(UART_AT_CMD));
                if let Err(e) = sensors.add_sds011(uart).await {
                    log::error!("SDS011 unavailable: {:?}", e);
                }
            }
            Err(e) => log::error!("UART setup failed: {:?}", e),
        }
    }

    log::info!("{} sensor(s) online", sensors.count());

    let rng = Rng::new(peripherals.RNG);
    let wifi = match Wifi::new(
        peripherals.WIFI,
        timg1.timer0,
        peripherals.RADIO_CLK,
        rng,
        spawner,
    )
    .await
    {
        Ok(wifi) => wifi,
        Err(e) => {
            log::error!("WiFi init failed: {:?}, restarting", e);
            Timer::after(Duration::from_secs(5)).await;
            restart();
        }
    };

    wifi.wait_online().await;

    let mut tls = match Tls::new(peripherals.SHA) {
        Ok(tls) => tls.with_hardware_rsa(peripherals.RSA),
        Err(e) => {
            log::error!("TLS init failed: {:?}, restarting", e);
            restart();
        }
    };

    tls.set_debug(0);

    let tls_shared = TLS.init(tls);

    let stack_shared = STACK.init(Mutex::new(wifi.stack));
    let rx_buf = RX_BUF.init(Mutex::new([0; RX_BUFFER_SIZE]));
    let tx_buf = TX_BUF.init(Mutex::new([0; TX_BUFFER_SIZE]));

    let uplink = match Uplink::new(stack_shared, tls_shared, rx_buf, tx_buf, sensors) {
        Ok(uplink) => uplink,
        Err(e) => {
            log::error!("Uplink setup failed: {:?}", e);
            return;
        }
    };

    spawner.spawn(main_task(uplink)).ok();
}

#[cfg(target_arch = "xtensa")]
#[embassy_executor::task]
async fn main_task(mut uplink: Uplink) {
    loop {
        if let Err(e) = uplink.cycle().await {
            log::error!("Measurement cycle failed: {:?}", e);
        }

        Timer::after(Duration::from_secs(
            CONFIG.measurement_interval_seconds.into(),
        ))
        .await;
    }
}

#[cfg(target_arch = "xtensa")]
fn restart() -> ! {
    esp_hal::system::software_reset();
    #[allow(unreachable_code)]
    loop {}
}

/// Off-target the binary only checks the compiled-in configuration.
#[cfg(not(target_arch = "xtensa"))]
fn main() -> std::process::ExitCode {
    use rockshield::config::{Config, CONFIG};

    fn redact(value: &str) -> &str {
        if Config::is_placeholder(value) {
            value
        } else {
            "********"
        }
    }

    println!("rockshield {}", rockshield::constants::VERSION);
    println!("  device_id           {}", CONFIG.device_id);
    println!("  wifi_ssid           {}", CONFIG.wifi_ssid);
    println!("  wifi_psk            {}", redact(CONFIG.wifi_psk));
    println!("  ml_server           {}", CONFIG.ml_server);
    println!("  thingspeak_server   {}", CONFIG.thingspeak_server);
    println!("  thingspeak_api_key  {}", redact(CONFIG.thingspeak_api_key));
    println!("  interval            {}s", CONFIG.measurement_interval_seconds);
    println!(
        "  tls_ca              {}",
        if CONFIG.tls_ca.is_some() { "set" } else { "none" }
    );

    match CONFIG.validate() {
        Ok(()) => {
            println!("configuration OK, build for xtensa-esp32-none-elf to flash");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("configuration invalid: {:?}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
