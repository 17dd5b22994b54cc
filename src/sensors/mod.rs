#![allow(async_fn_in_trait)]

use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use log::{info, warn};

use esp_hal::{i2c::master::I2c, uart::Uart, Async};

use rockshield::readings::Readings;

pub mod bme280;
pub mod scd30;
pub mod sds011;

use bme280::Bme280;
use scd30::Scd30;
use sds011::Sds011;

pub type SharedI2c = I2cDevice<'static, NoopRawMutex, I2c<'static, Async>>;
pub type I2cBus = Mutex<NoopRawMutex, I2c<'static, Async>>;

#[derive(Debug)]
pub enum SensorError {
    InitFailure,
    MeasurementFailure,
    NoData,
    NoSensors,
}

pub trait Sensor {
    const NAME: &'static str;

    async fn measure(&mut self, readings: &mut Readings) -> Result<(), SensorError>;
}

/// The sensors enabled through cargo features and found at boot.
#[derive(Default)]
pub struct Sensors {
    bme280: Option<Bme280<SharedI2c>>,
    scd30: Option<Scd30<SharedI2c>>,
    sds011: Option<Sds011<Uart<'static, Async>>>,
}

impl Sensors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        usize::from(self.bme280.is_some())
            + usize::from(self.scd30.is_some())
            + usize::from(self.sds011.is_some())
    }

    pub async fn add_bme280(&mut self, bus: &'static I2cBus) -> Result<(), SensorError> {
        self.bme280 = Some(Bme280::new(I2cDevice::new(bus)).await?);
        Ok(())
    }

    pub async fn add_scd30(&mut self, bus: &'static I2cBus, interval_seconds: u16) -> Result<(), SensorError> {
        self.scd30 = Some(Scd30::new(I2cDevice::new(bus), interval_seconds).await?);
        Ok(())
    }

    pub async fn add_sds011(&mut self, uart: Uart<'static, Async>) -> Result<(), SensorError> {
        self.sds011 = Some(Sds011::new(uart).await?);
        Ok(())
    }

    /// Samples every attached sensor. A failing sensor is skipped so the
    /// others still get uploaded; only an empty result is an error.
    pub async fn measure(&mut self) -> Result<Readings, SensorError> {
        if self.count() == 0 {
            return Err(SensorError::NoSensors);
        }

        let mut readings = Readings::new();
        if let Some(sensor) = self.bme280.as_mut() {
            sample(sensor, &mut readings).await;
        }
        if let Some(sensor) = self.scd30.as_mut() {
            sample(sensor, &mut readings).await;
        }
        if let Some(sensor) = self.sds011.as_mut() {
            sample(sensor, &mut readings).await;
        }

        if readings.is_empty() {
            return Err(SensorError::NoData);
        }
        info!("Collected {} readings", readings.len());
        Ok(readings)
    }
}

async fn sample<S: Sensor>(sensor: &mut S, readings: &mut Readings) {
    if let Err(e) = sensor.measure(readings).await {
        warn!("{} measurement failed: {:?}", S::NAME, e);
    }
}
