use embassy_time::{Delay, Duration, Instant, Timer};
use embedded_hal_async::i2c::I2c;
use libscd::asynchronous::scd30::Scd30 as Scd30Sensor;
use log::{error, info};

use rockshield::readings::{Quantity, Readings};

use super::{Sensor, SensorError};

/// Sea-level pressure in mbar used for on-sensor CO2 compensation
const AMBIENT_PRESSURE: u16 = 1013;
/// Maximum number of retries for SCD30 initialization
const MAX_INIT_RETRIES: u8 = 5;
/// Maximum time to wait for sensor data to be ready (in milliseconds)
const DATA_READY_TIMEOUT_MS: u64 = 30_000;
/// Valid range of the on-sensor measurement interval
const INTERVAL_RANGE: core::ops::RangeInclusive<u16> = 2..=1800;

pub struct Scd30<I2C> {
    sensor: Scd30Sensor<I2C, Delay>,
}

impl<I2C: I2c> Scd30<I2C> {
    pub async fn new(i2c: I2C, interval_seconds: u16) -> Result<Self, SensorError> {
        info!("Initialising SCD30...");
        let mut sensor = Scd30Sensor::new(i2c, Delay);

        Timer::after(Duration::from_millis(1000)).await;

        let mut retries = 0;
        while let Err(e) = sensor.stop_continuous_measurement().await {
            retries += 1;
            if retries >= MAX_INIT_RETRIES {
                error!(
                    "SCD30: failed to stop continuous measurement after {} retries: {:?}",
                    MAX_INIT_RETRIES, e
                );
                return Err(SensorError::InitFailure);
            }
            info!("SCD30 not ready ({:?}), retry {}/{}", e, retries, MAX_INIT_RETRIES);
            Timer::after(Duration::from_millis(5000)).await;
        }

        Timer::after(Duration::from_millis(1000)).await;
        let interval = interval_seconds.clamp(*INTERVAL_RANGE.start(), *INTERVAL_RANGE.end());
        sensor.set_measurement_interval(interval).await.map_err(|e| {
            error!("SCD30: failed to set measurement interval: {:?}", e);
            SensorError::InitFailure
        })?;

        Timer::after(Duration::from_millis(100)).await;
        sensor
            .start_continuous_measurement(AMBIENT_PRESSURE)
            .await
            .map_err(|e| {
                error!("SCD30: failed to start continuous measurement: {:?}", e);
                SensorError::InitFailure
            })?;

        info!("Initialised SCD30");

        Ok(Self { sensor })
    }
}

impl<I2C: I2c> Sensor for Scd30<I2C> {
    const NAME: &'static str = "SCD30";

    async fn measure(&mut self, readings: &mut Readings) -> Result<(), SensorError> {
        let start = Instant::now();
        let timeout = Duration::from_millis(DATA_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                error!("SCD30: no data after {}ms", DATA_READY_TIMEOUT_MS);
                return Err(SensorError::MeasurementFailure);
            }

            match self.sensor.data_ready().await {
                Ok(true) => break,
                Ok(false) => Timer::after(Duration::from_millis(100)).await,
                Err(e) => {
                    error!("SCD30: error checking data ready: {:?}", e);
                    return Err(SensorError::MeasurementFailure);
                }
            }
        }

        let sample = self.sensor.read_measurement().await.map_err(|e| {
            error!("SCD30: error reading measurement: {:?}", e);
            SensorError::MeasurementFailure
        })?;

        readings.add(Quantity::Temperature, sample.temperature);
        readings.add(Quantity::Humidity, sample.humidity);
        readings.add(Quantity::Co2, sample.co2 as f32);
        Ok(())
    }
}
