use bme280_rs::{AsyncBme280, Oversampling, SensorMode};
use embassy_time::Delay;
use log::info;

use rockshield::readings::{Quantity, Readings};

use super::{Sensor, SensorError};

pub struct Bme280<I2C> {
    sensor: AsyncBme280<I2C, Delay>,
}

impl<I2C: embedded_hal_async::i2c::I2c> Bme280<I2C> {
    pub async fn new(i2c: I2C) -> Result<Self, SensorError> {
        info!("Initialising BME280...");
        let mut sensor = AsyncBme280::new(i2c, Delay);
        sensor.init().await.map_err(|_| SensorError::InitFailure)?;

        sensor
            .set_sampling_configuration(
                bme280_rs::Configuration::default()
                    .with_temperature_oversampling(Oversampling::Oversample1)
                    .with_pressure_oversampling(Oversampling::Oversample1)
                    .with_humidity_oversampling(Oversampling::Oversample1)
                    .with_sensor_mode(SensorMode::Normal),
            )
            .await
            .map_err(|_| SensorError::InitFailure)?;

        info!("Initialised BME280");

        Ok(Self { sensor })
    }
}

impl<I2C: embedded_hal_async::i2c::I2c> Sensor for Bme280<I2C> {
    const NAME: &'static str = "BME280";

    async fn measure(&mut self, readings: &mut Readings) -> Result<(), SensorError> {
        let sample = self
            .sensor
            .read_sample()
            .await
            .map_err(|_| SensorError::MeasurementFailure)?;

        // pressure comes back in Pa, ThingSpeak charts hPa
        for (quantity, value) in [
            (Quantity::Temperature, sample.temperature),
            (Quantity::Humidity, sample.humidity),
            (Quantity::Pressure, sample.pressure.map(|pa| pa / 100.0)),
        ] {
            readings.add(quantity, value.ok_or(SensorError::NoData)?);
        }
        Ok(())
    }
}
