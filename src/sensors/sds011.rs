use embedded_io_async::{Read, Write};
use log::{info, warn};
use sds011_nostd_rs::{
    Config as Sds011Config, DeviceID as Sds011DeviceID, DeviceMode as Sds011DeviceMode,
    Sds011 as Sds011Sensor,
};

use rockshield::readings::{Quantity, Readings};

use super::{Sensor, SensorError};

pub struct Sds011<S> {
    sensor: Sds011Sensor<S>,
}

impl<S: Read + Write> Sds011<S> {
    pub async fn new(serial: S) -> Result<Self, SensorError> {
        info!("Initialising SDS011...");
        let mut sensor = Sds011Sensor::new(
            serial,
            Sds011Config {
                id: Sds011DeviceID {
                    id1: 0xFF,
                    id2: 0xFF,
                },
                mode: Sds011DeviceMode::Active,
            },
        );

        // the sensor streams in active mode even when the init handshake is missed
        if sensor.init().await.is_err() {
            warn!("SDS011 did not acknowledge init, continuing in active mode");
        }

        info!("Initialised SDS011");

        Ok(Self { sensor })
    }
}

impl<S: Read + Write> Sensor for Sds011<S> {
    const NAME: &'static str = "SDS011";

    async fn measure(&mut self, readings: &mut Readings) -> Result<(), SensorError> {
        let sample = self
            .sensor
            .read_sample()
            .await
            .map_err(|_| SensorError::MeasurementFailure)?;
        readings.add(Quantity::Pm2_5, sample.pm2_5);
        readings.add(Quantity::Pm10, sample.pm10);
        Ok(())
    }
}
