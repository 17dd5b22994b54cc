use embassy_net::Stack;
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use embassy_time::Timer;
use esp_mbedtls::Tls;
use heapless::Vec;
use log::{info, warn};
use static_cell::StaticCell;

use rockshield::config::CONFIG;
use rockshield::constants::*;
use rockshield::http::{self, Method, Request, Response};
use rockshield::inference::{self, Prediction};
use rockshield::readings::Readings;
use rockshield::retry::Backoff;
use rockshield::thingspeak::{self, Update};
use rockshield::url::Url;

use crate::cstr;
use crate::sensors::{SensorError, Sensors};
use crate::transport::Transport;

static CA_CHAIN: StaticCell<Vec<u8, TLS_BUFFER_MAX>> = StaticCell::new();
static RESPONSE_BUF: StaticCell<Mutex<NoopRawMutex, [u8; HTTP_RESPONSE_BUFFER_SIZE]>> =
    StaticCell::new();

#[derive(Debug)]
pub enum Error {
    Config,
    #[allow(dead_code)]
    Sensor(SensorError),
    Transport,
    #[allow(dead_code)]
    Http(http::Error),
    #[allow(dead_code)]
    Status(u16),
    #[allow(dead_code)]
    Inference(inference::Error),
    #[allow(dead_code)]
    ThingSpeak(thingspeak::Error),
}

/// One measurement cycle: sample the sensors, ask the ML server for a
/// prediction, then push everything to the ThingSpeak channel.
pub struct Uplink {
    stack: &'static Mutex<NoopRawMutex, Stack<'static>>,
    tls: &'static Tls<'static>,
    rx_buf: &'static Mutex<NoopRawMutex, [u8; RX_BUFFER_SIZE]>,
    tx_buf: &'static Mutex<NoopRawMutex, [u8; TX_BUFFER_SIZE]>,
    response_buf: &'static Mutex<NoopRawMutex, [u8; HTTP_RESPONSE_BUFFER_SIZE]>,
    ca_chain: Option<&'static [u8]>,
    ml_server: Url<'static>,
    thingspeak_server: Url<'static>,
    sensors: Sensors,
}

impl Uplink {
    pub fn new(
        stack: &'static Mutex<NoopRawMutex, Stack<'static>>,
        tls: &'static Tls<'static>,
        rx_buf: &'static Mutex<NoopRawMutex, [u8; RX_BUFFER_SIZE]>,
        tx_buf: &'static Mutex<NoopRawMutex, [u8; TX_BUFFER_SIZE]>,
        sensors: Sensors,
    ) -> Result<Self, Error> {
        let ml_server = Url::parse(CONFIG.ml_server).map_err(|_| Error::Config)?;
        let thingspeak_server = Url::parse(CONFIG.thingspeak_server).map_err(|_| Error::Config)?;

        let ca_chain = match CONFIG.tls_ca {
            Some(pem) => {
                let pem = cstr::pem_c_str_vec::<TLS_BUFFER_MAX>(pem).map_err(|e| {
                    log::error!("CA chain unusable: {:?}", e);
                    Error::Config
                })?;
                let pem: &'static Vec<u8, TLS_BUFFER_MAX> = CA_CHAIN.init(pem);
                Some(pem.as_slice())
            }
            None => None,
        };

        let response_buf = RESPONSE_BUF.init(Mutex::new([0; HTTP_RESPONSE_BUFFER_SIZE]));

        Ok(Self {
            stack,
            tls,
            rx_buf,
            tx_buf,
            response_buf,
            ca_chain,
            ml_server,
            thingspeak_server,
            sensors,
        })
    }

    pub async fn cycle(&mut self) -> Result<(), Error> {
        let readings = self.sensors.measure().await.map_err(Error::Sensor)?;
        log::debug!("Readings: {:?}", readings);

        // telemetry still goes out when the ML server is unreachable
        let prediction = match self.infer(&readings).await {
            Ok(prediction) => {
                info!(
                    "Prediction: {} (confidence {:?})",
                    prediction.label, prediction.confidence
                );
                Some(prediction)
            }
            Err(e) => {
                warn!("Inference failed: {:?}", e);
                None
            }
        };

        let update = Update::from_readings(&readings, prediction.as_ref());
        let body = thingspeak::encode_form(CONFIG.thingspeak_api_key, &update)
            .map_err(Error::ThingSpeak)?;

        let mut backoff = Backoff::new(UPLOAD_RETRY_BASE_MS, UPLOAD_RETRY_MAX_MS, UPLOAD_MAX_ATTEMPTS);
        loop {
            match self.upload(body.as_bytes()).await {
                Ok(entry_id) => {
                    info!("ThingSpeak entry {} created", entry_id);
                    return Ok(());
                }
                Err(e) => {
                    warn!("ThingSpeak upload attempt {} failed: {:?}", backoff.attempt(), e);
                    match backoff.next_delay_ms() {
                        Some(delay) => Timer::after_millis(delay).await,
                        None => return Err(e),
                    }
                }
            }
        }
    }

    async fn infer(&self, readings: &Readings) -> Result<Prediction, Error> {
        let payload =
            inference::encode_request(CONFIG.device_id, readings).map_err(Error::Inference)?;

        let mut response_buf = self.response_buf.lock().await;
        let response = self
            .post(
                &self.ml_server,
                inference::CONTENT_TYPE,
                payload.as_bytes(),
                &mut *response_buf,
            )
            .await?;
        if !response.is_success() {
            return Err(Error::Status(response.status));
        }
        inference::parse_response(response.body).map_err(Error::Inference)
    }

    async fn upload(&self, body: &[u8]) -> Result<u32, Error> {
        let mut response_buf = self.response_buf.lock().await;
        let response = self
            .post(
                &self.thingspeak_server,
                thingspeak::CONTENT_TYPE,
                body,
                &mut *response_buf,
            )
            .await?;
        if !response.is_success() {
            return Err(Error::Status(response.status));
        }
        thingspeak::parse_entry_id(response.body).map_err(Error::ThingSpeak)
    }

    async fn post<'r>(
        &self,
        url: &Url<'_>,
        content_type: &str,
        body: &[u8],
        response_buf: &'r mut [u8],
    ) -> Result<Response<'r>, Error> {
        let stack = *self.stack.lock().await;
        let mut rx_buf = self.rx_buf.lock().await;
        let mut tx_buf = self.tx_buf.lock().await;

        let mut servername_buf = [0u8; SERVERNAME_MAX];
        let servername =
            cstr::write_trimmed_c_str(url.host, &mut servername_buf).map_err(|_| Error::Config)?;

        let mut session = Transport::connect(
            stack,
            self.tls,
            &mut *rx_buf,
            &mut *tx_buf,
            url,
            servername,
            self.ca_chain,
        )
        .await
        .map_err(|e| {
            log::error!("Connecting to {} failed: {:?}", url.host, e);
            Error::Transport
        })?;

        let request = Request {
            method: Method::Post,
            url,
            content_type: Some(content_type),
            body,
        };
        http::send(&mut session, &request)
            .await
            .map_err(Error::Http)?;
        http::receive(&mut session, response_buf)
            .await
            .map_err(Error::Http)
    }
}
