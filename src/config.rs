use crate::thingspeak::MIN_UPDATE_INTERVAL_SECS;
use crate::url::Url;

/// Telemetry endpoint used when `cfg.toml` does not override it.
pub const DEFAULT_THINGSPEAK_SERVER: &str = "https://api.thingspeak.com/update";

/// Prefix shared by every template value in `cfg.toml.example`.
pub const PLACEHOLDER_PREFIX: &str = "YOUR_";

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Empty(&'static str),
    Placeholder(&'static str),
    InvalidUrl(&'static str),
    MissingCaCertificate(&'static str),
    IntervalTooShort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    // Device ID (used as DHCP hostname and sent with inference requests)
    pub device_id: &'static str,

    // Wi-Fi SSID to connect to
    pub wifi_ssid: &'static str,

    // Wi-Fi pre-shared key (password)
    pub wifi_psk: &'static str,

    // ML inference API endpoint
    pub ml_server: &'static str,

    // ThingSpeak update endpoint
    pub thingspeak_server: &'static str,

    // ThingSpeak channel Write API Key
    pub thingspeak_api_key: &'static str,

    // Measurement interval in seconds
    pub measurement_interval_seconds: u16,

    // TLS CA certificate chain, required for https:// endpoints
    pub tls_ca: Option<&'static str>,
}

impl Config {
    /// The template values shipped in `cfg.toml.example`.
    pub const PLACEHOLDER: Config = Config {
        device_id: "rockshield-01",
        wifi_ssid: "YOUR_SSID",
        wifi_psk: "YOUR_PASSWORD",
        ml_server: "YOUR_API_ENDPOINT",
        thingspeak_server: DEFAULT_THINGSPEAK_SERVER,
        thingspeak_api_key: "YOUR_API_KEY",
        measurement_interval_seconds: 60,
        tls_ca: None,
    };

    pub fn is_placeholder(value: &str) -> bool {
        value.starts_with(PLACEHOLDER_PREFIX)
    }

    /// Checks the record is usable before any network work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("device_id", self.device_id),
            ("wifi_ssid", self.wifi_ssid),
            ("wifi_psk", self.wifi_psk),
            ("ml_server", self.ml_server),
            ("thingspeak_server", self.thingspeak_server),
            ("thingspeak_api_key", self.thingspeak_api_key),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(name));
            }
            if Self::is_placeholder(value) {
                return Err(ConfigError::Placeholder(name));
            }
        }

        if u64::from(self.measurement_interval_seconds) < MIN_UPDATE_INTERVAL_SECS {
            return Err(ConfigError::IntervalTooShort);
        }

        for (name, value) in [
            ("ml_server", self.ml_server),
            ("thingspeak_server", self.thingspeak_server),
        ] {
            let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl(name))?;
            if url.is_tls() && self.tls_ca.map_or(true, |ca| ca.trim().is_empty()) {
                return Err(ConfigError::MissingCaCertificate(name));
            }
        }

        Ok(())
    }
}

// config values are generated at compile time
include!(concat!(env!("OUT_DIR"), "/config.rs"));
