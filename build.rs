use std::{env, error::Error, fs, path::Path};

use serde::Deserialize;

const CONFIG_FILE: &str = "cfg.toml";
const TEMPLATE_FILE: &str = "cfg.toml.example";

#[derive(Deserialize)]
struct RawConfig {
    wifi_ssid: String,
    wifi_psk: String,
    device_id: String,
    ml_server: String,
    thingspeak_server: Option<String>,
    thingspeak_api_key: String,
    measurement_interval_seconds: u16,
    tls_ca: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed={CONFIG_FILE}");
    println!("cargo:rerun-if-changed={TEMPLATE_FILE}");

    let source = if Path::new(CONFIG_FILE).exists() {
        CONFIG_FILE
    } else {
        println!("cargo:warning={CONFIG_FILE} not found, building with {TEMPLATE_FILE} placeholders");
        TEMPLATE_FILE
    };

    let toml_str = fs::read_to_string(source)?;
    let raw: RawConfig = toml::from_str(&toml_str)?;

    for (name, value) in [
        ("wifi_ssid", &raw.wifi_ssid),
        ("wifi_psk", &raw.wifi_psk),
        ("ml_server", &raw.ml_server),
        ("thingspeak_api_key", &raw.thingspeak_api_key),
    ] {
        if value.is_empty() || value.starts_with("YOUR_") {
            println!("cargo:warning={name} is not set in {source}, the device will not go online");
        }
    }

    // the generated code is included by src/config.rs, where the default lives
    let thingspeak_server = match &raw.thingspeak_server {
        Some(url) => format!("{url:?}"),
        None => "DEFAULT_THINGSPEAK_SERVER".to_string(),
    };

    let code = format!(
        r#"
        pub const CONFIG: Config = Config {{
            device_id: {device_id:?},
            wifi_ssid: {ssid:?},
            wifi_psk: {psk:?},
            ml_server: {ml:?},
            thingspeak_server: {ts},
            thingspeak_api_key: {key:?},
            measurement_interval_seconds: {intv},
            tls_ca: {ca:?},
        }};
    "#,
        device_id = raw.device_id,
        ssid = raw.wifi_ssid,
        psk = raw.wifi_psk,
        ml = raw.ml_server,
        ts = thingspeak_server,
        key = raw.thingspeak_api_key,
        intv = raw.measurement_interval_seconds,
        ca = raw.tls_ca,
    );

    let out_dir = env::var("OUT_DIR")?;
    let dest_path = Path::new(&out_dir).join("config.rs");
    fs::write(dest_path, code)?;
    Ok(())
}
