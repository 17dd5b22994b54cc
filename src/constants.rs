/// Current firmware version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent sent with every HTTP request
pub const USER_AGENT: &str = concat!("rockshield/", env!("CARGO_PKG_VERSION"));

/// Size of the heap in DRAM (internal memory), mbedTLS allocates from it
pub const HEAP_DRAM_SIZE: usize = 72 * 1024;

/// Size of the TCP socket receive buffer for encrypted data
pub const RX_BUFFER_SIZE: usize = 4096;
/// Size of the TCP socket transmit buffer for encrypted data
pub const TX_BUFFER_SIZE: usize = 4096;

/// Maximum size for a PEM certificate chain including the NUL terminator
pub const TLS_BUFFER_MAX: usize = 4096;
/// Maximum server name length passed to mbedTLS, NUL included
pub const SERVERNAME_MAX: usize = 128;

/// Maximum size of an outgoing HTTP request head
pub const HTTP_HEAD_MAX: usize = 512;
/// Buffer for a whole HTTP response (head and body)
pub const HTTP_RESPONSE_BUFFER_SIZE: usize = 2048;

/// Maximum size of the JSON body sent to the inference server
pub const INFERENCE_PAYLOAD_MAX: usize = 512;
/// Maximum length of a prediction label kept from the inference response
pub const PREDICTION_LABEL_MAX: usize = 64;

/// Maximum size of a ThingSpeak form-encoded update
pub const THINGSPEAK_PAYLOAD_MAX: usize = 512;

/// TCP socket timeout for HTTP exchanges
pub const SOCKET_TIMEOUT_SECS: u64 = 30;

/// Buffer size for UART read operations (for SDS011 sensor)
pub const UART_READ_BUFFER_SIZE: usize = 64;
/// AT command character for UART configuration
pub const UART_AT_CMD: u8 = 0xAB;

/// Upper bound for a single WiFi association attempt
pub const WIFI_CONNECT_TIMEOUT_SECS: u64 = 30;
/// Delay before retrying after a WiFi disconnect or failed attempt
pub const WIFI_RECONNECT_DELAY_MS: u64 = 5000;

/// Telemetry upload attempts per measurement cycle
pub const UPLOAD_MAX_ATTEMPTS: u8 = 3;
/// First retry delay, matches ThingSpeak's free-tier update spacing
pub const UPLOAD_RETRY_BASE_MS: u64 = 15_000;
/// Cap on the retry delay
pub const UPLOAD_RETRY_MAX_MS: u64 = 60_000;
