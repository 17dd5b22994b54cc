use core::ffi::CStr;

use embassy_net::{
    dns::{DnsQueryType, Error as DNSError},
    tcp::{ConnectError, Error as TcpError, TcpSocket},
    Stack,
};
use embassy_time::Duration;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use esp_mbedtls::{asynch::Session, Certificates, Mode, Tls, TlsError, TlsVersion, X509};

use rockshield::constants::SOCKET_TIMEOUT_SECS;
use rockshield::url::Url;

#[derive(Debug)]
pub enum Error {
    CACertificateMissing,
    #[allow(dead_code)]
    DNSQueryFailed(DNSError),
    DNSLookupFailed,
    #[allow(dead_code)]
    SocketConnectionError(ConnectError),
    PEMParseError,
    #[allow(dead_code)]
    TLSSessionFailed(TlsError),
    #[allow(dead_code)]
    TLSHandshakeFailed(TlsError),
}

/// Read/write failure on an open transport.
#[derive(Debug)]
pub enum IoError {
    #[allow(dead_code)]
    Tcp(TcpError),
    #[allow(dead_code)]
    Tls(TlsError),
}

impl embedded_io_async::Error for IoError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Byte stream to one server, plain TCP for `http://` URLs and an mbedTLS
/// session for `https://` ones.
pub enum Transport<'a> {
    Plain(TcpSocket<'a>),
    Tls(Session<'a, TcpSocket<'a>>),
}

impl<'a> Transport<'a> {
    #[allow(clippy::too_many_arguments)]
    pub async fn connect(
        stack: Stack<'static>,
        tls: &'a Tls<'static>,
        rx_buffer: &'a mut [u8],
        tx_buffer: &'a mut [u8],
        url: &Url<'_>,
        servername: &'a CStr,
        ca_chain: Option<&'a [u8]>,
    ) -> Result<Self, Error> {
        let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));

        let addr = stack
            .dns_query(url.host, DnsQueryType::A)
            .await
            .map_err(Error::DNSQueryFailed)?
            .first()
            .copied()
            .ok_or(Error::DNSLookupFailed)?;

        log::info!("Connecting TCP socket to {}:{}", url.host, url.port);
        socket
            .connect((addr, url.port))
            .await
            .map_err(Error::SocketConnectionError)?;
        log::debug!("TCP connected");

        if !url.is_tls() {
            return Ok(Self::Plain(socket));
        }

        let ca_chain = ca_chain.ok_or(Error::CACertificateMissing)?;
        let certificates = Certificates {
            ca_chain: Some(X509::pem(ca_chain).map_err(|_| Error::PEMParseError)?),
            ..Default::default()
        };

        let mut session = Session::new(
            socket,
            Mode::Client { servername },
            TlsVersion::Tls1_2,
            certificates,
            tls.reference(),
        )
        .map_err(Error::TLSSessionFailed)?;

        log::info!("Starting TLS handshake with {}", url.host);
        session.connect().await.map_err(|e| {
            log::error!("TLS handshake with {} failed: {:?}", url.host, e);
            Error::TLSHandshakeFailed(e)
        })?;
        log::debug!("TLS handshake complete");

        Ok(Self::Tls(session))
    }
}

impl ErrorType for Transport<'_> {
    type Error = IoError;
}

impl Read for Transport<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        match self {
            Self::Plain(socket) => socket.read(buf).await.map_err(IoError::Tcp),
            Self::Tls(session) => session.read(buf).await.map_err(IoError::Tls),
        }
    }
}

impl Write for Transport<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        match self {
            Self::Plain(socket) => socket.write(buf).await.map_err(IoError::Tcp),
            Self::Tls(session) => session.write(buf).await.map_err(IoError::Tls),
        }
    }

    async fn flush(&mut self) -> Result<(), IoError> {
        match self {
            Self::Plain(socket) => socket.flush().await.map_err(IoError::Tcp),
            Self::Tls(session) => session.flush().await.map_err(IoError::Tls),
        }
    }
}
