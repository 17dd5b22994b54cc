//! Minimal HTTP/1.1 client for one request per connection.
//!
//! Requests always carry `Connection: close`, so a response without
//! `Content-Length` or chunked encoding is read until the peer closes.

use core::fmt::Write as _;

use embedded_io_async::{Read, Write};
use heapless::String;

use crate::constants::{HTTP_HEAD_MAX, USER_AGENT};
use crate::url::Url;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Io,
    BufferFull,
    MalformedResponse,
    UnexpectedEof,
    RequestTooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

pub struct Request<'a> {
    pub method: Method,
    pub url: &'a Url<'a>,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Debug)]
pub struct Response<'b> {
    pub status: u16,
    pub body: &'b [u8],
}

impl Response<'_> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

enum BodyLength {
    Fixed(usize),
    Chunked,
    UntilClose,
}

pub async fn send<S: Write>(session: &mut S, request: &Request<'_>) -> Result<(), Error> {
    let mut head: String<HTTP_HEAD_MAX> = String::new();
    write!(
        head,
        "{} {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\n",
        request.method.as_str(),
        request.url.target(),
        request.url.authority(),
        USER_AGENT
    )
    .map_err(|_| Error::RequestTooLarge)?;
    if let Some(content_type) = request.content_type {
        write!(head, "Content-Type: {}\r\n", content_type).map_err(|_| Error::RequestTooLarge)?;
    }
    if request.method == Method::Post || !request.body.is_empty() {
        write!(head, "Content-Length: {}\r\n", request.body.len())
            .map_err(|_| Error::RequestTooLarge)?;
    }
    head.push_str("Connection: close\r\n\r\n")
        .map_err(|_| Error::RequestTooLarge)?;

    session
        .write_all(head.as_bytes())
        .await
        .map_err(|_| Error::Io)?;
    if !request.body.is_empty() {
        session
            .write_all(request.body)
            .await
            .map_err(|_| Error::Io)?;
    }
    session.flush().await.map_err(|_| Error::Io)
}

/// Reads one response into `buf` and returns the decoded body as a slice
/// of it.
pub async fn receive<'b, S: Read>(session: &mut S, buf: &'b mut [u8]) -> Result<Response<'b>, Error> {
    let mut total_read = 0;

    // Read until the end of the headers
    let body_start = loop {
        if let Some(pos) = find_header_end(&buf[..total_read]) {
            break pos;
        }
        if total_read == buf.len() {
            return Err(Error::BufferFull);
        }
        let n = session
            .read(&mut buf[total_read..])
            .await
            .map_err(|_| Error::Io)?;
        if n == 0 {
            return Err(Error::UnexpectedEof);
        }
        total_read += n;
    };

    let head = core::str::from_utf8(&buf[..body_start]).map_err(|_| Error::MalformedResponse)?;
    let (status, length) = parse_head(head)?;
    log::debug!("HTTP status {}", status);

    let body_end = match length {
        BodyLength::Fixed(len) => {
            let end = body_start.checked_add(len).ok_or(Error::BufferFull)?;
            if end > buf.len() {
                return Err(Error::BufferFull);
            }
            read_until(session, buf, &mut total_read, end).await?;
            end
        }
        BodyLength::UntilClose => {
            read_to_close(session, buf, &mut total_read).await?;
            total_read
        }
        BodyLength::Chunked => {
            read_chunked(session, buf, &mut total_read, body_start).await?
        }
    };

    Ok(Response {
        status,
        body: &buf[body_start..body_end],
    })
}

fn parse_head(head: &str) -> Result<(u16, BodyLength), Error> {
    let mut lines = head.split("\r\n");
    let status_line = lines.next().ok_or(Error::MalformedResponse)?;

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().ok_or(Error::MalformedResponse)?;
    if !version.starts_with("HTTP/1.") {
        return Err(Error::MalformedResponse);
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(Error::MalformedResponse)?;

    let mut length = BodyLength::UntilClose;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("transfer-encoding") && value.eq_ignore_ascii_case("chunked") {
            length = BodyLength::Chunked;
        } else if name.eq_ignore_ascii_case("content-length") && !matches!(length, BodyLength::Chunked) {
            let len = value.parse::<usize>().map_err(|_| Error::MalformedResponse)?;
            length = BodyLength::Fixed(len);
        }
    }

    // 1xx, 204 and 304 never carry a body
    if status < 200 || status == 204 || status == 304 {
        length = BodyLength::Fixed(0);
    }

    Ok((status, length))
}

async fn read_until<S: Read>(
    session: &mut S,
    buf: &mut [u8],
    total_read: &mut usize,
    end: usize,
) -> Result<(), Error> {
    while *total_read < end {
        let n = session
            .read(&mut buf[*total_read..end])
            .await
            .map_err(|_| Error::Io)?;
        if n == 0 {
            return Err(Error::UnexpectedEof);
        }
        *total_read += n;
    }
    Ok(())
}

async fn read_to_close<S: Read>(session: &mut S, buf: &mut [u8], total_read: &mut usize) -> Result<(), Error> {
    loop {
        if *total_read == buf.len() {
            return Err(Error::BufferFull);
        }
        let n = session
            .read(&mut buf[*total_read..])
            .await
            .map_err(|_| Error::Io)?;
        if n == 0 {
            return Ok(());
        }
        *total_read += n;
    }
}

/// Decodes a chunked body in place. Returns the end of the decoded body.
async fn read_chunked<S: Read>(
    session: &mut S,
    buf: &mut [u8],
    total_read: &mut usize,
    body_start: usize,
) -> Result<usize, Error> {
    // `write` trails `read` as chunk framing is stripped
    let mut write = body_start;
    let mut read = body_start;

    loop {
        let line_end = loop {
            if let Some(pos) = find_crlf(&buf[read..*total_read]) {
                break read + pos;
            }
            fill(session, buf, total_read).await?;
        };

        let size_field = core::str::from_utf8(&buf[read..line_end]).map_err(|_| Error::MalformedResponse)?;
        // chunk extensions follow a ';'
        let size_field = size_field.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_field, 16).map_err(|_| Error::MalformedResponse)?;
        read = line_end + 2;

        if size == 0 {
            // trailers are not used by the servers we talk to
            return Ok(write);
        }

        let chunk_end = read.checked_add(size).ok_or(Error::BufferFull)?;
        while *total_read < chunk_end + 2 {
            fill(session, buf, total_read).await?;
        }
        if &buf[chunk_end..chunk_end + 2] != b"\r\n" {
            return Err(Error::MalformedResponse);
        }

        buf.copy_within(read..chunk_end, write);
        write += size;
        read = chunk_end + 2;
    }
}

async fn fill<S: Read>(session: &mut S, buf: &mut [u8], total_read: &mut usize) -> Result<(), Error> {
    if *total_read == buf.len() {
        return Err(Error::BufferFull);
    }
    let n = session
        .read(&mut buf[*total_read..])
        .await
        .map_err(|_| Error::Io)?;
    if n == 0 {
        return Err(Error::UnexpectedEof);
    }
    *total_read += n;
    Ok(())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == b"\r\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use embedded_io_async::ErrorType;

    /// In-memory session that hands out its input a few bytes at a time
    /// and records everything written to it.
    pub(crate) struct MockSession {
        input: Vec<u8>,
        pos: usize,
        step: usize,
        pub(crate) output: Vec<u8>,
    }

    impl MockSession {
        pub(crate) fn new(input: &[u8], step: usize) -> Self {
            Self {
                input: input.to_vec(),
                pos: 0,
                step,
                output: Vec::new(),
            }
        }
    }

    impl ErrorType for MockSession {
        type Error = Infallible;
    }

    impl Read for MockSession {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
            let n = buf.len().min(self.step).min(self.input.len() - self.pos);
            buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for MockSession {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    #[test]
    fn post_request_is_well_formed() {
        let mut session = MockSession::new(b"", 16);
        let url = Url::parse("https://api.thingspeak.com/update").unwrap();
        let request = Request {
            method: Method::Post,
            url: &url,
            content_type: Some("application/x-www-form-urlencoded"),
            body: b"api_key=KEY&field1=1.00",
        };
        block_on(send(&mut session, &request)).unwrap();

        let text = core::str::from_utf8(&session.output).unwrap();
        assert!(text.starts_with("POST /update HTTP/1.1\r\nHost: api.thingspeak.com\r\n"));
        assert!(text.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
        assert!(text.contains("Content-Length: 23\r\n"));
        assert!(text.contains("Connection: close\r\n\r\napi_key=KEY&field1=1.00"));
    }

    #[test]
    fn get_request_has_no_body_headers() {
        let mut session = MockSession::new(b"", 16);
        let url = Url::parse("http://ml.local/health").unwrap();
        let request = Request {
            method: Method::Get,
            url: &url,
            content_type: None,
            body: b"",
        };
        block_on(send(&mut session, &request)).unwrap();

        let text = core::str::from_utf8(&session.output).unwrap();
        assert!(!text.contains("Content-Length"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn non_default_port_and_query_reach_the_head() {
        let mut session = MockSession::new(b"", 16);
        let url = Url::parse("http://192.168.1.20:8000/predict?token=abc").unwrap();
        let request = Request {
            method: Method::Post,
            url: &url,
            content_type: Some("application/json"),
            body: b"{}",
        };
        block_on(send(&mut session, &request)).unwrap();

        let text = core::str::from_utf8(&session.output).unwrap();
        assert!(text.starts_with("POST /predict?token=abc HTTP/1.1\r\nHost: 192.168.1.20:8000\r\n"));

        let mut session = MockSession::new(b"", 16);
        let url = Url::parse("http://ml.local?token=abc").unwrap();
        let request = Request {
            method: Method::Get,
            url: &url,
            content_type: None,
            body: b"",
        };
        block_on(send(&mut session, &request)).unwrap();

        let text = core::str::from_utf8(&session.output).unwrap();
        assert!(text.starts_with("GET /?token=abc HTTP/1.1\r\nHost: ml.local\r\n"));
    }

    #[test]
    fn content_length_response() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 4\r\n\r\n1234";
        let mut session = MockSession::new(raw, 7);
        let mut buf = [0u8; 256];
        let response = block_on(receive(&mut session, &mut buf)).unwrap();
        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.body, b"1234");
    }

    #[test]
    fn chunked_response_is_decoded() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\n{\"pr\r\nb;ext=1\r\nediction\":1\r\n1\r\n}\r\n0\r\n\r\n";
        let mut session = MockSession::new(raw, 5);
        let mut buf = [0u8; 256];
        let response = block_on(receive(&mut session, &mut buf)).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"{\"prediction\":1}");
    }

    #[test]
    fn body_until_close() {
        let raw = b"HTTP/1.0 500 Internal Server Error\r\n\r\noops";
        let mut session = MockSession::new(raw, 3);
        let mut buf = [0u8; 128];
        let response = block_on(receive(&mut session, &mut buf)).unwrap();
        assert_eq!(response.status, 500);
        assert!(!response.is_success());
        assert_eq!(response.body, b"oops");
    }

    #[test]
    fn truncated_body_is_an_error() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n12";
        let mut session = MockSession::new(raw, 64);
        let mut buf = [0u8; 128];
        let err = block_on(receive(&mut session, &mut buf)).unwrap_err();
        assert_eq!(err, Error::UnexpectedEof);
    }

    #[test]
    fn oversized_response_is_rejected() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n";
        let mut session = MockSession::new(raw, 64);
        let mut buf = [0u8; 64];
        let err = block_on(receive(&mut session, &mut buf)).unwrap_err();
        assert_eq!(err, Error::BufferFull);
    }

    #[test]
    fn garbage_status_line() {
        let raw = b"SSH-2.0-OpenSSH\r\n\r\n";
        let mut session = MockSession::new(raw, 64);
        let mut buf = [0u8; 64];
        let err = block_on(receive(&mut session, &mut buf)).unwrap_err();
        assert_eq!(err, Error::MalformedResponse);
    }
}
