//! Just enough URL parsing to reach the inference and telemetry servers.

use core::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    UnsupportedScheme,
    MissingHost,
    InvalidPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Borrowed view over an absolute `http://` or `https://` URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Url<'a> {
    pub scheme: Scheme,
    pub host: &'a str,
    pub port: u16,
    /// Never empty; `/` when the URL has no path.
    pub path: &'a str,
    /// Text after `?`, without the `?`.
    pub query: Option<&'a str>,
}

impl<'a> Url<'a> {
    pub fn parse(url: &'a str) -> Result<Self, Error> {
        let url = url.trim();
        let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
            (Scheme::Https, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (Scheme::Http, rest)
        } else {
            return Err(Error::UnsupportedScheme);
        };

        let (authority, target) = match rest.find(['/', '?']) {
            Some(0) => return Err(Error::MissingHost),
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, ""),
        };

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        let path = if path.is_empty() { "/" } else { path };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| Error::InvalidPort)?;
                if port == 0 {
                    return Err(Error::InvalidPort);
                }
                (host, port)
            }
            None => (authority, scheme.default_port()),
        };

        if host.is_empty() {
            return Err(Error::MissingHost);
        }

        Ok(Self {
            scheme,
            host,
            port,
            path,
            query,
        })
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Origin-form request target, `path[?query]`.
    pub fn target(&self) -> Target<'_> {
        Target(self)
    }

    /// `host` or `host:port`, as sent in the `Host` header.
    pub fn authority(&self) -> Authority<'_> {
        Authority(self)
    }
}

pub struct Target<'u>(&'u Url<'u>);

impl fmt::Display for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.path)?;
        match self.0.query {
            Some(query) => write!(f, "?{}", query),
            None => Ok(()),
        }
    }
}

pub struct Authority<'u>(&'u Url<'u>);

impl fmt::Display for Authority<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self.0;
        if url.port == url.scheme.default_port() {
            f.write_str(url.host)
        } else {
            write!(f, "{}:{}", url.host, url.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use core::fmt::Write;

    use heapless::String;

    use super::*;

    fn render(value: impl fmt::Display) -> String<64> {
        let mut out = String::new();
        write!(out, "{}", value).unwrap();
        out
    }

    #[test]
    fn parses_thingspeak_update_url() {
        let url = Url::parse("https://api.thingspeak.com/update").unwrap();
        assert_eq!(url.scheme, Scheme::Https);
        assert_eq!(url.host, "api.thingspeak.com");
        assert_eq!(url.port, 443);
        assert_eq!(url.path, "/update");
        assert!(url.is_tls());
    }

    #[test]
    fn explicit_port_and_query() {
        let url = Url::parse("http://192.168.1.20:8000/predict?model=v2").unwrap();
        assert_eq!(url.scheme, Scheme::Http);
        assert_eq!(url.host, "192.168.1.20");
        assert_eq!(url.port, 8000);
        assert_eq!(url.path, "/predict");
        assert_eq!(url.query, Some("model=v2"));
        assert!(!url.is_tls());
        assert_eq!(render(url.target()).as_str(), "/predict?model=v2");
        assert_eq!(render(url.authority()).as_str(), "192.168.1.20:8000");
    }

    #[test]
    fn bare_host_gets_root_path() {
        let url = Url::parse("http://ml.local").unwrap();
        assert_eq!(url.path, "/");
        assert_eq!(url.query, None);
        assert_eq!(url.port, 80);
        assert_eq!(render(url.authority()).as_str(), "ml.local");
    }

    #[test]
    fn query_without_path_is_kept() {
        let url = Url::parse("http://ml.local?token=abc").unwrap();
        assert_eq!(url.host, "ml.local");
        assert_eq!(url.path, "/");
        assert_eq!(url.query, Some("token=abc"));
        assert_eq!(render(url.target()).as_str(), "/?token=abc");
    }

    #[test]
    fn default_port_is_left_out_of_authority() {
        let url = Url::parse("https://api.thingspeak.com:443/update").unwrap();
        assert_eq!(render(url.authority()).as_str(), "api.thingspeak.com");

        let url = Url::parse("https://api.thingspeak.com:8443/update").unwrap();
        assert_eq!(render(url.authority()).as_str(), "api.thingspeak.com:8443");
    }

    #[test]
    fn rejects_placeholders_and_bad_input() {
        assert_eq!(Url::parse("YOUR_API_ENDPOINT"), Err(Error::UnsupportedScheme));
        assert_eq!(Url::parse("ftp://host/file"), Err(Error::UnsupportedScheme));
        assert_eq!(Url::parse("https:///update"), Err(Error::MissingHost));
        assert_eq!(Url::parse("https://:8080/update"), Err(Error::MissingHost));
        assert_eq!(Url::parse("http://host:http/"), Err(Error::InvalidPort));
        assert_eq!(Url::parse("http://host:0/"), Err(Error::InvalidPort));
    }
}
