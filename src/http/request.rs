//! Request parsing.
//!
//! # Responsibilities
//! - Split raw bytes at the header/body boundary
//! - Parse the request line and the recognized headers
//! - Decode bodies for the upload and login endpoints
//!
//! # Design Decisions
//! - Only `Connection`, `Content-Length` and `User-Agent` are interpreted;
//!   header names match case-sensitively
//! - A bad request line fails the whole connection, a bad form body fails
//!   only its own request

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Resource name of the binary upload endpoint.
pub const UPLOAD_ENDPOINT: &str = "uploaded_image";
/// Resource name of the login form endpoint.
pub const LOGIN_ENDPOINT: &str = "logger_name";
/// Resource name of the uploaded media listing.
pub const MEDIA_ENDPOINT: &str = "download";

/// Errors produced while parsing a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Could not parse request line: {0:?}")]
    RequestLine(String),

    #[error("Invalid Content-Length: {0:?}")]
    ContentLength(String),

    #[error("Form field `{0}` is missing")]
    MissingField(&'static str),
}

impl ParseError {
    /// Errors that fail only the current request rather than the connection.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ParseError::MissingField(_))
    }
}

/// Decoded request body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Payload {
    #[default]
    Empty,
    /// File bytes sent to the upload endpoint.
    Upload {
        data: Vec<u8>,
        filename: Option<String>,
    },
    /// `"{name} {surname}"` from the login form.
    Login(String),
}

/// A parsed HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    /// Request target as sent, query string included.
    pub target: String,
    /// Final path segment of the target.
    pub resource: String,
    pub version: String,
    pub connection: Option<String>,
    pub content_length: Option<usize>,
    pub user_agent: Option<String>,
    pub client: IpAddr,
    /// 1-based position of this request on its connection.
    pub sequence: usize,
    pub body: Payload,
    pub rate_limited: bool,
}

impl Request {
    /// Parse the request line and headers.
    ///
    /// Connection-level fields (`client`, `sequence`, `rate_limited`) start
    /// unset; see [`Request::with_origin`].
    pub fn parse(head: &str) -> Result<Self, ParseError> {
        let mut lines = head.lines();
        let first = lines.next().unwrap_or_default();
        let tokens: Vec<&str> = first.split_whitespace().collect();
        let [method, target, version] = tokens.as_slice() else {
            return Err(ParseError::RequestLine(first.to_string()));
        };

        let mut request = Request {
            method: method.to_string(),
            target: target.to_string(),
            resource: resource_name(target).to_string(),
            version: version.to_string(),
            connection: None,
            content_length: None,
            user_agent: None,
            client: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            sequence: 0,
            body: Payload::Empty,
            rate_limited: false,
        };

        for line in lines {
            if let Some(value) = line.strip_prefix("Connection:") {
                request.connection = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("Content-Length:") {
                let value = value.trim();
                let length = value
                    .parse()
                    .map_err(|_| ParseError::ContentLength(value.to_string()))?;
                request.content_length = Some(length);
            } else if let Some(value) = line.strip_prefix("User-Agent:") {
                request.user_agent = Some(value.trim().to_string());
            }
        }

        Ok(request)
    }

    /// Attach the connection this request arrived on.
    pub fn with_origin(mut self, client: IpAddr, sequence: usize, rate_limited: bool) -> Self {
        self.client = client;
        self.sequence = sequence;
        self.rate_limited = rate_limited;
        self
    }

    /// Target without its query string.
    pub fn path(&self) -> &str {
        strip_query(&self.target)
    }

    pub fn is_post(&self) -> bool {
        self.method == "POST"
    }

    pub fn is_upload(&self) -> bool {
        self.resource == UPLOAD_ENDPOINT
    }

    /// The client sent `Connection: close`.
    pub fn wants_close(&self) -> bool {
        self.connection
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case("close"))
    }

    /// Decode `raw` according to the endpoint this request targets.
    pub fn decode_body(&mut self, raw: &[u8]) -> Result<(), ParseError> {
        if raw.is_empty() {
            return Ok(());
        }

        match self.resource.as_str() {
            UPLOAD_ENDPOINT => {
                let (data, filename) = decode_upload(raw);
                self.body = Payload::Upload {
                    data: data.to_vec(),
                    filename,
                };
            }
            LOGIN_ENDPOINT => {
                self.body = Payload::Login(decode_login(raw)?);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Split a buffer at the first blank line into head and body.
pub fn split_head(buf: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find(buf, b"\r\n\r\n") {
        return (&buf[..pos], &buf[pos + 4..]);
    }
    if let Some(pos) = find(buf, b"\n\n") {
        return (&buf[..pos], &buf[pos + 2..]);
    }
    (buf, &[])
}

fn strip_query(target: &str) -> &str {
    target.split(['?', '#']).next().unwrap_or(target)
}

fn resource_name(target: &str) -> &str {
    strip_query(target).rsplit('/').next().unwrap_or_default()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Separate the part headers from the file bytes, picking up `filename="..."`.
fn decode_upload(raw: &[u8]) -> (&[u8], Option<String>) {
    let Some(boundary) = find(raw, b"\r\n\r\n") else {
        return (raw, None);
    };

    const TOKEN: &[u8] = b"filename=\"";
    let filename = raw[..boundary].split(|&b| b == b'\n').find_map(|line| {
        let start = find(line, TOKEN)? + TOKEN.len();
        let rest = &line[start..];
        let end = rest.iter().position(|&b| b == b'"')?;
        Some(String::from_utf8_lossy(&rest[..end]).into_owned())
    });

    (&raw[boundary + 4..], filename)
}

/// `name=John&surname=Doe` → `"John Doe"`.
fn decode_login(raw: &[u8]) -> Result<String, ParseError> {
    let text = String::from_utf8_lossy(raw).replace('+', " ");
    let fields: HashMap<&str, &str> = text
        .trim_end_matches(['\r', '\n'])
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect();

    let name = fields.get("name").ok_or(ParseError::MissingField("name"))?;
    let surname = fields
        .get("surname")
        .ok_or(ParseError::MissingField("surname"))?;
    Ok(format!("{} {}", name, surname))
}
