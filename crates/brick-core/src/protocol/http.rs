//! Minimal HTTP/1.1 framing for the remote event listener.
//!
//! The listener only needs the request line of a `GET` request and only ever
//! answers with a small body followed by `Connection: close`, so a full HTTP
//! stack is not required.  This module parses the request line, finds the end
//! of the request head, and renders responses.

use std::fmt;

use thiserror::Error;

use super::request::DecodedRequest;

/// Upper bound on the request head the listener is willing to buffer.
pub const MAX_HEAD_BYTES: usize = 8 * 1024;

/// The built-in control page served for paths that carry no events.
pub const CONTROL_PAGE: &str = include_str!("control_page.html");

/// Errors produced while reading a request head.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HttpError {
    #[error("request line is empty")]
    EmptyRequestLine,

    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
}

/// The first line of an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    /// The path component of the request target, without query or fragment.
    pub path: String,
    pub version: String,
}

/// Parses a request line such as `GET /Axis/X/0.5/1?x=1 HTTP/1.1`.
///
/// The query string and fragment are stripped from the target.
///
/// # Errors
///
/// Returns [`HttpError::EmptyRequestLine`] for blank input and
/// [`HttpError::MalformedRequestLine`] when the method, target or version is
/// missing.
pub fn parse_request_line(line: &str) -> Result<RequestLine, HttpError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(HttpError::EmptyRequestLine);
    }

    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::MalformedRequestLine(line.to_string()));
    };

    if !version.starts_with("HTTP/") {
        return Err(HttpError::MalformedRequestLine(line.to_string()));
    }

    let path = target
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_string();

    Ok(RequestLine {
        method: method.to_string(),
        path,
        version: version.to_string(),
    })
}

/// Returns the offset just past the blank line that ends a request head, if
/// `buf` already contains it.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(pos + 4);
    }
    buf.windows(2).position(|w| w == b"\n\n").map(|pos| pos + 2)
}

/// Extracts and parses the request line from a complete request head.
pub fn parse_request_head(head: &[u8]) -> Result<RequestLine, HttpError> {
    let text = std::str::from_utf8(head).map_err(|_| HttpError::InvalidEncoding)?;
    let first = text.lines().next().unwrap_or_default();
    parse_request_line(first)
}

/// Response status codes used by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    InternalServerError,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::InternalServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// A complete response ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Ok,
            body: body.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::InternalServerError,
            body: message.into(),
        }
    }

    pub fn control_page() -> Self {
        Self::ok(CONTROL_PAGE)
    }

    /// The success response for a decoded request: the control page or the
    /// event echo.
    pub fn for_request(request: &DecodedRequest) -> Self {
        match request {
            DecodedRequest::ControlPage => Self::control_page(),
            events => Self::ok(events.echo()),
        }
    }

    /// Serialises status line, headers and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {}\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            self.status,
            self.body.len()
        );
        let mut bytes = Vec::with_capacity(head.len() + self.body.len());
        bytes.extend_from_slice(head.as_bytes());
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }
}
