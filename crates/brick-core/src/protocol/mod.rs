//! Remote event ingestion protocol.
//!
//! Remote controllers (a phone browser, a small script) send controller events
//! as plain HTTP GET requests whose path encodes one or more events:
//!
//! ```text
//! GET /Axis/X/-0.5/1700000000123/Button/A/1/1700000000124 HTTP/1.1
//! ```
//!
//! This module is transport-free: the listener in the application crate reads
//! bytes from sockets and hands the request path to [`request::decode_request_path`].

pub mod http;
pub mod request;
pub mod sequence;

pub use http::{parse_request_line, HttpError, HttpResponse, RequestLine, StatusCode};
pub use request::{decode_request_path, DecodedEvent, DecodedRequest};
pub use sequence::SequenceFilter;
