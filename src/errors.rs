use crate::{Response, StatusCode};
use std::{io, net::SocketAddr};
use thiserror::Error;

/// Reasons a byte stream could not be read as an HTTP request.
///
/// The back end never routes such a request: it answers with the status
/// from [`MalformedRequest::status`] and closes the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedRequest {
    #[error("invalid HTTP method")]
    InvalidMethod,
    #[error("invalid request target")]
    InvalidTarget,
    #[error("request target too long")]
    TargetTooLong,
    #[error("invalid HTTP version")]
    InvalidVersion,
    #[error("HTTP version not supported")]
    UnsupportedVersion,
    #[error("invalid header line")]
    InvalidHeader,
    #[error("too many headers")]
    TooManyHeaders,
    #[error("request head too large")]
    HeadTooLarge,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("invalid chunked encoding")]
    InvalidChunk,
    #[error("request body too large")]
    BodyTooLarge,
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
    #[error("connection closed mid-request")]
    UnexpectedEof,
}

macro_rules! http_errors {
    ($($name:ident: $status:ident, $code:literal => $message:literal; )*) => {
        /// Status code sent back for this failure.
        pub const fn status(&self) -> StatusCode {
            match self { $(
                Self::$name => StatusCode::$status,
            )* }
        }

        /// Machine-readable code (e.g., `INVALID_METHOD`).
        pub const fn code(&self) -> &'static str {
            match self { $(
                Self::$name => $code,
            )* }
        }

        pub(crate) const fn json(&self) -> &'static str {
            match self { $(
                Self::$name => concat!(
                    r#"{"error":""#, $message, r#"","code":""#, $code, r#""}"#
                ),
            )* }
        }
    };
}

impl MalformedRequest {
    http_errors! {
        InvalidMethod: BadRequest, "INVALID_METHOD" => "Invalid HTTP method";
        InvalidTarget: BadRequest, "INVALID_TARGET" => "Invalid request target";
        TargetTooLong: UriTooLong, "TARGET_TOO_LONG" => "Request target too long";
        InvalidVersion: BadRequest, "INVALID_VERSION" => "Invalid HTTP version";
        UnsupportedVersion: HttpVersionNotSupported, "UNSUPPORTED_VERSION"
            => "HTTP version not supported";

        InvalidHeader: BadRequest, "INVALID_HEADER" => "Invalid header format";
        TooManyHeaders: RequestHeaderFieldsTooLarge, "TOO_MANY_HEADERS"
            => "Too many headers";
        HeadTooLarge: RequestHeaderFieldsTooLarge, "HEAD_TOO_LARGE"
            => "Request head too large";
        InvalidContentLength: BadRequest, "INVALID_CONTENT_LENGTH"
            => "Invalid Content-Length";
        InvalidChunk: BadRequest, "INVALID_CHUNK" => "Invalid chunked body";

        BodyTooLarge: PayloadTooLarge, "BODY_TOO_LARGE" => "Request body too large";
        InvalidEncoding: BadRequest, "INVALID_ENCODING" => "Request head is not UTF-8";
        UnexpectedEof: BadRequest, "UNEXPECTED_EOF" => "Incomplete request";
    }

    /// Builds the synthetic response for this failure: the status, a
    /// `Connection: close` header and, if `json` is set, a small JSON body.
    pub fn to_response(&self, json: bool) -> Response {
        let response = Response::new(self.status()).with_header("Connection", "close");

        match json {
            true => response
                .with_type("application/json")
                .with_body(self.json()),
            false => response,
        }
    }
}

/// Sent by the overflow tasks when the pending queue is full.
pub(crate) const fn service_unavailable(json: bool) -> &'static [u8] {
    match json {
        true => concat!(
            "HTTP/1.1 503 Service Unavailable\r\n",
            "Connection: close\r\n",
            "Content-Type: application/json\r\n",
            "Content-Length: 72\r\n",
            "\r\n",
            r#"{"error":"Service temporarily unavailable","code":"SERVICE_UNAVAILABLE"}"#
        )
        .as_bytes(),
        false => concat!(
            "HTTP/1.1 503 Service Unavailable\r\n",
            "Connection: close\r\n",
            "Content-Length: 0\r\n\r\n"
        )
        .as_bytes(),
    }
}

/// Failures of the back end and front end.
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be created or bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// The accept loop hit a non-recoverable error.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A route pattern did not compile.
    #[error("invalid route pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
