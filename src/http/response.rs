//! Immutable HTTP response values.

use crate::http::{
    body::Body,
    types::{header_name, header_value, Headers, StatusCode, Version},
    wire::{self, Exchange},
};
use std::{fmt::Display, io};

/// Immutable HTTP response: status, ordered header lines and a body.
///
/// Every builder method consumes the response and returns a new one.
/// Framing headers (`Content-Length`, `Transfer-Encoding`) are computed by
/// the printer from the body, so there is no need to set them by hand.
///
/// # Examples
/// ```
/// use forktake::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Created)
///     .with_header("Location", "/items/7")
///     .text("created");
///
/// assert_eq!(response.status(), StatusCode::Created);
/// assert_eq!(response.header("location"), Some("/items/7"));
/// assert_eq!(response.body().len(), Some(7));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
}

impl Response {
    /// Response with the given status, no headers and no body.
    #[inline]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::empty(),
        }
    }

    /// `200 OK` without headers and body.
    #[inline]
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok)
    }

    pub fn from_parts(status: StatusCode, headers: Headers, body: Body) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// `303 See Other` (or another `3xx`) pointing to `location`.
    pub fn redirect(location: impl Into<String>, status: StatusCode) -> Self {
        Self::new(status).with_header("Location", location.into())
    }

    #[inline(always)]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline(always)]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of a header, case-insensitive.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    #[inline(always)]
    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Appends a header line; existing lines with the same name are kept.
    ///
    /// Name bytes outside the token grammar become `-` and control
    /// characters in the value become spaces, so the printed header always
    /// stays on one line.
    pub fn with_header<N, V>(mut self, name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Display,
    {
        self.headers.push(header_name(name.into()), header_value(value.to_string()));
        self
    }

    /// Drops every line of a header.
    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    /// Replaces `Content-Type`.
    pub fn with_type(self, media_type: impl Display) -> Self {
        self.without_header("Content-Type")
            .with_header("Content-Type", media_type)
    }

    /// Replaces the body. Stale framing headers are removed.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.headers.remove("Content-Length");
        self.headers.remove("Transfer-Encoding");
        self.body = body.into();
        self
    }

    /// UTF-8 text body with `Content-Type: text/plain`.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.with_type("text/plain; charset=utf-8")
            .with_body(text.into())
    }

    /// HTML body with `Content-Type: text/html`.
    pub fn html(self, html: impl Into<String>) -> Self {
        self.with_type("text/html; charset=utf-8")
            .with_body(html.into())
    }

    /// Consumes the response.
    #[inline]
    pub fn into_parts(self) -> (StatusCode, Headers, Body) {
        (self.status, self.headers, self.body)
    }

    #[inline]
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Reads a streamed body into memory so the response can be inspected
    /// and still be sent.
    pub async fn buffered(self) -> io::Result<Self> {
        let Self {
            status,
            headers,
            body,
        } = self;

        Ok(Self {
            status,
            headers,
            body: body.into_bytes().await?.into(),
        })
    }

    /// Prints the response as it would go over an HTTP/1.1 keep-alive
    /// connection. Equal responses always print the same bytes.
    pub async fn print(self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buffer = Vec::new();

        wire::write_response(
            &mut out,
            &mut buffer,
            self,
            Exchange {
                version: Version::Http11,
                head_request: false,
                keep_alive: true,
            },
            None,
        )
        .await?;

        Ok(out)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}
