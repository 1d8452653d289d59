use crate::http::{
    body::Body,
    media::{MediaRange, MediaType},
    query::Query,
    types::{header_name, header_value, Headers, Method, Version},
};
use std::{borrow::Cow, net::SocketAddr, sync::Arc};

/// Head of a request: the head line and the header lines.
///
/// # Wire format
///
/// - `SP`: ASCII space (0x20)
/// - `CRLF`: exactly `"\r\n"`, a lone `CR` or `LF` is rejected
///
/// | Part        | Template                                       | Example                       |
/// |-------------|------------------------------------------------|-------------------------------|
/// | Head line   | `[METHOD] SP [TARGET] SP "HTTP/" [VERSION] CRLF` | `GET /api/users HTTP/1.1\r\n` |
/// | Header line | `[NAME] ": " [VALUE] CRLF`                     | `Accept: text/html\r\n`       |
/// | End         | `CRLF`                                         |                               |
///
/// The value of a header starts right after the first `": "` and is kept
/// verbatim, so leading and trailing spaces survive:
/// ```text
/// X-Empty: \r\n                   // Value: ``
/// Name:   spaced value  \r\n      // Value: `  spaced value  `
/// Name:value\r\n                  // Error: no `": "` separator
/// ```
///
/// The head must be `UTF-8`. Printing a parsed head with [`Head::print`]
/// reproduces the input byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) version: Version,
    pub(crate) headers: Headers,
}

impl Head {
    /// Creates a head without headers.
    pub fn new(method: Method, target: impl Into<String>, version: Version) -> Self {
        Self {
            method,
            target: target.into(),
            version,
            headers: Headers::new(),
        }
    }

    #[inline(always)]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Request target exactly as received (`/path?query`).
    #[inline(always)]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Target without the query.
    #[inline]
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// Query part of the target (empty when absent).
    #[inline]
    pub fn query(&self) -> Query<'_> {
        Query::new(self.target.split_once('?').map_or("", |(_, query)| query))
    }

    #[inline(always)]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline(always)]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the first header value with case-insensitive name matching.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns every value of a header.
    #[inline]
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers.get_all(name)
    }

    /// Whether the client asked to keep the connection open.
    ///
    /// `Connection: close` always wins, `Connection: keep-alive` enables
    /// persistence on HTTP/1.0; otherwise HTTP/1.1 keeps and HTTP/1.0 closes.
    pub fn is_keep_alive(&self) -> bool {
        if self.headers.has_token("Connection", "close") {
            false
        } else if self.headers.has_token("Connection", "keep-alive") {
            true
        } else {
            self.version.keep_alive_default()
        }
    }

    /// `Expect: 100-continue` was sent.
    #[inline]
    pub fn expects_continue(&self) -> bool {
        self.version == Version::Http11
            && self
                .headers
                .get("Expect")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
    }

    /// Prints the head line, every header line and the final `CRLF`.
    pub fn print(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(64 + self.target.len() + self.headers.len() * 32);
        self.write_to(&mut buffer);
        buffer
    }

    pub(crate) fn write_to(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.method.as_str().as_bytes());
        buffer.push(b' ');
        buffer.extend_from_slice(self.target.as_bytes());
        buffer.push(b' ');
        buffer.extend_from_slice(self.version.as_str().as_bytes());
        buffer.extend_from_slice(b"\r\n");
        self.headers.write_to(buffer);
        buffer.extend_from_slice(b"\r\n");
    }
}

/// Immutable HTTP request.
///
/// The head is shared behind an [`Arc`], so handing it to diagnostics or a
/// [`Fallback`](crate::Fallback) is cheap. The body is read at most once:
/// [`Request::into_body`] and [`Request::into_parts`] consume the request.
///
/// Derived views ([`path`](Request::path), [`query_param`](Request::query_param),
/// [`accept`](Request::accept), ...) are computed on every call.
///
/// # Examples
/// ```
/// use forktake::{Method, Request};
///
/// let request = Request::new(Method::Get, "/users/7?tab=posts")
///     .with_header("Accept", "text/html");
///
/// assert_eq!(request.path(), "/users/7");
/// assert_eq!(request.query_param("tab").as_deref(), Some("posts"));
/// assert_eq!(request.header("accept"), Some("text/html"));
/// ```
#[derive(Debug)]
pub struct Request {
    head: Arc<Head>,
    params: Vec<(String, String)>,
    body: Body,
    peer: Option<SocketAddr>,
}

impl Request {
    /// HTTP/1.1 request with no headers and an empty body.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self::from_head(Head::new(method, target, Version::Http11))
    }

    /// Request with an empty body.
    pub fn from_head(head: Head) -> Self {
        Self::from_parts(Arc::new(head), Body::empty())
    }

    pub fn from_parts(head: Arc<Head>, body: Body) -> Self {
        Self {
            head,
            params: Vec::new(),
            body,
            peer: None,
        }
    }

    /// Returns a request with one more header line.
    ///
    /// Name bytes outside the token grammar become `-` and control
    /// characters in the value become spaces.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.head)
            .headers
            .push(header_name(name.into()), header_value(value.into()));
        self
    }

    /// Returns a request with all lines of the header removed.
    pub fn without_header(mut self, name: &str) -> Self {
        Arc::make_mut(&mut self.head).headers.remove(name);
        self
    }

    /// Returns a request with another body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns a request with another protocol version.
    pub fn with_version(mut self, version: Version) -> Self {
        Arc::make_mut(&mut self.head).version = version;
        self
    }

    pub(crate) fn with_params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.params.extend(params);
        self
    }

    pub(crate) fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    #[inline(always)]
    pub fn head(&self) -> &Arc<Head> {
        &self.head
    }

    #[inline(always)]
    pub fn method(&self) -> Method {
        self.head.method
    }

    #[inline(always)]
    pub fn target(&self) -> &str {
        self.head.target()
    }

    #[inline(always)]
    pub fn path(&self) -> &str {
        self.head.path()
    }

    #[inline(always)]
    pub fn query(&self) -> Query<'_> {
        self.head.query()
    }

    /// Decoded value of the first query parameter called `name`.
    #[inline]
    pub fn query_param(&self, name: &str) -> Option<Cow<'_, str>> {
        self.head.query().get(name)
    }

    #[inline(always)]
    pub fn version(&self) -> Version {
        self.head.version
    }

    #[inline(always)]
    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    /// Returns the first header value with case-insensitive name matching
    /// (per [RFC 7230](https://tools.ietf.org/html/rfc7230#section-3.2)).
    /// Uses linear search.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    /// Returns every value of a header in order of appearance.
    #[inline]
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.head.header_all(name)
    }

    /// Path capture bound by a [`FkRegex`](crate::FkRegex) named group.
    /// When nested forks bind the same name, the innermost binding wins.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Ranges of every `Accept` line in order, `*/*` when there is none.
    pub fn accept(&self) -> Vec<MediaRange> {
        let mut lines = self.header_all("Accept").peekable();

        match lines.peek() {
            None => MediaRange::parse_accept(None),
            Some(_) => lines
                .flat_map(|line| MediaRange::parse_accept(Some(line)))
                .collect(),
        }
    }

    /// Media type of the body, from `Content-Type`.
    pub fn content_type(&self) -> Option<MediaType> {
        self.header("Content-Type").and_then(MediaType::parse)
    }

    /// Address of the client, when the request came from a socket.
    #[inline(always)]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    #[inline]
    pub fn is_keep_alive(&self) -> bool {
        self.head.is_keep_alive()
    }

    /// Body length, if it is known without reading.
    #[inline]
    pub fn body_len(&self) -> Option<u64> {
        self.body.len()
    }

    /// Prints the head; see [`Head::print`].
    #[inline]
    pub fn print_head(&self) -> Vec<u8> {
        self.head.print()
    }

    /// Consumes the request and returns its body.
    #[inline]
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Consumes the request.
    #[inline]
    pub fn into_parts(self) -> (Arc<Head>, Body) {
        (self.head, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{media::quality_of, wire::parse_request};

    #[test]
    fn views() {
        let request = Request::new(Method::Post, "/a/b?x=1&y=two%20words")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_header("Accept", "text/html;q=0.5, */*;q=0.1");

        assert_eq!(request.path(), "/a/b");
        assert_eq!(request.query().as_str(), "x=1&y=two%20words");
        assert_eq!(request.query_param("y").as_deref(), Some("two words"));
        assert_eq!(request.query_param("z"), None);
        assert_eq!(request.content_type().unwrap().to_string(), "application/json");
        assert_eq!(request.accept().len(), 2);
        assert_eq!(request.peer_addr(), None);
    }

    #[test]
    fn accept_spans_every_line() {
        let request = Request::new(Method::Get, "/")
            .with_header("Accept", "application/json;q=0.5")
            .with_header("Accept", "text/html, text/*;q=0.2");
        let ranges = request.accept();

        #[rustfmt::skip]
        let cases = [
            ("application/json", 500),
            ("text/html",        1000),
            ("text/plain",       200),
            ("image/png",        0),
        ];

        assert_eq!(ranges.len(), 3);
        for (media, quality) in cases {
            let media = MediaType::parse(media).unwrap();
            assert_eq!(quality_of(&ranges, &media), quality, "{media}");
        }

        let ranges = Request::new(Method::Get, "/").accept();
        assert_eq!(quality_of(&ranges, &MediaType::parse("a/b").unwrap()), 1000);
    }

    #[test]
    fn keep_alive() {
        #[rustfmt::skip]
        let cases = [
            (Version::Http11, None,                         true),
            (Version::Http11, Some("close"),                false),
            (Version::Http11, Some("Keep-Alive"),           true),
            (Version::Http10, None,                         false),
            (Version::Http10, Some("keep-alive"),           true),
            (Version::Http10, Some("upgrade, keep-alive"),  true),
            (Version::Http11, Some("keep-alive, close"),    false),
        ];

        for (version, connection, expected) in cases {
            let mut request = Request::new(Method::Get, "/").with_version(version);
            if let Some(value) = connection {
                request = request.with_header("Connection", value);
            }

            assert_eq!(request.is_keep_alive(), expected, "{version} {connection:?}");
        }
    }

    #[test]
    fn params_innermost_wins() {
        let request = Request::new(Method::Get, "/")
            .with_params([("id".to_string(), "outer".to_string())])
            .with_params([("id".to_string(), "inner".to_string())]);

        assert_eq!(request.param("id"), Some("inner"));
        assert_eq!(request.param("other"), None);
    }

    #[test]
    fn builders_do_not_touch_shared_heads() {
        let original = Request::new(Method::Get, "/").with_header("A", "1");
        let shared = Arc::clone(original.head());

        let changed = original.with_header("B", "2\r\nInjected: yes");

        assert_eq!(shared.headers().len(), 1);
        assert_eq!(changed.headers().len(), 2);
        assert_eq!(changed.header("b"), Some("2  Injected: yes"));
    }

    #[test]
    fn builders_keep_one_line_per_header() {
        #[rustfmt::skip]
        let cases = [
            ("X-A",              "1",          "X-A: 1\r\n"),
            ("X-A\r\nSet-Cookie", "evil=1",     "X-A--Set-Cookie: evil=1\r\n"),
            ("Bad Name:",        "v",          "Bad-Name-: v\r\n"),
            ("",                 "v",          "-: v\r\n"),
            ("X-B",              "a\0b\tc",    "X-B: a b\tc\r\n"),
        ];

        for (name, value, line) in cases {
            let request = Request::new(Method::Get, "/").with_header(name, value);
            let printed = String::from_utf8(request.print_head()).unwrap();

            assert_eq!(printed, format!("GET / HTTP/1.1\r\n{line}\r\n"), "{name:?}");
            assert!(parse_request(printed.as_bytes()).is_ok(), "{name:?}");
        }
    }

    #[test]
    fn print_head() {
        let request = Request::new(Method::Get, "/x")
            .with_header("Host", "localhost")
            .with_header("X-Empty", "");

        assert_eq!(
            request.print_head(),
            b"GET /x HTTP/1.1\r\nHost: localhost\r\nX-Empty: \r\n\r\n"
        );
    }

    #[test]
    fn expect_continue() {
        let request = Request::new(Method::Put, "/").with_header("Expect", "100-Continue");
        assert!(request.head().expects_continue());

        let request = request.with_version(Version::Http10);
        assert!(!request.head().expects_continue());
    }
}
