//! HTTP/1.x wire codec: request heads and bodies in, responses out.

use crate::{
    errors::MalformedRequest,
    http::{
        body::Body,
        request::{Head, Request},
        response::Response,
        types::{hex_to_usize, is_token, slice_to_usize, Headers, Method, Version},
    },
    limits::ReqLimits,
};
use bytes::{Bytes, BytesMut};
use memchr::{memchr, memmem};
use std::{io, sync::Arc, time::Duration};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_CHUNK_LINE: usize = 1024;
const COPY_CHUNK: usize = 8 * 1024;

/// Parses one complete request held in `raw` with default [`ReqLimits`].
///
/// The body is taken from `Content-Length`, or decoded when
/// `Transfer-Encoding: chunked` is present (chunked wins over a length);
/// without either the body is empty. Bytes after the request are ignored.
///
/// # Examples
/// ```
/// use forktake::{parse_request, Method};
///
/// let raw = b"POST /notes HTTP/1.1\r\nContent-Length: 4\r\n\r\nnote";
/// let request = parse_request(raw).unwrap();
///
/// assert_eq!(request.method(), Method::Post);
/// assert_eq!(request.body_len(), Some(4));
/// assert_eq!(request.print_head(), &raw[..raw.len() - 4]);
/// ```
pub fn parse_request(raw: &[u8]) -> Result<Request, MalformedRequest> {
    parse_request_with(raw, &ReqLimits::default())
}

/// Same as [`parse_request`] with custom limits.
pub fn parse_request_with(raw: &[u8], limits: &ReqLimits) -> Result<Request, MalformedRequest> {
    let (head, consumed) = parse_head(raw, limits)?.ok_or(MalformedRequest::UnexpectedEof)?;
    let rest = &raw[consumed..];

    let body: Body = match framing(&head, limits)? {
        Framing::Empty => Body::empty(),
        Framing::Length(length) => rest
            .get(..length)
            .map(Bytes::copy_from_slice)
            .ok_or(MalformedRequest::UnexpectedEof)?
            .into(),
        Framing::Chunked => decode_chunked(rest, limits)?
            .map(|(body, _)| body)
            .ok_or(MalformedRequest::UnexpectedEof)?
            .into(),
    };

    Ok(Request::from_parts(Arc::new(head), body))
}

/// Parses a head at the start of `buf`.
///
/// Empty lines before the head line are skipped (RFC 7230, section 3.5).
/// Returns `Ok(None)` while the terminating blank line has not arrived,
/// otherwise the head and the number of bytes it took, skipped lines included.
pub(crate) fn parse_head(
    buf: &[u8],
    limits: &ReqLimits,
) -> Result<Option<(Head, usize)>, MalformedRequest> {
    let max = limits.max_head_size();

    let skipped = leading_empty_lines(buf);
    let whole = buf;
    let buf = &buf[skipped..];

    let end = match memmem::find(buf, b"\r\n\r\n") {
        Some(pos) => pos + 4,
        None if whole.len() >= max => return Err(MalformedRequest::HeadTooLarge),
        None => return Ok(None),
    };

    if end > max {
        return Err(MalformedRequest::HeadTooLarge);
    }

    let text = simdutf8::basic::from_utf8(&buf[..end - 4])
        .map_err(|_| MalformedRequest::InvalidEncoding)?;
    let mut lines = text.split("\r\n");

    let mut head = parse_head_line(lines.next().unwrap_or(""), limits)?;
    for line in lines {
        if head.headers.len() >= limits.header_count {
            return Err(MalformedRequest::TooManyHeaders);
        }

        let (name, value) = parse_header_line(line, limits)?;
        head.headers.push(name.to_string(), value.to_string());
    }

    Ok(Some((head, skipped + end)))
}

fn leading_empty_lines(buf: &[u8]) -> usize {
    buf.chunks_exact(2)
        .take_while(|pair| *pair == b"\r\n")
        .count()
        * 2
}

// METHOD SP TARGET SP VERSION
fn parse_head_line(line: &str, limits: &ReqLimits) -> Result<Head, MalformedRequest> {
    let (method, rest) = line
        .split_once(' ')
        .ok_or(MalformedRequest::InvalidMethod)?;
    let method = Method::from_bytes(method.as_bytes())?;

    let (target, version) = rest
        .rsplit_once(' ')
        .ok_or(MalformedRequest::InvalidVersion)?;

    if target.len() > limits.url_size {
        return Err(MalformedRequest::TargetTooLong);
    }

    let valid_target = match target.as_bytes().first() {
        Some(b'/') => true,
        Some(b'*') => target.len() == 1 && method == Method::Options,
        _ => false,
    };

    if !valid_target || target.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(MalformedRequest::InvalidTarget);
    }

    let version = Version::from_bytes(version.as_bytes())?;

    Ok(Head {
        method,
        target: target.to_string(),
        version,
        headers: Headers::with_capacity(limits.header_count.min(16)),
    })
}

// NAME ": " VALUE
fn parse_header_line<'a>(
    line: &'a str,
    limits: &ReqLimits,
) -> Result<(&'a str, &'a str), MalformedRequest> {
    let (name, value) = line
        .split_once(": ")
        .ok_or(MalformedRequest::InvalidHeader)?;

    if name.len() > limits.header_name_size || value.len() > limits.header_value_size {
        return Err(MalformedRequest::HeadTooLarge);
    }

    if name.is_empty() || !name.bytes().all(is_token) {
        return Err(MalformedRequest::InvalidHeader);
    }

    if value.bytes().any(|b| (b < b' ' && b != b'\t') || b == 0x7f) {
        return Err(MalformedRequest::InvalidHeader);
    }

    Ok((name, value))
}

/// How the body of a request is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    Empty,
    Length(usize),
    Chunked,
}

pub(crate) fn framing(head: &Head, limits: &ReqLimits) -> Result<Framing, MalformedRequest> {
    let last_coding = head
        .headers
        .get_all("Transfer-Encoding")
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|coding| !coding.is_empty())
        .last();

    if let Some(coding) = last_coding {
        return match coding.eq_ignore_ascii_case("chunked") {
            true => Ok(Framing::Chunked),
            false => Err(MalformedRequest::InvalidChunk),
        };
    }

    let mut length = None;
    for part in head
        .headers
        .get_all("Content-Length")
        .flat_map(|value| value.split(','))
    {
        let value = slice_to_usize(part.trim().as_bytes())
            .ok_or(MalformedRequest::InvalidContentLength)?;

        if length.is_some_and(|known| known != value) {
            return Err(MalformedRequest::InvalidContentLength);
        }
        length = Some(value);
    }

    match length {
        None | Some(0) => Ok(Framing::Empty),
        Some(length) if length > limits.body_size => Err(MalformedRequest::BodyTooLarge),
        Some(length) => Ok(Framing::Length(length)),
    }
}

/// Decodes a chunked body at the start of `buf`.
///
/// Returns `Ok(None)` until the last chunk and the trailers have arrived,
/// otherwise the decoded body and the number of bytes it took. Trailer
/// fields are read and dropped.
pub(crate) fn decode_chunked(
    buf: &[u8],
    limits: &ReqLimits,
) -> Result<Option<(Bytes, usize)>, MalformedRequest> {
    let mut body = BytesMut::new();
    let mut pos = 0;

    loop {
        let line = match next_line(buf, pos)? {
            Some(line) => line,
            None => return Ok(None),
        };

        let size_field = match memchr(b';', line) {
            Some(index) => &line[..index],
            None => line,
        };
        let size = hex_to_usize(trim_spaces(size_field)).ok_or(MalformedRequest::InvalidChunk)?;
        pos += line.len() + 2;

        if size == 0 {
            return Ok(finish_trailers(buf, pos, limits)?.map(|end| (body.freeze(), end)));
        }

        if body.len().saturating_add(size) > limits.body_size {
            return Err(MalformedRequest::BodyTooLarge);
        }

        if buf.len() < pos + size + 2 {
            return Ok(None);
        }

        body.extend_from_slice(&buf[pos..pos + size]);
        if &buf[pos + size..pos + size + 2] != b"\r\n" {
            return Err(MalformedRequest::InvalidChunk);
        }
        pos += size + 2;
    }
}

fn finish_trailers(
    buf: &[u8],
    mut pos: usize,
    limits: &ReqLimits,
) -> Result<Option<usize>, MalformedRequest> {
    for _ in 0..=limits.header_count {
        match next_line(buf, pos)? {
            None => return Ok(None),
            Some([]) => return Ok(Some(pos + 2)),
            Some(line) => pos += line.len() + 2,
        }
    }

    Err(MalformedRequest::TooManyHeaders)
}

fn next_line(buf: &[u8], pos: usize) -> Result<Option<&[u8]>, MalformedRequest> {
    let rest = buf.get(pos..).unwrap_or_default();

    match memmem::find(rest, b"\r\n") {
        Some(end) if end > MAX_CHUNK_LINE => Err(MalformedRequest::InvalidChunk),
        Some(end) => Ok(Some(&rest[..end])),
        None if rest.len() > MAX_CHUNK_LINE => Err(MalformedRequest::InvalidChunk),
        None => Ok(None),
    }
}

fn trim_spaces(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

/// What the response is written for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Exchange {
    pub version: Version,
    pub head_request: bool,
    pub keep_alive: bool,
}

enum Delimit {
    Nothing,
    Length(u64),
    Chunked,
    Close,
}

/// Writes `response` and returns whether the connection may stay open.
///
/// Framing is derived from the body: a known length is announced with a
/// `Content-Length` (appended, or rewritten if it disagrees), an unknown
/// length is sent chunked on HTTP/1.1 and close-delimited on HTTP/1.0.
/// `1xx`, `204` and `304` responses and answers to `HEAD` carry no body.
pub(crate) async fn write_response<W>(
    writer: &mut W,
    buffer: &mut Vec<u8>,
    response: Response,
    exchange: Exchange,
    write_timeout: Option<Duration>,
) -> io::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    buffer.clear();

    let (status, mut headers, body) = response.into_parts();
    let mut keep_alive = exchange.keep_alive && !headers.has_token("Connection", "close");

    let delimit = match (status.allows_body(), body.len()) {
        (false, _) => {
            headers.remove("Content-Length");
            headers.remove("Transfer-Encoding");
            Delimit::Nothing
        }
        (true, Some(length)) => {
            headers.remove("Transfer-Encoding");
            set_length(&mut headers, length);
            Delimit::Length(length)
        }
        (true, None) => {
            headers.remove("Content-Length");
            headers.remove("Transfer-Encoding");

            match exchange.version {
                Version::Http11 => {
                    headers.push("Transfer-Encoding".into(), "chunked".into());
                    Delimit::Chunked
                }
                Version::Http10 => {
                    keep_alive = false;
                    Delimit::Close
                }
            }
        }
    };

    match (exchange.version, keep_alive) {
        (_, false) if !headers.has_token("Connection", "close") => {
            headers.remove("Connection");
            headers.push("Connection".into(), "close".into());
        }
        (Version::Http10, true) if !headers.has_token("Connection", "keep-alive") => {
            headers.push("Connection".into(), "keep-alive".into());
        }
        _ => {}
    }

    buffer.extend_from_slice(status.status_line(exchange.version));
    headers.write_to(buffer);
    buffer.extend_from_slice(b"\r\n");

    let delimit = match exchange.head_request {
        true => Delimit::Nothing,
        false => delimit,
    };

    match (delimit, body.as_full()) {
        (Delimit::Nothing, _) => send(writer, buffer, write_timeout).await?,
        (Delimit::Length(_), Some(bytes)) => {
            buffer.extend_from_slice(bytes);
            send(writer, buffer, write_timeout).await?;
        }
        (Delimit::Length(length), None) => {
            send(writer, buffer, write_timeout).await?;
            copy_exact(writer, body, length, write_timeout).await?;
        }
        (Delimit::Chunked, _) => {
            send(writer, buffer, write_timeout).await?;
            copy_chunked(writer, buffer, body, write_timeout).await?;
        }
        (Delimit::Close, _) => {
            send(writer, buffer, write_timeout).await?;
            copy_all(writer, body, write_timeout).await?;
        }
    }

    writer.flush().await?;
    Ok(keep_alive)
}

fn set_length(headers: &mut Headers, length: u64) {
    let consistent = headers
        .get_all("Content-Length")
        .all(|value| value.trim().parse::<u64>().ok() == Some(length));

    if !consistent {
        headers.remove("Content-Length");
    }
    if !consistent || !headers.contains("Content-Length") {
        headers.push("Content-Length".into(), length.to_string());
    }
}

#[inline]
async fn send<W>(writer: &mut W, bytes: &[u8], timeout: Option<Duration>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, writer.write_all(bytes))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "socket write timed out"))?,
        None => writer.write_all(bytes).await,
    }
}

async fn copy_exact<W>(
    writer: &mut W,
    body: Body,
    length: u64,
    timeout: Option<Duration>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut reader = body.into_reader();
    let mut chunk = vec![0u8; COPY_CHUNK];
    let mut remaining = length;

    while remaining > 0 {
        let want = remaining.min(chunk.len() as u64) as usize;
        let read = reader.read(&mut chunk[..want]).await?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "body ended before its declared length",
            ));
        }

        send(writer, &chunk[..read], timeout).await?;
        remaining -= read as u64;
    }

    Ok(())
}

async fn copy_chunked<W>(
    writer: &mut W,
    buffer: &mut Vec<u8>,
    body: Body,
    timeout: Option<Duration>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut reader = body.into_reader();
    let mut chunk = vec![0u8; COPY_CHUNK];

    loop {
        let read = reader.read(&mut chunk).await?;
        buffer.clear();

        if read == 0 {
            return send(writer, b"0\r\n\r\n", timeout).await;
        }

        buffer.extend_from_slice(format!("{read:x}\r\n").as_bytes());
        buffer.extend_from_slice(&chunk[..read]);
        buffer.extend_from_slice(b"\r\n");
        send(writer, buffer, timeout).await?;
    }
}

async fn copy_all<W>(writer: &mut W, body: Body, timeout: Option<Duration>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut reader = body.into_reader();
    let mut chunk = vec![0u8; COPY_CHUNK];

    loop {
        match reader.read(&mut chunk).await? {
            0 => return Ok(()),
            read => send(writer, &chunk[..read], timeout).await?,
        }
    }
}

/// Reads from `reader` into `buf` until `parse` yields a value.
///
/// `first_wait` bounds the wait for the first byte when `buf` is empty,
/// `read_wait` every later read. `Ok(None)` means the peer closed cleanly
/// before sending anything.
pub(crate) async fn read_until<R, T, F>(
    reader: &mut R,
    buf: &mut BytesMut,
    first_wait: Duration,
    read_wait: Duration,
    mut parse: F,
) -> Result<Option<T>, ReadError>
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]) -> Result<Option<T>, MalformedRequest>,
{
    loop {
        if !buf.is_empty() {
            if let Some(value) = parse(&buf[..])? {
                return Ok(Some(value));
            }
        }

        let wait = match buf.is_empty() {
            true => first_wait,
            false => read_wait,
        };

        buf.reserve(4096);
        let read = tokio::time::timeout(wait, reader.read_buf(buf))
            .await
            .map_err(|_| ReadError::TimedOut)??;

        if read == 0 {
            return match buf.is_empty() {
                true => Ok(None),
                false => Err(ReadError::Malformed(MalformedRequest::UnexpectedEof)),
            };
        }
    }
}

/// Failure while waiting for request bytes.
#[derive(Debug)]
pub(crate) enum ReadError {
    Malformed(MalformedRequest),
    TimedOut,
    Io(io::Error),
}

impl From<MalformedRequest> for ReadError {
    fn from(err: MalformedRequest) -> Self {
        ReadError::Malformed(err)
    }
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> Self {
        ReadError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;

    macro_rules! parse {
        ($raw:expr) => {
            parse_request($raw.as_bytes())
        };
    }

    #[test]
    fn head_round_trip() {
        #[rustfmt::skip]
        let heads = [
            "GET / HTTP/1.1\r\n\r\n",
            "GET /f HTTP/1.0\r\nHost: localhost\r\n\r\n",
            "OPTIONS * HTTP/1.1\r\nhost: a\r\n\r\n",
            "DELETE /a/b?c=d&e HTTP/1.1\r\nX-Empty: \r\nx-spaced:   v  \r\nX-Dup: 1\r\nx-dup: 2\r\n\r\n",
            "POST /ż HTTP/1.1\r\nX-Name: Zażółć\r\n\r\n",
        ];

        for raw in heads {
            let request = parse!(raw).unwrap();
            assert_eq!(request.print_head(), raw.as_bytes(), "{raw:?}");
        }
    }

    #[test]
    fn head_errors() {
        use MalformedRequest::*;

        #[rustfmt::skip]
        let cases = [
            ("",                                       UnexpectedEof),
            ("GET / HTTP/1.1\r\n",                     UnexpectedEof),
            ("FETCH / HTTP/1.1\r\n\r\n",               InvalidMethod),
            ("get / HTTP/1.1\r\n\r\n",                 InvalidMethod),
            ("GET\r\n\r\n",                            InvalidMethod),
            ("GET /\r\n\r\n",                          InvalidVersion),
            ("GET / HTTP/1.2\r\n\r\n",                 UnsupportedVersion),
            ("GET / HTTX/1.1\r\n\r\n",                 InvalidVersion),
            ("GET a HTTP/1.1\r\n\r\n",                 InvalidTarget),
            ("GET * HTTP/1.1\r\n\r\n",                 InvalidTarget),
            ("GET /a b HTTP/1.1\r\n\r\n",              InvalidTarget),
            ("GET  / HTTP/1.1\r\n\r\n",                InvalidTarget),
            ("GET / HTTP/1.1\r\nHost:x\r\n\r\n",       InvalidHeader),
            ("GET / HTTP/1.1\r\n: x\r\n\r\n",          InvalidHeader),
            ("GET / HTTP/1.1\r\nBad Name: x\r\n\r\n",  InvalidHeader),
            ("GET / HTTP/1.1\r\nA: \x01\r\n\r\n",      InvalidHeader),
            ("GET / HTTP/1.1\r\nA: b\nC: d\r\n\r\n",   InvalidHeader),
        ];

        for (raw, error) in cases {
            assert_eq!(parse!(raw).map(|_| ()), Err(error), "{raw:?}");
        }
    }

    #[test]
    fn empty_lines_before_the_head() {
        let limits = ReqLimits::default();

        #[rustfmt::skip]
        let cases = [
            ("GET / HTTP/1.1\r\n\r\n",             Some(18)),
            ("\r\nGET / HTTP/1.1\r\n\r\n",         Some(20)),
            ("\r\n\r\nGET / HTTP/1.1\r\n\r\n",     Some(22)),
            ("\r\n",                               None),
            ("\r\nGET / HTTP/1.1\r\n",             None),
        ];

        for (raw, consumed) in cases {
            let parsed = parse_head(raw.as_bytes(), &limits).unwrap();
            assert_eq!(parsed.map(|(_, n)| n), consumed, "{raw:?}");
        }

        let request = parse!("\r\nPOST /x HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.print_head(), b"POST /x HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn non_utf8_head() {
        let raw = b"GET /\xff HTTP/1.1\r\n\r\n";
        assert_eq!(
            parse_request(raw).map(|_| ()),
            Err(MalformedRequest::InvalidEncoding)
        );
    }

    #[test]
    fn limits() {
        let limits = ReqLimits {
            url_size: 8,
            header_count: 2,
            header_name_size: 8,
            header_value_size: 8,
            body_size: 4,
            ..ReqLimits::default()
        };

        #[rustfmt::skip]
        let cases = [
            ("GET /123456789 HTTP/1.1\r\n\r\n",                      MalformedRequest::TargetTooLong),
            ("GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n",       MalformedRequest::TooManyHeaders),
            ("GET / HTTP/1.1\r\nLong-Name: 1\r\n\r\n",               MalformedRequest::HeadTooLarge),
            ("GET / HTTP/1.1\r\nA: 123456789\r\n\r\n",               MalformedRequest::HeadTooLarge),
            ("POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\n12345",    MalformedRequest::BodyTooLarge),
            ("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\n12345\r\n0\r\n\r\n",
                                                                     MalformedRequest::BodyTooLarge),
        ];

        for (raw, error) in cases {
            assert_eq!(
                parse_request_with(raw.as_bytes(), &limits).map(|_| ()),
                Err(error),
                "{raw:?}"
            );
        }

        let endless = vec![b'a'; limits.max_head_size()];
        assert_eq!(
            parse_head(&endless, &limits).map(|_| ()),
            Err(MalformedRequest::HeadTooLarge)
        );
    }

    #[tokio::test]
    async fn bodies() {
        #[rustfmt::skip]
        let cases = [
            ("GET / HTTP/1.1\r\n\r\nignored",                                           ""),
            ("POST / HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcdef",                      "abc"),
            ("POST / HTTP/1.1\r\nContent-Length: 3, 3\r\n\r\nabc",                      "abc"),
            ("POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n",                            ""),
            ("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2;x=y\r\nde\r\n0\r\n\r\n", "abcde"),
            ("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Length: 1\r\n\r\nA\r\n0123456789\r\n0\r\nX-Sum: 1\r\n\r\n",
                                                                                        "0123456789"),
        ];

        for (raw, body) in cases {
            let request = parse!(raw).unwrap();
            let bytes = request.into_body().into_bytes().await.unwrap();
            assert_eq!(bytes, body.as_bytes(), "{raw:?}");
        }
    }

    #[test]
    fn body_errors() {
        use MalformedRequest::*;

        #[rustfmt::skip]
        let cases = [
            ("POST / HTTP/1.1\r\nContent-Length: x\r\n\r\n",                           InvalidContentLength),
            ("POST / HTTP/1.1\r\nContent-Length: -1\r\n\r\n",                          InvalidContentLength),
            ("POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab",    InvalidContentLength),
            ("POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nab",                         UnexpectedEof),
            ("POST / HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n",                     InvalidChunk),
            ("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n",            InvalidChunk),
            ("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nabc\r\n",      InvalidChunk),
            ("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nab\r\n",       UnexpectedEof),
        ];

        for (raw, error) in cases {
            assert_eq!(parse!(raw).map(|_| ()), Err(error), "{raw:?}");
        }
    }

    #[test]
    fn chunked_incremental() {
        let limits = ReqLimits::default();
        let full = b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\nNEXT";

        for cut in 0..full.len() - 4 {
            assert_eq!(decode_chunked(&full[..cut], &limits), Ok(None), "cut at {cut}");
        }

        let (body, used) = decode_chunked(full, &limits).unwrap().unwrap();
        assert_eq!(body, "Wikipedia");
        assert_eq!(&full[used..], b"NEXT");
    }

    async fn written(response: Response, exchange: Exchange) -> (String, bool) {
        let mut out = Vec::new();
        let mut buffer = Vec::new();
        let keep_alive = write_response(&mut out, &mut buffer, response, exchange, None)
            .await
            .unwrap();

        (String::from_utf8(out).unwrap(), keep_alive)
    }

    const HTTP11: Exchange = Exchange {
        version: Version::Http11,
        head_request: false,
        keep_alive: true,
    };

    #[tokio::test]
    async fn connection_headers() {
        #[rustfmt::skip]
        let cases = [
            (Version::Http11, true,  "HTTP/1.1 204 No Content\r\n\r\n",                          true),
            (Version::Http11, false, "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n",     false),
            (Version::Http10, true,  "HTTP/1.0 204 No Content\r\nConnection: keep-alive\r\n\r\n", true),
            (Version::Http10, false, "HTTP/1.0 204 No Content\r\nConnection: close\r\n\r\n",     false),
        ];

        for (version, keep_alive, expected, still_open) in cases {
            let exchange = Exchange {
                version,
                keep_alive,
                head_request: false,
            };
            let response = Response::new(StatusCode::NoContent).with_body("dropped");

            assert_eq!(written(response, exchange).await, (expected.to_string(), still_open));
        }
    }

    #[tokio::test]
    async fn close_requested_by_take() {
        let response = Response::ok().with_header("Connection", "close");
        let (text, keep_alive) = written(response, HTTP11).await;

        assert!(!keep_alive);
        assert_eq!(text, "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn head_request_has_no_body() {
        let exchange = Exchange {
            head_request: true,
            ..HTTP11
        };
        let (text, _) = written(Response::ok().text("hello"), exchange).await;

        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 5\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn streamed_bodies() {
        let stream = || Body::from_reader(std::io::Cursor::new(b"streamed".to_vec()), None);

        let (text, keep_alive) = written(Response::ok().with_body(stream()), HTTP11).await;
        assert!(keep_alive);
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n8\r\nstreamed\r\n0\r\n\r\n"
        );

        let exchange = Exchange {
            version: Version::Http10,
            ..HTTP11
        };
        let (text, keep_alive) = written(Response::ok().with_body(stream()), exchange).await;
        assert!(!keep_alive);
        assert_eq!(text, "HTTP/1.0 200 OK\r\nConnection: close\r\n\r\nstreamed");

        let sized = Body::from_reader(std::io::Cursor::new(b"sized".to_vec()), Some(5));
        let (text, _) = written(Response::ok().with_body(sized), HTTP11).await;
        assert_eq!(text, "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nsized");
    }

    #[tokio::test]
    async fn short_stream_is_an_error() {
        let short = Body::from_reader(std::io::Cursor::new(b"abc".to_vec()), Some(10));
        let mut out = Vec::new();
        let mut buffer = Vec::new();

        let result = write_response(&mut out, &mut buffer, Response::ok().with_body(short), HTTP11, None).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn read_until_parses_across_reads() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let limits = ReqLimits::default();

        let writer = tokio::spawn(async move {
            client.write_all(b"GET /split HTTP/1.1\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            client.write_all(b"Host: x\r\n\r\n").await.unwrap();
            client
        });

        let mut buf = BytesMut::new();
        let wait = Duration::from_secs(1);
        let (head, used) = read_until(&mut server, &mut buf, wait, wait, |b| parse_head(b, &limits))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(head.target(), "/split");
        assert_eq!(used, buf.len());
        drop(writer.await.unwrap());

        let mut empty = BytesMut::new();
        let closed = read_until(&mut server, &mut empty, wait, wait, |b| parse_head(b, &limits)).await;
        assert!(matches!(closed, Ok(None)));
    }
}
