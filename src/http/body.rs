//! Single-pass message bodies.

use bytes::Bytes;
use std::{fmt, io, pin::Pin};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Boxed byte source behind a streamed [`Body`].
pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// Body of a request or a response.
///
/// A body is read at most once: every way of reading it consumes the value.
/// Decorators that need to look at a body and still forward it call
/// [`Body::into_bytes`] and rebuild the message from the buffer.
pub struct Body {
    kind: Kind,
}

enum Kind {
    Empty,
    Full(Bytes),
    Stream {
        reader: BodyReader,
        length: Option<u64>,
    },
}

impl Body {
    /// A body without content.
    #[inline]
    pub const fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// Wraps a reader. `length` is the exact number of bytes it yields, if known;
    /// unknown-length bodies are sent chunked (HTTP/1.1) or close-delimited (HTTP/1.0).
    pub fn from_reader<R>(reader: R, length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            kind: Kind::Stream {
                reader: Box::pin(reader),
                length,
            },
        }
    }

    /// Length in bytes, when it is known without reading.
    #[inline]
    pub fn len(&self) -> Option<u64> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Full(bytes) => Some(bytes.len() as u64),
            Kind::Stream { length, .. } => *length,
        }
    }

    /// `true` only if the body is known to be empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Reads the whole body into memory.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Full(bytes) => Ok(bytes),
            Kind::Stream { mut reader, length } => {
                let hint = length.unwrap_or(0).min(64 * 1024) as usize;
                let mut buffer = Vec::with_capacity(hint);
                reader.read_to_end(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
        }
    }

    /// Reads the whole body and checks that it is UTF-8.
    pub async fn into_string(self) -> io::Result<String> {
        let bytes = self.into_bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Turns the body into a reader.
    pub fn into_reader(self) -> BodyReader {
        match self.kind {
            Kind::Empty => Box::pin(io::Cursor::new(Bytes::new())),
            Kind::Full(bytes) => Box::pin(io::Cursor::new(bytes)),
            Kind::Stream { reader, .. } => reader,
        }
    }

    #[inline]
    pub(crate) fn as_full(&self) -> Option<&[u8]> {
        match &self.kind {
            Kind::Empty => Some(&[]),
            Kind::Full(bytes) => Some(bytes),
            Kind::Stream { .. } => None,
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("Body::Empty"),
            Kind::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Kind::Stream { length, .. } => {
                f.debug_struct("Body::Stream").field("length", length).finish()
            }
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        match bytes.is_empty() {
            true => Self::empty(),
            false => Self {
                kind: Kind::Full(bytes),
            },
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Bytes::from_static(bytes).into()
    }
}
