//! URL query string parsing.

use memchr::memchr;
use std::borrow::Cow;

/// View over a raw query string (`a=1&b=2`).
///
/// Pairs are split lazily; nothing is allocated unless a value needs
/// percent-decoding. Parameter order is kept and duplicates are allowed.
///
/// # Examples
/// ```rust
/// use forktake::query::Query;
///
/// let query = Query::new("?debug&name=&=Qwe&key=a%20b&&");
/// let pairs: Vec<_> = query.pairs().collect();
///
/// assert_eq!(pairs, [("debug", ""), ("name", ""), ("", "Qwe"), ("key", "a%20b"), ("", "")]);
/// assert_eq!(query.get("key").as_deref(), Some("a b"));
/// assert_eq!(query.get("missing"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query<'a> {
    raw: &'a str,
}

impl<'a> Query<'a> {
    /// Wraps a query string; a leading `?` is ignored.
    #[inline]
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw: raw.strip_prefix('?').unwrap_or(raw),
        }
    }

    /// The query string without the leading `?`.
    #[inline]
    pub fn as_str(&self) -> &'a str {
        self.raw
    }

    /// `true` if there are no parameters at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Raw `(name, value)` pairs; a parameter without `=` has an empty value.
    #[inline]
    pub fn pairs(&self) -> Pairs<'a> {
        Pairs { rest: self.raw }
    }

    /// Decoded value of the first parameter called `name`.
    pub fn get(&self, name: &str) -> Option<Cow<'a, str>> {
        self.pairs()
            .find(|(key, _)| decode(key) == name)
            .map(|(_, value)| decode(value))
    }

    /// Decoded values of every parameter called `name`, in order.
    pub fn get_all<'n>(&self, name: &'n str) -> impl Iterator<Item = Cow<'a, str>> + 'n
    where
        'a: 'n,
    {
        self.pairs()
            .filter(move |(key, _)| decode(key) == name)
            .map(|(_, value)| decode(value))
    }
}

/// Iterator returned by [`Query::pairs`].
#[derive(Debug, Clone)]
pub struct Pairs<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Pairs<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let bytes = self.rest.as_bytes();
        let end = memchr(b'&', bytes).unwrap_or(bytes.len());
        let segment = &self.rest[..end];
        self.rest = self.rest.get(end + 1..).unwrap_or("");

        Some(match memchr(b'=', segment.as_bytes()) {
            Some(index) => (&segment[..index], &segment[index + 1..]),
            None => (segment, ""),
        })
    }
}

/// Decodes `application/x-www-form-urlencoded` text: `+` becomes a space and
/// `%XX` escapes are resolved. Broken escapes are kept verbatim and invalid
/// UTF-8 is replaced.
pub fn decode(raw: &str) -> Cow<'_, str> {
    let bytes = raw.as_bytes();
    if memchr::memchr2(b'%', b'+', bytes).is_none() {
        return Cow::Borrowed(raw);
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => match (hex(bytes.get(i + 1)), hex(bytes.get(i + 2))) {
                (Some(high), Some(low)) => {
                    out.push(high << 4 | low);
                    i += 2;
                }
                _ => out.push(b'%'),
            },
            byte => out.push(byte),
        }
        i += 1;
    }

    match String::from_utf8(out) {
        Ok(text) => Cow::Owned(text),
        Err(e) => Cow::Owned(String::from_utf8_lossy(e.as_bytes()).into_owned()),
    }
}

#[inline(always)]
fn hex(byte: Option<&u8>) -> Option<u8> {
    match byte? {
        b @ b'0'..=b'9' => Some(b - b'0'),
        b @ b'a'..=b'f' => Some(b - b'a' + 10),
        b @ b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
