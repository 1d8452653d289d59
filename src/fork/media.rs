//! Forks driven by media types: `Accept` negotiation and request
//! `Content-Type`.

use crate::{
    errors::Error,
    fork::chain::{Fork, Routed},
    http::{
        media::{quality_of, MediaRange, MediaType},
        request::Request,
    },
    take::signal::Take,
};

/// Content negotiation over the `Accept` header.
///
/// Each variant is a concrete media type with its take. The variant with the
/// highest client quality wins; equal qualities keep declaration order and a
/// quality of zero excludes the variant. A request without `Accept` takes the
/// first variant.
///
/// # Examples
/// ```
/// use forktake::{FkTypes, Fork, Method, Request, Routed, TkText};
///
/// let fork = FkTypes::new()
///     .with("text/html", TkText::new("<p>hi</p>"))
///     .unwrap()
///     .with("application/json", TkText::new("{}"))
///     .unwrap();
///
/// let req = Request::new(Method::Get, "/").with_header("Accept", "application/json");
/// assert!(matches!(fork.route(req), Routed::To(..)));
///
/// let req = Request::new(Method::Get, "/").with_header("Accept", "image/png");
/// assert!(matches!(fork.route(req), Routed::Skip(..)));
/// ```
#[derive(Default)]
pub struct FkTypes {
    variants: Vec<(MediaType, Box<dyn Take>)>,
}

impl FkTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variant. Fails with [`Error::Config`] when `media` is not a
    /// concrete `type/subtype`.
    pub fn with(mut self, media: &str, take: impl Take + 'static) -> Result<Self, Error> {
        let media = MediaType::parse(media)
            .filter(|media| media.kind() != "*" && media.subtype() != "*")
            .ok_or(Error::Config("variant media type must be a concrete type/subtype"))?;

        self.variants.push((media, Box::new(take)));
        Ok(self)
    }
}

impl Fork for FkTypes {
    fn route(&self, req: Request) -> Routed<'_> {
        let ranges = req.accept();

        let mut best: Option<(u16, &dyn Take)> = None;
        for (media, take) in &self.variants {
            let quality = quality_of(&ranges, media);
            if quality > best.map_or(0, |(q, _)| q) {
                best = Some((quality, take.as_ref()));
            }
        }

        match best {
            Some((_, take)) => Routed::To(take, req),
            None => Routed::Skip(req),
        }
    }
}

/// Matches the media type of the request body.
///
/// The pattern is a media range such as `application/json` or `text/*`;
/// parameters of the request header (`charset`) are ignored.
pub struct FkContentType {
    range: MediaRange,
    take: Box<dyn Take>,
}

impl FkContentType {
    /// Fails with [`Error::Config`] when `range` does not parse.
    pub fn new(range: &str, take: impl Take + 'static) -> Result<Self, Error> {
        let range = MediaRange::parse(range)
            .ok_or(Error::Config("content type must be a media range"))?;

        Ok(Self {
            range,
            take: Box::new(take),
        })
    }
}

impl Fork for FkContentType {
    fn route(&self, req: Request) -> Routed<'_> {
        let matched = req
            .content_type()
            .is_some_and(|media| self.range.matches(&media));

        match matched {
            true => Routed::To(self.take.as_ref(), req),
            false => Routed::Skip(req),
        }
    }
}
