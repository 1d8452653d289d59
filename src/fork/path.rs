//! Forks matching the request target with regular expressions.

use crate::{
    errors::Error,
    fork::chain::{Fork, Routed},
    http::request::Request,
    take::signal::Take,
};
use regex::Regex;

fn anchored(pattern: &str) -> Result<Regex, Error> {
    Ok(Regex::new(&format!("^(?:{pattern})$"))?)
}

/// Matches the whole request path against a regular expression.
///
/// The pattern is anchored at both ends, so `/users` does not match
/// `/users/7`. A single trailing slash on the path is ignored unless
/// [`strict`](FkRegex::strict) is set. Named groups become request
/// parameters, readable with [`Request::param`].
///
/// # Examples
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use forktake::{FkRegex, Method, Request, Response, Take, TkFn, TkFork};
///
/// let take = TkFork::new().fork(
///     FkRegex::new(r"/users/(?<id>\d+)", TkFn::new(|req: Request| async move {
///         Ok(Response::ok().text(format!("user {}", req.param("id").unwrap_or("?"))))
///     }))
///     .unwrap(),
/// );
///
/// let response = take.act(Request::new(Method::Get, "/users/42/")).await.unwrap();
/// assert_eq!(response.into_body().into_string().await.unwrap(), "user 42");
/// # }
/// ```
pub struct FkRegex {
    pattern: Regex,
    strict: bool,
    take: Box<dyn Take>,
}

impl FkRegex {
    /// Fails with [`Error::Pattern`] if the expression does not compile.
    pub fn new(pattern: &str, take: impl Take + 'static) -> Result<Self, Error> {
        Ok(Self {
            pattern: anchored(pattern)?,
            strict: false,
            take: Box::new(take),
        })
    }

    /// Makes a trailing slash significant.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl Fork for FkRegex {
    fn route(&self, req: Request) -> Routed<'_> {
        let path = match (self.strict, req.path()) {
            (false, path) if path.len() > 1 => path.strip_suffix('/').unwrap_or(path),
            (_, path) => path,
        };

        let params = self.pattern.captures(path).map(|caps| {
            self.pattern
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|value| (name.to_string(), value.as_str().to_string()))
                })
                .collect::<Vec<_>>()
        });

        match params {
            Some(params) => Routed::To(self.take.as_ref(), req.with_params(params)),
            None => Routed::Skip(req),
        }
    }
}

/// Matches when a query parameter is present and its decoded value matches
/// an anchored regular expression.
pub struct FkParams {
    name: String,
    pattern: Regex,
    take: Box<dyn Take>,
}

impl FkParams {
    pub fn new(name: impl Into<String>, pattern: &str, take: impl Take + 'static) -> Result<Self, Error> {
        Ok(Self {
            name: name.into(),
            pattern: anchored(pattern)?,
            take: Box::new(take),
        })
    }
}

impl Fork for FkParams {
    fn route(&self, req: Request) -> Routed<'_> {
        let matched = req
            .query()
            .get_all(&self.name)
            .any(|value| self.pattern.is_match(&value));

        match matched {
            true => Routed::To(self.take.as_ref(), req),
            false => Routed::Skip(req),
        }
    }
}
