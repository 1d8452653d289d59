//! Takes that produce responses themselves.

use crate::{
    http::{request::Request, response::Response, types::StatusCode},
    take::signal::{Outcome, Signal, Take},
};
use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use std::future::Future;

/// Take backed by an async closure.
///
/// # Examples
/// ```
/// use forktake::{Response, Signal, TkFn};
///
/// let echo = TkFn::new(|req| async move {
///     let body = req.into_body().into_bytes().await?;
///     Ok::<_, Signal>(Response::ok().with_body(body))
/// });
/// ```
pub struct TkFn<F> {
    func: F,
}

impl<F, Fut> TkFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> Take for TkFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn act(&self, req: Request) -> BoxFuture<'_, Outcome> {
        Box::pin((self.func)(req))
    }
}

/// Answers every request with a response made by `make`, ignoring the request.
pub struct TkFixed<F> {
    make: F,
}

impl<F> TkFixed<F>
where
    F: Fn() -> Response + Send + Sync,
{
    pub fn new(make: F) -> Self {
        Self { make }
    }
}

impl<F> Take for TkFixed<F>
where
    F: Fn() -> Response + Send + Sync,
{
    fn act(&self, _req: Request) -> BoxFuture<'_, Outcome> {
        Box::pin(future::ready(Ok((self.make)())))
    }
}

/// `200 OK` with a fixed HTML page.
#[derive(Debug, Clone)]
pub struct TkHtml {
    page: Bytes,
}

impl TkHtml {
    pub fn new(page: impl Into<Bytes>) -> Self {
        Self { page: page.into() }
    }
}

impl Take for TkHtml {
    fn act(&self, _req: Request) -> BoxFuture<'_, Outcome> {
        let response = Response::ok()
            .with_type("text/html; charset=utf-8")
            .with_body(self.page.clone());

        Box::pin(future::ready(Ok(response)))
    }
}

/// `200 OK` with fixed plain text.
#[derive(Debug, Clone)]
pub struct TkText {
    text: Bytes,
}

impl TkText {
    pub fn new(text: impl Into<Bytes>) -> Self {
        Self { text: text.into() }
    }
}

impl Take for TkText {
    fn act(&self, _req: Request) -> BoxFuture<'_, Outcome> {
        let response = Response::ok()
            .with_type("text/plain; charset=utf-8")
            .with_body(self.text.clone());

        Box::pin(future::ready(Ok(response)))
    }
}

/// Always signals a redirect; wrap the tree in [`TkForward`](crate::TkForward)
/// to turn it into a response.
#[derive(Debug, Clone)]
pub struct TkRedirect {
    location: String,
    status: StatusCode,
}

impl TkRedirect {
    /// `303 See Other` to `location`.
    pub fn new(location: impl Into<String>) -> Self {
        Self::with_status(location, StatusCode::SeeOther)
    }

    pub fn with_status(location: impl Into<String>, status: StatusCode) -> Self {
        Self {
            location: location.into(),
            status,
        }
    }
}

impl Take for TkRedirect {
    fn act(&self, _req: Request) -> BoxFuture<'_, Outcome> {
        let signal = Signal::redirect_with(self.location.clone(), self.status);
        Box::pin(future::ready(Err(signal)))
    }
}
