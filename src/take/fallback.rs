//! Fallbacks: responses for requests a take could not answer.

use crate::{
    http::{request::Head, response::Response, types::StatusCode},
    take::signal::Signal,
};
use std::sync::Arc;

/// A request that ended with [`Signal::NotFound`] or [`Signal::Fault`].
#[derive(Debug, Clone)]
pub struct Failure {
    head: Arc<Head>,
    signal: Signal,
}

impl Failure {
    pub fn new(head: Arc<Head>, signal: Signal) -> Self {
        Self { head, signal }
    }

    /// Head of the failed request.
    #[inline(always)]
    pub fn head(&self) -> &Head {
        &self.head
    }

    #[inline(always)]
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    /// `404` for unmatched requests, the fault status otherwise.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.signal.status()
    }

    pub(crate) fn into_signal(self) -> Signal {
        self.signal
    }
}

/// Produces a response for a [`Failure`], or declines with `None`.
///
/// Closures `Fn(&Failure) -> Option<Response>` are fallbacks too.
pub trait Fallback: Send + Sync {
    fn route(&self, failure: &Failure) -> Option<Response>;
}

impl<F> Fallback for F
where
    F: Fn(&Failure) -> Option<Response> + Send + Sync,
{
    #[inline]
    fn route(&self, failure: &Failure) -> Option<Response> {
        self(failure)
    }
}

/// Handles failures with one particular status.
pub struct FbStatus {
    status: StatusCode,
    make: Box<dyn Fn(&Failure) -> Response + Send + Sync>,
}

impl FbStatus {
    /// Answers failures with `status` using `make`.
    pub fn new<F>(status: StatusCode, make: F) -> Self
    where
        F: Fn(&Failure) -> Response + Send + Sync + 'static,
    {
        Self {
            status,
            make: Box::new(make),
        }
    }

    /// Answers failures with `status` with a plain-text reason phrase.
    pub fn text(status: StatusCode) -> Self {
        Self::new(status, move |_| {
            Response::new(status).text(format!("{}\n", status.reason()))
        })
    }
}

impl Fallback for FbStatus {
    fn route(&self, failure: &Failure) -> Option<Response> {
        match failure.status() == self.status {
            true => Some((self.make)(failure)),
            false => None,
        }
    }
}

/// Tries fallbacks in order; the first one that answers wins.
#[derive(Default)]
pub struct FbChain {
    fallbacks: Vec<Box<dyn Fallback>>,
}

impl FbChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chain with one more fallback at the end.
    pub fn with(mut self, fallback: impl Fallback + 'static) -> Self {
        self.fallbacks.push(Box::new(fallback));
        self
    }
}

impl Fallback for FbChain {
    fn route(&self, failure: &Failure) -> Option<Response> {
        self.fallbacks
            .iter()
            .find_map(|fallback| fallback.route(failure))
    }
}
