use crate::http::{request::Request, response::Response, types::StatusCode};
use futures_util::future::BoxFuture;
use std::{fmt, io, sync::Arc};
use thiserror::Error;

/// What a [`Take`] produces: a response or a [`Signal`].
pub type Outcome = Result<Response, Signal>;

/// A request handler: turns a [`Request`] into a [`Response`].
///
/// Takes are built once, shared by every worker behind an [`Arc`], and must
/// not keep per-request state. Instead of a response a take may return a
/// [`Signal`] that an enclosing decorator ([`TkForward`](crate::TkForward),
/// [`TkFallback`](crate::TkFallback)) or the back end turns into one.
///
/// # Examples
/// ```
/// use forktake::{BoxFuture, Outcome, Request, Response, Take};
///
/// struct Hello;
///
/// impl Take for Hello {
///     fn act(&self, req: Request) -> BoxFuture<'_, Outcome> {
///         Box::pin(async move { Ok(Response::ok().text(format!("hello, {}", req.path()))) })
///     }
/// }
/// ```
///
/// Closures can be used through [`TkFn`](crate::TkFn).
pub trait Take: Send + Sync {
    /// Handles one request.
    fn act(&self, req: Request) -> BoxFuture<'_, Outcome>;
}

impl<T: Take + ?Sized> Take for Box<T> {
    #[inline]
    fn act(&self, req: Request) -> BoxFuture<'_, Outcome> {
        (**self).act(req)
    }
}

impl<T: Take + ?Sized> Take for Arc<T> {
    #[inline]
    fn act(&self, req: Request) -> BoxFuture<'_, Outcome> {
        (**self).act(req)
    }
}

/// Non-response outcome of a [`Take`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Signal {
    /// Send the client elsewhere; answered by [`TkForward`](crate::TkForward).
    #[error("redirect to {location} ({status})")]
    Redirect {
        location: String,
        status: StatusCode,
    },

    /// No fork matched the request.
    #[error("no route matched")]
    NotFound,

    /// The take failed.
    #[error(transparent)]
    Fault(Fault),
}

impl Signal {
    /// `303 See Other` redirect.
    #[inline]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::redirect_with(location, StatusCode::SeeOther)
    }

    /// Redirect with another `3xx` code.
    #[inline]
    pub fn redirect_with(location: impl Into<String>, status: StatusCode) -> Self {
        Signal::Redirect {
            location: location.into(),
            status,
        }
    }

    /// `500 Internal Server Error` fault.
    #[inline]
    pub fn fault(detail: impl Into<String>) -> Self {
        Signal::Fault(Fault::new(StatusCode::InternalServerError, detail))
    }

    /// Fault answered with `status`.
    #[inline]
    pub fn fault_with(status: StatusCode, detail: impl Into<String>) -> Self {
        Signal::Fault(Fault::new(status, detail))
    }

    /// Status the back end answers with when nothing handles the signal.
    ///
    /// An uncaught redirect is a wiring mistake and counts as `500`.
    pub fn status(&self) -> StatusCode {
        match self {
            Signal::Redirect { .. } => StatusCode::InternalServerError,
            Signal::NotFound => StatusCode::NotFound,
            Signal::Fault(fault) => fault.status,
        }
    }
}

impl From<io::Error> for Signal {
    fn from(err: io::Error) -> Self {
        Signal::fault(err.to_string())
    }
}

impl From<Fault> for Signal {
    fn from(fault: Fault) -> Self {
        Signal::Fault(fault)
    }
}

/// Failure inside a take: a status to answer with and a detail for the logs.
///
/// The detail is never sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    status: StatusCode,
    detail: String,
}

impl Fault {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    #[inline(always)]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline(always)]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.detail)
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        #[rustfmt::skip]
        let cases = [
            (Signal::redirect("/h"),                                StatusCode::InternalServerError),
            (Signal::NotFound,                                      StatusCode::NotFound),
            (Signal::fault("boom"),                                 StatusCode::InternalServerError),
            (Signal::fault_with(StatusCode::BadGateway, "upstream"), StatusCode::BadGateway),
        ];

        for (signal, status) in cases {
            assert_eq!(signal.status(), status, "{signal}");
        }
    }

    #[test]
    fn redirect_defaults_to_see_other() {
        assert_eq!(
            Signal::redirect("/h"),
            Signal::Redirect {
                location: "/h".into(),
                status: StatusCode::SeeOther
            }
        );
    }

    #[test]
    fn io_errors_become_faults() {
        let signal: Signal = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert_eq!(signal.to_string(), "500 Internal Server Error: disk");
    }
}
