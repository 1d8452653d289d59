//! Decorators: takes that wrap another take.

use crate::{
    http::{request::Request, response::Response},
    take::{
        fallback::{Failure, Fallback},
        signal::{Outcome, Signal, Take},
    },
};
use futures_util::{future::BoxFuture, FutureExt};
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

/// Turns [`Signal::Redirect`] into a redirect response with a `Location`
/// header. Every other outcome passes through unchanged.
///
/// # Examples
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use forktake::{Method, Request, StatusCode, Take, TkForward, TkRedirect};
///
/// let take = TkForward::new(TkRedirect::new("/h"));
/// let response = take.act(Request::new(Method::Get, "/")).await.unwrap();
///
/// assert_eq!(response.status(), StatusCode::SeeOther);
/// assert_eq!(response.header("Location"), Some("/h"));
/// # }
/// ```
pub struct TkForward<T> {
    origin: T,
}

impl<T: Take> TkForward<T> {
    pub fn new(origin: T) -> Self {
        Self { origin }
    }
}

impl<T: Take> Take for TkForward<T> {
    fn act(&self, req: Request) -> BoxFuture<'_, Outcome> {
        Box::pin(async move {
            match self.origin.act(req).await {
                Err(Signal::Redirect { location, status }) => {
                    Ok(Response::redirect(location, status))
                }
                other => other,
            }
        })
    }
}

/// Replaces [`Signal::NotFound`] and [`Signal::Fault`] with the response of a
/// [`Fallback`]. When the fallback declines, the signal propagates.
pub struct TkFallback<T, F> {
    origin: T,
    fallback: F,
}

impl<T: Take, F: Fallback> TkFallback<T, F> {
    pub fn new(origin: T, fallback: F) -> Self {
        Self { origin, fallback }
    }
}

impl<T: Take, F: Fallback> Take for TkFallback<T, F> {
    fn act(&self, req: Request) -> BoxFuture<'_, Outcome> {
        let head = Arc::clone(req.head());

        Box::pin(async move {
            match self.origin.act(req).await {
                Err(signal @ (Signal::NotFound | Signal::Fault(_))) => {
                    let failure = Failure::new(head, signal);
                    match self.fallback.route(&failure) {
                        Some(response) => Ok(response),
                        None => Err(failure.into_signal()),
                    }
                }
                other => other,
            }
        })
    }
}

/// Appends fixed header lines to every response of the wrapped take.
pub struct TkWithHeaders<T> {
    origin: T,
    headers: Vec<(String, String)>,
}

impl<T: Take> TkWithHeaders<T> {
    pub fn new<I, N, V>(origin: T, headers: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            origin,
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

impl<T: Take> Take for TkWithHeaders<T> {
    fn act(&self, req: Request) -> BoxFuture<'_, Outcome> {
        Box::pin(async move {
            let response = self.origin.act(req).await?;

            Ok(self
                .headers
                .iter()
                .fold(response, |response, (name, value)| {
                    response.with_header(name.as_str(), value)
                }))
        })
    }
}

/// Converts a panic of the wrapped take into a `500` [`Signal::Fault`].
///
/// The back end already isolates panics per connection; this decorator lets a
/// [`TkFallback`] above it render the failure instead.
pub struct TkSafe<T> {
    origin: T,
}

impl<T: Take> TkSafe<T> {
    pub fn new(origin: T) -> Self {
        Self { origin }
    }
}

impl<T: Take> Take for TkSafe<T> {
    fn act(&self, req: Request) -> BoxFuture<'_, Outcome> {
        Box::pin(async move {
            act_safely(&self.origin, req)
                .await
                .unwrap_or_else(|panic| Err(Signal::fault(panic)))
        })
    }
}

/// Runs `take`, catching panics both while building and while polling its
/// future. `Err` carries the panic message.
pub(crate) async fn act_safely<T>(take: &T, req: Request) -> Result<Outcome, String>
where
    T: Take + ?Sized,
{
    let future = std::panic::catch_unwind(AssertUnwindSafe(|| take.act(req))).map_err(panic_message)?;

    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast_ref::<&'static str>() {
            Some(message) => message.to_string(),
            None => "panic with a non-string payload".to_string(),
        },
    }
}
