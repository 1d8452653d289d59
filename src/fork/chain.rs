use crate::{
    http::request::Request,
    take::signal::{Outcome, Signal, Take},
};
use futures_util::future::{self, BoxFuture};

/// Result of asking a [`Fork`] about a request.
pub enum Routed<'a> {
    /// The fork matched: run this take on the (possibly enriched) request.
    To(&'a dyn Take, Request),
    /// No match; the request is handed back untouched.
    Skip(Request),
}

/// Routing predicate paired with the take it routes to.
///
/// A fork owns the request while deciding and either routes it or gives it
/// back, so a chain can try the next fork without cloning anything. Forks
/// hold only immutable configuration.
pub trait Fork: Send + Sync {
    fn route(&self, req: Request) -> Routed<'_>;
}

impl<T: Fork + ?Sized> Fork for Box<T> {
    #[inline]
    fn route(&self, req: Request) -> Routed<'_> {
        (**self).route(req)
    }
}

/// Ordered forks; the first one that matches wins.
///
/// # Examples
/// ```
/// use forktake::{FkChain, FkFixed, FkRegex, Fork, Method, Request, Routed, TkText};
///
/// let chain = FkChain::new()
///     .fork(FkRegex::new("/a", TkText::new("a")).unwrap())
///     .fork(FkFixed::new(TkText::new("anything else")));
///
/// assert!(matches!(chain.route(Request::new(Method::Get, "/zzz")), Routed::To(..)));
/// ```
#[derive(Default)]
pub struct FkChain {
    forks: Vec<Box<dyn Fork>>,
}

impl FkChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chain with `fork` appended after the existing ones.
    pub fn fork(mut self, fork: impl Fork + 'static) -> Self {
        self.forks.push(Box::new(fork));
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.forks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.forks.is_empty()
    }
}

impl Fork for FkChain {
    fn route(&self, mut req: Request) -> Routed<'_> {
        for fork in &self.forks {
            match fork.route(req) {
                Routed::To(take, routed) => return Routed::To(take, routed),
                Routed::Skip(back) => req = back,
            }
        }

        Routed::Skip(req)
    }
}

/// Matches every request. Put it last as a safety net.
pub struct FkFixed {
    take: Box<dyn Take>,
}

impl FkFixed {
    pub fn new(take: impl Take + 'static) -> Self {
        Self {
            take: Box::new(take),
        }
    }
}

impl Fork for FkFixed {
    #[inline]
    fn route(&self, req: Request) -> Routed<'_> {
        Routed::To(self.take.as_ref(), req)
    }
}

/// Take that dispatches through an [`FkChain`]; no match becomes
/// [`Signal::NotFound`].
///
/// # Examples
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use forktake::{FkRegex, Method, Request, Signal, Take, TkFork, TkText};
///
/// let take = TkFork::new()
///     .fork(FkRegex::new("/f", TkText::new("f")).unwrap());
///
/// let missing = take.act(Request::new(Method::Get, "/g")).await;
/// assert_eq!(missing.unwrap_err(), Signal::NotFound);
/// # }
/// ```
#[derive(Default)]
pub struct TkFork {
    chain: FkChain,
}

impl TkFork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chain(chain: FkChain) -> Self {
        Self { chain }
    }

    /// Returns the take with `fork` appended.
    pub fn fork(self, fork: impl Fork + 'static) -> Self {
        Self {
            chain: self.chain.fork(fork),
        }
    }
}

impl Take for TkFork {
    fn act(&self, req: Request) -> BoxFuture<'_, Outcome> {
        match self.chain.route(req) {
            Routed::To(take, req) => take.act(req),
            Routed::Skip(_) => Box::pin(future::ready(Err(Signal::NotFound))),
        }
    }
}
