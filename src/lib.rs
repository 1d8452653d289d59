//! forktake - immutable-object HTTP server toolkit
//!
//! A request is parsed into an immutable [`Request`], dispatched through a
//! graph of [`Take`]s (handlers) selected by [`Fork`]s (routing predicates),
//! and the immutable [`Response`] is printed back onto the socket.
//!
//! # Building blocks
//!
//! - **Takes** turn a request into a response or a [`Signal`]: leaves such as
//!   [`TkText`], [`TkHtml`], [`TkFn`], and decorators such as [`TkForward`]
//!   (redirect signals to responses) and [`TkFallback`] (failures to
//!   responses).
//! - **Forks** pair a predicate with a take: [`FkRegex`], [`FkMethods`],
//!   [`FkHeader`], [`FkParams`], [`FkHost`], [`FkTypes`],
//!   [`FkContentType`], [`FkFixed`]. [`TkFork`] tries them in order; the
//!   first match wins.
//! - **Back end**: [`Server`] binds a socket and serves connections with a
//!   fixed pool of workers. [`FrontEnd`] runs several back ends.
//!
//! # Protocol Support
//!
//! - **HTTP/1.1**: persistent connections, chunked request and response bodies,
//!   `Expect: 100-continue`
//! - **HTTP/1.0**: keep-alive on request, close-delimited streamed bodies
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use forktake::{
//!     FbStatus, FkFixed, FkRegex, Server, StatusCode, TkFallback, TkFork, TkForward,
//!     TkHtml, TkRedirect,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), forktake::Error> {
//!     let take = TkFallback::new(
//!         TkForward::new(
//!             TkFork::new()
//!                 .fork(FkRegex::new("/", TkHtml::new("<html>home</html>"))?)
//!                 .fork(FkRegex::new("/old", TkRedirect::new("/"))?),
//!         ),
//!         FbStatus::text(StatusCode::NotFound),
//!     );
//!
//!     let mut running = Server::builder().take(take).build()?.start()?;
//!     println!("listening on {}", running.local_addr());
//!
//!     tokio::signal::ctrl_c().await?;
//!     running.stop().await
//! }
//! ```
//!
//! Takes can be exercised without a socket:
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use forktake::{parse_request, FkRegex, Take, TkFork, TkText};
//!
//! let take = TkFork::new().fork(FkRegex::new("/f", TkText::new("f")).unwrap());
//! let request = parse_request(b"GET /f HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
//!
//! let printed = take.act(request).await.unwrap().print().await.unwrap();
//! assert!(printed.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! # }
//! ```

pub(crate) mod http {
    pub(crate) mod body;
    pub(crate) mod media;
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
    pub(crate) mod wire;
}
pub(crate) mod take {
    pub(crate) mod decor;
    pub(crate) mod fallback;
    pub(crate) mod leaf;
    pub(crate) mod signal;
}
pub(crate) mod fork {
    pub(crate) mod chain;
    pub(crate) mod header;
    pub(crate) mod media;
    pub(crate) mod path;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod front;
    pub(crate) mod server_impl;
    pub(crate) mod socket;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    errors::{Error, MalformedRequest},
    fork::{
        chain::{FkChain, FkFixed, Fork, Routed, TkFork},
        header::{FkHeader, FkHost, FkMethods},
        media::{FkContentType, FkTypes},
        path::{FkParams, FkRegex},
    },
    http::{
        body::{Body, BodyReader},
        media::{quality_of, MediaRange, MediaType},
        query,
        request::{Head, Request},
        response::Response,
        types::{Headers, Method, StatusCode, Version},
        wire::{parse_request, parse_request_with},
    },
    server::{
        front::FrontEnd,
        server_impl::{Running, Server, ServerBuilder, State, Stopper},
        socket::{BackEndConfig, Plain, Wrap},
    },
    take::{
        decor::{TkFallback, TkForward, TkSafe, TkWithHeaders},
        fallback::{Failure, Fallback, FbChain, FbStatus},
        leaf::{TkFixed, TkFn, TkHtml, TkRedirect, TkText},
        signal::{Fault, Outcome, Signal, Take},
    },
};
pub use futures_util::future::BoxFuture;
