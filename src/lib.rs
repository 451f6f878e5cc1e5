//! ## WebDAV protocol handler with a hierarchical lock manager
//!
//! [`Webdav`] (RFC4918) is defined as
//! HTTP (GET/HEAD/PUT/DELETE) plus a bunch of extension methods (PROPFIND, etc).
//! These extension methods are used to manage collections (like unix directories),
//! get information on collections (like unix `ls` or `readdir`), rename and
//! copy items, lock/unlock items, etc.
//!
//! A `handler` is a piece of code that takes a `http::Request`, processes it in some
//! way, and then generates a `http::Response`. This library is a `handler` that maps
//! the HTTP/Webdav protocol onto a [store][DavStore]. Included are a store for the
//! local filesystem ([`LocalFs`]) and an in-memory one ([`MemFs`]).
//!
//! The handler works with the standard http types from the `http` and `http_body`
//! crates, so it can be used straight away with hyper and friends.
//!
//! ## Locking.
//!
//! Client locks (LOCK/UNLOCK) live in a [`ResourceLocks`] manager: a tree of
//! locks that mirrors the resource hierarchy, with exclusive and shared locks,
//! depth-scoped conflict checks and expiry. The same manager hands out
//! short-lived temporary locks that the handler holds while a request runs, so
//! two requests that touch overlapping paths do not interleave.
//!
//! A LOCK on a path that does not exist creates a lock-null resource: it
//! has a lock but no content until a PUT or MKCOL with the lock token turns it
//! into a real resource or folder. An UNLOCK before that removes it again.
//!
//! ## Partial failure.
//!
//! COPY, MOVE and DELETE of a folder keep going when a single child fails.
//! The failures are collected and returned in one 207 Multi-Status response.
//!
//! ## Example.
//!
//! Example server using [hyper] that serves an in-memory store.
//!
//! ```no_run
//! use std::convert::Infallible;
//! use dav_lockserver::{DavHandler, MemFs};
//!
//! #[tokio::main]
//! async fn main() {
//!     let addr = ([127, 0, 0, 1], 4918).into();
//!
//!     let dav_server = DavHandler::builder(MemFs::new()).build();
//!
//!     let make_service = hyper::service::make_service_fn(move |_| {
//!         let dav_server = dav_server.clone();
//!         async move {
//!             let func = move |req| {
//!                 let dav_server = dav_server.clone();
//!                 async move {
//!                     Ok::<_, Infallible>(dav_server.handle(req).await)
//!                 }
//!             };
//!             Ok::<_, Infallible>(hyper::service::service_fn(func))
//!         }
//!     });
//!
//!     println!("Serving on {}", addr);
//!     let _ = hyper::Server::bind(&addr)
//!         .serve(make_service)
//!         .await
//!         .map_err(|e| eprintln!("server error: {}", e));
//! }
//! ```
//!
//! [`Webdav`]: https://tools.ietf.org/html/rfc4918
//! [hyper]: https://hyper.rs/

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod davhandler;
mod davheaders;
mod davstatus;
mod errors;
mod multierror;
mod util;
mod xmltree_ext;

pub mod body;
pub mod davpath;
pub mod fs;
pub mod ls;

#[cfg(test)]
mod tests;

pub(crate) use crate::errors::{DavError, DavResult};

pub use crate::davhandler::{DavBuilder, DavHandler};
pub use crate::davpath::IncludedPath;
pub use crate::fs::{DavStore, FsError, FsResult, StoredObject, Transaction};
#[cfg(any(docsrs, feature = "localfs"))]
pub use crate::fs::localfs::LocalFs;
#[cfg(any(docsrs, feature = "memfs"))]
pub use crate::fs::memfs::MemFs;
pub use crate::ls::{LockedObject, ResourceLocks};
pub use crate::util::DavMethod;
