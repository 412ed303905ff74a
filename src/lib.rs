//! ## Generic async Webdav handler with class 2 locking
//!
//! [`Webdav`] (RFC4918) is defined as
//! HTTP (GET/HEAD/PUT/DELETE) plus a bunch of extension methods (PROPFIND, etc).
//! These extension methods are used to manage collections (like unix directories),
//! rename and copy items, and lock/unlock items. The heart of this library is
//! the class 2 locking subsystem: LOCK/UNLOCK handling, `If` header evaluation,
//! and the lock validation stage that every state-changing request passes
//! through before its own handler runs.
//!
//! A `handler` is a piece of code that takes a `http::Request`, processes it in some
//! way, and then generates a `http::Response`. This library is a `handler` that maps
//! the HTTP/Webdav protocol to a filesystem and a locksystem behind trait
//! objects, so it can be used with HTTP servers like hyper, warp, actix-web, etc.
//!
//! ## Backend interfaces.
//!
//! - the library contains a [HTTP handler][DavHandler].
//! - you supply a [filesystem][DavFileSystem] for backend storage.
//! - you can supply a [locksystem][DavLockSystem] that handles webdav locks.
//!
//! Included backends:
//!
//! - [`MemFs`][fs::memfs::MemFs]: ephemeral in-memory filesystem.
//! - [`MemLs`][ls::memls::MemLs]: ephemeral in-memory locksystem.
//! - [`FakeLs`][ls::fakels::FakeLs]: fake locksystem. just enough LOCK/UNLOCK
//!   support for macOS/Windows.
//!
//! ## Example.
//!
//! ```
//! use lockdav::{DavHandler, fs::memfs::MemFs, ls::memls::MemLs};
//!
//! let dav_server = DavHandler::builder(MemFs::new())
//!     .locksystem(MemLs::new())
//!     .strip_prefix("/dav")
//!     .build();
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod conditional;
mod davhandler;
mod davheaders;
mod errors;
mod util;
mod xmltree_ext;

pub mod body;
pub mod davpath;
pub mod fs;
pub mod ls;

use crate::errors::DavResult;

pub use crate::davhandler::{DavBuilder, DavHandler};
pub use crate::util::{DavMethod, DavMethodSet};
