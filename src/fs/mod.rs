//! Filesystem interface: the resource tree the handler serves.
//!
//! The handler only needs a small surface: existence checks, open with
//! create (LOCK on an unmapped url creates an empty resource), and the
//! tree operations behind MKCOL/DELETE/COPY/MOVE. One backend is
//! included, the ephemeral in-memory [`MemFs`][memfs::MemFs].

use std::fmt::Debug;
use std::io;
use std::time::SystemTime;

use bytes::{Buf, Bytes};
use futures_util::future::BoxFuture;

use crate::davpath::DavPath;

pub mod memfs;

/// Errors returned by the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotImplemented,
    GeneralFailure,
    Exists,
    NotFound,
    Forbidden,
}

pub type FsResult<T> = Result<T, FsError>;

/// Convenience alias for the boxed futures the filesystem methods return.
pub type FsFuture<'a, T> = BoxFuture<'a, FsResult<T>>;

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::AlreadyExists => FsError::Exists,
            io::ErrorKind::PermissionDenied => FsError::Forbidden,
            _ => FsError::GeneralFailure,
        }
    }
}

/// Options for [`DavFileSystem::open`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub create_new: bool,
    pub truncate: bool,
}

impl OpenOptions {
    pub fn read() -> OpenOptions {
        OpenOptions {
            read: true,
            ..Default::default()
        }
    }

    pub fn write() -> OpenOptions {
        OpenOptions {
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }
}

/// The filesystem backend the handler talks to.
pub trait DavFileSystem: Send + Sync + 'static {
    /// Metadata of the resource at `path`.
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>>;

    /// Open (or create) the file at `path`.
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions)
        -> FsFuture<'a, Box<dyn DavFile>>;

    /// Create a collection.
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Remove a file.
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Remove a collection and everything below it.
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Rename a file or collection.
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()>;

    /// Copy a file or collection (recursively).
    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()>;
}

/// An open file handle.
pub trait DavFile: Debug + Send {
    fn write_buf(&mut self, buf: Box<dyn Buf + Send>) -> FsFuture<()>;
    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<()>;
    fn read_bytes(&mut self, count: usize) -> FsFuture<Bytes>;
    fn flush(&mut self) -> FsFuture<()>;
}

/// Metadata of a file or collection.
pub trait DavMetaData: Debug + Send + Sync {
    fn len(&self) -> u64;
    fn modified(&self) -> FsResult<SystemTime>;
    fn is_dir(&self) -> bool;

    fn is_file(&self) -> bool {
        !self.is_dir()
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
