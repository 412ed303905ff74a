//! Ephemeral in-memory filesystem.
//!
//! This implementation keeps the whole tree in one flat map behind a
//! mutex. Good enough to serve as a webdav backend for tests and for
//! small shares; everything is lost when the process exits.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::FutureExt;
use parking_lot::Mutex;

use super::*;
use crate::davpath::DavPath;

#[derive(Debug, Clone)]
enum MemEntry {
    Dir,
    File { data: Bytes, modified: SystemTime },
}

type Tree = BTreeMap<String, MemEntry>;

/// Ephemeral in-memory filesystem.
pub struct MemFs {
    tree: Arc<Mutex<Tree>>,
}

#[derive(Debug, Clone)]
struct MemFsMeta {
    len: u64,
    is_dir: bool,
    modified: SystemTime,
}

#[derive(Debug)]
struct MemFsFile {
    tree: Arc<Mutex<Tree>>,
    path: String,
    buf: BytesMut,
    pos: usize,
}

impl MemFs {
    /// Create a new "memfs" filesystem.
    pub fn new() -> Arc<MemFs> {
        let mut tree = Tree::new();
        tree.insert("/".to_string(), MemEntry::Dir);
        Arc::new(MemFs {
            tree: Arc::new(Mutex::new(tree)),
        })
    }
}

// canonical map key: no trailing slash, except for the root.
fn key(path: &DavPath) -> String {
    let s = path.as_str();
    if s.len() > 1 {
        s.trim_end_matches('/').to_string()
    } else {
        s.to_string()
    }
}

fn parent_key(k: &str) -> String {
    match k.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => k[..i].to_string(),
    }
}

fn has_dir(tree: &Tree, k: &str) -> bool {
    matches!(tree.get(k), Some(MemEntry::Dir))
}

// keys of `k` and everything below it.
fn subtree_keys(tree: &Tree, k: &str) -> Vec<String> {
    let prefix = if k == "/" {
        "/".to_string()
    } else {
        format!("{k}/")
    };
    tree.keys()
        .filter(|e| *e == k || e.starts_with(&prefix))
        .cloned()
        .collect()
}

impl DavFileSystem for MemFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        async move {
            let tree = self.tree.lock();
            match tree.get(&key(path)) {
                Some(MemEntry::Dir) => Ok(Box::new(MemFsMeta {
                    len: 0,
                    is_dir: true,
                    modified: SystemTime::now(),
                }) as Box<dyn DavMetaData>),
                Some(MemEntry::File { data, modified }) => Ok(Box::new(MemFsMeta {
                    len: data.len() as u64,
                    is_dir: false,
                    modified: *modified,
                }) as Box<dyn DavMetaData>),
                None => Err(FsError::NotFound),
            }
        }
        .boxed()
    }

    fn open<'a>(
        &'a self,
        path: &'a DavPath,
        options: OpenOptions,
    ) -> FsFuture<'a, Box<dyn DavFile>> {
        async move {
            let tree = self.tree.lock();
            let k = key(path);
            let buf = match tree.get(&k) {
                Some(MemEntry::Dir) => return Err(FsError::Forbidden),
                Some(MemEntry::File { data, .. }) => {
                    if options.create_new {
                        return Err(FsError::Exists);
                    }
                    if options.truncate {
                        BytesMut::new()
                    } else {
                        BytesMut::from(&data[..])
                    }
                }
                None => {
                    if !options.create && !options.create_new {
                        return Err(FsError::NotFound);
                    }
                    if !has_dir(&tree, &parent_key(&k)) {
                        return Err(FsError::NotFound);
                    }
                    BytesMut::new()
                }
            };
            Ok(Box::new(MemFsFile {
                tree: self.tree.clone(),
                path: k,
                buf,
                pos: 0,
            }) as Box<dyn DavFile>)
        }
        .boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_dir {path:?}");
            let mut tree = self.tree.lock();
            let k = key(path);
            if tree.contains_key(&k) {
                return Err(FsError::Exists);
            }
            if !has_dir(&tree, &parent_key(&k)) {
                return Err(FsError::NotFound);
            }
            tree.insert(k, MemEntry::Dir);
            Ok(())
        }
        .boxed()
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_file {path:?}");
            let mut tree = self.tree.lock();
            let k = key(path);
            match tree.get(&k) {
                Some(MemEntry::File { .. }) => {
                    tree.remove(&k);
                    Ok(())
                }
                Some(MemEntry::Dir) => Err(FsError::Forbidden),
                None => Err(FsError::NotFound),
            }
        }
        .boxed()
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_dir {path:?}");
            let mut tree = self.tree.lock();
            let k = key(path);
            if !has_dir(&tree, &k) {
                return Err(FsError::NotFound);
            }
            if k == "/" {
                return Err(FsError::Forbidden);
            }
            for sub in subtree_keys(&tree, &k) {
                tree.remove(&sub);
            }
            Ok(())
        }
        .boxed()
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: rename {from:?} {to:?}");
            let mut tree = self.tree.lock();
            let (from_k, to_k) = (key(from), key(to));
            if !tree.contains_key(&from_k) {
                return Err(FsError::NotFound);
            }
            if !has_dir(&tree, &parent_key(&to_k)) {
                return Err(FsError::NotFound);
            }
            // the destination is replaced, subtree included.
            for sub in subtree_keys(&tree, &to_k) {
                tree.remove(&sub);
            }
            for sub in subtree_keys(&tree, &from_k) {
                let entry = tree.remove(&sub).unwrap();
                let new = format!("{}{}", to_k, &sub[from_k.len()..]);
                tree.insert(new, entry);
            }
            Ok(())
        }
        .boxed()
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: copy {from:?} {to:?}");
            let mut tree = self.tree.lock();
            let (from_k, to_k) = (key(from), key(to));
            if !tree.contains_key(&from_k) {
                return Err(FsError::NotFound);
            }
            if !has_dir(&tree, &parent_key(&to_k)) {
                return Err(FsError::NotFound);
            }
            for sub in subtree_keys(&tree, &to_k) {
                tree.remove(&sub);
            }
            for sub in subtree_keys(&tree, &from_k) {
                let entry = tree.get(&sub).unwrap().clone();
                let new = format!("{}{}", to_k, &sub[from_k.len()..]);
                tree.insert(new, entry);
            }
            Ok(())
        }
        .boxed()
    }
}

impl DavFile for MemFsFile {
    fn write_buf(&mut self, mut buf: Box<dyn Buf + Send>) -> FsFuture<()> {
        async move {
            while buf.has_remaining() {
                let b = buf.chunk();
                let n = b.len();
                self.buf.extend_from_slice(b);
                buf.advance(n);
            }
            Ok(())
        }
        .boxed()
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<()> {
        async move {
            self.buf.extend_from_slice(&buf);
            Ok(())
        }
        .boxed()
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<Bytes> {
        async move {
            let end = (self.pos + count).min(self.buf.len());
            let data = Bytes::copy_from_slice(&self.buf[self.pos..end]);
            self.pos = end;
            Ok(data)
        }
        .boxed()
    }

    fn flush(&mut self) -> FsFuture<()> {
        async move {
            let mut tree = self.tree.lock();
            tree.insert(
                self.path.clone(),
                MemEntry::File {
                    data: self.buf.clone().freeze(),
                    modified: SystemTime::now(),
                },
            );
            Ok(())
        }
        .boxed()
    }
}

impl DavMetaData for MemFsMeta {
    fn len(&self) -> u64 {
        self.len
    }
    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.modified)
    }
    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> DavPath {
        DavPath::from_str_and_prefix(s, "").unwrap()
    }

    #[tokio::test]
    async fn create_write_read() {
        let fs = MemFs::new();
        let mut f = fs.open(&path("/a.txt"), OpenOptions::write()).await.unwrap();
        f.write_bytes(Bytes::from("hello")).await.unwrap();
        f.flush().await.unwrap();

        let meta = fs.metadata(&path("/a.txt")).await.unwrap();
        assert_eq!(meta.len(), 5);
        assert!(meta.is_file());

        let mut f = fs.open(&path("/a.txt"), OpenOptions::read()).await.unwrap();
        let data = f.read_bytes(64).await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn open_needs_parent() {
        let fs = MemFs::new();
        let res = fs.open(&path("/no/dir/a.txt"), OpenOptions::write()).await;
        assert!(matches!(res, Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn dirs_and_subtree_removal() {
        let fs = MemFs::new();
        fs.create_dir(&path("/d/")).await.unwrap();
        fs.create_dir(&path("/d/sub/")).await.unwrap();
        let mut f = fs
            .open(&path("/d/sub/x.txt"), OpenOptions::write())
            .await
            .unwrap();
        f.flush().await.unwrap();

        assert!(matches!(
            fs.create_dir(&path("/d/")).await,
            Err(FsError::Exists)
        ));

        fs.remove_dir(&path("/d/")).await.unwrap();
        assert!(fs.metadata(&path("/d/sub/x.txt")).await.is_err());
        assert!(fs.metadata(&path("/d/")).await.is_err());
    }

    #[tokio::test]
    async fn rename_moves_subtree() {
        let fs = MemFs::new();
        fs.create_dir(&path("/src/")).await.unwrap();
        let mut f = fs
            .open(&path("/src/f.txt"), OpenOptions::write())
            .await
            .unwrap();
        f.write_bytes(Bytes::from("x")).await.unwrap();
        f.flush().await.unwrap();

        fs.rename(&path("/src/"), &path("/dst/")).await.unwrap();
        assert!(fs.metadata(&path("/src/")).await.is_err());
        assert!(fs.metadata(&path("/dst/f.txt")).await.is_ok());
    }
}
