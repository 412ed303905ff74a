//! Path type for the request uri, with the handler prefix stripped off.
//!
//! A `DavPath` is always absolute, percent-decoded, and normalized. A
//! trailing slash is kept, since in webdav it distinguishes a collection
//! from a plain resource.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::errors::DavError;
use crate::DavResult;

// characters we percent-encode when generating an url from a path.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// URL path, stripped of the handler prefix, decoded and normalized.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DavPath {
    path: String,
    prefix: String,
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl fmt::Debug for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.with_prefix())
    }
}

impl DavPath {
    /// Create a `DavPath` from a percent-encoded url path and a prefix.
    pub(crate) fn from_str_and_prefix(rp: &str, prefix: &str) -> DavResult<DavPath> {
        // "*" is only valid for OPTIONS.
        if rp == "*" {
            return Ok(DavPath {
                path: "*".to_string(),
                prefix: prefix.to_string(),
            });
        }
        let rp = rp.split(['?', '#']).next().unwrap_or(rp);
        let decoded = percent_decode_str(rp)
            .decode_utf8()
            .map_err(|_| DavError::InvalidPath)?;
        if !decoded.starts_with('/') {
            return Err(DavError::InvalidPath);
        }

        // strip the prefix.
        let prefix = prefix.trim_end_matches('/');
        let rest = decoded
            .strip_prefix(prefix)
            .ok_or(DavError::InvalidPath)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return Err(DavError::InvalidPath);
        }
        let rest = if rest.is_empty() { "/" } else { rest };

        // normalize: resolve "." and empty segments, refuse ".." outright.
        let is_collection = rest.ends_with('/');
        let mut segments = Vec::new();
        for segment in rest.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(DavError::InvalidPath),
                s => segments.push(s),
            }
        }
        let mut path = String::from("/");
        path.push_str(&segments.join("/"));
        if is_collection && path.len() > 1 {
            path.push('/');
        }

        Ok(DavPath {
            path,
            prefix: prefix.to_string(),
        })
    }

    /// Create a `DavPath` from a request uri and a prefix.
    pub(crate) fn from_uri_and_prefix(uri: &http::Uri, prefix: &str) -> DavResult<DavPath> {
        DavPath::from_str_and_prefix(uri.path(), prefix)
    }

    /// Is this a URL for a collection (i.e. has a trailing slash).
    pub fn is_collection(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Is this the `*` OPTIONS target.
    pub fn is_star(&self) -> bool {
        self.path == "*"
    }

    /// Add a trailing slash.
    pub(crate) fn add_slash(&mut self) {
        if !self.is_collection() {
            self.path.push('/');
        }
    }

    /// The parent of this path (the root is its own parent).
    pub fn parent(&self) -> DavPath {
        let trimmed = self.path.trim_end_matches('/');
        let path = match trimmed.rfind('/') {
            Some(i) => &trimmed[..i + 1],
            None => "/",
        };
        DavPath {
            path: path.to_string(),
            prefix: self.prefix.clone(),
        }
    }

    /// Does `self` sit strictly above `other` in the tree?
    pub fn is_parent_of(&self, other: &DavPath) -> bool {
        let base = self.path.trim_end_matches('/');
        other.path.len() > base.len() + 1 && other.path.as_bytes()[base.len()] == b'/'
            && other.path.starts_with(base)
    }

    /// The decoded path, without the prefix.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// As a percent-encoded url string, without the prefix.
    pub fn as_url_string(&self) -> String {
        utf8_percent_encode(&self.path, PATH_ENCODE_SET).to_string()
    }

    /// The same path, but with the prefix put back in front.
    pub fn with_prefix(&self) -> DavPathWithPrefix {
        DavPathWithPrefix(self)
    }
}

/// Borrowed view of a [`DavPath`] that renders with the prefix included.
pub struct DavPathWithPrefix<'a>(&'a DavPath);

impl DavPathWithPrefix<'_> {
    pub fn as_url_string(&self) -> String {
        let mut s = utf8_percent_encode(&self.0.prefix, PATH_ENCODE_SET).to_string();
        s.push_str(&self.0.as_url_string());
        s
    }
}

impl fmt::Debug for DavPathWithPrefix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.0.prefix, self.0.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_decode() {
        let p = DavPath::from_str_and_prefix("/dav/a%20b/c.txt", "/dav").unwrap();
        assert_eq!(p.as_str(), "/a b/c.txt");
        assert_eq!(p.as_url_string(), "/a%20b/c.txt");
        assert_eq!(p.with_prefix().as_url_string(), "/dav/a%20b/c.txt");
        assert!(!p.is_collection());
    }

    #[test]
    fn normalization() {
        let p = DavPath::from_str_and_prefix("/a//b/./c/", "").unwrap();
        assert_eq!(p.as_str(), "/a/b/c/");
        assert!(p.is_collection());
        assert!(DavPath::from_str_and_prefix("/a/../b", "").is_err());
        assert!(DavPath::from_str_and_prefix("relative", "").is_err());
        assert!(DavPath::from_str_and_prefix("/other/x", "/dav").is_err());
    }

    #[test]
    fn parents() {
        let p = DavPath::from_str_and_prefix("/a/b/c.txt", "").unwrap();
        assert_eq!(p.parent().as_str(), "/a/b/");
        let root = DavPath::from_str_and_prefix("/", "").unwrap();
        assert_eq!(root.parent().as_str(), "/");

        let dir = DavPath::from_str_and_prefix("/a/b/", "").unwrap();
        assert!(dir.parent().is_parent_of(&dir));
        assert!(dir.is_parent_of(&p));
        assert!(!p.is_parent_of(&dir));
        let sibling = DavPath::from_str_and_prefix("/a/bc", "").unwrap();
        assert!(!dir.is_parent_of(&sibling));
    }
}
