//
// The locking protocol (RFC4918 #6-#9): the LOCK/UNLOCK handlers, the
// lock-token validation stage that runs in front of every other method,
// and the XML payloads for both.
//
use std::collections::HashSet;
use std::io::Write;
use std::time::SystemTime;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};
use xmltree::Element;

use crate::body::Body;
use crate::conditional;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::{FsError, OpenOptions};
use crate::ls::{DavLock, DavTimeout, LockScope};
use crate::util::{DavMethod, MemBuffer};
use crate::xmltree_ext::emit_element;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_lock(
        &self,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut path = self.path(req);
        let ls = self
            .ls
            .as_ref()
            .ok_or(DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;

        // every lock currently covering this path.
        let cur_locks = ls.locks(&path, false);

        let mut lock = if !body.is_empty() {
            // a body means a new lock.
            let (scope, owner) = parse_lockinfo(body)?;
            if let Some(blocking) = cur_locks.iter().find(|l| l.scope == LockScope::Exclusive) {
                return Err(DavError::ConflictingLock(blocking.clone()));
            }
            if scope == LockScope::Exclusive {
                if let Some(blocking) = cur_locks.first() {
                    return Err(DavError::ConflictingLock(blocking.clone()));
                }
            }

            let deep = match req
                .headers()
                .typed_try_get::<davheaders::Depth>()
                .map_err(|_| DavError::Status(StatusCode::BAD_REQUEST))?
            {
                Some(davheaders::Depth::Zero) => false,
                // Depth defaults to infinity on LOCK.
                Some(davheaders::Depth::Infinity) | None => true,
                Some(davheaders::Depth::One) => {
                    return Err(StatusCode::BAD_REQUEST.into());
                }
            };

            let mut lock = DavLock::new(path.clone());
            lock.scope = scope;
            lock.owner = owner;
            lock.deep = deep;
            lock.principal = self.principal.as_deref().cloned();
            lock
        } else {
            // no body: refresh the lock one of the submitted tokens names.
            let conditions = self.if_conditions(req)?;
            let found = conditions
                .iter()
                .flat_map(|list| &list.conditions)
                .find_map(|cond| match &cond.item {
                    davheaders::IfItem::Token(token) => {
                        cur_locks.iter().find(|l| l.uri_token() == *token)
                    }
                    _ => None,
                });
            match found {
                Some(lock) => lock.clone(),
                None => {
                    // nothing to refresh: either someone else's lock is in
                    // the way, or there is no lock here at all.
                    return Err(match cur_locks.into_iter().next() {
                        Some(blocking) => DavError::Locked(blocking),
                        None => StatusCode::BAD_REQUEST.into(),
                    });
                }
            }
        };

        // a refreshed lock keeps its own uri, which may differ from the
        // request path when it was found through an ancestor.
        path = lock.path.clone();

        lock.timeout = match req.headers().typed_try_get::<davheaders::Timeout>() {
            Ok(Some(t)) => t.0,
            Ok(None) => DavTimeout::Seconds(0),
            Err(_) => return Err(StatusCode::BAD_REQUEST.into()),
        };
        lock.created = SystemTime::now();

        // locking an unmapped url creates an empty resource (RFC4918 #7.3).
        let status = match self.fs.metadata(&path).await {
            Ok(_) => StatusCode::OK,
            Err(FsError::NotFound) => {
                let opts = OpenOptions {
                    write: true,
                    create: true,
                    ..Default::default()
                };
                let mut f = self.fs.open(&path, opts).await?;
                f.flush().await?;
                StatusCode::CREATED
            }
            Err(e) => return Err(e.into()),
        };

        if !ls.lock(&path, &lock) {
            // we checked above, but the locksystem serializes writers; it
            // can still refuse when another request got in between.
            return Err(match ls.locks(&path, false).into_iter().next() {
                Some(blocking) => DavError::ConflictingLock(blocking),
                None => StatusCode::LOCKED.into(),
            });
        }

        let mut w = EmitterConfig::new().create_writer(MemBuffer::new());
        w.write(XmlEvent::start_element("D:prop").ns("D", "DAV:"))?;
        w.write(XmlEvent::start_element("D:lockdiscovery"))?;
        emit_activelock(&mut w, &lock)?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        let body = w.into_inner().take();

        let mut res = Response::new(Body::from(body));
        *res.status_mut() = status;
        res.headers_mut().typed_insert(davheaders::LockToken(format!(
            "<{}>",
            lock.uri_token()
        )));
        res.headers_mut().insert(
            "content-type",
            "application/xml; charset=utf-8".parse().unwrap(),
        );
        Ok(res)
    }

    pub(crate) async fn handle_unlock(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        let path = self.path(req);
        let ls = self
            .ls
            .as_ref()
            .ok_or(DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;

        let token = req
            .headers()
            .typed_get::<davheaders::LockToken>()
            .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?
            .0;
        // some clients leave the angle brackets off.
        let token = token.trim();
        let token = if token.starts_with('<') {
            token.to_string()
        } else {
            format!("<{token}>")
        };

        let found = ls
            .locks(&path, false)
            .into_iter()
            .find(|l| format!("<{}>", l.uri_token()) == token);
        match found {
            Some(lock) => {
                ls.unlock(&lock.path, &lock);
                let mut res = Response::new(Body::empty());
                *res.status_mut() = StatusCode::NO_CONTENT;
                Ok(res)
            }
            None => Err(DavError::LockTokenMatchesRequestUri),
        }
    }

    // The lock-token validation stage. Runs before the primary handler of
    // every method except UNLOCK (which matches its token itself).
    pub(crate) fn verify_lock_stage(
        &self,
        method: DavMethod,
        path: &DavPath,
        req: &Request<()>,
    ) -> DavResult<()> {
        let conditions = self.if_conditions(req)?;

        let conditions = match (method, self.ls.as_ref()) {
            // LOCK does its own conflict handling; submitted tokens are
            // provisionally valid.
            (DavMethod::Lock, _) => conditional::mark_all_tokens_valid(conditions),
            // without a locksystem there is nothing to verify against.
            (_, None) => conditional::mark_all_tokens_valid(conditions),
            (_, Some(ls)) => {
                let required = self.required_locks(method, path, req)?;
                let (conditions, result) = conditional::verify_lock_tokens(
                    conditions,
                    required,
                    path,
                    &self.prefix,
                    |p| ls.locks(p, false),
                );
                result.map_err(DavError::Locked)?;
                conditions
            }
        };

        if !conditional::eval_if_lists(&conditions) {
            return Err(StatusCode::PRECONDITION_FAILED.into());
        }
        Ok(())
    }

    // The locks a method must present tokens for.
    fn required_locks(
        &self,
        method: DavMethod,
        path: &DavPath,
        req: &Request<()>,
    ) -> DavResult<Vec<DavLock>> {
        let Some(ls) = self.ls.as_ref() else {
            return Ok(Vec::new());
        };
        let mut required = match method {
            DavMethod::Delete => ls.locks(path, true),
            DavMethod::MkCol
            | DavMethod::MkCalendar
            | DavMethod::PropPatch
            | DavMethod::Put
            | DavMethod::Patch => ls.locks(path, false),
            DavMethod::Move => {
                let mut locks = ls.locks(path, true);
                locks.extend(ls.locks(&self.destination_path(req)?, false));
                locks
            }
            DavMethod::Copy => ls.locks(&self.destination_path(req)?, false),
            _ => Vec::new(),
        };
        // a lock visible through several paths counts once.
        let mut seen = HashSet::new();
        required.retain(|l| seen.insert(l.token.clone()));
        Ok(required)
    }

    // Remove every lock on `path` and below. Used when the resource
    // itself goes away (DELETE, and the source side of MOVE).
    pub(crate) fn cascade_unlock(&self, path: &DavPath) {
        if let Some(ls) = self.ls.as_ref() {
            for lock in ls.locks(path, true) {
                if !ls.unlock(&lock.path, &lock) {
                    debug!("cascade_unlock: {} already gone", lock.token);
                }
            }
        }
    }

    pub(crate) fn if_conditions(&self, req: &Request<()>) -> DavResult<Vec<davheaders::IfList>> {
        Ok(req
            .headers()
            .typed_try_get::<davheaders::IfHeader>()
            .map_err(|_| DavError::Status(StatusCode::BAD_REQUEST))?
            .map(|h| h.0)
            .unwrap_or_default())
    }

    pub(crate) fn destination_path(&self, req: &Request<()>) -> DavResult<DavPath> {
        let dest = req
            .headers()
            .typed_get::<davheaders::Destination>()
            .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?
            .0;
        let path = if dest.starts_with('/') {
            dest
        } else {
            url::Url::parse(&dest)
                .map_err(|_| DavError::Status(StatusCode::BAD_REQUEST))?
                .path()
                .to_string()
        };
        DavPath::from_str_and_prefix(&path, &self.prefix)
    }
}

// Parse a `<D:lockinfo>` request body into scope and owner. A body that
// is not a valid lockinfo document is a client error (400).
fn parse_lockinfo(body: &[u8]) -> DavResult<(LockScope, Option<Element>)> {
    let bad = || DavError::Status(StatusCode::BAD_REQUEST);
    let root = Element::parse(body).map_err(|_| bad())?;
    if root.name != "lockinfo" {
        return Err(bad());
    }
    let scope_elem = root.get_child("lockscope").ok_or_else(bad)?;
    let scope = if scope_elem.get_child("exclusive").is_some() {
        LockScope::Exclusive
    } else if scope_elem.get_child("shared").is_some() {
        LockScope::Shared
    } else {
        return Err(bad());
    };
    // only write locks exist (RFC4918 #7).
    if let Some(locktype) = root.get_child("locktype") {
        if locktype.get_child("write").is_none() {
            return Err(bad());
        }
    }
    let owner = root.get_child("owner").cloned();
    Ok((scope, owner))
}

pub(crate) fn emit_activelock<W: Write>(w: &mut EventWriter<W>, lock: &DavLock) -> DavResult<()> {
    w.write(XmlEvent::start_element("D:activelock"))?;

    w.write(XmlEvent::start_element("D:lockscope"))?;
    let scope = match lock.scope {
        LockScope::Exclusive => "D:exclusive",
        LockScope::Shared => "D:shared",
    };
    w.write(XmlEvent::start_element(scope))?;
    w.write(XmlEvent::end_element())?;
    w.write(XmlEvent::end_element())?;

    w.write(XmlEvent::start_element("D:locktype"))?;
    w.write(XmlEvent::start_element("D:write"))?;
    w.write(XmlEvent::end_element())?;
    w.write(XmlEvent::end_element())?;

    w.write(XmlEvent::start_element("D:depth"))?;
    w.write(XmlEvent::characters(if lock.deep { "infinity" } else { "0" }))?;
    w.write(XmlEvent::end_element())?;

    w.write(XmlEvent::start_element("D:timeout"))?;
    w.write(XmlEvent::characters(&lock.timeout.to_string()))?;
    w.write(XmlEvent::end_element())?;

    w.write(XmlEvent::start_element("D:locktoken"))?;
    w.write(XmlEvent::start_element("D:href"))?;
    w.write(XmlEvent::characters(&lock.uri_token()))?;
    w.write(XmlEvent::end_element())?;
    w.write(XmlEvent::end_element())?;

    w.write(XmlEvent::start_element("D:lockroot"))?;
    w.write(XmlEvent::start_element("D:href"))?;
    w.write(XmlEvent::characters(&lock.path.with_prefix().as_url_string()))?;
    w.write(XmlEvent::end_element())?;
    w.write(XmlEvent::end_element())?;

    if let Some(owner) = &lock.owner {
        emit_element(w, owner)?;
    }

    w.write(XmlEvent::end_element())?;
    Ok(())
}

pub(crate) fn emit_supportedlock<W: Write>(w: &mut EventWriter<W>) -> DavResult<()> {
    for scope in ["D:exclusive", "D:shared"] {
        w.write(XmlEvent::start_element("D:lockentry"))?;
        w.write(XmlEvent::start_element("D:lockscope"))?;
        w.write(XmlEvent::start_element(scope))?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::start_element("D:locktype"))?;
        w.write(XmlEvent::start_element("D:write"))?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockinfo_scopes() {
        let body = br#"<?xml version="1.0"?>
            <D:lockinfo xmlns:D="DAV:">
              <D:lockscope><D:exclusive/></D:lockscope>
              <D:locktype><D:write/></D:locktype>
              <D:owner>me</D:owner>
            </D:lockinfo>"#;
        let (scope, owner) = parse_lockinfo(body).unwrap();
        assert_eq!(scope, LockScope::Exclusive);
        assert!(owner.is_some());

        let body = br#"<D:lockinfo xmlns:D="DAV:">
              <D:lockscope><D:shared/></D:lockscope>
              <D:locktype><D:write/></D:locktype>
            </D:lockinfo>"#;
        let (scope, owner) = parse_lockinfo(body).unwrap();
        assert_eq!(scope, LockScope::Shared);
        assert!(owner.is_none());
    }

    #[test]
    fn lockinfo_rejects_junk_as_bad_request() {
        // any body that is not a valid lockinfo document is a 400.
        let is_400 = |body: &[u8]| {
            matches!(
                parse_lockinfo(body),
                Err(ref e) if e.statuscode() == StatusCode::BAD_REQUEST
            )
        };
        assert!(is_400(b"not xml at all"));
        assert!(is_400(b"<foo/>"));
        let no_scope = br#"<D:lockinfo xmlns:D="DAV:"><D:owner>x</D:owner></D:lockinfo>"#;
        assert!(is_400(no_scope));
        let read_lock = br#"<D:lockinfo xmlns:D="DAV:">
              <D:lockscope><D:exclusive/></D:lockscope>
              <D:locktype><D:read/></D:locktype>
            </D:lockinfo>"#;
        assert!(is_400(read_lock));
    }

    #[test]
    fn activelock_fragment() {
        let path = DavPath::from_str_and_prefix("/dir/a%20b.txt", "").unwrap();
        let mut lock = DavLock::new(path);
        lock.deep = true;
        lock.timeout = DavTimeout::Seconds(3600);

        let mut w = EmitterConfig::new()
            .write_document_declaration(false)
            .create_writer(MemBuffer::new());
        w.write(XmlEvent::start_element("D:lockdiscovery").ns("D", "DAV:"))
            .unwrap();
        emit_activelock(&mut w, &lock).unwrap();
        w.write(XmlEvent::end_element()).unwrap();
        let out = String::from_utf8(w.into_inner().take().to_vec()).unwrap();

        assert!(out.contains("<D:depth>infinity</D:depth>"));
        assert!(out.contains("<D:timeout>Second-3600</D:timeout>"));
        assert!(out.contains(&format!("opaquelocktoken:{}", lock.token)));
        assert!(out.contains("/dir/a%20b.txt"));
    }
}
