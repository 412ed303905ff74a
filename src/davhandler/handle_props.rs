//
// PROPFIND / PROPPATCH.
//
// Generic property storage is not part of this library; what we serve
// are the lock related live properties (DAV:supportedlock and
// DAV:lockdiscovery, rendered from the locksystem) plus the bare
// minimum a webdav client expects (resourcetype, getcontentlength).
// PROPPATCH accordingly refuses every mutation, but only after the
// lock validation stage had its say.
//
use std::io::Write;

use http::{Request, Response, StatusCode};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};
use xmltree::Element;

use super::handle_lock::{emit_activelock, emit_supportedlock};
use crate::body::Body;
use crate::errors::DavError;
use crate::fs::DavMetaData;
use crate::util::MemBuffer;
use crate::DavResult;

// the live properties we can answer.
const LIVE_PROPS: &[&str] = &[
    "resourcetype",
    "getcontentlength",
    "supportedlock",
    "lockdiscovery",
];

enum PropfindType {
    AllProp,
    PropName,
    Prop(Vec<String>),
}

fn parse_propfind(body: &[u8]) -> DavResult<PropfindType> {
    if body.is_empty() {
        return Ok(PropfindType::AllProp);
    }
    let root = Element::parse(body)?;
    if root.name != "propfind" {
        return Err(DavError::XmlParseError);
    }
    if root.get_child("allprop").is_some() {
        return Ok(PropfindType::AllProp);
    }
    if root.get_child("propname").is_some() {
        return Ok(PropfindType::PropName);
    }
    let prop = root.get_child("prop").ok_or(DavError::XmlParseError)?;
    let names = prop
        .children
        .iter()
        .filter_map(|c| c.as_element())
        .map(|e| e.name.clone())
        .collect();
    Ok(PropfindType::Prop(names))
}

impl crate::DavHandler {
    pub(crate) async fn handle_propfind(
        &self,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut path = self.path(req);
        let meta = self.fs.metadata(&path).await?;
        if meta.is_dir() {
            path.add_slash();
        }

        let wanted = match parse_propfind(body)? {
            PropfindType::AllProp => LIVE_PROPS.iter().map(|s| s.to_string()).collect(),
            PropfindType::PropName => {
                return self.propfind_names(&path);
            }
            PropfindType::Prop(names) => names,
        };

        let mut w = EmitterConfig::new().create_writer(MemBuffer::new());
        w.write(XmlEvent::start_element("D:multistatus").ns("D", "DAV:"))?;
        w.write(XmlEvent::start_element("D:response"))?;
        emit_href(&mut w, &path.with_prefix().as_url_string())?;

        let (found, missing): (Vec<_>, Vec<_>) = wanted
            .into_iter()
            .partition(|name| LIVE_PROPS.contains(&name.as_str()));

        if !found.is_empty() {
            w.write(XmlEvent::start_element("D:propstat"))?;
            w.write(XmlEvent::start_element("D:prop"))?;
            for name in &found {
                self.emit_live_prop(&mut w, name, &path, &*meta)?;
            }
            w.write(XmlEvent::end_element())?;
            emit_status(&mut w, StatusCode::OK)?;
            w.write(XmlEvent::end_element())?;
        }
        if !missing.is_empty() {
            w.write(XmlEvent::start_element("D:propstat"))?;
            w.write(XmlEvent::start_element("D:prop"))?;
            for name in &missing {
                w.write(XmlEvent::start_element(name.as_str()))?;
                w.write(XmlEvent::end_element())?;
            }
            w.write(XmlEvent::end_element())?;
            emit_status(&mut w, StatusCode::NOT_FOUND)?;
            w.write(XmlEvent::end_element())?;
        }

        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        Ok(multistatus_response(w.into_inner().take()))
    }

    fn propfind_names(&self, path: &crate::davpath::DavPath) -> DavResult<Response<Body>> {
        let mut w = EmitterConfig::new().create_writer(MemBuffer::new());
        w.write(XmlEvent::start_element("D:multistatus").ns("D", "DAV:"))?;
        w.write(XmlEvent::start_element("D:response"))?;
        emit_href(&mut w, &path.with_prefix().as_url_string())?;
        w.write(XmlEvent::start_element("D:propstat"))?;
        w.write(XmlEvent::start_element("D:prop"))?;
        for name in LIVE_PROPS {
            w.write(XmlEvent::start_element(format!("D:{name}").as_str()))?;
            w.write(XmlEvent::end_element())?;
        }
        w.write(XmlEvent::end_element())?;
        emit_status(&mut w, StatusCode::OK)?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        Ok(multistatus_response(w.into_inner().take()))
    }

    fn emit_live_prop<W: Write>(
        &self,
        w: &mut EventWriter<W>,
        name: &str,
        path: &crate::davpath::DavPath,
        meta: &dyn DavMetaData,
    ) -> DavResult<()> {
        match name {
            "resourcetype" => {
                w.write(XmlEvent::start_element("D:resourcetype"))?;
                if meta.is_dir() {
                    w.write(XmlEvent::start_element("D:collection"))?;
                    w.write(XmlEvent::end_element())?;
                }
                w.write(XmlEvent::end_element())?;
            }
            "getcontentlength" => {
                w.write(XmlEvent::start_element("D:getcontentlength"))?;
                w.write(XmlEvent::characters(&meta.len().to_string()))?;
                w.write(XmlEvent::end_element())?;
            }
            "supportedlock" => {
                w.write(XmlEvent::start_element("D:supportedlock"))?;
                if self.ls.is_some() {
                    emit_supportedlock(w)?;
                }
                w.write(XmlEvent::end_element())?;
            }
            "lockdiscovery" => {
                w.write(XmlEvent::start_element("D:lockdiscovery"))?;
                if let Some(ls) = self.ls.as_ref() {
                    for lock in ls.locks(path, false) {
                        emit_activelock(w, &lock)?;
                    }
                }
                w.write(XmlEvent::end_element())?;
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) async fn handle_proppatch(
        &self,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let path = self.path(req);
        self.fs.metadata(&path).await?;

        let root = Element::parse(body)?;
        if root.name != "propertyupdate" {
            return Err(DavError::XmlParseError);
        }
        let mut names = Vec::new();
        for update in root.children.iter().filter_map(|c| c.as_element()) {
            if update.name != "set" && update.name != "remove" {
                continue;
            }
            if let Some(prop) = update.get_child("prop") {
                names.extend(
                    prop.children
                        .iter()
                        .filter_map(|c| c.as_element())
                        .map(|e| e.name.clone()),
                );
            }
        }
        if names.is_empty() {
            return Err(DavError::XmlParseError);
        }

        let mut w = EmitterConfig::new().create_writer(MemBuffer::new());
        w.write(XmlEvent::start_element("D:multistatus").ns("D", "DAV:"))?;
        w.write(XmlEvent::start_element("D:response"))?;
        emit_href(&mut w, &path.with_prefix().as_url_string())?;
        w.write(XmlEvent::start_element("D:propstat"))?;
        w.write(XmlEvent::start_element("D:prop"))?;
        for name in &names {
            w.write(XmlEvent::start_element(name.as_str()))?;
            w.write(XmlEvent::end_element())?;
        }
        w.write(XmlEvent::end_element())?;
        emit_status(&mut w, StatusCode::FORBIDDEN)?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        Ok(multistatus_response(w.into_inner().take()))
    }
}

fn emit_href<W: Write>(w: &mut EventWriter<W>, href: &str) -> DavResult<()> {
    w.write(XmlEvent::start_element("D:href"))?;
    w.write(XmlEvent::characters(href))?;
    w.write(XmlEvent::end_element())?;
    Ok(())
}

fn emit_status<W: Write>(w: &mut EventWriter<W>, status: StatusCode) -> DavResult<()> {
    w.write(XmlEvent::start_element("D:status"))?;
    w.write(XmlEvent::characters(&format!(
        "HTTP/1.1 {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )))?;
    w.write(XmlEvent::end_element())?;
    Ok(())
}

fn multistatus_response(body: bytes::Bytes) -> Response<Body> {
    let mut res = Response::new(Body::from(body));
    *res.status_mut() = StatusCode::MULTI_STATUS;
    res.headers_mut().insert(
        "content-type",
        "application/xml; charset=utf-8".parse().unwrap(),
    );
    res
}
