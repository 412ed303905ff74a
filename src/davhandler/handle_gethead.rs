use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::fs::OpenOptions;
use crate::util::DavMethod;
use crate::DavResult;

impl crate::DavHandler {
    // Plain GET/HEAD of a file. No ranges, no caching conditionals;
    // this library is about webdav, not about being a file server.
    pub(crate) async fn handle_get(
        &self,
        req: &Request<()>,
        method: DavMethod,
    ) -> DavResult<Response<Body>> {
        let path = self.path(req);
        let meta = self.fs.metadata(&path).await?;
        if meta.is_dir() {
            return Err(StatusCode::METHOD_NOT_ALLOWED.into());
        }

        let len = meta.len();
        let mut res = Response::new(Body::empty());
        res.headers_mut().typed_insert(headers::ContentLength(len));
        res.headers_mut()
            .insert("accept-ranges", "none".parse().unwrap());
        if let Ok(modified) = meta.modified() {
            res.headers_mut()
                .typed_insert(headers::LastModified::from(modified));
        }

        if method == DavMethod::Get {
            let mut file = self.fs.open(&path, OpenOptions::read()).await?;
            let data = file.read_bytes(len as usize).await?;
            *res.body_mut() = Body::from(data);
        }
        Ok(res)
    }
}
