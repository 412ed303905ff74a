use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::fs::FsError;
use crate::DavResult;

impl crate::DavHandler {
    // MKCOL and MKCALENDAR; both create a collection here, a calendar
    // is just a collection with a different resource type.
    pub(crate) async fn handle_mkcol(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        let path = self.path(req);

        if !self.has_parent(&path).await {
            return Err(StatusCode::CONFLICT.into());
        }
        match self.fs.create_dir(&path).await {
            Ok(()) => {}
            Err(FsError::Exists) => return Err(StatusCode::METHOD_NOT_ALLOWED.into()),
            Err(e) => return Err(e.into()),
        }

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::CREATED;
        Ok(res)
    }
}
