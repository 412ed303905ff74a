use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_delete(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        let path = self.path(req);
        let meta = self.fs.metadata(&path).await?;

        if meta.is_dir() {
            self.fs.remove_dir(&path).await?;
        } else {
            self.fs.remove_file(&path).await?;
        }

        // the resource is gone, so are its locks and those of everything
        // below it.
        self.cascade_unlock(&path);

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::NO_CONTENT;
        Ok(res)
    }
}
